//! # credence-storage
//!
//! Credential storage backends for Credence: an in-process volatile store,
//! a durable local JSON document, an embedded SQLite store and an HTTP
//! cookie jar, plus the [`StorageManager`] that reads them in priority
//! order, fans writes out to all of them and reconciles divergence.

pub mod blocking;
pub mod local;
pub mod manager;
pub mod sync;
pub mod volatile;

#[cfg(feature = "cookie")]
pub mod cookie;
#[cfg(feature = "embedded")]
pub mod embedded;

pub use local::LocalFileBackend;
pub use manager::{BackendSnapshot, ReconcileReport, StorageManager, WriteReport};
pub use volatile::VolatileBackend;

#[cfg(feature = "cookie")]
pub use cookie::CookieBackend;
#[cfg(feature = "embedded")]
pub use embedded::EmbeddedBackend;
