//! Core traits defined in `credence-core` and implemented by other crates.

pub mod refresh_transport;
pub mod storage_backend;

pub use refresh_transport::{RefreshResponse, RefreshTransport, TransportError};
pub use storage_backend::{BackendError, StorageBackend};
