//! # credence-auth
//!
//! Token handling for Credence: decoding access tokens, coordinating the
//! single in-flight refresh, the [`TokenService`] façade consumers talk to,
//! and the [`LifecycleWatcher`] that revalidates on foreground return.
//!
//! ## Modules
//!
//! - `jwt`: access-token payload decoding (no signature verification)
//! - `session`: session generation, status and write gate
//! - `refresh`: single-flight refresh state machine with bounded retries
//! - `service`: the token façade and proactive refresh scheduling
//! - `lifecycle`: foreground-return and periodic revalidation
//! - `transport`: HTTP client for the auth server's refresh endpoint
//! - `engine`: wiring of all of the above from configuration

pub mod engine;
pub mod jwt;
pub mod lifecycle;
pub mod refresh;
pub mod service;
pub mod session;
pub mod transport;

pub use engine::CredentialEngine;
pub use jwt::{Claims, DecodeError, TokenCodec};
pub use lifecycle::{ForegroundOutcome, LifecycleEvent, LifecycleWatcher};
pub use refresh::{RefreshCoordinator, RefreshError, RefreshPhase};
pub use service::{SessionReport, TokenService};
pub use session::{Session, SessionStatus};
pub use transport::HttpRefreshTransport;
