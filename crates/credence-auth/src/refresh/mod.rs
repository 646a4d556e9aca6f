//! Single-flight access-token refresh.

pub mod coordinator;
pub mod error;

pub use coordinator::{RefreshAttemptState, RefreshCoordinator, RefreshPhase, RefreshResult};
pub use error::RefreshError;
