//! Session identity, generation and status.

pub mod state;

pub use state::{Session, SessionStatus};
