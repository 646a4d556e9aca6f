//! The token façade consumers talk to.

pub mod scheduler;
pub mod token_service;

pub use token_service::{SessionReport, TokenService};
