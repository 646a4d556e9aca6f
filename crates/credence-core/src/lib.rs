//! # credence-core
//!
//! Core crate for Credence. Contains the storage and transport traits,
//! configuration schemas, credential types, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Credence crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
