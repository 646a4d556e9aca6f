//! Core type definitions used across the Credence workspace.

pub mod credential;

pub use credential::{
    AccessToken, BackendKind, CredentialKey, RefreshToken, StoredCredentialSet, TokenGrant,
};
