//! Access-token decoding.

pub mod claims;
pub mod codec;

pub use claims::Claims;
pub use codec::{DecodeError, TokenCodec};
