//! Refresh endpoint transports.

pub mod http;

pub use http::HttpRefreshTransport;
