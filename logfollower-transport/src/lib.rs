//! The transport contract the follower core consumes, plus a real
//! HTTP implementation.
//!
//! Generalizes `submerge-net::Node`'s synchronous, serde-framed
//! `{send_msg,recv_msg}` message passing to an async request/response
//! fetch against a remote master, since here the "wire" is an
//! HTTP-like chunked log stream rather than a paired request/response
//! protocol between symmetric peers.

mod error;
mod headers;
mod http;
mod transport;

#[cfg(feature = "test-util")]
mod fake;

pub use error::TransportError;
pub use headers::ChunkHeaders;
pub use http::HttpTransport;
pub use transport::{ChunkResponse, Transport};

#[cfg(feature = "test-util")]
pub use fake::FakeTransport;
