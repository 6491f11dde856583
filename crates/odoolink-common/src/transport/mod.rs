//! Transport Layer
//!
//! A [`Transport`] moves one JSON-RPC envelope to a remote instance and brings
//! the decoded response envelope back. It knows nothing about sessions or
//! fault translation; those live in the client.
//!
//! One transport is shared by every client of an instance, so implementations
//! must be safe to call concurrently. Transport-level failures are already
//! typed: [`ErrorKind::Connection`](crate::protocol::ErrorKind::Connection) for
//! refused or broken connections and 5xx replies,
//! [`ErrorKind::RateLimit`](crate::protocol::ErrorKind::RateLimit) for 429.
//!
//! # Components
//!
//! - **[`Transport`]**: the seam clients talk through
//! - **[`TransportFactory`]**: builds the shared transport for an instance
//! - **[`HttpTransport`]**: hyper-based implementation (`POST {url}/jsonrpc`)

pub mod http;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::config::ConnectionConfig;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, Result};

pub use http::{HttpTransport, HttpTransportFactory};

#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends one request and returns the response envelope, fault or not.
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse>;

    /// Releases the underlying connections. Later sends fail with a
    /// connection error.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Creates the shared transport for one instance.
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: &ConnectionConfig) -> Result<Arc<dyn Transport>>;
}
