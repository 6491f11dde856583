//! odoolink Client
//!
//! Resilient access to one or more Odoo instances:
//!
//! - [`OdooClient`]: one authenticated session, one attempt per call
//! - [`RetryPolicy`]: exponential backoff around any fallible async operation,
//!   with re-authentication when a session expires
//! - [`ConnectionManager`]: per-instance pools of authenticated clients
//!
//! Every failure is an [`odoolink_common::OdooError`]; turn it into the
//! external `{error, code, details}` shape with
//! [`odoolink_common::format_error_response`].

pub mod client;
pub mod pool;
pub mod retry;

#[cfg(test)]
mod mock;

pub use client::OdooClient;
pub use pool::{ConnectionManager, PoolStats, PooledClient};
pub use retry::{with_retry, RetryPolicy};
