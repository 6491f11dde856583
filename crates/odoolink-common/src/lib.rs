//! odoolink Common Types and Transport
//!
//! Shared building blocks for talking to Odoo instances over JSON-RPC:
//!
//! - **Protocol Layer**: request/response envelopes, the fault envelope, the
//!   closed error taxonomy and the fault translator
//! - **Configuration**: validated per-instance connection parameters
//! - **Transport Layer**: the [`transport::Transport`] seam and its HTTP
//!   implementation
//!
//! # Components
//!
//! - [`protocol`] - JSON-RPC types, [`OdooError`], [`parse_odoo_error`], [`format_error_response`]
//! - [`config`] - [`ConnectionConfig`] and [`ConnectionSet`]
//! - [`transport`] - [`Transport`], [`TransportFactory`], [`HttpTransport`]
//!
//! # Example
//!
//! ```
//! use odoolink_common::{format_error_response, parse_odoo_error, ErrorKind, FaultData, JsonRpcError};
//!
//! let fault = JsonRpcError::server_fault(FaultData::new(
//!     "odoo.exceptions.AccessError",
//!     "You are not allowed to access 'Journal Entry' (account.move) records.",
//! ));
//! let err = parse_odoo_error(&fault);
//! assert_eq!(err.kind(), ErrorKind::Permission);
//!
//! let response = format_error_response(&err);
//! assert_eq!(response.code, "PERMISSION_ERROR");
//! assert_eq!(response.details["model"], "account.move");
//! ```

pub mod config;
pub mod protocol;
pub mod transport;

pub use config::{ConfigError, ConnectionConfig, ConnectionSet};
pub use protocol::*;
pub use transport::{HttpTransport, HttpTransportFactory, Transport, TransportFactory};
