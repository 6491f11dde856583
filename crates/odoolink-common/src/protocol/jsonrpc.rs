//! Odoo JSON-RPC Envelope Types
//!
//! Odoo exposes its legacy RPC services over a JSON-RPC 2.0 endpoint
//! (`POST /jsonrpc`). Every call uses the JSON-RPC method `"call"` and names
//! the real target inside `params`:
//!
//! ```text
//! {"jsonrpc": "2.0", "method": "call",
//!  "params": {"service": "object", "method": "execute_kw", "args": [...]},
//!  "id": 7}
//! ```
//!
//! Failures come back as a fault envelope in the `error` member:
//!
//! ```text
//! {"jsonrpc": "2.0", "id": 7, "error": {
//!     "code": 200, "message": "Odoo Server Error",
//!     "data": {"name": "odoo.exceptions.AccessError", "debug": "Traceback ...",
//!              "message": "...", "arguments": [...], "context": {}}}}
//! ```
//!
//! # Example
//!
//! ```
//! use odoolink_common::protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::service_call("common", "version", json!([]), 1);
//! assert_eq!(request.method, "call");
//!
//! let response = JsonRpcResponse::success(json!(1), json!({"server_version": "17.0"}));
//! assert!(response.error.is_none());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Service hosting `authenticate` and `version`.
pub const SERVICE_COMMON: &str = "common";
/// Service hosting `execute_kw`.
pub const SERVICE_OBJECT: &str = "object";

/// Code Odoo puts on every server-side fault envelope.
pub const ODOO_SERVER_ERROR: i64 = 200;
/// Code Odoo uses when the HTTP session behind a request is gone.
pub const ODOO_SESSION_EXPIRED: i64 = 100;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-wide monotonically increasing request id.
pub fn next_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,
    /// Name of the method to invoke
    pub method: String,
    /// Parameter values
    pub params: Value,
    /// Request identifier
    pub id: Value,
}

impl JsonRpcRequest {
    /// Builds the `call` envelope Odoo expects for `service.method(*args)`.
    pub fn service_call(service: &str, method: &str, args: Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: "call".into(),
            params: json!({
                "service": service,
                "method": method,
                "args": args,
            }),
            id: json!(id),
        }
    }

    /// Service named in the params, if any.
    pub fn service(&self) -> Option<&str> {
        self.params.get("service").and_then(Value::as_str)
    }

    /// Remote method named in the params, if any.
    pub fn service_method(&self) -> Option<&str> {
        self.params.get("method").and_then(Value::as_str)
    }

    /// Positional arguments named in the params, if any.
    pub fn service_args(&self) -> Option<&Vec<Value>> {
        self.params.get("args").and_then(Value::as_array)
    }
}

/// JSON-RPC 2.0 response
///
/// `result` and `error` default to `None` so that servers which omit the
/// unused member still decode. An explicit `"result": null` decodes as
/// `Some(Value::Null)`, keeping it apart from a missing member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,
    /// Result value on success
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Fault envelope on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier
    #[serde(default)]
    pub id: Value,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response
    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// Fault envelope carried in the `error` member of a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    /// Error code (200 for Odoo server faults)
    pub code: i64,
    /// Short description, usually "Odoo Server Error"
    pub message: String,
    /// Remote exception details; shape is only trusted after [`Self::fault_data`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Builds an Odoo-style server fault for the given remote exception.
    pub fn server_fault(data: FaultData) -> Self {
        Self {
            code: ODOO_SERVER_ERROR,
            message: "Odoo Server Error".into(),
            data: serde_json::to_value(data).ok(),
        }
    }

    /// Decodes the nested `{name, debug, message, arguments}` payload.
    ///
    /// Returns `None` when `data` is absent or is not an object, which is
    /// what non-Odoo JSON-RPC servers send.
    pub fn fault_data(&self) -> Option<FaultData> {
        match &self.data {
            Some(data @ Value::Object(_)) => serde_json::from_value(data.clone()).ok(),
            _ => None,
        }
    }
}

/// Remote exception description nested inside a fault envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FaultData {
    /// Fully qualified remote exception class, e.g. `odoo.exceptions.AccessError`
    pub name: String,
    /// Free-text debug description, usually a formatted traceback
    pub debug: String,
    /// Human readable message of the remote exception
    pub message: String,
    /// Constructor arguments of the remote exception
    pub arguments: Vec<Value>,
    /// Remote request context
    pub context: Value,
}

impl FaultData {
    /// Convenience constructor used by servers and tests.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let name = name.into();
        Self {
            debug: format!("Traceback (most recent call last):\n{name}: {message}"),
            arguments: vec![Value::String(message.clone())],
            name,
            message,
            context: Value::Object(Default::default()),
        }
    }
}
