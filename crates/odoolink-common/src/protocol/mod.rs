pub mod error;
pub mod jsonrpc;
pub mod translate;

pub use error::{Details, ErrorKind, OdooError, Result, FALLBACK_CODE};
pub use jsonrpc::{FaultData, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use translate::{format_dyn_error_response, format_error_response, parse_odoo_error, ErrorResponse};

#[cfg(test)]
mod tests;
