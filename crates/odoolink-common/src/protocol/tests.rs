//! Cross-module protocol tests
//!
//! These tests follow a fault from the raw response body through the
//! translator to the boundary shape handed to external callers.

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_request_ids_are_unique() {
        let ids: HashSet<_> = (0..1000).map(|_| jsonrpc::next_request_id()).collect();
        assert_eq!(ids.len(), 1000, "All request IDs should be unique");
    }

    #[test]
    fn test_fault_body_to_error_response() {
        let body = r#"{
            "jsonrpc": "2.0",
            "id": 4,
            "error": {
                "code": 200,
                "message": "Odoo Server Error",
                "data": {
                    "name": "odoo.exceptions.AccessError",
                    "debug": "Traceback (most recent call last):\nodoo.exceptions.AccessError: You are not allowed to access 'Journal Entry' (account.move) records.",
                    "message": "You are not allowed to access 'Journal Entry' (account.move) records.",
                    "arguments": ["You are not allowed to access 'Journal Entry' (account.move) records."],
                    "context": {}
                }
            }
        }"#;

        let response: JsonRpcResponse = serde_json::from_str(body).unwrap();
        let err = parse_odoo_error(response.error.as_ref().unwrap());
        let wire = serde_json::to_value(format_error_response(&err)).unwrap();

        assert_eq!(wire["code"], json!("PERMISSION_ERROR"));
        assert_eq!(wire["details"]["model"], json!("account.move"));
        assert_eq!(
            wire["error"],
            json!("You are not allowed to access 'Journal Entry' (account.move) records.")
        );
    }

    #[test]
    fn test_server_fault_helper_round_trips_through_translator() {
        let fault = JsonRpcError::server_fault(FaultData::new(
            "odoo.exceptions.ValidationError",
            "Invalid value for field 'email'",
        ));
        let err = parse_odoo_error(&fault);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.details()["fields"], json!(["email"]));
    }
}
