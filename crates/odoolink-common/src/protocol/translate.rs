//! Fault Translation
//!
//! Odoo reports every failure as the same generic envelope wrapping the
//! string form of a Python exception. This module recovers the exception
//! category and the identifiers callers care about (model, fields, record
//! ids) so that nothing downstream has to inspect raw fault payloads.
//!
//! It also owns the one shape in which failures leave the crate boundary:
//! [`ErrorResponse`] `{error, code, details}`.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;

use super::error::{Details, ErrorKind, OdooError, FALLBACK_CODE};
use super::jsonrpc::{JsonRpcError, ODOO_SESSION_EXPIRED};

static MODEL_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bmodel:\s*([a-z][a-z0-9_]*(?:\.[a-z0-9_]+)+)").expect("valid regex")
});

static MODEL_IN_PARENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([a-z][a-z0-9_]*(?:\.[a-z0-9_]+)+)\)").expect("valid regex")
});

// 'Customer' (partner_id)
static FIELD_WITH_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"][^'"]+['"]\s*\(([a-z_][a-z0-9_]*)\)"#).expect("valid regex")
});

static QUOTED_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"`]([a-z_][a-z0-9_]*)['"`]"#).expect("valid regex")
});

// Record: res.partner(42, 43)
static MISSING_RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Record:\s*([a-z][a-z0-9_]*(?:\.[a-z0-9_]+)*)\(([0-9,\s]*)\)").expect("valid regex")
});

/// Translates an Odoo fault envelope into a typed error.
///
/// The remote exception class is read from `data.name`:
///
/// - `...AccessError` → [`ErrorKind::Permission`], offending model in `details.model`
/// - `...ValidationError` → [`ErrorKind::Validation`], field names in `details.fields`
/// - `...MissingError` → [`ErrorKind::NotFound`]
/// - `...SessionExpiredException` → [`ErrorKind::Permission`] with `details.session_expired`
/// - anything else → [`ErrorKind::Unknown`] with the remote message unchanged
pub fn parse_odoo_error(fault: &JsonRpcError) -> OdooError {
    let Some(data) = fault.fault_data() else {
        let mut details = Details::new();
        details.insert("code".into(), fault.code.into());
        if let Some(data) = &fault.data {
            details.insert("data".into(), data.clone());
        }
        if fault.code == ODOO_SESSION_EXPIRED {
            details.insert("session_expired".into(), Value::Bool(true));
            return OdooError::with_details(ErrorKind::Permission, fault.message.clone(), details);
        }
        return OdooError::with_details(ErrorKind::Unknown, fault.message.clone(), details);
    };

    let message = if data.message.is_empty() {
        fault.message.clone()
    } else {
        data.message.clone()
    };

    let mut details = Details::new();
    if !data.name.is_empty() {
        details.insert("exception".into(), Value::String(data.name.clone()));
    }

    let class = data.name.rsplit('.').next().unwrap_or_default();

    if class.ends_with("AccessError") {
        let model = find_model(&data.debug, class).or_else(|| find_model(&message, class));
        if let Some(model) = model {
            details.insert("model".into(), Value::String(model));
        }
        return OdooError::with_details(ErrorKind::Permission, message, details);
    }

    if class.ends_with("ValidationError") {
        let mut sources: Vec<&str> = data.arguments.iter().filter_map(Value::as_str).collect();
        if sources.is_empty() {
            sources.push(&message);
        }
        let fields = find_fields(&sources);
        if !fields.is_empty() {
            details.insert(
                "fields".into(),
                Value::Array(fields.into_iter().map(Value::String).collect()),
            );
        }
        return OdooError::with_details(ErrorKind::Validation, message, details);
    }

    if class.ends_with("MissingError") {
        let haystack = format!("{}\n{}", message, data.debug);
        if let Some(caps) = MISSING_RECORD.captures(&haystack) {
            details.insert("model".into(), Value::String(caps[1].to_string()));
            let ids: Vec<Value> = caps[2]
                .split(',')
                .filter_map(|id| id.trim().parse::<i64>().ok())
                .map(Value::from)
                .collect();
            if !ids.is_empty() {
                details.insert("record_ids".into(), Value::Array(ids));
            }
        }
        return OdooError::with_details(ErrorKind::NotFound, message, details);
    }

    if class.ends_with("SessionExpiredException") || fault.code == ODOO_SESSION_EXPIRED {
        details.insert("session_expired".into(), Value::Bool(true));
        return OdooError::with_details(ErrorKind::Permission, message, details);
    }

    OdooError::with_details(ErrorKind::Unknown, message, details)
}

/// Looks for a dotted model name, preferring the text after the last
/// mention of the exception class (the traceback's final line).
fn find_model(text: &str, class: &str) -> Option<String> {
    let tail = text.rfind(class).map(|idx| &text[idx..]).unwrap_or(text);
    [tail, text].into_iter().find_map(|haystack| {
        MODEL_LABELLED
            .captures(haystack)
            .or_else(|| MODEL_IN_PARENS.captures(haystack))
            .map(|caps| caps[1].to_string())
    })
}

fn find_fields(sources: &[&str]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for source in sources {
        for caps in FIELD_WITH_LABEL.captures_iter(source) {
            push_unique(&mut fields, &caps[1]);
        }
    }
    if fields.is_empty() {
        for source in sources {
            for caps in QUOTED_IDENTIFIER.captures_iter(source) {
                push_unique(&mut fields, &caps[1]);
            }
        }
    }
    fields
}

fn push_unique(fields: &mut Vec<String>, field: &str) {
    if !fields.iter().any(|f| f == field) {
        fields.push(field.to_string());
    }
}

/// Uniform `{error, code, details}` shape for every failure that leaves the crate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Details,
}

impl From<&OdooError> for ErrorResponse {
    fn from(err: &OdooError) -> Self {
        match err {
            OdooError::MaxRetriesExceeded { attempts, last } => {
                let mut details = last.details().clone();
                details.insert("attempts".into(), Value::from(*attempts));
                ErrorResponse {
                    error: err.to_string(),
                    code: last.code().to_string(),
                    details,
                }
            }
            typed => ErrorResponse {
                error: typed.message().to_string(),
                code: typed.code().to_string(),
                details: typed.details().clone(),
            },
        }
    }
}

/// Formats any error for an external caller.
///
/// [`OdooError`]s keep their kind code and details. Any other error gets
/// [`FALLBACK_CODE`] and its type name in `details.type`.
pub fn format_error_response<E>(err: &E) -> ErrorResponse
where
    E: std::error::Error + 'static,
{
    respond(err, short_type_name(std::any::type_name::<E>()))
}

/// Like [`format_error_response`] for type-erased errors, e.g. the inside of
/// a `Box<dyn Error>` or an `anyhow::Error`.
///
/// The concrete type is unknown here, so foreign errors report
/// `details.type = "Error"`.
pub fn format_dyn_error_response(err: &(dyn std::error::Error + 'static)) -> ErrorResponse {
    respond(err, "Error")
}

fn respond(err: &(dyn std::error::Error + 'static), type_name: &str) -> ErrorResponse {
    if let Some(typed) = err.downcast_ref::<OdooError>() {
        return ErrorResponse::from(typed);
    }

    let mut details = Details::new();
    details.insert("type".into(), Value::String(type_name.to_string()));
    ErrorResponse {
        error: err.to_string(),
        code: FALLBACK_CODE.to_string(),
        details,
    }
}

fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
