use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Free-form structured context attached to an error (url, model, fields, ...).
pub type Details = Map<String, Value>;

/// Wire code reported for errors that are not [`OdooError`]s.
pub const FALLBACK_CODE: &str = "UNKNOWN_ERROR";

/// Closed set of failure categories callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Connection,
    Authentication,
    Permission,
    Validation,
    NotFound,
    RateLimit,
    Timeout,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::Connection,
        ErrorKind::Authentication,
        ErrorKind::Permission,
        ErrorKind::Validation,
        ErrorKind::NotFound,
        ErrorKind::RateLimit,
        ErrorKind::Timeout,
        ErrorKind::Unknown,
    ];

    /// Stable code reported to external callers.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Connection => "CONNECTION_ERROR",
            ErrorKind::Authentication => "AUTHENTICATION_ERROR",
            ErrorKind::Permission => "PERMISSION_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::RateLimit => "RATE_LIMIT_EXCEEDED",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::Unknown => FALLBACK_CODE,
        }
    }

    /// Transport-class kinds that the default retry policy re-attempts.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Connection | ErrorKind::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "CONNECTION",
            ErrorKind::Authentication => "AUTHENTICATION",
            ErrorKind::Permission => "PERMISSION",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Typed error produced at the client boundary.
///
/// Every remote fault and every transport failure is turned into one of these
/// before it reaches calling code. Values are built once, where the failure is
/// recognised, and then only moved.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OdooError {
    #[error("Connection error: {message}")]
    Connection { message: String, details: Details },

    #[error("Authentication failed: {message}")]
    Authentication { message: String, details: Details },

    #[error("Permission denied: {message}")]
    Permission { message: String, details: Details },

    #[error("Validation error: {message}")]
    Validation { message: String, details: Details },

    #[error("Not found: {message}")]
    NotFound { message: String, details: Details },

    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String, details: Details },

    #[error("Request timeout: {message}")]
    Timeout { message: String, details: Details },

    #[error("{message}")]
    Unknown { message: String, details: Details },

    /// The retry policy gave up; `last` is the final underlying failure.
    #[error("Max retries ({attempts}) exceeded: {last}")]
    MaxRetriesExceeded { attempts: u32, last: Box<OdooError> },
}

impl OdooError {
    /// Builds an error of `kind` with empty details.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::with_details(kind, message, Details::new())
    }

    pub fn with_details(kind: ErrorKind, message: impl Into<String>, details: Details) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Connection => OdooError::Connection { message, details },
            ErrorKind::Authentication => OdooError::Authentication { message, details },
            ErrorKind::Permission => OdooError::Permission { message, details },
            ErrorKind::Validation => OdooError::Validation { message, details },
            ErrorKind::NotFound => OdooError::NotFound { message, details },
            ErrorKind::RateLimit => OdooError::RateLimit { message, details },
            ErrorKind::Timeout => OdooError::Timeout { message, details },
            ErrorKind::Unknown => OdooError::Unknown { message, details },
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Returns the error with one more detail entry.
    ///
    /// Meant for use while the error is being built, before it is returned.
    pub fn with_detail(self, key: &str, value: impl Into<Value>) -> Self {
        match self {
            OdooError::MaxRetriesExceeded { attempts, last } => OdooError::MaxRetriesExceeded {
                attempts,
                last: Box::new(last.with_detail(key, value)),
            },
            other => {
                let kind = other.kind();
                let (message, mut details) = other.into_parts();
                details.insert(key.to_string(), value.into());
                Self::with_details(kind, message, details)
            }
        }
    }

    fn into_parts(self) -> (String, Details) {
        match self {
            OdooError::Connection { message, details }
            | OdooError::Authentication { message, details }
            | OdooError::Permission { message, details }
            | OdooError::Validation { message, details }
            | OdooError::NotFound { message, details }
            | OdooError::RateLimit { message, details }
            | OdooError::Timeout { message, details }
            | OdooError::Unknown { message, details } => (message, details),
            OdooError::MaxRetriesExceeded { last, .. } => last.into_parts(),
        }
    }

    /// Kind of the error; for an exhausted retry, the kind of the last failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OdooError::Connection { .. } => ErrorKind::Connection,
            OdooError::Authentication { .. } => ErrorKind::Authentication,
            OdooError::Permission { .. } => ErrorKind::Permission,
            OdooError::Validation { .. } => ErrorKind::Validation,
            OdooError::NotFound { .. } => ErrorKind::NotFound,
            OdooError::RateLimit { .. } => ErrorKind::RateLimit,
            OdooError::Timeout { .. } => ErrorKind::Timeout,
            OdooError::Unknown { .. } => ErrorKind::Unknown,
            OdooError::MaxRetriesExceeded { last, .. } => last.kind(),
        }
    }

    /// Message without the kind prefix added by `Display`.
    pub fn message(&self) -> &str {
        match self {
            OdooError::Connection { message, .. }
            | OdooError::Authentication { message, .. }
            | OdooError::Permission { message, .. }
            | OdooError::Validation { message, .. }
            | OdooError::NotFound { message, .. }
            | OdooError::RateLimit { message, .. }
            | OdooError::Timeout { message, .. }
            | OdooError::Unknown { message, .. } => message,
            OdooError::MaxRetriesExceeded { last, .. } => last.message(),
        }
    }

    pub fn details(&self) -> &Details {
        match self {
            OdooError::Connection { details, .. }
            | OdooError::Authentication { details, .. }
            | OdooError::Permission { details, .. }
            | OdooError::Validation { details, .. }
            | OdooError::NotFound { details, .. }
            | OdooError::RateLimit { details, .. }
            | OdooError::Timeout { details, .. }
            | OdooError::Unknown { details, .. } => details,
            OdooError::MaxRetriesExceeded { last, .. } => last.details(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Whether the default retry policy would re-attempt this failure.
    pub fn is_retryable(&self) -> bool {
        !self.is_max_retries_exceeded() && self.kind().is_transient()
    }

    pub fn is_max_retries_exceeded(&self) -> bool {
        matches!(self, OdooError::MaxRetriesExceeded { .. })
    }

    /// The failure that ended an exhausted retry, or `self`.
    pub fn last_error(&self) -> &OdooError {
        match self {
            OdooError::MaxRetriesExceeded { last, .. } => last.last_error(),
            other => other,
        }
    }

    /// True when the failure means the session behind the client is no
    /// longer valid, as opposed to a genuine authorization denial.
    pub fn is_session_expired(&self) -> bool {
        if self.is_max_retries_exceeded() {
            return false;
        }
        if !matches!(self.kind(), ErrorKind::Permission | ErrorKind::Authentication) {
            return false;
        }
        if self.details().get("session_expired") == Some(&Value::Bool(true)) {
            return true;
        }
        let message = self.message().to_ascii_lowercase();
        message.contains("session expired")
            || message.contains("session_expired")
            || message.contains("invalid session")
    }
}

impl From<serde_json::Error> for OdooError {
    fn from(err: serde_json::Error) -> Self {
        OdooError::unknown(format!("JSON serialization error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, OdooError>;
