//! Connection Configuration
//!
//! Validated connection parameters for one remote instance, and the set of
//! instances a process talks to. Validation happens once, when a value is
//! built or deserialized; a [`ConnectionConfig`] that exists is valid.
//!
//! # Example
//!
//! ```
//! use odoolink_common::config::ConnectionConfig;
//! use std::time::Duration;
//!
//! let config = ConnectionConfig::new(
//!     "prod",
//!     "https://erp.example.com",
//!     "prod_db",
//!     "api@example.com",
//!     "secret",
//!     Duration::from_secs(30),
//!     10,
//! ).unwrap();
//! assert_eq!(config.instance_id(), "prod");
//!
//! assert!(ConnectionConfig::new("prod", "erp.example.com", "db", "u", "p",
//!     Duration::from_secs(30), 10).is_err());
//! ```

use hyper::Uri;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default bound on idle (and checked out) clients per instance.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("timeout must be a positive number of seconds within range")]
    InvalidTimeout,

    #[error("max_connections must be greater than zero")]
    InvalidPoolSize,

    #[error("duplicate instance id '{0}'")]
    DuplicateInstance(String),

    #[error("no connections configured")]
    NoConnections,

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Connection parameters for one remote instance.
///
/// Immutable once built. The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawConnectionConfig")]
pub struct ConnectionConfig {
    instance_id: String,
    url: String,
    database: String,
    username: String,
    password: String,
    timeout: Duration,
    max_connections: usize,
}

impl ConnectionConfig {
    /// Validates and builds a config.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingField`] for an empty id, url, database, username or password
    /// - [`ConfigError::InvalidUrl`] unless the url is `http(s)://host[:port]` with a port in 1..=65535
    /// - [`ConfigError::InvalidTimeout`] / [`ConfigError::InvalidPoolSize`] for zero values
    pub fn new(
        instance_id: impl Into<String>,
        url: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
        max_connections: usize,
    ) -> Result<Self, ConfigError> {
        let instance_id = required("instance_id", instance_id.into())?;
        let url = validate_url(required("url", url.into())?)?;
        let database = required("database", database.into())?;
        let username = required("username", username.into())?;
        let password = password.into();
        if password.is_empty() {
            return Err(ConfigError::MissingField("password"));
        }
        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        if max_connections == 0 {
            return Err(ConfigError::InvalidPoolSize);
        }

        Ok(Self {
            instance_id,
            url,
            database,
            username,
            password,
            timeout,
            max_connections,
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Base url without a trailing slash.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// JSON-RPC endpoint derived from the base url.
    pub fn endpoint(&self) -> String {
        format!("{}/jsonrpc", self.url)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("instance_id", &self.instance_id)
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

fn required(field: &'static str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

fn validate_url(url: String) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        url: url.clone(),
        reason: reason.to_string(),
    };

    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(invalid("must start with http:// or https://"));
    }

    let uri: Uri = url.parse().map_err(|e: hyper::http::uri::InvalidUri| invalid(&e.to_string()))?;
    match uri.host() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(invalid("missing host")),
    }
    // `Uri::port_u16` yields None for out-of-range ports, so read the raw text.
    let authority = uri.authority().map(|a| a.as_str()).unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, rest)| rest);
    if let Some((_, port)) = host_port.rsplit_once(':').filter(|(_, p)| !p.contains(']')) {
        match port.parse::<u16>() {
            Ok(p) if p > 0 => {}
            _ => return Err(invalid("port must be between 1 and 65535")),
        }
    }

    Ok(url.trim_end_matches('/').to_string())
}

/// Shape accepted from config files before validation.
#[derive(Deserialize)]
struct RawConnectionConfig {
    #[serde(default)]
    instance_id: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    database: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    /// Seconds
    #[serde(default = "default_timeout_secs")]
    timeout: f64,
    #[serde(default = "default_max_connections")]
    max_connections: usize,
}

fn default_timeout_secs() -> f64 {
    DEFAULT_TIMEOUT.as_secs_f64()
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

impl TryFrom<RawConnectionConfig> for ConnectionConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConnectionConfig) -> Result<Self, Self::Error> {
        if raw.timeout <= 0.0 {
            return Err(ConfigError::InvalidTimeout);
        }
        let timeout = Duration::try_from_secs_f64(raw.timeout).map_err(|_| ConfigError::InvalidTimeout)?;
        ConnectionConfig::new(
            raw.instance_id,
            raw.url,
            raw.database,
            raw.username,
            raw.password,
            timeout,
            raw.max_connections,
        )
    }
}

/// Non-empty set of connection configs with unique instance ids.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawConnectionSet")]
pub struct ConnectionSet {
    connections: Vec<ConnectionConfig>,
}

#[derive(Deserialize)]
struct RawConnectionSet {
    #[serde(default)]
    connections: Vec<ConnectionConfig>,
}

impl TryFrom<RawConnectionSet> for ConnectionSet {
    type Error = ConfigError;

    fn try_from(raw: RawConnectionSet) -> Result<Self, Self::Error> {
        ConnectionSet::new(raw.connections)
    }
}

impl ConnectionSet {
    pub fn new(connections: Vec<ConnectionConfig>) -> Result<Self, ConfigError> {
        if connections.is_empty() {
            return Err(ConfigError::NoConnections);
        }
        let mut seen = HashSet::new();
        for config in &connections {
            if !seen.insert(config.instance_id()) {
                return Err(ConfigError::DuplicateInstance(config.instance_id().to_string()));
            }
        }
        Ok(Self { connections })
    }

    /// Parses `{"connections": [...]}`.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn get(&self, instance_id: &str) -> Option<&ConnectionConfig> {
        self.connections.iter().find(|c| c.instance_id() == instance_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionConfig> {
        self.connections.iter()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl IntoIterator for ConnectionSet {
    type Item = ConnectionConfig;
    type IntoIter = std::vec::IntoIter<ConnectionConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.connections.into_iter()
    }
}
