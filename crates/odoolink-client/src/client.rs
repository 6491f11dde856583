use odoolink_common::config::ConnectionConfig;
use odoolink_common::protocol::error::{ErrorKind, OdooError, Result};
use odoolink_common::protocol::jsonrpc::{
    next_request_id, JsonRpcRequest, JsonRpcResponse, SERVICE_COMMON, SERVICE_OBJECT,
};
use odoolink_common::protocol::parse_odoo_error;
use odoolink_common::transport::{HttpTransport, Transport};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Model and method used as the health probe: reading the caller's own
/// user record exercises the network, the credentials and the session.
const HEALTH_PROBE_MODEL: &str = "res.users";
const HEALTH_PROBE_METHOD: &str = "read";

#[derive(Debug, Default)]
struct Session {
    uid: Option<i64>,
}

/// Authenticated RPC client for one Odoo instance.
///
/// The client performs exactly one attempt per operation; retrying is the
/// job of [`RetryPolicy`](crate::RetryPolicy). The session (the numeric user
/// id returned by `authenticate`) is cached, so a stream of calls costs one
/// authentication round trip, not one per call.
///
/// Clients created by the [`ConnectionManager`](crate::ConnectionManager)
/// share their instance's transport; a standalone client can be built with
/// [`OdooClient::connect`].
pub struct OdooClient {
    config: Arc<ConnectionConfig>,
    transport: Arc<dyn Transport>,
    session: Mutex<Session>,
    closed: AtomicBool,
}

impl OdooClient {
    /// Creates an unauthenticated client over an existing transport.
    pub fn new(config: Arc<ConnectionConfig>, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            session: Mutex::new(Session::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a client with its own HTTP transport.
    pub fn connect(config: ConnectionConfig) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::new(Arc::new(config), transport))
    }

    pub fn instance_id(&self) -> &str {
        self.config.instance_id()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Cached user id, if authenticated.
    pub async fn uid(&self) -> Option<i64> {
        if self.is_closed() {
            return None;
        }
        self.session.lock().await.uid
    }

    pub async fn is_authenticated(&self) -> bool {
        self.uid().await.is_some()
    }

    /// Authenticates against the instance and caches the user id.
    ///
    /// Returns the cached id without any network access when already
    /// authenticated. Concurrent callers wait for a single round trip.
    ///
    /// # Errors
    ///
    /// - `Authentication` when the server rejects the credentials or answers
    ///   with a fault
    /// - `Timeout` / `Connection` when the server cannot be reached
    pub async fn authenticate(&self) -> Result<i64> {
        let mut session = self.session.lock().await;
        if let Some(uid) = session.uid {
            return Ok(uid);
        }

        let args = json!([
            self.config.database(),
            self.config.username(),
            self.config.password(),
            {}
        ]);
        let response = self.send(SERVICE_COMMON, "authenticate", args).await?;

        if let Some(fault) = response.error {
            let remote = parse_odoo_error(&fault);
            return Err(OdooError::with_details(
                ErrorKind::Authentication,
                remote.message(),
                remote.details().clone(),
            )
            .with_detail("database", self.config.database())
            .with_detail("username", self.config.username()));
        }

        match response.result.as_ref().and_then(Value::as_i64) {
            Some(uid) if uid > 0 => {
                session.uid = Some(uid);
                tracing::info!(
                    instance = %self.instance_id(),
                    database = %self.config.database(),
                    uid,
                    "authenticated"
                );
                Ok(uid)
            }
            _ => Err(OdooError::authentication(format!(
                "Invalid credentials for user '{}' on database '{}'",
                self.config.username(),
                self.config.database()
            ))
            .with_detail("database", self.config.database())
            .with_detail("username", self.config.username())
            .with_detail("url", self.config.url())),
        }
    }

    /// Calls `model.method(*args, **kwargs)` through `execute_kw`.
    ///
    /// Authenticates first when needed. A fault is translated into a typed
    /// error; when it signals an expired session, the cached session is
    /// dropped so that the next use authenticates again.
    pub async fn call(&self, model: &str, method: &str, args: Value, kwargs: Value) -> Result<Value> {
        let uid = self.authenticate().await?;
        let kwargs = if kwargs.is_null() { json!({}) } else { kwargs };

        let payload = json!([
            self.config.database(),
            uid,
            self.config.password(),
            model,
            method,
            args,
            kwargs
        ]);

        let outcome = self
            .send(SERVICE_OBJECT, "execute_kw", payload)
            .await
            .and_then(decode);

        match outcome {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_session_expired() {
                    self.invalidate_session().await;
                    tracing::warn!(instance = %self.instance_id(), "session expired; will re-authenticate");
                }
                let err = if err.details().contains_key("model") {
                    err
                } else {
                    err.with_detail("model", model)
                };
                Err(err.with_detail("method", method))
            }
        }
    }

    /// Server version information; does not require authentication.
    pub async fn version(&self) -> Result<Value> {
        let response = self.send(SERVICE_COMMON, "version", json!([])).await?;
        decode(response)
    }

    /// Forgets the cached session; the next call authenticates again.
    pub async fn invalidate_session(&self) {
        self.session.lock().await.uid = None;
    }

    /// Cheap round trip confirming the client is still usable.
    ///
    /// Reads the authenticated user's own record. An unauthenticated or
    /// closed client is reported unhealthy without network access.
    pub async fn health_check(&self) -> bool {
        let Some(uid) = self.uid().await else {
            return false;
        };
        match self
            .call(HEALTH_PROBE_MODEL, HEALTH_PROBE_METHOD, json!([[uid]]), json!({"fields": ["id"]}))
            .await
        {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(instance = %self.instance_id(), error = %err, "health check failed");
                false
            }
        }
    }

    /// Marks the client unusable. The shared transport stays open.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// One request, bounded by the configured timeout.
    async fn send(
        &self,
        service: &str,
        method: &str,
        args: Value,
    ) -> Result<odoolink_common::protocol::JsonRpcResponse> {
        if self.is_closed() {
            return Err(OdooError::connection("Client is closed").with_detail("url", self.config.url()));
        }

        let request = JsonRpcRequest::service_call(service, method, args, next_request_id());
        let timeout = self.config.timeout();

        match tokio::time::timeout(timeout, self.transport.send(&request)).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = timeout.as_millis() as u64;
                Err(OdooError::timeout(format!("{service}.{method} timed out after {timeout_ms}ms"))
                    .with_detail("timeout_ms", timeout_ms)
                    .with_detail("url", self.config.url()))
            }
        }
    }
}

/// A fault becomes a typed error; a body with neither `result` nor `error`
/// is rejected rather than read as `null`.
fn decode(response: JsonRpcResponse) -> Result<Value> {
    match (response.error, response.result) {
        (Some(fault), _) => Err(parse_odoo_error(&fault)),
        (None, Some(result)) => Ok(result),
        (None, None) => Err(OdooError::unknown("Invalid response: missing result")),
    }
}

impl fmt::Debug for OdooClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OdooClient")
            .field("instance_id", &self.instance_id())
            .field("url", &self.config.url())
            .field("closed", &self.is_closed())
            .finish()
    }
}
