//! Scripted in-memory Odoo used by the unit tests.

use async_trait::async_trait;
use odoolink_common::config::ConnectionConfig;
use odoolink_common::protocol::{FaultData, JsonRpcError, JsonRpcRequest, JsonRpcResponse, OdooError, Result};
use odoolink_common::transport::{Transport, TransportFactory};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn test_config(instance_id: &str, max_connections: usize) -> ConnectionConfig {
    ConnectionConfig::new(
        instance_id,
        "http://odoo.test",
        "db",
        "admin",
        "admin",
        Duration::from_secs(5),
        max_connections,
    )
    .unwrap()
}

/// What the mock answers to the next scripted request.
#[derive(Debug)]
pub(crate) enum Outcome {
    Result(Value),
    Fault(FaultData),
    /// An envelope with neither `result` nor `error`.
    Empty,
    Error(OdooError),
}

#[derive(Debug)]
struct State {
    uid: Option<i64>,
    healthy: bool,
    delay: Option<Duration>,
    calls: Vec<String>,
    last_args: Option<Vec<Value>>,
    auth_outcomes: VecDeque<Outcome>,
    outcomes: VecDeque<Outcome>,
}

/// Answers `common.authenticate`, `common.version` and `object.execute_kw`.
///
/// `res.users.read` is the health probe and never consumes scripted
/// outcomes; any other `execute_kw` pops the next outcome or echoes the
/// positional args back.
#[derive(Debug)]
pub(crate) struct MockOdoo {
    state: Mutex<State>,
    closes: AtomicUsize,
    closed: AtomicBool,
}

impl MockOdoo {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                uid: Some(2),
                healthy: true,
                delay: None,
                calls: Vec::new(),
                last_args: None,
                auth_outcomes: VecDeque::new(),
                outcomes: VecDeque::new(),
            }),
            closes: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn with_uid(self: Arc<Self>, uid: Option<i64>) -> Arc<Self> {
        self.state.lock().unwrap().uid = uid;
        self
    }

    pub(crate) fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        self.set_delay(Some(delay));
        self
    }

    pub(crate) fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().delay = delay;
    }

    pub(crate) fn set_healthy(&self, healthy: bool) {
        self.state.lock().unwrap().healthy = healthy;
    }

    pub(crate) fn push_outcome(&self, outcome: Outcome) {
        self.state.lock().unwrap().outcomes.push_back(outcome);
    }

    pub(crate) fn push_auth_outcome(&self, outcome: Outcome) {
        self.state.lock().unwrap().auth_outcomes.push_back(outcome);
    }

    /// `service.method`, or `model.method` for `execute_kw`, in arrival order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| *c == call).count()
    }

    pub(crate) fn last_args(&self) -> Option<Vec<Value>> {
        self.state.lock().unwrap().last_args.clone()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn answer(id: Value, outcome: Outcome) -> Result<JsonRpcResponse> {
        match outcome {
            Outcome::Result(value) => Ok(JsonRpcResponse::success(id, value)),
            Outcome::Fault(data) => Ok(JsonRpcResponse::error(id, JsonRpcError::server_fault(data))),
            Outcome::Empty => Ok(JsonRpcResponse {
                jsonrpc: "2.0".into(),
                result: None,
                error: None,
                id,
            }),
            Outcome::Error(err) => Err(err),
        }
    }
}

#[async_trait]
impl Transport for MockOdoo {
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        if self.is_closed() {
            return Err(OdooError::connection("Transport is closed"));
        }

        let args = request.service_args().cloned().unwrap_or_default();
        let service = request.service().unwrap_or_default().to_string();
        let method = request.service_method().unwrap_or_default().to_string();

        let label = if service == "object" && method == "execute_kw" {
            format!(
                "{}.{}",
                args.get(3).and_then(Value::as_str).unwrap_or_default(),
                args.get(4).and_then(Value::as_str).unwrap_or_default()
            )
        } else {
            format!("{service}.{method}")
        };

        let delay = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(label.clone());
            state.last_args = Some(args.clone());
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let id = request.id.clone();
        let mut state = self.state.lock().unwrap();
        match label.as_str() {
            "common.authenticate" => match state.auth_outcomes.pop_front() {
                Some(outcome) => Self::answer(id, outcome),
                None => {
                    let result = state.uid.map(Value::from).unwrap_or(Value::Bool(false));
                    Ok(JsonRpcResponse::success(id, result))
                }
            },
            "common.version" => Ok(JsonRpcResponse::success(id, json!({"server_version": "17.0"}))),
            "res.users.read" => {
                if state.healthy {
                    Ok(JsonRpcResponse::success(id, json!([{"id": state.uid}])))
                } else {
                    Err(OdooError::connection("health probe refused"))
                }
            }
            _ => match state.outcomes.pop_front() {
                Some(outcome) => Self::answer(id, outcome),
                None => Ok(JsonRpcResponse::success(id, args.get(5).cloned().unwrap_or(Value::Null))),
            },
        }
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Hands out a fresh [`MockOdoo`] per instance and remembers each one.
#[derive(Debug, Default)]
pub(crate) struct MockFactory {
    created: Mutex<Vec<(String, Arc<MockOdoo>)>>,
}

impl MockFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transports created for `instance_id`, oldest first.
    pub(crate) fn transports(&self, instance_id: &str) -> Vec<Arc<MockOdoo>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == instance_id)
            .map(|(_, mock)| mock.clone())
            .collect()
    }

    pub(crate) fn latest(&self, instance_id: &str) -> Arc<MockOdoo> {
        self.transports(instance_id).pop().expect("transport created")
    }
}

impl TransportFactory for MockFactory {
    fn create(&self, config: &ConnectionConfig) -> Result<Arc<dyn Transport>> {
        let mock = MockOdoo::new();
        self.created
            .lock()
            .unwrap()
            .push((config.instance_id().to_string(), mock.clone()));
        Ok(mock)
    }
}
