use futures::future::BoxFuture;
use odoolink_common::config::ConnectionConfig;
use odoolink_common::protocol::error::{OdooError, Result};
use odoolink_common::transport::{HttpTransportFactory, Transport, TransportFactory};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::client::OdooClient;

/// Point-in-time counters for one instance pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Authenticated clients waiting in the idle list
    pub idle: usize,
    /// Clients currently handed out
    pub checked_out: usize,
    /// Clients created and authenticated since the instance was added
    pub created: u64,
    /// Checkouts served from the idle list
    pub reused: u64,
    /// Clients closed because they failed a health check or did not fit
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    created: u64,
    reused: u64,
    discarded: u64,
}

/// Per-instance pool: the shared transport, idle clients and the checkout
/// permits bounding how many clients exist at once.
struct InstancePool {
    generation: u64,
    config: Arc<ConnectionConfig>,
    transport: Arc<dyn Transport>,
    idle: Vec<OdooClient>,
    permits: Arc<Semaphore>,
    counters: Counters,
}

impl InstancePool {
    fn new(generation: u64, config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        let max = config.max_connections();
        Self {
            generation,
            config: Arc::new(config),
            transport,
            idle: Vec::with_capacity(max),
            permits: Arc::new(Semaphore::new(max)),
            counters: Counters::default(),
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.len(),
            checked_out: self.config.max_connections() - self.permits.available_permits(),
            created: self.counters.created,
            reused: self.counters.reused,
            discarded: self.counters.discarded,
        }
    }

    /// Closes idle clients and the transport. Checked-out clients find the
    /// pool gone when they are released and are discarded then.
    async fn shutdown(self) {
        self.permits.close();
        for client in &self.idle {
            client.close();
        }
        self.transport.close().await;
    }
}

#[derive(Default)]
struct State {
    initialized: bool,
    instances: HashMap<String, InstancePool>,
}

struct Shared {
    factory: Arc<dyn TransportFactory>,
    state: Mutex<State>,
    generations: AtomicU64,
}

/// Registry of per-instance client pools.
///
/// Each registered instance gets one shared transport and a bounded set of
/// authenticated [`OdooClient`]s. A checkout hands out a [`PooledClient`]
/// guard; releasing it (explicitly, by dropping it, or by cancelling the task
/// holding it) health-checks the client and puts it back only if it is still
/// usable.
///
/// # Lifecycle
///
/// `initialize` → `add_connection`/`remove_connection`… → `cleanup`. Every
/// operation other than `initialize` fails until the manager is initialized.
///
/// # Concurrency
///
/// Bookkeeping lives behind one async mutex which is never held across a
/// network round trip. At most `max_connections` clients per instance are
/// checked out at any time; additional callers wait for a permit, bounded by
/// the instance's configured timeout. Instances never block each other.
///
/// # Example
///
/// ```rust,no_run
/// use odoolink_client::ConnectionManager;
/// use odoolink_common::ConnectionConfig;
/// use serde_json::json;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = ConnectionManager::new();
/// manager.initialize().await;
///
/// let config = ConnectionConfig::new(
///     "prod", "https://odoo.example.com", "prod", "admin", "secret",
///     Duration::from_secs(30), 4,
/// )?;
/// manager.add_connection("prod", config).await?;
///
/// let client = manager.get_connection("prod").await?;
/// let count = client.call("res.partner", "search_count", json!([[]]), json!({})).await?;
/// client.release().await;
///
/// println!("{count}");
/// manager.cleanup().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    /// Creates a manager that reaches instances over HTTP.
    pub fn new() -> Self {
        Self::with_factory(Arc::new(HttpTransportFactory))
    }

    /// Creates a manager whose transports come from `factory`.
    pub fn with_factory(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            shared: Arc::new(Shared {
                factory,
                state: Mutex::new(State::default()),
                generations: AtomicU64::new(1),
            }),
        }
    }

    /// Marks the manager ready. Calling it again has no effect.
    pub async fn initialize(&self) {
        let mut state = self.shared.state.lock().await;
        if !state.initialized {
            state.initialized = true;
            tracing::info!("connection manager initialized");
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.shared.state.lock().await.initialized
    }

    /// Registers an instance, replacing any pool already registered under
    /// `instance_id`. A replaced pool's transport is closed once; its
    /// checked-out clients are discarded when released.
    pub async fn add_connection(&self, instance_id: impl Into<String>, config: ConnectionConfig) -> Result<()> {
        let instance_id = instance_id.into();
        {
            let state = self.shared.state.lock().await;
            ensure_initialized(&state)?;
        }

        let transport = self.shared.factory.create(&config)?;
        let generation = self.shared.generations.fetch_add(1, Ordering::Relaxed);
        let max_connections = config.max_connections();
        let pool = InstancePool::new(generation, config, transport.clone());

        let replaced = {
            let mut state = self.shared.state.lock().await;
            if !state.initialized {
                drop(state);
                transport.close().await;
                return Err(not_initialized());
            }
            state.instances.insert(instance_id.clone(), pool)
        };

        if let Some(old) = replaced {
            old.shutdown().await;
            tracing::info!(instance = %instance_id, max_connections, "replaced instance pool");
        } else {
            tracing::info!(instance = %instance_id, max_connections, "added instance pool");
        }
        Ok(())
    }

    /// Checks out an authenticated client for `instance_id`.
    ///
    /// Idle clients are health-checked before reuse; a client that fails is
    /// closed and the next one is tried. When none is left a fresh client
    /// is created and authenticated.
    ///
    /// # Errors
    ///
    /// - `NotFound` naming the instance when it is not registered
    /// - `Connection` when no permit frees up within the configured timeout
    /// - whatever authenticating a fresh client fails with
    pub async fn get_connection(&self, instance_id: &str) -> Result<PooledClient> {
        let (generation, config, transport, permits) = {
            let state = self.shared.state.lock().await;
            ensure_initialized(&state)?;
            let pool = state
                .instances
                .get(instance_id)
                .ok_or_else(|| unknown_instance(instance_id))?;
            (
                pool.generation,
                pool.config.clone(),
                pool.transport.clone(),
                pool.permits.clone(),
            )
        };

        let permit = match tokio::time::timeout(config.timeout(), permits.acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            // The semaphore is closed when the pool is removed or replaced.
            Ok(Err(_)) => return Err(unknown_instance(instance_id)),
            Err(_) => {
                return Err(OdooError::connection(format!(
                    "Timed out waiting for a connection to instance '{instance_id}'"
                ))
                .with_detail("instance_id", instance_id)
                .with_detail("max_connections", config.max_connections()));
            }
        };

        loop {
            let candidate = {
                let mut state = self.shared.state.lock().await;
                match current_pool(&mut state, instance_id, generation) {
                    Some(pool) => pool.idle.pop(),
                    None => return Err(unknown_instance(instance_id)),
                }
            };
            let Some(client) = candidate else {
                break;
            };

            if client.health_check().await {
                self.record(instance_id, generation, |c| c.reused += 1).await;
                tracing::debug!(instance = %instance_id, "reused idle client");
                return Ok(PooledClient::new(client, instance_id, generation, permit, &self.shared));
            }

            client.close();
            self.record(instance_id, generation, |c| c.discarded += 1).await;
            tracing::warn!(instance = %instance_id, "discarded unhealthy idle client");
        }

        let client = OdooClient::new(config, transport);
        client.authenticate().await?;
        self.record(instance_id, generation, |c| c.created += 1).await;
        tracing::debug!(instance = %instance_id, "created client");

        Ok(PooledClient::new(client, instance_id, generation, permit, &self.shared))
    }

    /// Runs `f` against a checked-out client and releases it afterwards,
    /// whatever `f` returns.
    ///
    /// ```rust,no_run
    /// # use odoolink_client::ConnectionManager;
    /// # use serde_json::json;
    /// # async fn demo(manager: &ConnectionManager) -> odoolink_common::Result<()> {
    /// let ids = manager
    ///     .with_connection("prod", |client| {
    ///         Box::pin(async move { client.call("res.partner", "search", json!([[]]), json!({})).await })
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_connection<T, F>(&self, instance_id: &str, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c OdooClient) -> BoxFuture<'c, Result<T>>,
    {
        let client = self.get_connection(instance_id).await?;
        let result = f(&*client).await;
        client.release().await;
        result
    }

    /// Closes and forgets an instance pool. Returns whether it existed.
    pub async fn remove_connection(&self, instance_id: &str) -> Result<bool> {
        let removed = {
            let mut state = self.shared.state.lock().await;
            ensure_initialized(&state)?;
            state.instances.remove(instance_id)
        };

        match removed {
            Some(pool) => {
                pool.shutdown().await;
                tracing::info!(instance = %instance_id, "removed instance pool");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Closes every pool and returns the manager to its uninitialized state.
    pub async fn cleanup(&self) {
        let pools: Vec<(String, InstancePool)> = {
            let mut state = self.shared.state.lock().await;
            if !state.initialized {
                return;
            }
            state.initialized = false;
            state.instances.drain().collect()
        };

        let count = pools.len();
        for (_, pool) in pools {
            pool.shutdown().await;
        }
        tracing::info!(instances = count, "connection manager cleaned up");
    }

    pub async fn stats(&self, instance_id: &str) -> Option<PoolStats> {
        let state = self.shared.state.lock().await;
        state.instances.get(instance_id).map(InstancePool::stats)
    }

    /// Registered instance ids, sorted.
    pub async fn instance_ids(&self) -> Vec<String> {
        let state = self.shared.state.lock().await;
        let mut ids: Vec<String> = state.instances.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn record(&self, instance_id: &str, generation: u64, update: impl FnOnce(&mut Counters)) {
        let mut state = self.shared.state.lock().await;
        if let Some(pool) = current_pool(&mut state, instance_id, generation) {
            update(&mut pool.counters);
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager").finish_non_exhaustive()
    }
}

fn current_pool<'a>(state: &'a mut State, instance_id: &str, generation: u64) -> Option<&'a mut InstancePool> {
    state
        .instances
        .get_mut(instance_id)
        .filter(|pool| pool.generation == generation)
}

fn ensure_initialized(state: &State) -> Result<()> {
    if state.initialized {
        Ok(())
    } else {
        Err(not_initialized())
    }
}

// Neither kind is retryable: waiting cannot fix a missing registration.
fn not_initialized() -> OdooError {
    OdooError::validation("Connection manager is not initialized")
}

fn unknown_instance(instance_id: &str) -> OdooError {
    OdooError::not_found(format!("No connection configured for instance '{instance_id}'"))
        .with_detail("instance_id", instance_id)
}

/// Puts `client` back into its pool if it is healthy, fits, and the pool
/// it came from is still registered; closes it otherwise.
async fn return_to_pool(shared: &Shared, instance_id: &str, generation: u64, client: OdooClient) {
    let healthy = client.health_check().await;

    let mut state = shared.state.lock().await;
    let Some(pool) = current_pool(&mut state, instance_id, generation) else {
        drop(state);
        client.close();
        tracing::debug!(instance = %instance_id, "pool gone, discarded released client");
        return;
    };

    if healthy && pool.idle.len() < pool.config.max_connections() {
        pool.idle.push(client);
        tracing::debug!(instance = %instance_id, idle = pool.idle.len(), "returned client to pool");
    } else {
        pool.counters.discarded += 1;
        drop(state);
        client.close();
        tracing::warn!(instance = %instance_id, healthy, "discarded released client");
    }
}

/// A client checked out of a [`ConnectionManager`].
///
/// Dereferences to [`OdooClient`]. Prefer [`PooledClient::release`]; a
/// dropped guard schedules the same release on the current tokio runtime,
/// or discards the client when no runtime is available.
pub struct PooledClient {
    client: Option<OdooClient>,
    permit: Option<OwnedSemaphorePermit>,
    instance_id: String,
    generation: u64,
    shared: Arc<Shared>,
}

impl PooledClient {
    fn new(
        client: OdooClient,
        instance_id: &str,
        generation: u64,
        permit: OwnedSemaphorePermit,
        shared: &Arc<Shared>,
    ) -> Self {
        Self {
            client: Some(client),
            permit: Some(permit),
            instance_id: instance_id.to_string(),
            generation,
            shared: shared.clone(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Returns the client to its pool.
    pub async fn release(mut self) {
        let permit = self.permit.take();
        if let Some(client) = self.client.take() {
            return_to_pool(&self.shared, &self.instance_id, self.generation, client).await;
        }
        drop(permit);
    }
}

impl Deref for PooledClient {
    type Target = OdooClient;

    fn deref(&self) -> &OdooClient {
        self.client.as_ref().expect("pooled client is present until released")
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        let permit = self.permit.take();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let shared = self.shared.clone();
                let instance_id = std::mem::take(&mut self.instance_id);
                let generation = self.generation;
                handle.spawn(async move {
                    return_to_pool(&shared, &instance_id, generation, client).await;
                    drop(permit);
                });
            }
            Err(_) => {
                client.close();
                drop(permit);
            }
        }
    }
}

impl fmt::Debug for PooledClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledClient")
            .field("instance_id", &self.instance_id)
            .field("client", &self.client)
            .finish()
    }
}
