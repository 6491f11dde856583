//! Command implementations, independent of argument parsing and output.

use anyhow::{anyhow, Context};
use odoolink_client::{ConnectionManager, RetryPolicy};
use odoolink_common::protocol::{format_error_response, OdooError};
use odoolink_common::{ConnectionConfig, ConnectionSet};
use serde_json::{Map, Value};

/// Picks the configured instance to talk to.
///
/// Without an explicit id the file must list exactly one instance.
pub fn resolve_instance<'a>(set: &'a ConnectionSet, instance: Option<&str>) -> anyhow::Result<&'a ConnectionConfig> {
    match instance {
        Some(id) => set
            .get(id)
            .ok_or_else(|| anyhow!("Instance '{id}' is not configured")),
        None if set.len() == 1 => set
            .iter()
            .next()
            .ok_or_else(|| anyhow!("No instances configured")),
        None => Err(anyhow!(
            "{} instances configured; choose one with --instance",
            set.len()
        )),
    }
}

/// Parses a JSON option, naming the option in the error.
pub fn parse_json(option: &str, raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("Invalid JSON in --{option}"))
}

/// One `execute_kw` call through a pooled client, retried under `policy`.
pub async fn call(
    manager: &ConnectionManager,
    instance_id: &str,
    model: &str,
    method: &str,
    args: &Value,
    kwargs: &Value,
    policy: &RetryPolicy,
) -> Result<Value, OdooError> {
    let client = policy.run(|| manager.get_connection(instance_id)).await?;
    let result = policy.call(&client, model, method, args, kwargs).await;
    client.release().await;
    result
}

/// Version and user id per instance, or the formatted error for instances
/// that cannot be reached. The flag reports whether every instance answered.
pub async fn ping(manager: &ConnectionManager, instance_ids: &[String]) -> (Value, bool) {
    let mut report = Map::new();
    let mut all_ok = true;

    for instance_id in instance_ids {
        let entry = match ping_one(manager, instance_id).await {
            Ok(entry) => entry,
            Err(err) => {
                all_ok = false;
                tracing::warn!(instance = %instance_id, error = %err, "ping failed");
                serde_json::to_value(format_error_response(&err)).unwrap_or(Value::Null)
            }
        };
        report.insert(instance_id.clone(), entry);
    }

    (Value::Object(report), all_ok)
}

async fn ping_one(manager: &ConnectionManager, instance_id: &str) -> Result<Value, OdooError> {
    let client = manager.get_connection(instance_id).await?;
    let version = client.version().await;
    let uid = client.uid().await;
    client.release().await;

    let version = version?;
    let mut entry = Map::new();
    entry.insert(
        "server_version".into(),
        version.get("server_version").cloned().unwrap_or(Value::Null),
    );
    entry.insert("uid".into(), uid.map(Value::from).unwrap_or(Value::Null));
    Ok(Value::Object(entry))
}

/// Registers `configs` with a fresh, initialized manager.
pub async fn manager_for<'a>(
    configs: impl IntoIterator<Item = &'a ConnectionConfig>,
) -> Result<ConnectionManager, OdooError> {
    let manager = ConnectionManager::new();
    manager.initialize().await;
    for config in configs {
        manager.add_connection(config.instance_id(), config.clone()).await?;
    }
    Ok(manager)
}
