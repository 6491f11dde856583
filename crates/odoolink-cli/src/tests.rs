use super::args::*;
use super::commands::*;
use argh::FromArgs;
use odoolink_common::ConnectionSet;
use serde_json::json;

const TWO_INSTANCES: &str = r#"{"connections": [
    {"instance_id": "prod", "url": "https://odoo.example.com", "database": "prod",
     "username": "admin", "password": "secret"},
    {"instance_id": "staging", "url": "http://127.0.0.1:8069", "database": "staging",
     "username": "admin", "password": "secret", "timeout": 5, "max_connections": 2}
]}"#;

#[test]
fn test_cli_parse_call_defaults() {
    let cli = Cli::from_args(&["odoolink"], &["call", "-c", "instances.json", "res.partner", "search_count"]).unwrap();
    match cli.command {
        Commands::Call(CallArgs { config, instance, model, method, args, kwargs, retries, backoff_ms }) => {
            assert_eq!(config, "instances.json");
            assert!(instance.is_none());
            assert_eq!(model, "res.partner");
            assert_eq!(method, "search_count");
            assert_eq!(args, "[]");
            assert_eq!(kwargs, "{}");
            assert_eq!(retries, 3);
            assert_eq!(backoff_ms, 500);
        }
        _ => panic!("Expected Call command"),
    }
}

#[test]
fn test_cli_parse_call_with_options() {
    let cli = Cli::from_args(&["odoolink"], &[
        "call",
        "--config", "instances.json",
        "--instance", "staging",
        "res.partner", "read",
        "--args", "[[1, 2]]",
        "--kwargs", r#"{"fields": ["name"]}"#,
        "--retries", "5",
        "--backoff-ms", "100",
    ]).unwrap();
    match cli.command {
        Commands::Call(args) => {
            assert_eq!(args.instance.as_deref(), Some("staging"));
            assert_eq!(args.args, "[[1, 2]]");
            assert_eq!(args.retries, 5);
            assert_eq!(args.backoff_ms, 100);
        }
        _ => panic!("Expected Call command"),
    }
}

#[test]
fn test_cli_call_requires_config() {
    assert!(Cli::from_args(&["odoolink"], &["call", "res.partner", "read"]).is_err());
}

#[test]
fn test_cli_parse_ping() {
    let cli = Cli::from_args(&["odoolink"], &["ping", "-c", "instances.json"]).unwrap();
    match cli.command {
        Commands::Ping(PingArgs { config, instance }) => {
            assert_eq!(config, "instances.json");
            assert!(instance.is_none());
        }
        _ => panic!("Expected Ping command"),
    }
}

#[test]
fn test_resolve_instance() {
    let set = ConnectionSet::from_json_str(TWO_INSTANCES).unwrap();

    assert_eq!(resolve_instance(&set, Some("staging")).unwrap().database(), "staging");
    let err = resolve_instance(&set, Some("dev")).unwrap_err();
    assert!(err.to_string().contains("'dev'"));
    let err = resolve_instance(&set, None).unwrap_err();
    assert!(err.to_string().contains("--instance"));
}

#[test]
fn test_resolve_single_instance_without_flag() {
    let set = ConnectionSet::from_json_str(
        r#"{"connections": [{"instance_id": "prod", "url": "https://odoo.example.com",
            "database": "prod", "username": "admin", "password": "secret"}]}"#,
    )
    .unwrap();
    assert_eq!(resolve_instance(&set, None).unwrap().instance_id(), "prod");
}

#[test]
fn test_parse_json_names_the_option() {
    assert_eq!(parse_json("kwargs", r#"{"limit": 1}"#).unwrap(), json!({"limit": 1}));
    let err = parse_json("args", "[1,").unwrap_err();
    assert!(err.to_string().contains("--args"));
}

#[tokio::test]
async fn test_manager_for_registers_every_instance() {
    let set = ConnectionSet::from_json_str(TWO_INSTANCES).unwrap();
    let manager = manager_for(set.iter()).await.unwrap();
    assert_eq!(manager.instance_ids().await, vec!["prod", "staging"]);
    manager.cleanup().await;
}
