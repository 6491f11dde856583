//! # odoolink CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Check every configured instance
//! odoolink ping -c instances.json
//!
//! # Call a model method (outputs raw JSON)
//! odoolink call -c instances.json -i prod res.partner search_count --args '[[]]'
//! ```
//!
//! The config file lists instances:
//!
//! ```json
//! {"connections": [{"instance_id": "prod", "url": "https://odoo.example.com",
//!   "database": "prod", "username": "admin", "password": "secret",
//!   "timeout": 30, "max_connections": 4}]}
//! ```
//!
//! Results go to stdout as JSON. A failed remote operation prints its
//! `{error, code, details}` JSON to stdout and exits with status 1. Logs go
//! to stderr.

use anyhow::Result;
use odoolink_cli::args::{CallArgs, Cli, Commands, PingArgs};
use odoolink_cli::commands;
use odoolink_client::RetryPolicy;
use odoolink_common::protocol::format_error_response;
use odoolink_common::ConnectionSet;
use std::process::ExitCode;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli: Cli = argh::from_env();

    // Default to INFO, RUST_LOG overrides; stderr keeps stdout pipeable.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Call(args) => run_call(args).await,
        Commands::Ping(args) => run_ping(args).await,
    }
}

async fn run_call(args: CallArgs) -> Result<ExitCode> {
    let set = ConnectionSet::from_json_file(&args.config)?;
    let config = commands::resolve_instance(&set, args.instance.as_deref())?;
    let call_args = commands::parse_json("args", &args.args)?;
    let call_kwargs = commands::parse_json("kwargs", &args.kwargs)?;
    if !call_args.is_array() {
        anyhow::bail!("--args must be a JSON array");
    }

    let policy = RetryPolicy::new(args.retries, Duration::from_millis(args.backoff_ms));
    let manager = commands::manager_for([config]).await?;

    let outcome = commands::call(
        &manager,
        config.instance_id(),
        &args.model,
        &args.method,
        &call_args,
        &call_kwargs,
        &policy,
    )
    .await;
    manager.cleanup().await;

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            tracing::error!(instance = %config.instance_id(), error = %err, "call failed");
            println!("{}", serde_json::to_string(&format_error_response(&err))?);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_ping(args: PingArgs) -> Result<ExitCode> {
    let set = ConnectionSet::from_json_file(&args.config)?;
    let configs = match args.instance.as_deref() {
        Some(_) => vec![commands::resolve_instance(&set, args.instance.as_deref())?],
        None => set.iter().collect(),
    };
    let instance_ids: Vec<String> = configs.iter().map(|c| c.instance_id().to_string()).collect();

    let manager = commands::manager_for(configs).await?;
    let (report, all_ok) = commands::ping(&manager, &instance_ids).await;
    manager.cleanup().await;

    println!("{}", serde_json::to_string(&report)?);
    Ok(if all_ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
