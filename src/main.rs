//! db-session - Main entry point.
//!
//! Loads a registry configuration and runs one catalog command against a named
//! connection, printing the result as JSON.

use clap::Parser;
use db_session::config::{Command, Config, RegistryConfig};
use db_session::db::{ConnectionRegistry, Session};
use db_session::error::DbResult;
use serde_json::{Value as JsonValue, json};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Run a command on an opened session.
async fn run_on_session(session: &mut Session, command: &Command) -> DbResult<JsonValue> {
    let value = match command {
        Command::Tables { .. } => json!(session.list_tables().await?),
        Command::Columns { table, .. } => json!(session.column_names(table).await?),
        Command::PrimaryKey { table, .. } => json!(session.primary_key_column(table).await?),
        Command::Sequences { .. } => json!(session.sequence_names().await?),
        Command::ResetSequences { start, .. } => {
            session.reset_identity_generation_or_sequences(*start).await?;
            json!({ "reset": true, "start": start })
        }
        Command::NextValue { sequence, .. } => {
            json!(session.next_value_from_sequence(sequence).await?)
        }
        Command::List { .. } => JsonValue::Null,
    };
    Ok(value)
}

async fn run(registry: &ConnectionRegistry, command: &Command) -> DbResult<JsonValue> {
    let connection = match command {
        Command::List { flags } => return Ok(json!(registry.list_connections(flags))),
        Command::Tables { connection }
        | Command::Columns { connection, .. }
        | Command::PrimaryKey { connection, .. }
        | Command::Sequences { connection }
        | Command::ResetSequences { connection, .. }
        | Command::NextValue { connection, .. } => connection,
    };

    let mut session = registry.open(connection).await?;
    let result = run_on_session(&mut session, command).await;
    if result.is_err() {
        // Nothing of a failed command is kept
        session.rollback().await.ok();
    } else {
        session.close().await;
    }
    result
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!(
        config = %config.config.display(),
        "Starting db-session v{}",
        env!("CARGO_PKG_VERSION")
    );

    let registry_config = RegistryConfig::from_file(&config.config)?;
    let registry = ConnectionRegistry::with_sqlx(registry_config)?;

    let result = run(&registry, &config.command).await;
    registry.close().await;

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            Err(e.into())
        }
    }
}
