#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use cursorkv::command;
use cursorkv::config::{EngineConfig, load_schemas};
use cursorkv::{Database, MemoryStore};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // stdout carries responses, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cursorkv=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration from environment variables
    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let schemas = match load_schemas(&config.schema_file) {
        Ok(schemas) => schemas,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    let db = match Database::new(MemoryStore::new(), config.database_options(schemas)) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to create database: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = db.open().await {
        tracing::error!("Failed to open database: {e}");
        std::process::exit(1);
    }
    tracing::info!(
        "database '{}' v{} open, reading commands from stdin",
        config.database_name,
        config.database_version
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = command::execute_line(&db, &line).await;
        if let Some(error) = &response.error {
            tracing::debug!("command failed: {error}");
        }
        let mut out = response.to_line();
        out.push('\n');
        if let Err(e) = stdout.write_all(out.as_bytes()).await {
            tracing::error!("Failed to write response: {e}");
            break;
        }
        if let Err(e) = stdout.flush().await {
            tracing::error!("Failed to flush stdout: {e}");
            break;
        }
    }

    db.close();
    tracing::info!("database closed");
}
