//! Lockkeeper - Distributed Advisory Lock Service
//!
//! Demo entry point: parses CLI arguments and either validates configuration,
//! prints build information, or starts a small demonstration shell that
//! dispatches a handful of stub events through the lock manager.

use std::sync::Arc;

use lockkeeper::clock::SystemClock;
use lockkeeper::config::Config;
use lockkeeper::core::LockManager;
use lockkeeper::metrics::Metrics;
use lockkeeper::shell::stub::{RecordingHandler, StubEventSource};
use lockkeeper::shell::{dispatch, Event};
use lockkeeper::storage::dynamodb::DynamoLockStore;
use lockkeeper::{cli, cli::Commands};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = cli::parse_args();

    match cli.command {
        Some(Commands::Start) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .init();

            if !cli.quiet {
                println!("Lockkeeper - Distributed Advisory Lock Service");
                println!("Version: {}", env!("CARGO_PKG_VERSION"));
            }

            let config = load_config(&cli.config)?;
            run_demo_shell(config).await?;
        }
        Some(Commands::Config { validate }) => {
            println!("Checking configuration...");
            if validate {
                match load_config(&cli.config) {
                    Ok(config) => {
                        println!("Configuration valid!");
                        if cli.verbose {
                            println!("Details:");
                            println!("   - owner: {}", config.lock_manager.owner);
                            println!("   - lease_duration_s: {}", config.lock_manager.lease_duration_s);
                            println!("   - table_name: {}", config.storage.dynamodb.table_name);
                            println!("   - region: {}", config.storage.dynamodb.region);
                        }
                    }
                    Err(e) => {
                        println!("Configuration error: {}", e);
                        std::process::exit(1);
                    }
                }
            }
        }
        Some(Commands::Info) => {
            println!("Lockkeeper - Distributed Advisory Lock Service");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!(
                "Environment: {}",
                if cfg!(debug_assertions) { "Development" } else { "Production" }
            );
        }
        None => {
            if !cli.quiet {
                println!("Lockkeeper - Distributed Advisory Lock Service");
                println!("Version: {}", env!("CARGO_PKG_VERSION"));
                println!("Run with `start` to launch the demo shell, or `--help` for options.");
            }
        }
    }

    Ok(())
}

fn load_config(path: &str) -> Result<Config, Box<dyn std::error::Error>> {
    std::env::set_var("CONFIG_FILE", path);
    Config::load().map_err(|e| e.into())
}

async fn run_demo_shell(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = Arc::new(Metrics::new()?);
    let store = DynamoLockStore::new(&config.storage.dynamodb).await;
    let manager = LockManager::new(store, SystemClock, config.lock_manager.clone(), Some(metrics));

    let source = StubEventSource::new(vec![
        Event { id: "demo-job-1".to_string(), payload: Vec::new() },
        Event { id: "demo-job-2".to_string(), payload: Vec::new() },
    ]);
    let handler = RecordingHandler::default();
    let cancel = CancellationToken::new();

    while let Some(event) = source.next() {
        if let Err(e) = dispatch(&manager, &handler, event, &cancel).await {
            tracing::error!(error = %e, "event dispatch failed");
        }
    }

    manager.close().await;
    Ok(())
}
