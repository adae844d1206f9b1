//! `queuectl`: a CLI for a single-host durable background job queue.

mod cli;
mod commands;
mod error;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use queuectl_core::{Config, ConfigKey, FileMetricsSink, MetricsSink, NoOpMetricsSink, Store};
use queuectl_store::SqliteStore;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ConfigAction, DlqAction, WorkerAction};
use error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = std::fs::create_dir_all(&cli.data_dir) {
        eprintln!("error: could not create data directory: {err}");
        return ExitCode::from(1);
    }

    let store = match SqliteStore::connect(cli.data_dir.join("queue.db")).await {
        Ok(store) => store,
        Err(err) => {
            eprintln!("error: could not open store: {err}");
            return ExitCode::from(1);
        }
    };
    if let Err(err) = store.migrate().await {
        eprintln!("error: could not initialize schema: {err}");
        return ExitCode::from(1);
    }
    let store: Arc<dyn Store> = Arc::new(store);

    let config = Config::new(Arc::clone(&store));
    let log_level = config
        .get(ConfigKey::LogLevel)
        .await
        .unwrap_or_else(|_| ConfigKey::LogLevel.default_value().to_string());
    init_tracing(&log_level);

    let metrics: Arc<dyn MetricsSink> = match cli.metrics_file {
        Some(path) => Arc::new(FileMetricsSink::new(path)),
        None => Arc::new(NoOpMetricsSink),
    };

    let result = dispatch(cli.command, store, config, metrics, cli.data_dir).await;

    match result {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

async fn dispatch(
    command: Command,
    store: Arc<dyn Store>,
    config: Config,
    metrics: Arc<dyn MetricsSink>,
    data_dir: std::path::PathBuf,
) -> Result<(), CliError> {
    match command {
        Command::InitDb => {
            // Schema creation already happened unconditionally above;
            // this subcommand exists for operators who want an explicit,
            // idempotent "set up" step before the first `enqueue`.
            println!("schema ready at {}", data_dir.join("queue.db").display());
            Ok(())
        }
        Command::Enqueue {
            command,
            id,
            max_retries,
            backoff_base,
            timeout_seconds,
        } => commands::enqueue::run(store.as_ref(), command, id, max_retries, backoff_base, timeout_seconds).await,
        Command::Status => commands::status::run(store.as_ref(), &data_dir).await,
        Command::List { state, limit } => commands::list::run(store.as_ref(), state, limit).await,
        Command::Worker { action } => match action {
            WorkerAction::Start { count } => commands::worker::start(store, metrics, data_dir, count).await,
            WorkerAction::Stop => commands::worker::stop(&data_dir).await,
        },
        Command::Dlq { action } => match action {
            DlqAction::List { limit } => commands::dlq::list(store.as_ref(), limit).await,
            DlqAction::Retry { id } => commands::dlq::retry(store.as_ref(), &id).await,
            DlqAction::Purge { older_than_days } => commands::dlq::purge(store.as_ref(), older_than_days).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Get { key } => commands::config::get(&config, key).await,
            ConfigAction::Set { key, value } => commands::config::set(&config, &key, &value).await,
        },
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
