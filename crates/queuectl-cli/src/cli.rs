use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// A single-host durable background job queue.
#[derive(Debug, Parser)]
#[command(name = "queuectl", version, about)]
pub struct Cli {
    /// Directory holding `queue.db` and the `STOP` flag file. Created on
    /// first use.
    #[arg(long, global = true, default_value = "./queuectl-data")]
    pub data_dir: PathBuf,

    /// Append line-delimited JSON worker-activity events to this file.
    #[arg(long, global = true)]
    pub metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the store schema if it does not already exist.
    InitDb,

    /// Add a new job to the queue and print its id.
    Enqueue {
        command: String,

        /// Use this id instead of generating one; fails if it already exists.
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        max_retries: Option<u32>,

        #[arg(long)]
        backoff_base: Option<u32>,

        #[arg(long)]
        timeout_seconds: Option<u64>,
    },

    /// Print job counts per state and whether the stop flag is set.
    Status,

    /// List jobs, one per line as tab-separated fields.
    List {
        #[arg(long)]
        state: Option<String>,

        #[arg(long, default_value_t = 100)]
        limit: i64,
    },

    /// Manage worker processes.
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },

    /// Inspect and manage the dead-letter queue.
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },

    /// Read or write configuration keys.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum WorkerAction {
    /// Spawn N workers and the reaper, and block until shutdown.
    Start {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Request shutdown by creating the stop-flag file.
    Stop,
}

#[derive(Debug, Subcommand)]
pub enum DlqAction {
    /// List dead jobs.
    List {
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
    /// Move a dead job back to pending, resetting its attempt count.
    Retry { id: String },
    /// Permanently delete dead jobs older than the given threshold.
    Purge {
        #[arg(long, default_value_t = 30)]
        older_than_days: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print one key's effective value, or every key if omitted.
    Get { key: Option<String> },
    /// Set a configuration key, validating it first.
    Set { key: String, value: String },
}
