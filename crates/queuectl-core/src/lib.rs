//! # queuectl-core
//!
//! The durable scheduling engine behind `queuectl`: a single-host
//! background job queue where a CLI enqueues shell-command jobs into an
//! embedded store, and a pool of workers claims, runs, and retries them.
//!
//! ## Core Concepts
//!
//! - [`Job`] / [`JobState`], the state machine: `pending -> processing ->
//!   (completed | pending-with-future-run_at | dead)`.
//! - [`Store`], durable persistence with an atomic claim protocol; at
//!   most one worker ever holds a given job.
//! - [`Executor`], runs one command under a hard timeout, returning a
//!   tagged [`Outcome`] instead of raising.
//! - [`scheduler::decide`], a pure function from `Outcome` + `Job` to a
//!   [`scheduler::Decision`] (complete / retry-with-backoff / bury).
//! - [`Worker`], claim -> execute -> classify -> persist, honouring a
//!   shared shutdown token.
//! - [`Manager`], owns the worker pool and the reaper, translates
//!   SIGINT/SIGTERM and an on-disk stop flag into that one token.
//!
//! ## What This Is Not
//!
//! Not a distributed queue, not a priority scheduler, not an
//! exactly-once delivery system. Single host, strict FIFO-by-`run_at`,
//! at-least-once with the expectation that user commands are idempotent.

mod clock;
mod config;
mod error;
mod executor;
mod job;
mod manager;
mod metrics;
mod scheduler;
mod store;
mod worker;

pub use clock::{Clock, SystemClock};
pub use config::{Config, ConfigKey};
pub use error::{StoreError, ValidationError};
pub use executor::{Executor, Outcome};
pub use job::{truncate_to_bytes, Job, JobSpec, JobState, MAX_PERSISTED_BYTES};
pub use manager::{Manager, ManagerConfig};
pub use metrics::{FileMetricsSink, MetricsEvent, MetricsEventKind, MetricsSink, NoOpMetricsSink};
pub use scheduler::{backoff_delay_seconds, decide, Decision, SchedulerConfig};
pub use store::{Store, REAPED_ERROR_MESSAGE};
pub use worker::Worker;

pub use async_trait::async_trait;
