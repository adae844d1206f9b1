use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::job::{Job, JobSpec, JobState};

/// Durable persistence for jobs and config, with atomic claim semantics.
///
/// Every method here must be atomic with respect to concurrent callers on
/// the same machine: the backing engine provides single-writer
/// serialisation and durable commit (an embedded database with
/// write-ahead logging satisfies this). [`Store::claim_one`] is the load-
/// bearing operation: it is the only place `attempts` is incremented, and
/// its conditional `UPDATE ... WHERE state = 'pending'` is what guarantees
/// at most one worker ever holds a given job.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new `pending` row. Fails with `AlreadyExists` if `spec.id`
    /// is set and collides, `Invalid` if `command` is empty or
    /// `timeout_seconds` is present and not positive.
    async fn enqueue(&self, spec: JobSpec) -> Result<String, StoreError>;

    /// Atomically claim the oldest ready job, if any. Increments
    /// `attempts`, sets `state = processing` and `locked_by = worker_id`.
    async fn claim_one(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>, StoreError>;

    /// `processing -> completed`. Errors with `IllegalTransition` if the
    /// job is not currently `processing`.
    async fn complete(&self, job_id: &str, output_log: Option<String>) -> Result<(), StoreError>;

    /// `processing -> pending`, with `run_at` moved into the future.
    async fn retry(
        &self,
        job_id: &str,
        next_run_at: DateTime<Utc>,
        last_error: Option<String>,
        output_log: Option<String>,
    ) -> Result<(), StoreError>;

    /// `processing -> dead`. Strict: calling this on a job that is already
    /// `dead` is an `IllegalTransition`, not a no-op.
    async fn bury(
        &self,
        job_id: &str,
        last_error: Option<String>,
        output_log: Option<String>,
    ) -> Result<(), StoreError>;

    /// `dead -> pending`, resetting `attempts` to 0. Returns `false`
    /// (not an error) if the job is not currently `dead`.
    async fn promote_dead(&self, job_id: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Aggregate snapshot; all four states are always present, zero-filled.
    async fn counts_by_state(&self) -> Result<HashMap<JobState, i64>, StoreError>;

    /// Jobs ordered by `created_at` ascending, optionally filtered by state.
    async fn list(&self, filter_state: Option<JobState>, limit: i64) -> Result<Vec<Job>, StoreError>;

    /// Point lookup by id.
    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError>;

    /// Hard-delete `dead` rows whose `updated_at` predates `older_than`.
    /// Never touches non-dead rows. Returns the number of rows deleted.
    async fn purge_dead(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Return stuck `processing` rows (stale `updated_at`) to `pending`,
    /// tagging `last_error`. Idempotent and safe to call concurrently.
    async fn reap(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Read one config value.
    async fn config_get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Persist one config value, overwriting any prior value for `key`.
    async fn config_set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// All persisted config overrides (defaults are not included; those
    /// live in [`crate::config::ConfigKey::default_value`]).
    async fn config_all(&self) -> Result<HashMap<String, String>, StoreError>;
}

/// The message stamped on a row recovered by [`Store::reap`].
pub const REAPED_ERROR_MESSAGE: &str = "reaped: worker presumed dead";
