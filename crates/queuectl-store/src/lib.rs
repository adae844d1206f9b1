//! SQLite implementation of the `queuectl` job store.
//!
//! This crate provides the production implementation of the
//! [`queuectl_core::Store`] trait: a single embedded database file, opened
//! in WAL journal mode, with every mutating operation expressed as one
//! atomic SQL statement (an `UPDATE ... WHERE state = '...' RETURNING *`)
//! so SQLite's own file-level write locking is what gives the claim
//! protocol its conditional-write guarantee, no `FOR UPDATE SKIP LOCKED`
//! needed, because there is only ever one writer at a time.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE jobs (
//!     id TEXT PRIMARY KEY,
//!     command TEXT NOT NULL,
//!     state TEXT NOT NULL,
//!     attempts INTEGER NOT NULL,
//!     max_retries INTEGER NOT NULL,
//!     backoff_base INTEGER NOT NULL,
//!     timeout_seconds INTEGER,
//!     created_at TEXT NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     run_at TEXT NOT NULL,
//!     locked_by TEXT,
//!     last_error TEXT,
//!     output_log TEXT
//! );
//! CREATE INDEX idx_jobs_state_run_at ON jobs (state, run_at);
//!
//! CREATE TABLE config (
//!     key TEXT PRIMARY KEY,
//!     value TEXT NOT NULL
//! );
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use queuectl_store::SqliteStore;
//!
//! let store = SqliteStore::connect("queue.db").await?;
//! store.migrate().await?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queuectl_core::{Job, JobSpec, JobState, Store, StoreError, ValidationError, REAPED_ERROR_MESSAGE};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    command TEXT NOT NULL,
    state TEXT NOT NULL,
    attempts INTEGER NOT NULL,
    max_retries INTEGER NOT NULL,
    backoff_base INTEGER NOT NULL,
    timeout_seconds INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    run_at TEXT NOT NULL,
    locked_by TEXT,
    last_error TEXT,
    output_log TEXT
);
CREATE INDEX IF NOT EXISTS idx_jobs_state_run_at ON jobs (state, run_at);

CREATE TABLE IF NOT EXISTS config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// SQLite-backed [`Store`]. Cheap to clone, wraps a pooled connection.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if absent) the database at `path`, in WAL mode with
    /// a generous busy timeout so a second writer waits for the first
    /// instead of erroring under ordinary contention.
    pub async fn connect(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// An ephemeral, single-connection in-memory store. Used by tests and
    /// by `queuectl-testing` fixtures.
    pub async fn connect_in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Idempotent schema creation. Safe to call on every startup.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<Job, StoreError> {
    let state_str: String = row.try_get("state").map_err(|e| StoreError::Backend(e.into()))?;
    let state = JobState::from_str(&state_str)
        .map_err(|e| StoreError::Backend(anyhow::anyhow!("corrupt state column: {e}")))?;
    let attempts: i64 = row.try_get("attempts").map_err(|e| StoreError::Backend(e.into()))?;
    let max_retries: i64 = row.try_get("max_retries").map_err(|e| StoreError::Backend(e.into()))?;
    let backoff_base: i64 = row.try_get("backoff_base").map_err(|e| StoreError::Backend(e.into()))?;
    let timeout_seconds: Option<i64> = row.try_get("timeout_seconds").map_err(|e| StoreError::Backend(e.into()))?;

    Ok(Job {
        id: row.try_get("id").map_err(|e| StoreError::Backend(e.into()))?,
        command: row.try_get("command").map_err(|e| StoreError::Backend(e.into()))?,
        state,
        attempts: attempts as u32,
        max_retries: max_retries as u32,
        backoff_base: backoff_base as u32,
        timeout_seconds: timeout_seconds.map(|v| v as u64),
        created_at: row.try_get("created_at").map_err(|e| StoreError::Backend(e.into()))?,
        updated_at: row.try_get("updated_at").map_err(|e| StoreError::Backend(e.into()))?,
        run_at: row.try_get("run_at").map_err(|e| StoreError::Backend(e.into()))?,
        locked_by: row.try_get("locked_by").map_err(|e| StoreError::Backend(e.into()))?,
        last_error: row.try_get("last_error").map_err(|e| StoreError::Backend(e.into()))?,
        output_log: row.try_get("output_log").map_err(|e| StoreError::Backend(e.into()))?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn enqueue(&self, spec: JobSpec) -> Result<String, StoreError> {
        if spec.command.trim().is_empty() {
            return Err(ValidationError::EmptyCommand.into());
        }
        if let Some(timeout) = spec.timeout_seconds {
            if timeout == 0 {
                return Err(ValidationError::NonPositiveTimeout(0).into());
            }
        }
        if let Some(base) = spec.backoff_base {
            if base < 1 {
                return Err(ValidationError::BackoffBaseTooSmall(base).into());
            }
        }

        let id = spec.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO jobs
                (id, command, state, attempts, max_retries, backoff_base,
                 timeout_seconds, created_at, updated_at, run_at,
                 locked_by, last_error, output_log)
            VALUES
                (?1, ?2, 'pending', 0, ?3, ?4, ?5, ?6, ?6, ?6, NULL, NULL, NULL)
            "#,
        )
        .bind(&id)
        .bind(&spec.command)
        .bind(spec.max_retries.unwrap_or(3) as i64)
        .bind(spec.backoff_base.unwrap_or(2) as i64)
        .bind(spec.timeout_seconds.map(|v| v as i64))
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(id),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::AlreadyExists(id))
            }
            Err(err) => Err(StoreError::Backend(err.into())),
        }
    }

    async fn claim_one(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'processing', locked_by = ?1, attempts = attempts + 1, updated_at = ?2
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = 'pending' AND run_at <= ?2
                ORDER BY run_at ASC, created_at ASC, id ASC
                LIMIT 1
            )
            AND state = 'pending'
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?;

        row.map(row_to_job).transpose()
    }

    async fn complete(&self, job_id: &str, output_log: Option<String>) -> Result<(), StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed', locked_by = NULL, updated_at = ?1, output_log = ?2
            WHERE id = ?3 AND state = 'processing'
            "#,
        )
        .bind(now)
        .bind(&output_log)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::IllegalTransition {
                job_id: job_id.to_string(),
                attempted: "complete",
            });
        }
        Ok(())
    }

    async fn retry(
        &self,
        job_id: &str,
        next_run_at: DateTime<Utc>,
        last_error: Option<String>,
        output_log: Option<String>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending', locked_by = NULL, run_at = ?1, updated_at = ?2,
                last_error = ?3, output_log = ?4
            WHERE id = ?5 AND state = 'processing'
            "#,
        )
        .bind(next_run_at)
        .bind(now)
        .bind(&last_error)
        .bind(&output_log)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::IllegalTransition {
                job_id: job_id.to_string(),
                attempted: "retry",
            });
        }
        Ok(())
    }

    async fn bury(&self, job_id: &str, last_error: Option<String>, output_log: Option<String>) -> Result<(), StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'dead', locked_by = NULL, updated_at = ?1, last_error = ?2, output_log = ?3
            WHERE id = ?4 AND state = 'processing'
            "#,
        )
        .bind(now)
        .bind(&last_error)
        .bind(&output_log)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::IllegalTransition {
                job_id: job_id.to_string(),
                attempted: "bury",
            });
        }
        Ok(())
    }

    async fn promote_dead(&self, job_id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending', attempts = 0, run_at = ?1, updated_at = ?1, last_error = NULL
            WHERE id = ?2 AND state = 'dead'
            "#,
        )
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn counts_by_state(&self) -> Result<HashMap<JobState, i64>, StoreError> {
        let rows = sqlx::query("SELECT state, COUNT(*) as c FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;

        let mut counts: HashMap<JobState, i64> = JobState::ALL.into_iter().map(|s| (s, 0)).collect();
        for row in rows {
            let state_str: String = row.try_get("state").map_err(|e| StoreError::Backend(e.into()))?;
            if let Ok(state) = JobState::from_str(&state_str) {
                let count: i64 = row.try_get("c").map_err(|e| StoreError::Backend(e.into()))?;
                counts.insert(state, count);
            }
        }
        Ok(counts)
    }

    async fn list(&self, filter_state: Option<JobState>, limit: i64) -> Result<Vec<Job>, StoreError> {
        let rows = match filter_state {
            Some(state) => {
                sqlx::query("SELECT * FROM jobs WHERE state = ?1 ORDER BY created_at ASC LIMIT ?2")
                    .bind(state.as_str())
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM jobs ORDER BY created_at ASC LIMIT ?1")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| StoreError::Backend(e.into()))?;

        rows.into_iter().map(row_to_job).collect()
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;
        row.map(row_to_job).transpose()
    }

    async fn purge_dead(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE state = 'dead' AND updated_at < ?1")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(result.rows_affected())
    }

    async fn reap(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending', locked_by = NULL, updated_at = ?1, last_error = ?2
            WHERE state = 'processing' AND updated_at < ?3
            "#,
        )
        .bind(now)
        .bind(REAPED_ERROR_MESSAGE)
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(result.rows_affected())
    }

    async fn config_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM config WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;
        row.map(|r| r.try_get("value").map_err(|e| StoreError::Backend(e.into())))
            .transpose()
    }

    async fn config_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO config (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(())
    }

    async fn config_all(&self) -> Result<HashMap<String, String>, StoreError> {
        let rows = sqlx::query("SELECT key, value FROM config")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;

        let mut out = HashMap::new();
        for row in rows {
            let key: String = row.try_get("key").map_err(|e| StoreError::Backend(e.into()))?;
            let value: String = row.try_get("value").map_err(|e| StoreError::Backend(e.into()))?;
            out.insert(key, value);
        }
        Ok(out)
    }
}
