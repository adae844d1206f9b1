//! Testing utilities shared across `queuectl` crates: a deterministic
//! fake clock for exercising backoff/reap timing without real sleeps, and
//! a disposable-database fixture for store-level integration tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queuectl_core::Clock;
use queuectl_store::SqliteStore;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A manually-advanced clock. `sleep_until` never actually sleeps; it
/// waits for either the cancellation token or [`FakeClock::advance`] to
/// push `now` past the requested deadline.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
    notify: Notify,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            notify: Notify::new(),
        }
    }

    /// Move the clock forward and wake any pending `sleep_until` calls so
    /// they can re-check whether their deadline has passed.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
        drop(now);
        self.notify.notify_waiters();
    }

    pub fn set(&self, value: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap();
        *now = value;
        drop(now);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>, cancel: &CancellationToken) {
        loop {
            if self.now_utc() >= deadline || cancel.is_cancelled() {
                return;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = cancel.cancelled() => return,
            }
        }
    }
}

/// An in-memory store plus a tempdir-backed equivalent, for tests that
/// need file-based durability semantics (e.g. across `SqliteStore`
/// reconnects) rather than a single pooled `:memory:` connection.
pub struct TempStore {
    pub store: SqliteStore,
    _dir: tempfile::TempDir,
}

impl TempStore {
    pub async fn new() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("queue.db");
        let store = SqliteStore::connect(&path).await?;
        store.migrate().await?;
        Ok(Self { store, _dir: dir })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn advance_wakes_a_pending_sleep() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let cancel = CancellationToken::new();
        let deadline = clock.now_utc() + chrono::Duration::seconds(10);

        let waiter_clock = Arc::clone(&clock);
        let waiter_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            waiter_clock.sleep_until(deadline, &waiter_cancel).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        clock.advance(chrono::Duration::seconds(11));
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sleep_until should wake once the deadline has passed")
            .unwrap();
    }

    #[tokio::test]
    async fn cancellation_wakes_a_pending_sleep_early() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let cancel = CancellationToken::new();
        let deadline = clock.now_utc() + chrono::Duration::seconds(1000);

        let waiter_clock = Arc::clone(&clock);
        let waiter_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            waiter_clock.sleep_until(deadline, &waiter_cancel).await;
        });

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sleep_until should wake on cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn temp_store_survives_round_trip() {
        let temp = TempStore::new().await.unwrap();
        let id = temp
            .store
            .enqueue(queuectl_core::JobSpec {
                command: "true".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(temp.store.get(&id).await.unwrap().is_some());
    }
}
