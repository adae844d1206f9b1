use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// Monotonic/wall-clock time source, injectable so tests never depend on
/// real wall-clock delay. Sleeping always races the cancellation token so
/// shutdown is never held up by a long backoff.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// Sleep until `deadline`, waking early if `cancel` is triggered.
    async fn sleep_until(&self, deadline: DateTime<Utc>, cancel: &CancellationToken);
}

/// The default clock: real time, real sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>, cancel: &CancellationToken) {
        let now = Utc::now();
        let remaining = (deadline - now).to_std().unwrap_or(std::time::Duration::ZERO);
        tokio::select! {
            _ = tokio::time::sleep(remaining) => {}
            _ = cancel.cancelled() => {}
        }
    }
}
