use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::executor::Executor;
use crate::job::Job;
use crate::metrics::{MetricsEvent, MetricsSink};
use crate::scheduler::{self, Decision, SchedulerConfig};
use crate::store::Store;

/// A long-running claim/execute/classify/persist loop, identified by a
/// string worker id decoupled from any OS pid so the reaper only ever
/// needs a staleness timestamp.
pub struct Worker {
    id: String,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    executor: Arc<Executor>,
    metrics: Arc<dyn MetricsSink>,
    poll_interval: Duration,
    scheduler_cfg: SchedulerConfig,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        executor: Arc<Executor>,
        metrics: Arc<dyn MetricsSink>,
        poll_interval: Duration,
        scheduler_cfg: SchedulerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            store,
            clock,
            executor,
            metrics,
            poll_interval,
            scheduler_cfg,
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn run(self) {
        tracing::info!(worker = %self.id, "worker started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.store.claim_one(&self.id, self.clock.now_utc()).await {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => {
                    tracing::debug!(worker = %self.id, "no ready job, polling");
                    let deadline = self.clock.now_utc() + chrono::Duration::from_std(self.poll_interval).unwrap_or_default();
                    self.clock.sleep_until(deadline, &self.cancel).await;
                }
                Err(err) => {
                    // Internal store error: don't lose this worker, but
                    // back off briefly so a down store doesn't spin us.
                    tracing::error!(worker = %self.id, error = %err, "store error while claiming; backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(500)) => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
            }
        }
        tracing::info!(worker = %self.id, "worker shutdown complete");
    }

    /// Runs one job to completion and persists the decision. Deliberately
    /// does not check the shutdown token mid-way: once a job is claimed,
    /// the commit back to the store always happens before this worker
    /// honours shutdown again.
    async fn process(&self, job: Job) {
        tracing::info!(worker = %self.id, job_id = %job.id, attempt = job.attempts, "claimed job");
        self.metrics.record(MetricsEvent::start(job.id.clone()));

        let timeout = job.timeout_seconds.map(Duration::from_secs);
        let outcome = self.executor.execute(&job.command, timeout).await;
        let now = self.clock.now_utc();
        let decision = scheduler::decide(&outcome, &job, now, &self.scheduler_cfg);
        let output_log = Some(outcome.to_output_log());
        let last_error = outcome.last_error();

        let persisted = match &decision {
            Decision::Complete => self.store.complete(&job.id, output_log).await,
            Decision::Retry { next_run_at } => {
                self.store
                    .retry(&job.id, *next_run_at, last_error.clone(), output_log)
                    .await
            }
            Decision::Bury => self.store.bury(&job.id, last_error.clone(), output_log).await,
        };

        match persisted {
            Ok(()) => {
                tracing::info!(worker = %self.id, job_id = %job.id, decision = decision.label(), "job persisted");
            }
            Err(err) => {
                // The reaper is the backstop here: the row is still
                // `processing` with a now-stale `updated_at`.
                tracing::error!(worker = %self.id, job_id = %job.id, error = %err, "failed to persist decision; reaper will recover");
            }
        }

        self.metrics
            .record(MetricsEvent::complete(job.id.clone(), decision.label()));
    }
}
