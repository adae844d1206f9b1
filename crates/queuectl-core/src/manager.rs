use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::executor::Executor;
use crate::metrics::MetricsSink;
use crate::scheduler::SchedulerConfig;
use crate::store::Store;
use crate::worker::Worker;

/// Everything the manager needs beyond its collaborators' `Arc`s.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub worker_count: usize,
    pub poll_interval: Duration,
    pub reap_interval: Duration,
    pub reap_threshold: Duration,
    /// How long to wait for workers to exit voluntarily on shutdown
    /// before abandoning them (the reaper recovers anything they held).
    pub shutdown_join_timeout: Duration,
    /// An on-disk shutdown channel with the same semantics as the
    /// cancellation token: presence means "stop".
    pub stop_flag_path: Option<PathBuf>,
    pub stop_flag_poll_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            poll_interval: Duration::from_millis(100),
            reap_interval: Duration::from_secs(30),
            reap_threshold: Duration::from_secs(7200),
            shutdown_join_timeout: Duration::from_secs(10),
            stop_flag_path: None,
            stop_flag_poll_interval: Duration::from_millis(250),
        }
    }
}

/// Owns a fixed-size worker pool plus the reaper, and coordinates
/// graceful shutdown across all of them through one monotone token.
pub struct Manager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    executor: Arc<Executor>,
    metrics: Arc<dyn MetricsSink>,
    config: ManagerConfig,
    scheduler_cfg: SchedulerConfig,
    cancel: CancellationToken,
}

impl Manager {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        executor: Arc<Executor>,
        metrics: Arc<dyn MetricsSink>,
        config: ManagerConfig,
        scheduler_cfg: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            executor,
            metrics,
            config,
            scheduler_cfg,
            cancel: CancellationToken::new(),
        }
    }

    /// A handle other code (signal handlers, `worker stop`) can use to
    /// request shutdown. Cancelling is monotone: once set, stays set.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the worker pool and reaper, install signal handlers, and
    /// block until shutdown is requested and every task has wound down
    /// (or the bounded wait has elapsed).
    pub async fn run(self) -> anyhow::Result<()> {
        if let Some(path) = &self.config.stop_flag_path {
            // A leftover stop flag from a prior run must not immediately
            // shut down a fresh start.
            let _ = tokio::fs::remove_file(path).await;
        }

        let mut handles = Vec::with_capacity(self.config.worker_count + 2);

        for i in 0..self.config.worker_count {
            let worker = Worker::new(
                format!("worker-{}", i + 1),
                Arc::clone(&self.store),
                Arc::clone(&self.clock),
                Arc::clone(&self.executor),
                Arc::clone(&self.metrics),
                self.config.poll_interval,
                self.scheduler_cfg,
                self.cancel.clone(),
            );
            handles.push(tokio::spawn(worker.run()));
        }

        handles.push(tokio::spawn(reap_loop(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.config.reap_interval,
            self.config.reap_threshold,
            self.cancel.clone(),
        )));

        if let Some(path) = self.config.stop_flag_path.clone() {
            handles.push(tokio::spawn(watch_stop_flag(
                path,
                self.config.stop_flag_poll_interval,
                self.cancel.clone(),
            )));
        }

        install_signal_handlers(self.cancel.clone());

        self.cancel.cancelled().await;
        tracing::info!("shutdown requested; waiting for workers to finish their current job");

        let join_all = futures::future::join_all(handles);
        if tokio::time::timeout(self.config.shutdown_join_timeout, join_all)
            .await
            .is_err()
        {
            tracing::warn!(
                "shutdown wait of {:?} elapsed; abandoning remaining tasks, the reaper will recover any held job",
                self.config.shutdown_join_timeout
            );
        }

        Ok(())
    }
}

async fn reap_loop(
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    threshold: Duration,
    cancel: CancellationToken,
) {
    loop {
        let cutoff = clock.now_utc() - chrono::Duration::from_std(threshold).unwrap_or_default();
        match store.reap(cutoff).await {
            Ok(0) => {}
            Ok(n) => tracing::warn!(count = n, "reaped stuck jobs back to pending"),
            Err(err) => tracing::error!(error = %err, "reap failed"),
        }

        let deadline = clock.now_utc() + chrono::Duration::from_std(interval).unwrap_or_default();
        clock.sleep_until(deadline, &cancel).await;
        if cancel.is_cancelled() {
            break;
        }
    }
}

async fn watch_stop_flag(path: PathBuf, interval: Duration, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "stop flag detected");
            cancel.cancel();
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => break,
        }
    }
}

#[cfg(unix)]
fn install_signal_handlers(cancel: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGINT handler");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => tracing::info!("received SIGINT"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
        cancel.cancel();
    });
}

#[cfg(not(unix))]
fn install_signal_handlers(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c");
            cancel.cancel();
        }
    });
}
