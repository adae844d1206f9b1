use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use queuectl_core::{Config, ConfigKey, Executor, Manager, ManagerConfig, MetricsSink, SchedulerConfig, Store, SystemClock};

use crate::error::CliError;

pub async fn start(
    store: Arc<dyn Store>,
    metrics: Arc<dyn MetricsSink>,
    data_dir: PathBuf,
    count: usize,
) -> Result<(), CliError> {
    let config = Config::new(Arc::clone(&store));
    let poll_interval = Duration::from_millis(config.get_u64(ConfigKey::WorkerPollIntervalMs).await?);
    let reap_threshold = Duration::from_secs(config.get_u64(ConfigKey::ReapThresholdSeconds).await?);
    let backoff_ceiling_seconds = config.get_u64(ConfigKey::BackoffCeilingSeconds).await?;

    let manager_config = ManagerConfig {
        worker_count: count,
        poll_interval,
        reap_threshold,
        stop_flag_path: Some(data_dir.join("STOP")),
        ..ManagerConfig::default()
    };

    let manager = Manager::new(
        store,
        Arc::new(SystemClock),
        Arc::new(Executor::new()),
        metrics,
        manager_config,
        SchedulerConfig { backoff_ceiling_seconds },
    );

    manager.run().await.map_err(CliError::Other)
}

pub async fn stop(data_dir: &std::path::Path) -> Result<(), CliError> {
    tokio::fs::create_dir_all(data_dir).await?;
    tokio::fs::write(data_dir.join("STOP"), b"").await?;
    println!("stop flag written; workers will finish their current job and exit");
    Ok(())
}
