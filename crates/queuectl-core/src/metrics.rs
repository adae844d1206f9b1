use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// One fire-and-forget record of worker activity. Best-effort: a sink
/// implementation's write failures must never affect job state.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsEvent {
    pub timestamp: DateTime<Utc>,
    pub event: MetricsEventKind,
    pub job_id: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsEventKind {
    Start,
    Complete,
}

impl MetricsEvent {
    pub fn start(job_id: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event: MetricsEventKind::Start,
            job_id: job_id.into(),
            status: None,
        }
    }

    pub fn complete(job_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event: MetricsEventKind::Complete,
            job_id: job_id.into(),
            status: Some(status.into()),
        }
    }
}

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent);
}

/// Discards every event. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetricsSink;

impl MetricsSink for NoOpMetricsSink {
    fn record(&self, _event: MetricsEvent) {}
}

/// Appends one JSON line per event to a file. Writes happen on a
/// background task fed by an unbounded channel, so `record()` never
/// blocks a worker on file I/O; a full channel or a write error is logged
/// and otherwise swallowed.
pub struct FileMetricsSink {
    tx: mpsc::UnboundedSender<MetricsEvent>,
}

impl FileMetricsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<MetricsEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = append_line(&path, &event).await {
                    tracing::warn!(error = %err, "metrics sink write failed");
                }
            }
        });
        Self { tx }
    }
}

impl MetricsSink for FileMetricsSink {
    fn record(&self, event: MetricsEvent) {
        // Channel is unbounded and the receiver only exits if the writer
        // task panics; a send error means that already happened, so there
        // is nothing more this sink can do.
        let _ = self.tx.send(event);
    }
}

async fn append_line(path: &Path, event: &MetricsEvent) -> std::io::Result<()> {
    let line = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    Ok(())
}
