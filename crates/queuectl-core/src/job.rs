use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The five-state job lifecycle from the outside world's point of view.
///
/// `failed` is deliberately absent: a job that has failed at least once but
/// still has retry budget left is simply `Pending` with `run_at` in the
/// future. Callers who need "has this ever failed" should look at
/// `attempts > 0` instead of a dedicated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Dead,
}

impl JobState {
    pub const ALL: [JobState; 4] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Dead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "dead" => Ok(JobState::Dead),
            other => Err(format!("unknown job state `{other}`")),
        }
    }
}

/// A durable unit of work: one shell command plus its retry policy and
/// current position in the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub state: JobState,
    pub attempts: u32,
    pub max_retries: u32,
    pub backoff_base: u32,
    pub timeout_seconds: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub run_at: DateTime<Utc>,
    pub locked_by: Option<String>,
    pub last_error: Option<String>,
    pub output_log: Option<String>,
}

/// The longest `last_error` / captured-stream excerpt persisted to the
/// store. Full output is only ever held transiently by the executor.
pub const MAX_PERSISTED_BYTES: usize = 4096;

pub fn truncate_to_bytes(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = s[..end].to_string();
    out.push_str("... [truncated]");
    out
}

/// Caller-supplied intent for a new job; defaults are filled in by the
/// config-aware layer above the store, not here.
#[derive(Debug, Clone, Default)]
pub struct JobSpec {
    pub id: Option<String>,
    pub command: String,
    pub max_retries: Option<u32>,
    pub backoff_base: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "a".repeat(10) + "é";
        let truncated = truncate_to_bytes(&s, 10);
        assert!(truncated.starts_with(&"a".repeat(10)));
    }

    #[test]
    fn state_round_trips_through_str() {
        for state in JobState::ALL {
            let parsed: JobState = state.as_str().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }
}
