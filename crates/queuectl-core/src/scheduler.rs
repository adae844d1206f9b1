use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::executor::Outcome;
use crate::job::Job;

/// What to do with a job's row after one execution attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Complete,
    Retry { next_run_at: DateTime<Utc> },
    Bury,
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Complete => "completed",
            Decision::Retry { .. } => "retry",
            Decision::Bury => "dead",
        }
    }
}

/// Knobs the scheduler needs beyond what's on the job row itself.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub backoff_ceiling_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backoff_ceiling_seconds: 3600,
        }
    }
}

/// `delay = backoff_base ^ attempts`, capped at `backoff_ceiling_seconds`.
/// `attempts` is the post-claim value (the just-finished execution counts),
/// so the first failure schedules `backoff_base ^ 1`.
pub fn backoff_delay_seconds(backoff_base: u32, attempts: u32, ceiling_seconds: u64) -> u64 {
    let delay = (backoff_base as u64).saturating_pow(attempts);
    delay.min(ceiling_seconds.max(1))
}

/// Pure function: executor outcome + current job snapshot -> next state.
/// `job.attempts` must already reflect the claim-time increment for the
/// execution that produced `outcome`.
pub fn decide(outcome: &Outcome, job: &Job, now: DateTime<Utc>, cfg: &SchedulerConfig) -> Decision {
    if outcome.is_success() {
        return Decision::Complete;
    }

    if job.attempts > job.max_retries {
        return Decision::Bury;
    }

    let delay = backoff_delay_seconds(job.backoff_base.max(1), job.attempts, cfg.backoff_ceiling_seconds);
    Decision::Retry {
        next_run_at: now + ChronoDuration::seconds(delay as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn job_with(attempts: u32, max_retries: u32, backoff_base: u32) -> Job {
        use crate::job::JobState;
        let now = Utc::now();
        Job {
            id: "job-1".to_string(),
            command: "true".to_string(),
            state: JobState::Processing,
            attempts,
            max_retries,
            backoff_base,
            timeout_seconds: None,
            created_at: now,
            updated_at: now,
            run_at: now,
            locked_by: Some("worker-1".to_string()),
            last_error: None,
            output_log: None,
        }
    }

    #[test]
    fn success_always_completes() {
        let job = job_with(1, 0, 2);
        let outcome = Outcome::Succeeded {
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        };
        assert_eq!(decide(&outcome, &job, Utc::now(), &SchedulerConfig::default()), Decision::Complete);
    }

    #[test]
    fn max_retries_zero_buries_on_first_failure() {
        let job = job_with(1, 0, 2);
        let outcome = Outcome::Failed {
            exit_code: 1,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        };
        assert_eq!(decide(&outcome, &job, Utc::now(), &SchedulerConfig::default()), Decision::Bury);
    }

    #[test]
    fn retries_schedule_exponential_backoff() {
        let job = job_with(2, 3, 2);
        let outcome = Outcome::Failed {
            exit_code: 1,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        };
        let now = Utc::now();
        match decide(&outcome, &job, now, &SchedulerConfig::default()) {
            Decision::Retry { next_run_at } => {
                assert_eq!((next_run_at - now).num_seconds(), 4); // 2^2
            }
            other => panic!("expected Retry, got {other:?}"),
        }
    }

    #[test]
    fn backoff_base_one_means_immediate_eligibility() {
        assert_eq!(backoff_delay_seconds(1, 5, 3600), 1);
    }

    #[test]
    fn ceiling_caps_runaway_delay() {
        assert_eq!(backoff_delay_seconds(10, 10, 3600), 3600);
    }
}
