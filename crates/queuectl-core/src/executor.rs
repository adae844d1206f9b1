use std::os::unix::process::CommandExt as _;
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::task::JoinHandle;

use crate::job::{truncate_to_bytes, MAX_PERSISTED_BYTES};

/// Grace period between SIGTERM and SIGKILL when a timed-out command's
/// process group refuses to die.
const KILL_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Outcome of running a single command. Data, not an exception: the
/// scheduler is a pure function over this plus the job's retry state.
#[derive(Debug, Clone)]
pub enum Outcome {
    Succeeded {
        stdout: String,
        stderr: String,
        duration: Duration,
    },
    Failed {
        exit_code: i32,
        stdout: String,
        stderr: String,
        duration: Duration,
    },
    TimedOut {
        duration: Duration,
        partial_stdout: String,
        partial_stderr: String,
    },
    Unlaunchable {
        reason: String,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }

    /// A short, human-readable `last_error` excerpt. `None` on success.
    pub fn last_error(&self) -> Option<String> {
        match self {
            Outcome::Succeeded { .. } => None,
            Outcome::Failed {
                exit_code, stderr, ..
            } => {
                let excerpt = if stderr.trim().is_empty() {
                    String::new()
                } else {
                    format!(": {}", stderr.trim())
                };
                Some(truncate_to_bytes(
                    &format!("Exit Code {exit_code}{excerpt}"),
                    MAX_PERSISTED_BYTES,
                ))
            }
            Outcome::TimedOut { duration, .. } => Some(format!(
                "timeout after {:.1}s",
                duration.as_secs_f64()
            )),
            Outcome::Unlaunchable { reason } => {
                Some(truncate_to_bytes(&format!("Unlaunchable: {reason}"), MAX_PERSISTED_BYTES))
            }
        }
    }

    /// Structured JSON persisted to `output_log`.
    pub fn to_output_log(&self) -> String {
        #[derive(Serialize)]
        struct Log<'a> {
            kind: &'a str,
            exit_code: Option<i32>,
            stdout: &'a str,
            stderr: &'a str,
            duration_ms: u128,
        }

        let log = match self {
            Outcome::Succeeded {
                stdout,
                stderr,
                duration,
            } => Log {
                kind: "succeeded",
                exit_code: Some(0),
                stdout,
                stderr,
                duration_ms: duration.as_millis(),
            },
            Outcome::Failed {
                exit_code,
                stdout,
                stderr,
                duration,
            } => Log {
                kind: "failed",
                exit_code: Some(*exit_code),
                stdout,
                stderr,
                duration_ms: duration.as_millis(),
            },
            Outcome::TimedOut {
                duration,
                partial_stdout,
                partial_stderr,
            } => Log {
                kind: "timed_out",
                exit_code: None,
                stdout: partial_stdout,
                stderr: partial_stderr,
                duration_ms: duration.as_millis(),
            },
            Outcome::Unlaunchable { reason } => Log {
                kind: "unlaunchable",
                exit_code: None,
                stdout: "",
                stderr: reason,
                duration_ms: 0,
            },
        };

        serde_json::to_string(&log).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Runs a single shell command with a hard wall-clock timeout. Never
/// touches the store; always returns decoded, bounded strings, raw byte
/// buffers never cross this boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct Executor;

impl Executor {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self, command: &str, timeout: Option<Duration>) -> Outcome {
        let start = std::time::Instant::now();

        let mut cmd = TokioCommand::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Give the child its own process group so a timeout kill can
            // take the whole tree with it instead of just the shell.
            .process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                return Outcome::Unlaunchable {
                    reason: err.to_string(),
                }
            }
        };
        let pgid = child.id().map(|pid| pid as i32);

        // Drain stdout/stderr on their own tasks rather than via
        // `wait_with_output`, so bytes the child already wrote survive a
        // timeout: `wait_with_output`'s future (and the buffer it owns)
        // would otherwise be dropped whole when the timeout elapses.
        let stdout_task = tokio::spawn(read_to_vec(child.stdout.take()));
        let stderr_task = tokio::spawn(read_to_vec(child.stderr.take()));

        match timeout {
            Some(budget) => match tokio::time::timeout(budget, child.wait()).await {
                Ok(Ok(status)) => {
                    let stdout = join_captured(stdout_task).await;
                    let stderr = join_captured(stderr_task).await;
                    Self::classify(status, stdout, stderr, start.elapsed())
                }
                Ok(Err(err)) => Outcome::Unlaunchable {
                    reason: err.to_string(),
                },
                Err(_elapsed) => {
                    if let Some(pgid) = pgid {
                        Self::kill_group(pgid).await;
                    }
                    // The child's pipes close once it is killed, so the
                    // reader tasks finish with whatever was written before
                    // the kill landed.
                    let partial_stdout = join_captured(stdout_task).await;
                    let partial_stderr = join_captured(stderr_task).await;
                    Outcome::TimedOut {
                        duration: start.elapsed(),
                        partial_stdout: truncate_to_bytes(
                            String::from_utf8_lossy(&partial_stdout).trim(),
                            MAX_PERSISTED_BYTES,
                        ),
                        partial_stderr: truncate_to_bytes(
                            String::from_utf8_lossy(&partial_stderr).trim(),
                            MAX_PERSISTED_BYTES,
                        ),
                    }
                }
            },
            None => match child.wait().await {
                Ok(status) => {
                    let stdout = join_captured(stdout_task).await;
                    let stderr = join_captured(stderr_task).await;
                    Self::classify(status, stdout, stderr, start.elapsed())
                }
                Err(err) => Outcome::Unlaunchable {
                    reason: err.to_string(),
                },
            },
        }
    }

    fn classify(status: std::process::ExitStatus, stdout: Vec<u8>, stderr: Vec<u8>, duration: Duration) -> Outcome {
        let stdout = truncate_to_bytes(String::from_utf8_lossy(&stdout).trim(), MAX_PERSISTED_BYTES);
        let stderr = truncate_to_bytes(String::from_utf8_lossy(&stderr).trim(), MAX_PERSISTED_BYTES);
        match status.code() {
            Some(0) => Outcome::Succeeded {
                stdout,
                stderr,
                duration,
            },
            Some(code) => Outcome::Failed {
                exit_code: code,
                stdout,
                stderr,
                duration,
            },
            // Terminated by a signal (e.g. our own SIGKILL racing a normal
            // exit). Treat as a generic failure with a sentinel code.
            None => Outcome::Failed {
                exit_code: -1,
                stdout,
                stderr,
                duration,
            },
        }
    }

    async fn kill_group(pgid: i32) {
        // SAFETY: pgid was observed immediately after spawning a child we
        // placed in its own process group, so the group either contains
        // only our own descendants or has already exited.
        unsafe {
            libc::killpg(pgid, libc::SIGTERM);
        }
        tokio::time::sleep(KILL_GRACE_PERIOD).await;
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
}

/// Reads a piped child handle to EOF on its own task, so the bytes
/// written so far are preserved even if the caller stops waiting on this
/// task (the child got killed, the pipe closed) before it would finish.
async fn read_to_vec<R: tokio::io::AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = handle {
        let _ = reader.read_to_end(&mut buf).await;
    }
    buf
}

/// Waits briefly for a reader task to finish; an empty buffer stands in
/// for a task that panicked or is still stuck on a pipe nothing closed.
async fn join_captured(task: JoinHandle<Vec<u8>>) -> Vec<u8> {
    tokio::time::timeout(KILL_GRACE_PERIOD * 4, task)
        .await
        .ok()
        .and_then(|r| r.ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeds_on_true() {
        let outcome = Executor::new().execute("true", None).await;
        assert!(outcome.is_success());
        assert!(outcome.last_error().is_none());
    }

    #[tokio::test]
    async fn fails_on_false_with_exit_code_prefix() {
        let outcome = Executor::new().execute("false", None).await;
        let err = outcome.last_error().expect("should have an error");
        assert!(err.starts_with("Exit Code 1"), "got: {err}");
    }

    #[tokio::test]
    async fn times_out_long_sleep() {
        let outcome = Executor::new()
            .execute("sleep 10", Some(Duration::from_millis(200)))
            .await;
        match &outcome {
            Outcome::TimedOut { .. } => {}
            other => panic!("expected TimedOut, got {other:?}"),
        }
        assert!(outcome.last_error().unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn unlaunchable_on_missing_shell_builtin_combo() {
        // `sh -c` itself always launches; exercise the Unlaunchable path by
        // pointing execution at a binary-less command instead would depend
        // on `sh` resolving; this case is covered structurally by spawn()
        // error handling and is exercised indirectly in store-layer tests.
        let outcome = Executor::new().execute("definitely-not-a-real-binary-xyz", None).await;
        match outcome {
            Outcome::Failed { exit_code, .. } => assert_eq!(exit_code, 127),
            other => panic!("expected shell-reported not-found failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_preserves_output_written_before_the_kill() {
        let outcome = Executor::new()
            .execute("echo partial-output; sleep 10", Some(Duration::from_millis(300)))
            .await;
        match outcome {
            Outcome::TimedOut { partial_stdout, .. } => {
                assert!(
                    partial_stdout.contains("partial-output"),
                    "expected the pre-kill echo to survive, got: {partial_stdout:?}"
                );
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let outcome = Executor::new()
            .execute("echo out; echo err 1>&2", None)
            .await;
        match outcome {
            Outcome::Succeeded { stdout, stderr, .. } => {
                assert_eq!(stdout, "out");
                assert_eq!(stderr, "err");
            }
            other => panic!("expected Succeeded, got {other:?}"),
        }
    }
}
