use thiserror::Error;

/// Errors that originate at the validation boundary (enqueue, config set).
/// Never touch the store; always safe to report verbatim to a CLI caller.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("command must not be empty")]
    EmptyCommand,
    #[error("timeout_seconds must be positive, got {0}")]
    NonPositiveTimeout(i64),
    #[error("max_retries must be non-negative")]
    NegativeMaxRetries,
    #[error("backoff_base must be at least 1, got {0}")]
    BackoffBaseTooSmall(u32),
    #[error("unknown configuration key `{0}`")]
    UnknownConfigKey(String),
    #[error("invalid value for `{key}`: {reason}")]
    InvalidConfigValue { key: String, reason: String },
}

/// Errors returned by a [`crate::store::Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job `{0}` already exists")]
    AlreadyExists(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("job `{job_id}` is not in a state where `{attempted}` is legal")]
    IllegalTransition { job_id: String, attempted: &'static str },
    #[error("job `{0}` not found")]
    NotFound(String),
    #[error("store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}
