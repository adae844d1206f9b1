use queuectl_core::{StoreError, ValidationError};

/// Maps a command's failure onto the exit codes documented on the CLI
/// surface. Validation failures are reported to the user directly;
/// everything else gets a generic line plus a pointer at the log output.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation(_) => 2,
            CliError::Store(_) => 3,
            CliError::Io(_) => 1,
            CliError::Other(_) => 1,
        }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Invalid(validation) => CliError::Validation(validation),
            other => CliError::Store(other.into()),
        }
    }
}
