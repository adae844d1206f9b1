use std::str::FromStr;

use queuectl_core::{JobState, Store};

use crate::error::CliError;

pub async fn run(store: &dyn Store, state: Option<String>, limit: i64) -> Result<(), CliError> {
    let filter = state
        .map(|s| {
            JobState::from_str(&s)
                .map_err(|e| CliError::Other(anyhow::anyhow!("invalid --state `{s}`: {e}")))
        })
        .transpose()?;

    let jobs = store.list(filter, limit).await?;
    for job in jobs {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            job.id,
            job.state,
            job.attempts,
            job.max_retries,
            job.run_at.to_rfc3339(),
            job.command,
        );
    }
    Ok(())
}
