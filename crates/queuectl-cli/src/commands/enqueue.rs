use queuectl_core::{JobSpec, Store};

use crate::error::CliError;

pub async fn run(
    store: &dyn Store,
    command: String,
    id: Option<String>,
    max_retries: Option<u32>,
    backoff_base: Option<u32>,
    timeout_seconds: Option<u64>,
) -> Result<(), CliError> {
    let id = store
        .enqueue(JobSpec {
            id,
            command,
            max_retries,
            backoff_base,
            timeout_seconds,
        })
        .await?;
    println!("{id}");
    Ok(())
}
