use chrono::Utc;
use queuectl_core::{JobState, Store};

use crate::error::CliError;

pub async fn list(store: &dyn Store, limit: i64) -> Result<(), CliError> {
    let jobs = store.list(Some(JobState::Dead), limit).await?;
    for job in jobs {
        println!(
            "{}\t{}\t{}\t{}",
            job.id,
            job.attempts,
            job.last_error.as_deref().unwrap_or(""),
            job.command,
        );
    }
    Ok(())
}

pub async fn retry(store: &dyn Store, id: &str) -> Result<(), CliError> {
    let promoted = store.promote_dead(id, Utc::now()).await?;
    if promoted {
        println!("{id} requeued");
    } else {
        return Err(CliError::Other(anyhow::anyhow!(
            "job `{id}` is not in the dead-letter queue"
        )));
    }
    Ok(())
}

pub async fn purge(store: &dyn Store, older_than_days: i64) -> Result<(), CliError> {
    let cutoff = Utc::now() - chrono::Duration::days(older_than_days);
    let purged = store.purge_dead(cutoff).await?;
    println!("purged {purged} job(s)");
    Ok(())
}
