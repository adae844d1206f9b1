use std::path::Path;

use queuectl_core::{JobState, Store};

use crate::error::CliError;

pub async fn run(store: &dyn Store, data_dir: &Path) -> Result<(), CliError> {
    let counts = store.counts_by_state().await?;
    let stop_flag = data_dir.join("STOP");
    let running = !stop_flag.exists();

    println!("worker state: {}", if running { "running" } else { "stopped" });
    for state in JobState::ALL {
        println!("{:<10} {}", state.as_str(), counts.get(&state).copied().unwrap_or(0));
    }
    Ok(())
}
