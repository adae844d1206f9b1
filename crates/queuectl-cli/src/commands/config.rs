use queuectl_core::{Config, ConfigKey};

use crate::error::CliError;

pub async fn get(config: &Config, key: Option<String>) -> Result<(), CliError> {
    match key {
        Some(key) => {
            let key = ConfigKey::parse(&key)?;
            println!("{}", config.get(key).await?);
        }
        None => {
            let mut all: Vec<_> = config.all().await?.into_iter().collect();
            all.sort_by_key(|(key, _)| *key);
            for (key, value) in all {
                println!("{key}={value}");
            }
        }
    }
    Ok(())
}

pub async fn set(config: &Config, key: &str, value: &str) -> Result<(), CliError> {
    config.set(key, value).await?;
    println!("{key}={value}");
    Ok(())
}
