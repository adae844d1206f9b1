use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{StoreError, ValidationError};
use crate::store::Store;

/// The closed set of configuration keys recognised by the store's flat
/// `config` table. Defaults live here in code; the store only ever holds
/// overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    MaxRetries,
    BackoffBase,
    WorkerPollIntervalMs,
    JobTimeoutSeconds,
    LogLevel,
    ReapThresholdSeconds,
    BackoffCeilingSeconds,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 7] = [
        ConfigKey::MaxRetries,
        ConfigKey::BackoffBase,
        ConfigKey::WorkerPollIntervalMs,
        ConfigKey::JobTimeoutSeconds,
        ConfigKey::LogLevel,
        ConfigKey::ReapThresholdSeconds,
        ConfigKey::BackoffCeilingSeconds,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::MaxRetries => "max_retries",
            ConfigKey::BackoffBase => "backoff_base",
            ConfigKey::WorkerPollIntervalMs => "worker_poll_interval_ms",
            ConfigKey::JobTimeoutSeconds => "job_timeout_seconds",
            ConfigKey::LogLevel => "log_level",
            ConfigKey::ReapThresholdSeconds => "reap_threshold_seconds",
            ConfigKey::BackoffCeilingSeconds => "backoff_ceiling_seconds",
        }
    }

    pub fn parse(key: &str) -> Result<ConfigKey, ValidationError> {
        ConfigKey::ALL
            .into_iter()
            .find(|k| k.as_str() == key)
            .ok_or_else(|| ValidationError::UnknownConfigKey(key.to_string()))
    }

    pub fn default_value(&self) -> &'static str {
        match self {
            ConfigKey::MaxRetries => "3",
            ConfigKey::BackoffBase => "2",
            ConfigKey::WorkerPollIntervalMs => "100",
            ConfigKey::JobTimeoutSeconds => "3600",
            ConfigKey::LogLevel => "info",
            // 2x the default job timeout, per the store's reap contract.
            ConfigKey::ReapThresholdSeconds => "7200",
            ConfigKey::BackoffCeilingSeconds => "3600",
        }
    }

    /// Validate and canonicalise a proposed value for this key.
    pub fn validate(&self, value: &str) -> Result<String, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidConfigValue {
            key: self.as_str().to_string(),
            reason: reason.to_string(),
        };

        match self {
            ConfigKey::MaxRetries => {
                let parsed: i64 = value.parse().map_err(|_| invalid("must be an integer"))?;
                if parsed < 0 {
                    return Err(invalid("must be non-negative"));
                }
                Ok(parsed.to_string())
            }
            ConfigKey::BackoffBase => {
                let parsed: i64 = value.parse().map_err(|_| invalid("must be an integer"))?;
                if parsed < 1 {
                    return Err(invalid("must be at least 1"));
                }
                Ok(parsed.to_string())
            }
            ConfigKey::WorkerPollIntervalMs | ConfigKey::JobTimeoutSeconds
            | ConfigKey::ReapThresholdSeconds | ConfigKey::BackoffCeilingSeconds => {
                let parsed: i64 = value.parse().map_err(|_| invalid("must be an integer"))?;
                if parsed <= 0 {
                    return Err(invalid("must be positive"));
                }
                Ok(parsed.to_string())
            }
            ConfigKey::LogLevel => {
                let lowered = value.to_ascii_lowercase();
                if !["trace", "debug", "info", "warn", "error"].contains(&lowered.as_str()) {
                    return Err(invalid("must be one of trace, debug, info, warn, error"));
                }
                Ok(lowered)
            }
        }
    }
}

/// Typed, validated view over the store's raw key/value `config` table.
#[derive(Clone)]
pub struct Config {
    store: Arc<dyn Store>,
}

impl Config {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get(&self, key: ConfigKey) -> Result<String, StoreError> {
        Ok(self
            .store
            .config_get(key.as_str())
            .await?
            .unwrap_or_else(|| key.default_value().to_string()))
    }

    pub async fn get_u64(&self, key: ConfigKey) -> Result<u64, StoreError> {
        let raw = self.get(key).await?;
        Ok(raw.parse().unwrap_or_else(|_| {
            key.default_value()
                .parse()
                .expect("compiled-in defaults are always valid")
        }))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = ConfigKey::parse(key)?;
        let canonical = key.validate(value)?;
        self.store.config_set(key.as_str(), &canonical).await
    }

    /// Every recognised key with its effective value (override or default).
    pub async fn all(&self) -> Result<HashMap<&'static str, String>, StoreError> {
        let overrides = self.store.config_all().await?;
        let mut out = HashMap::new();
        for key in ConfigKey::ALL {
            let value = overrides
                .get(key.as_str())
                .cloned()
                .unwrap_or_else(|| key.default_value().to_string());
            out.insert(key.as_str(), value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_max_retries() {
        assert!(ConfigKey::MaxRetries.validate("-1").is_err());
        assert!(ConfigKey::MaxRetries.validate("0").is_ok());
    }

    #[test]
    fn rejects_backoff_base_below_one() {
        assert!(ConfigKey::BackoffBase.validate("0").is_err());
        assert!(ConfigKey::BackoffBase.validate("1").is_ok());
    }

    #[test]
    fn log_level_is_case_insensitive_and_closed() {
        assert_eq!(ConfigKey::LogLevel.validate("WARN").unwrap(), "warn");
        assert!(ConfigKey::LogLevel.validate("verbose").is_err());
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(ConfigKey::parse("not-a-key").is_err());
    }
}
