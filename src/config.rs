use std::time::Duration;

use thiserror::Error;

use crate::engine::RetryPolicy;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);
pub const DEFAULT_INITIAL_RETRY_DELAY: Duration = Duration::from_millis(10);
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_millis(600);
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_BATCH: usize = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: expected a non-negative integer, got '{value}'")]
    NotANumber { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

/// Runtime settings for a [`Ledger`](crate::Ledger).
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Cadence of the retry scheduler.
    pub tick_interval: Duration,
    /// Upper bound on entries replayed per tick.
    pub retry_batch: usize,
    pub retry: RetryPolicy,
    /// Spawn the scheduler task on construction. When off, retries only
    /// advance through [`Ledger::retry_tick`](crate::Ledger::retry_tick).
    pub background_retries: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            retry_batch: DEFAULT_RETRY_BATCH,
            retry: RetryPolicy::new(
                DEFAULT_MAX_RETRY_ATTEMPTS,
                DEFAULT_INITIAL_RETRY_DELAY,
                DEFAULT_MAX_RETRY_DELAY,
            ),
            background_retries: true,
        }
    }
}

impl LedgerConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_retry_batch(mut self, batch: usize) -> Self {
        self.retry_batch = batch.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_background_retries(mut self, enabled: bool) -> Self {
        self.background_retries = enabled;
        self
    }

    /// Defaults overridden by `LEDGER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &'static str| -> Result<Option<u64>, ConfigError> {
            let Some(value) = lookup(key) else {
                return Ok(None);
            };
            let parsed = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::NotANumber { key, value })?;
            if parsed == 0 {
                return Err(ConfigError::Zero { key });
            }
            Ok(Some(parsed))
        };

        let mut config = Self::default();
        if let Some(ms) = read("LEDGER_TICK_MS")? {
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(batch) = read("LEDGER_RETRY_BATCH")? {
            config.retry_batch = batch as usize;
        }

        let attempts = read("LEDGER_RETRY_ATTEMPTS")?
            .map(|n| n as u32)
            .unwrap_or(config.retry.max_attempts);
        let initial = read("LEDGER_RETRY_INITIAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(config.retry.initial_delay);
        let max = read("LEDGER_RETRY_MAX_MS")?
            .map(Duration::from_millis)
            .unwrap_or(config.retry.max_delay);
        config.retry = RetryPolicy::new(attempts, initial, max);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.tick_interval, Duration::from_millis(10));
        assert_eq!(config.retry_batch, 1);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(10));
        assert_eq!(config.retry.max_delay, Duration::from_millis(600));
        assert!(config.background_retries);
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.tick_interval, DEFAULT_TICK_INTERVAL);
        assert_eq!(config.retry.max_attempts, DEFAULT_MAX_RETRY_ATTEMPTS);
    }

    #[test]
    fn environment_overrides() {
        let config = LedgerConfig::from_lookup(lookup(&[
            ("LEDGER_TICK_MS", "20"),
            ("LEDGER_RETRY_BATCH", "4"),
            ("LEDGER_RETRY_ATTEMPTS", "3"),
            ("LEDGER_RETRY_INITIAL_MS", "5"),
            ("LEDGER_RETRY_MAX_MS", " 60 "),
        ]))
        .unwrap();
        assert_eq!(config.tick_interval, Duration::from_millis(20));
        assert_eq!(config.retry_batch, 4);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(5));
        assert_eq!(config.retry.max_delay, Duration::from_millis(60));
    }

    #[test]
    fn rejects_garbage_and_zero() {
        let err = LedgerConfig::from_lookup(lookup(&[("LEDGER_TICK_MS", "fast")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NotANumber {
                key: "LEDGER_TICK_MS",
                ..
            }
        ));

        let err = LedgerConfig::from_lookup(lookup(&[("LEDGER_RETRY_BATCH", "0")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Zero {
                key: "LEDGER_RETRY_BATCH"
            }
        );
    }

    #[test]
    fn retry_batch_is_at_least_one() {
        let config = LedgerConfig::default().with_retry_batch(0);
        assert_eq!(config.retry_batch, 1);
    }
}
