//! Configuration for the sync coordinator.

use habitsync_core::DEFAULT_MAX_RETRIES;
use std::time::Duration;

/// Configuration for sync cycles.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Failed attempts after which an operation is parked in the failed set.
    pub max_retries: u32,
    /// Backoff for rescheduling failed cycles.
    pub retry: RetryConfig,
    /// Run a full sync whenever connectivity comes back.
    pub auto_sync_on_reconnect: bool,
}

impl SyncConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry: RetryConfig::default(),
            auto_sync_on_reconnect: true,
        }
    }

    /// Sets the retry ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets whether coming online triggers a full sync.
    pub fn with_auto_sync_on_reconnect(mut self, enabled: bool) -> Self {
        self.auto_sync_on_reconnect = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff table for deferred retries.
///
/// The delay is picked by the highest `retry_count` in the queue, clamped to
/// the last entry.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delays indexed by retry count.
    pub backoff: Vec<Duration>,
}

impl RetryConfig {
    /// Creates a configuration from an explicit table.
    pub fn new(backoff: Vec<Duration>) -> Self {
        Self { backoff }
    }

    /// Returns the delay before retrying when the most-retried queued
    /// operation has failed `max_retry_count` times.
    pub fn delay_for(&self, max_retry_count: u32) -> Duration {
        let Some(last) = self.backoff.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        let index = (max_retry_count as usize).min(last);
        self.backoff[index]
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_secs(30),
            Duration::from_secs(60),
            Duration::from_secs(120),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_max_retries(5)
            .with_auto_sync_on_reconnect(false);
        assert_eq!(config.max_retries, 5);
        assert!(!config.auto_sync_on_reconnect);
        assert_eq!(SyncConfig::default().max_retries, 3);
    }

    #[test]
    fn backoff_is_clamped() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(0), Duration::from_secs(30));
        assert_eq!(retry.delay_for(1), Duration::from_secs(60));
        assert_eq!(retry.delay_for(2), Duration::from_secs(120));
        assert_eq!(retry.delay_for(7), Duration::from_secs(120));
    }

    #[test]
    fn empty_table_retries_immediately() {
        assert_eq!(RetryConfig::new(Vec::new()).delay_for(2), Duration::ZERO);
    }
}
