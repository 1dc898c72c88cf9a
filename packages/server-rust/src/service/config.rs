use std::time::Duration;

use crate::storage::DataStoreConfig;

/// Runtime configuration for the dispatch pipeline and its background work.
///
/// Controls request deadlines, the store sweep interval, and the budgets of
/// the artifact store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Deadline applied to requests that do not carry their own, in milliseconds.
    pub default_timeout_ms: u64,
    /// Interval between data store sweeps in milliseconds.
    pub sweep_interval_ms: u64,
    /// Budgets of the artifact store.
    pub artifact_store: DataStoreConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            sweep_interval_ms: 60_000,
            artifact_store: DataStoreConfig {
                max_length: 10,
                max_size: 10_000_000,
                max_duration: Duration::from_secs(100 * 60),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.default_timeout_ms, 30_000);
        assert_eq!(config.sweep_interval_ms, 60_000);
        assert_eq!(config.artifact_store.max_length, 10);
        assert_eq!(config.artifact_store.total_budget(), 100_000_000);
        assert_eq!(config.artifact_store.max_duration.as_secs(), 6000);
    }
}
