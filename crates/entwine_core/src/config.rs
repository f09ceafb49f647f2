//! Store configuration.

use std::time::Duration;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the database file if it doesn't exist.
    pub create_if_missing: bool,

    /// How long the batch coordinator waits for additional callers before
    /// opening the shared write transaction.
    pub batch_window: Duration,

    /// Maximum number of callers coalesced into one batch.
    pub batch_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            batch_window: Duration::from_millis(2),
            batch_limit: 64,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database file if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the batch accumulation window.
    #[must_use]
    pub const fn batch_window(mut self, window: Duration) -> Self {
        self.batch_window = window;
        self
    }

    /// Sets the batch size cap.
    #[must_use]
    pub const fn batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    pub(crate) fn normalize(mut self) -> Self {
        if self.batch_limit == 0 {
            self.batch_limit = 1;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(config.batch_limit > 0);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .create_if_missing(false)
            .batch_window(Duration::from_millis(5))
            .batch_limit(8);

        assert!(!config.create_if_missing);
        assert_eq!(config.batch_window, Duration::from_millis(5));
        assert_eq!(config.batch_limit, 8);
    }

    #[test]
    fn zero_batch_limit_normalizes() {
        let config = Config::new().batch_limit(0).normalize();
        assert_eq!(config.batch_limit, 1);
    }
}
