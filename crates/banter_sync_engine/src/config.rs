//! Configuration for the sync engine.

/// Tunables for the sync engine.
///
/// Deployments tune these rather than patching constants; the defaults
/// match the platform's production values.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Batch size used when a request does not specify one.
    pub default_batch_size: usize,
    /// Upper bound a caller-supplied batch size is clamped to.
    pub max_batch_size: usize,
    /// Failed attempts before a queued operation is terminally failed.
    pub retry_limit: u32,
    /// Days a synced queue row is retained before garbage collection.
    pub synced_retention_days: i64,
    /// Days without activity before a device is swept inactive.
    pub inactive_threshold_days: i64,
}

impl EngineConfig {
    /// Creates a configuration with production defaults.
    pub fn new() -> Self {
        Self {
            default_batch_size: 100,
            max_batch_size: 500,
            retry_limit: 3,
            synced_retention_days: 7,
            inactive_threshold_days: 90,
        }
    }

    /// Sets the default batch size.
    pub fn with_default_batch_size(mut self, size: usize) -> Self {
        self.default_batch_size = size;
        self
    }

    /// Sets the maximum batch size.
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Sets the retry ceiling for queued operations.
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit;
        self
    }

    /// Sets the retention window for synced queue rows.
    pub fn with_synced_retention_days(mut self, days: i64) -> Self {
        self.synced_retention_days = days;
        self
    }

    /// Sets the inactivity window for the device sweep.
    pub fn with_inactive_threshold_days(mut self, days: i64) -> Self {
        self.inactive_threshold_days = days;
        self
    }

    /// Clamps a caller-supplied batch size into the allowed range.
    pub fn clamp_batch_size(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_batch_size)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
