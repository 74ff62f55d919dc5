//! Engine configuration.

use std::time::Duration;

/// Instance identifier used when none is configured.
pub const DEFAULT_INSTANCE_ID: &str = "primary";

/// Maximum number of events admitted per batch by default.
pub const DEFAULT_BATCH_SIZE: usize = 15;

/// Delay between two admission rounds of a worker by default.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Runtime settings of one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Identifier of this instance. Persisted events are owned by, admitted
    /// by, and recovered by the instance whose identifier they carry.
    pub instance_id: String,
    /// Maximum number of events admitted per batch.
    pub batch_size: usize,
    /// Delay between two admission rounds of a worker.
    pub poll_interval: Duration,
    /// Defer non-immediate child events to the queue. When `false` every
    /// child runs inline.
    pub asynchronous: bool,
    /// Keep rows of executed events instead of deleting them.
    pub retain_executed: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instance_id: DEFAULT_INSTANCE_ID.to_owned(),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            asynchronous: true,
            retain_executed: false,
        }
    }
}

impl EngineConfig {
    /// Default configuration for the given instance.
    #[must_use]
    pub fn for_instance(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            ..Self::default()
        }
    }
}
