//! Startup recovery sweep.

use std::sync::Arc;

use entity_events_core::context::{OperationResult, OperationState};
use entity_events_core::error::EventError;
use entity_events_core::repository::{PersistedEventFilter, PersistedEventRepository};
use entity_events_core::state::EntityStateRepository;
use tracing::{info, instrument, warn};

/// Reason recorded on events and states canceled by the sweep.
pub const INTERRUPTED_REASON: &str = "event was running when its instance stopped";

/// Outcome of a recovery sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Events moved from `RUNNING` to `CANCELED`.
    pub canceled_events: usize,
    /// Entity states canceled along with them.
    pub canceled_states: u64,
}

/// Cancels the events an instance left `RUNNING` when it stopped.
pub struct RecoverySweep {
    events: Arc<dyn PersistedEventRepository>,
    states: Arc<dyn EntityStateRepository>,
    instance_id: String,
}

impl std::fmt::Debug for RecoverySweep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoverySweep")
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

impl RecoverySweep {
    /// Creates a sweep for the rows of `instance_id`.
    pub fn new(
        events: Arc<dyn PersistedEventRepository>,
        states: Arc<dyn EntityStateRepository>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            events,
            states,
            instance_id: instance_id.into(),
        }
    }

    /// Moves every `RUNNING` event of this instance, and the states linked to
    /// it, to `CANCELED`. Running the sweep again changes nothing.
    ///
    /// # Errors
    ///
    /// Returns a repository error.
    #[instrument(skip(self), fields(instance_id = %self.instance_id))]
    pub async fn init(&self) -> Result<RecoveryReport, EventError> {
        let filter = PersistedEventFilter::in_state(OperationState::Running)
            .for_instance(&self.instance_id);
        let running = self.events.find(&filter).await?;

        let canceled = OperationResult::canceled(INTERRUPTED_REASON);
        let mut report = RecoveryReport::default();
        for event in running {
            if !self
                .events
                .transition(event.id, OperationState::Running, &canceled)
                .await?
            {
                warn!(event_id = %event.id, "event left RUNNING before it could be canceled");
                continue;
            }
            report.canceled_events += 1;
            report.canceled_states += self.states.update_by_event(event.id, &canceled).await?;
        }

        info!(
            canceled_events = report.canceled_events,
            canceled_states = report.canceled_states,
            "recovery sweep finished"
        );
        Ok(report)
    }
}
