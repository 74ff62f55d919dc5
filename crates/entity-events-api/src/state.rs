//! Shared application state.

use std::sync::Arc;

use entity_events_core::clock::Clock;
use entity_events_core::repository::PersistedEventRepository;
use entity_events_core::state::EntityStateRepository;
use entity_events_engine::sink::PersistenceSink;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Source of request timestamps.
    pub clock: Arc<dyn Clock>,
    /// Persisted event queue.
    pub event_repository: Arc<dyn PersistedEventRepository>,
    /// Entity states linked to events.
    pub state_repository: Arc<dyn EntityStateRepository>,
    /// Writes published events for this instance.
    pub sink: Arc<PersistenceSink>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state for the instance `instance_id`.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        event_repository: Arc<dyn PersistedEventRepository>,
        state_repository: Arc<dyn EntityStateRepository>,
        instance_id: impl Into<String>,
    ) -> Self {
        let sink = Arc::new(PersistenceSink::new(
            Arc::clone(&event_repository),
            Arc::clone(&clock),
            instance_id,
        ));
        Self {
            clock,
            event_repository,
            state_repository,
            sink,
        }
    }
}
