//! Test repositories: in-memory and failing implementations of the
//! repository traits.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entity_events_core::context::{OperationResult, OperationState};
use entity_events_core::error::EventError;
use entity_events_core::event::Priority;
use entity_events_core::repository::{
    PersistedEvent, PersistedEventFilter, PersistedEventRepository,
};
use entity_events_core::state::{EntityState, EntityStateRepository};
use uuid::Uuid;

/// A persisted event repository holding rows in memory. Conditional updates
/// are atomic with respect to each other, like the store's.
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    events: Mutex<Vec<PersistedEvent>>,
}

impl InMemoryEventRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository pre-populated with `events`.
    #[must_use]
    pub fn with_events(events: Vec<PersistedEvent>) -> Self {
        Self {
            events: Mutex::new(events),
        }
    }

    /// Returns a snapshot of all stored rows in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn events(&self) -> Vec<PersistedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Returns a stored row.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn get(&self, id: Uuid) -> Option<PersistedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    fn sorted(mut events: Vec<PersistedEvent>) -> Vec<PersistedEvent> {
        events.sort_by_key(|e| e.created);
        events
    }
}

#[async_trait]
impl PersistedEventRepository for InMemoryEventRepository {
    async fn insert(&self, event: &PersistedEvent) -> Result<(), EventError> {
        let mut events = self.events.lock().unwrap();
        if events.iter().any(|e| e.id == event.id) {
            return Err(EventError::Infrastructure(format!(
                "duplicate event id {}",
                event.id
            )));
        }
        events.push(event.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PersistedEvent>, EventError> {
        Ok(self.get(id))
    }

    async fn find(
        &self,
        filter: &PersistedEventFilter,
    ) -> Result<Vec<PersistedEvent>, EventError> {
        let matching = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        let mut sorted = Self::sorted(matching);
        if let Some(limit) = filter.limit {
            sorted.truncate(limit);
        }
        Ok(sorted)
    }

    async fn find_to_execute(
        &self,
        instance_id: &str,
        priority: Priority,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PersistedEvent>, EventError> {
        let matching = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.state() == OperationState::Created
                    && e.instance_id == instance_id
                    && e.priority == priority
                    && e.is_executable_at(now)
            })
            .cloned()
            .collect();
        let mut sorted = Self::sorted(matching);
        sorted.truncate(limit);
        Ok(sorted)
    }

    async fn find_duplicates(
        &self,
        event: &PersistedEvent,
        now: DateTime<Utc>,
    ) -> Result<Vec<PersistedEvent>, EventError> {
        let key = event.duplicate_key();
        let matching = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.id != event.id
                    && e.state() == OperationState::Created
                    && e.instance_id == event.instance_id
                    && e.is_executable_at(now)
                    && e.duplicate_key() == key
            })
            .cloned()
            .collect();
        Ok(Self::sorted(matching))
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: OperationState,
        result: &OperationResult,
    ) -> Result<bool, EventError> {
        let mut events = self.events.lock().unwrap();
        match events
            .iter_mut()
            .find(|e| e.id == id && e.state() == expected)
        {
            Some(event) => {
                event.result = result.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_priority(&self, id: Uuid, priority: Priority) -> Result<bool, EventError> {
        let mut events = self.events.lock().unwrap();
        match events
            .iter_mut()
            .find(|e| e.id == id && e.state() == OperationState::Created)
        {
            Some(event) => {
                event.priority = priority;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, EventError> {
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| e.id != id);
        Ok(events.len() != before)
    }

    async fn delete_if(&self, id: Uuid, expected: OperationState) -> Result<bool, EventError> {
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| !(e.id == id && e.state() == expected));
        Ok(events.len() != before)
    }
}

/// An event repository that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventRepository;

fn connection_refused() -> EventError {
    EventError::Infrastructure("connection refused".into())
}

#[async_trait]
impl PersistedEventRepository for FailingEventRepository {
    async fn insert(&self, _event: &PersistedEvent) -> Result<(), EventError> {
        Err(connection_refused())
    }

    async fn find_by_id(&self, _id: Uuid) -> Result<Option<PersistedEvent>, EventError> {
        Err(connection_refused())
    }

    async fn find(
        &self,
        _filter: &PersistedEventFilter,
    ) -> Result<Vec<PersistedEvent>, EventError> {
        Err(connection_refused())
    }

    async fn find_to_execute(
        &self,
        _instance_id: &str,
        _priority: Priority,
        _now: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<PersistedEvent>, EventError> {
        Err(connection_refused())
    }

    async fn find_duplicates(
        &self,
        _event: &PersistedEvent,
        _now: DateTime<Utc>,
    ) -> Result<Vec<PersistedEvent>, EventError> {
        Err(connection_refused())
    }

    async fn transition(
        &self,
        _id: Uuid,
        _expected: OperationState,
        _result: &OperationResult,
    ) -> Result<bool, EventError> {
        Err(connection_refused())
    }

    async fn update_priority(&self, _id: Uuid, _priority: Priority) -> Result<bool, EventError> {
        Err(connection_refused())
    }

    async fn delete(&self, _id: Uuid) -> Result<bool, EventError> {
        Err(connection_refused())
    }

    async fn delete_if(&self, _id: Uuid, _expected: OperationState) -> Result<bool, EventError> {
        Err(connection_refused())
    }
}

/// An entity state repository holding states in memory.
#[derive(Debug, Default)]
pub struct InMemoryEntityStateRepository {
    states: Mutex<Vec<EntityState>>,
}

impl InMemoryEntityStateRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all stored states.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn states(&self) -> Vec<EntityState> {
        self.states.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntityStateRepository for InMemoryEntityStateRepository {
    async fn insert(&self, state: &EntityState) -> Result<(), EventError> {
        self.states.lock().unwrap().push(state.clone());
        Ok(())
    }

    async fn find_by_event(&self, event_id: Uuid) -> Result<Vec<EntityState>, EventError> {
        let mut states: Vec<EntityState> = self
            .states
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.event_id == Some(event_id))
            .cloned()
            .collect();
        states.sort_by_key(|s| s.created);
        Ok(states)
    }

    async fn update_by_event(
        &self,
        event_id: Uuid,
        result: &OperationResult,
    ) -> Result<u64, EventError> {
        let mut updated = 0;
        for state in self
            .states
            .lock()
            .unwrap()
            .iter_mut()
            .filter(|s| s.event_id == Some(event_id) && s.result.state != result.state)
        {
            state.result = result.clone();
            updated += 1;
        }
        Ok(updated)
    }
}
