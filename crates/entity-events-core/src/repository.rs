//! Persisted event repository abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{OperationResult, OperationState};
use crate::error::EventError;
use crate::event::{Priority, Properties};

/// Durable record of a queued event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEvent {
    /// Event identifier, shared with the resurrected event.
    pub id: Uuid,
    /// Type tag of the content owner.
    pub owner_type: String,
    /// Identifier of the content owner.
    pub owner_id: Option<Uuid>,
    /// Event type name.
    pub event_type: String,
    /// Inline content, when the payload itself is the durable unit.
    pub content: Option<serde_json::Value>,
    /// Admission priority.
    pub priority: Priority,
    /// Not eligible before this instant.
    pub execute_date: Option<DateTime<Utc>>,
    /// Worker instance that owns the event.
    pub instance_id: String,
    /// Lifecycle state and failure description.
    pub result: OperationResult,
    /// Parent event.
    pub parent_id: Option<Uuid>,
    /// Type name of the parent event.
    pub parent_event_type: Option<String>,
    /// Root of the causal tree.
    pub root_id: Option<Uuid>,
    /// Event properties.
    pub properties: Properties,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
}

impl PersistedEvent {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> OperationState {
        self.result.state
    }

    /// Key identifying logically identical events.
    #[must_use]
    pub fn duplicate_key(&self) -> DuplicateKey {
        DuplicateKey {
            owner_id: self.owner_id,
            owner_type: self.owner_type.clone(),
            event_type: self.event_type.clone(),
            parent_event_type: self.parent_event_type.clone(),
        }
    }

    /// Whether `other` describes the same logical event: same key and equal
    /// properties.
    #[must_use]
    pub fn is_duplicate_of(&self, other: &PersistedEvent) -> bool {
        self.id != other.id
            && self.duplicate_key() == other.duplicate_key()
            && self.properties == other.properties
    }

    /// Whether the event may run at `now`.
    #[must_use]
    pub fn is_executable_at(&self, now: DateTime<Utc>) -> bool {
        self.execute_date.is_none_or(|date| date <= now)
    }
}

/// Grouping key for duplicate detection. Properties are compared separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DuplicateKey {
    /// Owner identifier.
    pub owner_id: Option<Uuid>,
    /// Owner type.
    pub owner_type: String,
    /// Event type name.
    pub event_type: String,
    /// Parent event type name.
    pub parent_event_type: Option<String>,
}

/// Query filter for persisted events. Unset fields do not filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedEventFilter {
    /// Owner type.
    pub owner_type: Option<String>,
    /// Owner identifier.
    pub owner_id: Option<Uuid>,
    /// Event type name.
    pub event_type: Option<String>,
    /// Any of these states. Empty matches all states.
    #[serde(default)]
    pub states: Vec<OperationState>,
    /// Owning instance.
    pub instance_id: Option<String>,
    /// Priority.
    pub priority: Option<Priority>,
    /// Parent event.
    pub parent_id: Option<Uuid>,
    /// Root event.
    pub root_id: Option<Uuid>,
    /// Created at or after.
    pub created_from: Option<DateTime<Utc>>,
    /// Created at or before.
    pub created_till: Option<DateTime<Utc>>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
}

impl PersistedEventFilter {
    /// Filter on a single state.
    #[must_use]
    pub fn in_state(state: OperationState) -> Self {
        Self {
            states: vec![state],
            ..Self::default()
        }
    }

    /// Restricts the filter to an instance.
    #[must_use]
    pub fn for_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Whether `event` satisfies every set criterion. `limit` is not
    /// considered.
    #[must_use]
    pub fn matches(&self, event: &PersistedEvent) -> bool {
        self.owner_type
            .as_ref()
            .is_none_or(|t| *t == event.owner_type)
            && self.owner_id.is_none_or(|id| Some(id) == event.owner_id)
            && self
                .event_type
                .as_ref()
                .is_none_or(|t| *t == event.event_type)
            && (self.states.is_empty() || self.states.contains(&event.state()))
            && self
                .instance_id
                .as_ref()
                .is_none_or(|i| *i == event.instance_id)
            && self.priority.is_none_or(|p| p == event.priority)
            && self.parent_id.is_none_or(|id| Some(id) == event.parent_id)
            && self.root_id.is_none_or(|id| Some(id) == event.root_id)
            && self.created_from.is_none_or(|from| event.created >= from)
            && self.created_till.is_none_or(|till| event.created <= till)
    }
}

/// Repository for persisted events.
///
/// State changes that race between workers go through
/// [`transition`](Self::transition), which only applies when the stored state
/// still equals the expected one.
#[async_trait]
pub trait PersistedEventRepository: Send + Sync {
    /// Insert a new event.
    async fn insert(&self, event: &PersistedEvent) -> Result<(), EventError>;

    /// Load an event by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PersistedEvent>, EventError>;

    /// Load events matching the filter, oldest first.
    async fn find(&self, filter: &PersistedEventFilter)
    -> Result<Vec<PersistedEvent>, EventError>;

    /// Load up to `limit` CREATED events of one instance and priority that are
    /// executable at `now`, oldest first.
    async fn find_to_execute(
        &self,
        instance_id: &str,
        priority: Priority,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PersistedEvent>, EventError>;

    /// Load the other CREATED events of the same instance sharing the
    /// duplicate key of `event` and executable at `now`. Properties are not
    /// compared.
    async fn find_duplicates(
        &self,
        event: &PersistedEvent,
        now: DateTime<Utc>,
    ) -> Result<Vec<PersistedEvent>, EventError>;

    /// Replace the result of an event if its state is still `expected`.
    /// Returns whether the transition was applied.
    async fn transition(
        &self,
        id: Uuid,
        expected: OperationState,
        result: &OperationResult,
    ) -> Result<bool, EventError>;

    /// Replace the priority of an event that is still CREATED. Returns whether
    /// the update was applied.
    async fn update_priority(&self, id: Uuid, priority: Priority) -> Result<bool, EventError>;

    /// Delete an event. Returns whether it existed.
    async fn delete(&self, id: Uuid) -> Result<bool, EventError>;

    /// Delete an event if its state is still `expected`.
    async fn delete_if(&self, id: Uuid, expected: OperationState) -> Result<bool, EventError>;

    /// Atomically move a CREATED event to RUNNING.
    async fn claim(&self, id: Uuid) -> Result<bool, EventError> {
        self.transition(
            id,
            OperationState::Created,
            &OperationResult::new(OperationState::Running),
        )
        .await
    }
}
