//! Side-effect state records.
//!
//! Collaborators record the outcome of work done on behalf of an event (for
//! example a provisioning attempt) as an [`EntityState`] linked to the event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::OperationResult;
use crate::error::EventError;

/// State record owned by a collaborator and linked to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// State identifier.
    pub id: Uuid,
    /// Owner type the state describes.
    pub owner_type: String,
    /// Owner the state describes.
    pub owner_id: Option<Uuid>,
    /// Event the state was produced for.
    pub event_id: Option<Uuid>,
    /// Instance that produced the state.
    pub instance_id: String,
    /// Recorded result.
    pub result: OperationResult,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
}

/// Repository for entity states.
#[async_trait]
pub trait EntityStateRepository: Send + Sync {
    /// Insert a new state.
    async fn insert(&self, state: &EntityState) -> Result<(), EventError>;

    /// Load the states linked to an event, oldest first.
    async fn find_by_event(&self, event_id: Uuid) -> Result<Vec<EntityState>, EventError>;

    /// Replace the result of every state linked to the event that is not
    /// already in the result's state. Returns the number of updated states.
    async fn update_by_event(
        &self,
        event_id: Uuid,
        result: &OperationResult,
    ) -> Result<u64, EventError>;
}
