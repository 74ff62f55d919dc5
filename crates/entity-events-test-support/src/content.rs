//! Test content: a minimal `Content` type and a map-backed lookup.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use entity_events_core::content::{Content, ContentLookup};
use entity_events_core::error::EventError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content type tag every `TestContent` is assignable to.
pub const ENTITY_CONTENT_TYPE: &str = "entity";

/// Test payload. Processors in tests append to `value` so that the order of
/// mutations is visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestContent {
    /// Owner identifier. `None` for detached payloads.
    pub id: Option<Uuid>,
    /// Owner type tag.
    pub owner_type: String,
    /// Mutable value.
    pub value: String,
}

impl TestContent {
    /// An identity owned payload.
    pub fn identity(value: impl Into<String>) -> Self {
        Self::owned("identity", value)
    }

    /// A role owned payload.
    pub fn role(value: impl Into<String>) -> Self {
        Self::owned("role", value)
    }

    /// A payload owned by a new owner of the given type.
    pub fn owned(owner_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            owner_type: owner_type.into(),
            value: value.into(),
        }
    }

    /// A payload without an owner; it is persisted inline.
    pub fn detached(owner_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: None,
            owner_type: owner_type.into(),
            value: value.into(),
        }
    }
}

impl Content for TestContent {
    fn owner_type(&self) -> &str {
        &self.owner_type
    }

    fn owner_id(&self) -> Option<Uuid> {
        self.id
    }

    fn content_types(&self) -> Vec<&str> {
        vec![self.owner_type.as_str(), ENTITY_CONTENT_TYPE]
    }
}

/// A content lookup backed by an in-memory map.
#[derive(Debug, Default)]
pub struct MapContentLookup {
    contents: Mutex<HashMap<Uuid, TestContent>>,
}

impl MapContentLookup {
    /// Create an empty lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store content under its owner id.
    ///
    /// # Panics
    ///
    /// Panics if the content has no owner id or the mutex is poisoned.
    pub fn insert(&self, content: TestContent) {
        let id = content.id.expect("MapContentLookup requires owned content");
        self.contents.lock().unwrap().insert(id, content);
    }

    /// Remove an owner, simulating its deletion.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn remove(&self, owner_id: Uuid) {
        self.contents.lock().unwrap().remove(&owner_id);
    }
}

#[async_trait]
impl ContentLookup<TestContent> for MapContentLookup {
    async fn lookup(&self, owner_id: Uuid) -> Result<Option<TestContent>, EventError> {
        Ok(self.contents.lock().unwrap().get(&owner_id).cloned())
    }
}
