//! Persistence sink.
//!
//! The sink owns every row of the persisted event queue written by this
//! instance: it turns deferred events into `CREATED` rows, claims rows for
//! execution and records their terminal state.

use std::sync::Arc;

use entity_events_core::clock::Clock;
use entity_events_core::content::Content;
use entity_events_core::context::{OperationResult, OperationState};
use entity_events_core::error::EventError;
use entity_events_core::event::{Event, Priority};
use entity_events_core::repository::{PersistedEvent, PersistedEventRepository};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Writes and finalizes persisted events of one instance.
pub struct PersistenceSink {
    repository: Arc<dyn PersistedEventRepository>,
    clock: Arc<dyn Clock>,
    instance_id: String,
}

impl std::fmt::Debug for PersistenceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceSink")
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

impl PersistenceSink {
    /// Creates a sink writing rows for `instance_id`.
    pub fn new(
        repository: Arc<dyn PersistedEventRepository>,
        clock: Arc<dyn Clock>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            clock,
            instance_id: instance_id.into(),
        }
    }

    /// Instance the sink queues rows for.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Queue the sink writes to.
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn PersistedEventRepository> {
        &self.repository
    }

    /// Builds the `CREATED` row for `event`, owned by this instance.
    ///
    /// Content is stored inline only when it is its own durable unit;
    /// otherwise the row references the owner and the content is looked up
    /// again on resurrection.
    ///
    /// # Errors
    ///
    /// Returns `EventError::Serialization` if inline content cannot be
    /// serialized.
    pub fn to_persisted<C: Content>(&self, event: &Event<C>) -> Result<PersistedEvent, EventError> {
        let content = if event.content.persist_inline() {
            Some(serde_json::to_value(&event.content)?)
        } else {
            None
        };

        Ok(PersistedEvent {
            id: event.id,
            owner_type: event.content.owner_type().to_owned(),
            owner_id: event.content.owner_id(),
            event_type: event.event_type.name().to_owned(),
            content,
            priority: event.effective_priority(),
            execute_date: event.execute_date,
            instance_id: self.instance_id.clone(),
            result: OperationResult::new(OperationState::Created),
            parent_id: event.parent_id,
            parent_event_type: event
                .parent_event_type
                .as_ref()
                .map(|t| t.name().to_owned()),
            root_id: event.root_id,
            properties: event.properties.clone(),
            created: self.clock.now(),
        })
    }

    /// Persists `event` as a `CREATED` row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be built or stored.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn persist<C: Content>(
        &self,
        event: &Event<C>,
    ) -> Result<PersistedEvent, EventError> {
        let row = self.to_persisted(event)?;
        self.publish(row).await
    }

    /// Enqueues a row for asynchronous admission.
    ///
    /// The row is reset to `CREATED`; rows without an instance are assigned
    /// to this one.
    ///
    /// # Errors
    ///
    /// Returns `EventError::Validation` for `IMMEDIATE` rows, which are
    /// never queued, or a repository error.
    pub async fn publish(&self, mut row: PersistedEvent) -> Result<PersistedEvent, EventError> {
        if row.priority == Priority::Immediate {
            return Err(EventError::Validation(format!(
                "event {} has IMMEDIATE priority and cannot be queued",
                row.id
            )));
        }
        if row.instance_id.is_empty() {
            row.instance_id.clone_from(&self.instance_id);
        }
        row.result = OperationResult::new(OperationState::Created);

        self.repository.insert(&row).await?;
        info!(
            event_id = %row.id,
            event_type = %row.event_type,
            priority = %row.priority,
            instance_id = %row.instance_id,
            "event queued"
        );
        Ok(row)
    }

    /// Claims a `CREATED` row for execution. Returns `false` when another
    /// worker got there first or the row no longer exists.
    ///
    /// # Errors
    ///
    /// Returns a repository error.
    pub async fn claim(&self, id: Uuid) -> Result<bool, EventError> {
        let claimed = self.repository.claim(id).await?;
        if !claimed {
            debug!(event_id = %id, "event already claimed");
        }
        Ok(claimed)
    }

    /// Moves a `RUNNING` row to `result`.
    ///
    /// # Errors
    ///
    /// Returns a repository error.
    pub async fn finish(&self, id: Uuid, result: OperationResult) -> Result<bool, EventError> {
        let state = result.state;
        let moved = self
            .repository
            .transition(id, OperationState::Running, &result)
            .await?;
        if moved {
            info!(event_id = %id, state = %state, "event finished");
        } else {
            warn!(event_id = %id, state = %state, "event was not running");
        }
        Ok(moved)
    }

    /// Marks a `RUNNING` row `EXECUTED` and deletes it unless `retain`.
    ///
    /// # Errors
    ///
    /// Returns a repository error.
    pub async fn complete(&self, id: Uuid, retain: bool) -> Result<bool, EventError> {
        let moved = self.finish(id, OperationResult::executed()).await?;
        if moved && !retain {
            self.repository.delete(id).await?;
            debug!(event_id = %id, "executed event removed");
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use entity_events_core::event::CoreEventType;
    use entity_events_test_support::{FixedClock, InMemoryEventRepository, TestContent};

    fn sink(repository: Arc<InMemoryEventRepository>) -> PersistenceSink {
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        PersistenceSink::new(repository, Arc::new(clock), "node-a")
    }

    #[tokio::test]
    async fn test_persist_references_owned_content() {
        // Arrange
        let repository = Arc::new(InMemoryEventRepository::new());
        let sink = sink(Arc::clone(&repository));
        let content = TestContent::identity("alice");
        let owner_id = content.id;
        let parent = Event::new(CoreEventType::Update, TestContent::identity("root"));
        let mut event = Event::new(CoreEventType::Notify, content)
            .with_priority(Priority::High)
            .with_property("mail", serde_json::json!("welcome"));
        event.link_to_parent(&parent);

        // Act
        let row = sink.persist(&event).await.unwrap();

        // Assert
        assert_eq!(row.id, event.id);
        assert_eq!(row.owner_type, "identity");
        assert_eq!(row.owner_id, owner_id);
        assert!(row.content.is_none());
        assert_eq!(row.priority, Priority::High);
        assert_eq!(row.instance_id, "node-a");
        assert_eq!(row.state(), OperationState::Created);
        assert_eq!(row.parent_id, Some(parent.id));
        assert_eq!(row.parent_event_type.as_deref(), Some("UPDATE"));
        assert_eq!(row.root_id, Some(parent.id));
        assert_eq!(row.created, Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        assert_eq!(repository.get(event.id), Some(row));
    }

    #[tokio::test]
    async fn test_persist_stores_detached_content_inline() {
        let repository = Arc::new(InMemoryEventRepository::new());
        let sink = sink(Arc::clone(&repository));
        let event = Event::new(CoreEventType::Create, TestContent::detached("mail", "hello"));

        let row = sink.persist(&event).await.unwrap();

        let stored: TestContent = serde_json::from_value(row.content.unwrap()).unwrap();
        assert_eq!(stored, event.content);
    }

    #[tokio::test]
    async fn test_publish_rejects_immediate_rows() {
        let repository = Arc::new(InMemoryEventRepository::new());
        let sink = sink(Arc::clone(&repository));
        let event = Event::new(CoreEventType::Create, TestContent::identity("x"))
            .with_priority(Priority::Immediate);
        let row = sink.to_persisted(&event).unwrap();

        let result = sink.publish(row).await;

        assert!(matches!(result, Err(EventError::Validation(_))));
        assert!(repository.events().is_empty());
    }

    #[tokio::test]
    async fn test_publish_assigns_local_instance_to_unowned_rows() {
        let repository = Arc::new(InMemoryEventRepository::new());
        let sink = sink(Arc::clone(&repository));
        let mut row = sink
            .to_persisted(&Event::new(CoreEventType::Create, TestContent::identity("x")))
            .unwrap();
        row.instance_id = String::new();
        row.result = OperationResult::executed();

        let published = sink.publish(row).await.unwrap();

        assert_eq!(published.instance_id, "node-a");
        assert_eq!(published.state(), OperationState::Created);
    }

    #[tokio::test]
    async fn test_claim_then_complete_deletes_row() {
        // Arrange
        let repository = Arc::new(InMemoryEventRepository::new());
        let sink = sink(Arc::clone(&repository));
        let row = sink
            .persist(&Event::new(CoreEventType::Create, TestContent::identity("x")))
            .await
            .unwrap();

        // Act
        let first = sink.claim(row.id).await.unwrap();
        let second = sink.claim(row.id).await.unwrap();
        let completed = sink.complete(row.id, false).await.unwrap();

        // Assert
        assert!(first);
        assert!(!second);
        assert!(completed);
        assert!(repository.get(row.id).is_none());
    }

    #[tokio::test]
    async fn test_complete_with_retain_keeps_executed_row() {
        let repository = Arc::new(InMemoryEventRepository::new());
        let sink = sink(Arc::clone(&repository));
        let row = sink
            .persist(&Event::new(CoreEventType::Create, TestContent::identity("x")))
            .await
            .unwrap();
        sink.claim(row.id).await.unwrap();

        sink.complete(row.id, true).await.unwrap();

        assert_eq!(
            repository.get(row.id).unwrap().state(),
            OperationState::Executed
        );
    }

    #[tokio::test]
    async fn test_finish_requires_running_row() {
        let repository = Arc::new(InMemoryEventRepository::new());
        let sink = sink(Arc::clone(&repository));
        let row = sink
            .persist(&Event::new(CoreEventType::Create, TestContent::identity("x")))
            .await
            .unwrap();

        let moved = sink
            .finish(row.id, OperationResult::exception("boom"))
            .await
            .unwrap();

        assert!(!moved);
        assert_eq!(
            repository.get(row.id).unwrap().state(),
            OperationState::Created
        );
    }
}
