//! Rebuilds live events from persisted rows.

use std::collections::HashMap;
use std::sync::Arc;

use entity_events_core::content::{Content, ContentLookup};
use entity_events_core::error::EventError;
use entity_events_core::event::{Event, EventType};
use entity_events_core::repository::PersistedEvent;
use tracing::debug;

/// Converts persisted rows back into events, looking up referenced content
/// by owner type.
pub struct Resurrector<C: Content> {
    lookups: HashMap<String, Arc<dyn ContentLookup<C>>>,
}

impl<C: Content> Default for Resurrector<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Content> std::fmt::Debug for Resurrector<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut owner_types: Vec<&String> = self.lookups.keys().collect();
        owner_types.sort();
        f.debug_struct("Resurrector")
            .field("owner_types", &owner_types)
            .finish()
    }
}

impl<C: Content> Resurrector<C> {
    /// Creates a resurrector without lookups; only inline content resolves.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lookups: HashMap::new(),
        }
    }

    /// Registers the lookup used for rows of `owner_type`.
    #[must_use]
    pub fn with_lookup(
        mut self,
        owner_type: impl Into<String>,
        lookup: Arc<dyn ContentLookup<C>>,
    ) -> Self {
        self.lookups.insert(owner_type.into(), lookup);
        self
    }

    /// Rebuilds the event stored in `row`.
    ///
    /// Inline content is decoded and used as both content and original
    /// source. Otherwise the current content is loaded through the lookup
    /// registered for the row's owner type. The event keeps the row's id,
    /// priority, execute date, linkage and properties.
    ///
    /// # Errors
    ///
    /// - `EventError::ContentDeleted` if the owner no longer exists
    /// - `EventError::UnknownOwnerType` if no lookup handles the owner type
    /// - `EventError::Validation` if the row has neither content nor owner
    /// - `EventError::Serialization` if inline content cannot be decoded
    pub async fn to_event(&self, row: &PersistedEvent) -> Result<Event<C>, EventError> {
        let content: C = match &row.content {
            Some(value) => serde_json::from_value(value.clone())?,
            None => {
                let owner_id = row.owner_id.ok_or_else(|| {
                    EventError::Validation(format!(
                        "event {} has neither inline content nor an owner",
                        row.id
                    ))
                })?;
                let lookup = self
                    .lookups
                    .get(&row.owner_type)
                    .ok_or_else(|| EventError::UnknownOwnerType(row.owner_type.clone()))?;
                lookup
                    .lookup(owner_id)
                    .await?
                    .ok_or_else(|| EventError::ContentDeleted {
                        owner_type: row.owner_type.clone(),
                        owner_id,
                    })?
            }
        };

        let mut event = Event::new(EventType::new(row.event_type.clone()), content);
        event.id = row.id;
        event.priority = Some(row.priority);
        event.execute_date = row.execute_date;
        event.parent_id = row.parent_id;
        event.parent_event_type = row.parent_event_type.clone().map(EventType::new);
        event.root_id = row.root_id;
        event.properties = row.properties.clone();

        debug!(event_id = %event.id, event_type = %event.event_type, "event resurrected");
        Ok(event)
    }
}
