//! Event content abstractions.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::EventError;

/// Payload carried by an event.
///
/// The engine never looks inside the content; it only needs the owner
/// reference to persist and re-fetch it, and type tags to select processors.
pub trait Content:
    Clone + Send + Sync + std::fmt::Debug + Serialize + DeserializeOwned + 'static
{
    /// Type tag of the owner (the domain object this content is or derives
    /// from).
    fn owner_type(&self) -> &str;

    /// Identifier of the owner, if the content is backed by a stored owner.
    fn owner_id(&self) -> Option<Uuid>;

    /// Content type tags this content is assignable to, most specific first.
    /// Processors declaring any of these tags accept the content.
    fn content_types(&self) -> Vec<&str> {
        vec![self.owner_type()]
    }

    /// Whether the content itself is the durable unit stored with a queued
    /// event. Content that can be re-fetched by owner is stored by reference.
    fn persist_inline(&self) -> bool {
        self.owner_id().is_none()
    }
}

/// Re-fetches the current content of an owner.
#[async_trait]
pub trait ContentLookup<C: Content>: Send + Sync {
    /// Returns the current content of the owner, or `None` when it no longer
    /// exists.
    async fn lookup(&self, owner_id: Uuid) -> Result<Option<C>, EventError>;
}
