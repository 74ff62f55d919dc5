//! Entity Events Store: `PostgreSQL` adapters for the repository traits.

pub mod pg_entity_state_repository;
pub mod pg_persisted_event_repository;
pub mod schema;

pub use pg_entity_state_repository::PgEntityStateRepository;
pub use pg_persisted_event_repository::PgPersistedEventRepository;

use entity_events_core::error::EventError;

pub(crate) fn infrastructure(e: sqlx::Error) -> EventError {
    EventError::Infrastructure(e.to_string())
}
