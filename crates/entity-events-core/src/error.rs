//! Engine error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for event processing.
#[derive(Debug, Error)]
pub enum EventError {
    /// No processor is registered under the given name.
    #[error("processor not found: {0}")]
    ProcessorNotFound(String),

    /// A processor with the same name is already registered.
    #[error("processor already registered: {0}")]
    DuplicateProcessor(String),

    /// A processor raised an unexpected error and the chain was aborted.
    #[error("processor {processor} failed: {source}")]
    ChainFault {
        /// Name of the processor that raised the error.
        processor: String,
        /// The error raised by the processor.
        #[source]
        source: Box<EventError>,
    },

    /// The owner of a persisted event no longer exists.
    #[error("content deleted: {owner_type} {owner_id}")]
    ContentDeleted {
        /// Owner type of the missing content.
        owner_type: String,
        /// Owner identifier of the missing content.
        owner_id: Uuid,
    },

    /// No content lookup is registered for an owner type.
    #[error("no content lookup registered for owner type {0}")]
    UnknownOwnerType(String),

    /// A persisted event was not found.
    #[error("event not found: {0}")]
    EventNotFound(Uuid),

    /// A persisted event was not in the state an operation required.
    #[error("event {id} is {actual}, expected {expected}")]
    StateConflict {
        /// The event that had the conflict.
        id: Uuid,
        /// The state the operation required.
        expected: String,
        /// The state found in the store.
        actual: String,
    },

    /// Content or properties could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid input.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl EventError {
    /// Returns `true` when the owner of the event content no longer exists.
    #[must_use]
    pub fn is_content_deleted(&self) -> bool {
        matches!(self, Self::ContentDeleted { .. })
    }
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_fault_message_names_processor_and_cause() {
        let err = EventError::ChainFault {
            processor: "identity-save".to_owned(),
            source: Box::new(EventError::Validation("username is required".to_owned())),
        };

        assert_eq!(
            err.to_string(),
            "processor identity-save failed: validation error: username is required"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_is_content_deleted() {
        let deleted = EventError::ContentDeleted {
            owner_type: "identity".to_owned(),
            owner_id: Uuid::nil(),
        };

        assert!(deleted.is_content_deleted());
        assert!(!EventError::Validation("x".to_owned()).is_content_deleted());
    }
}
