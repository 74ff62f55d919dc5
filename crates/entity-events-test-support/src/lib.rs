//! Shared test mocks and utilities for the entity event engine.

mod clock;
mod content;
mod processor;
mod repository;

pub use clock::{FixedClock, ManualClock};
pub use content::{ENTITY_CONTENT_TYPE, MapContentLookup, TestContent};
pub use processor::StepProcessor;
pub use repository::{
    FailingEventRepository, InMemoryEntityStateRepository, InMemoryEventRepository,
};
