//! Entity Events Engine: processor chains and the persisted event queue.
//!
//! Registers processors, runs their chains over events, defers child events
//! to the persisted queue, admits queued events in priority order and
//! recovers events interrupted by a stopped instance.

pub mod admission;
pub mod config;
pub mod dispatcher;
pub mod manager;
pub mod priority;
pub mod recovery;
pub mod registry;
pub mod resurrection;
pub mod sink;
pub mod worker;

pub use config::EngineConfig;
pub use manager::{EntityEventManager, EntityEventManagerBuilder};
pub use registry::{ProcessorDescriptor, ProcessorFilter, ProcessorRegistry};
pub use worker::{BatchReport, EventWorker};
