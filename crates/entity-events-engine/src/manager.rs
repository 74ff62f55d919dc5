//! Entity event manager.
//!
//! Facade wiring the registry, dispatcher, sink, scheduler, resurrector and
//! recovery sweep of one instance together.

use std::sync::Arc;

use entity_events_core::clock::{Clock, SystemClock};
use entity_events_core::content::{Content, ContentLookup};
use entity_events_core::context::EventContext;
use entity_events_core::error::EventError;
use entity_events_core::event::{Event, Priority};
use entity_events_core::repository::{PersistedEvent, PersistedEventRepository};
use entity_events_core::state::EntityStateRepository;

use crate::admission::AdmissionScheduler;
use crate::config::EngineConfig;
use crate::dispatcher::ChainDispatcher;
use crate::priority::evaluate_priority;
use crate::recovery::{RecoveryReport, RecoverySweep};
use crate::registry::ProcessorRegistry;
use crate::resurrection::Resurrector;
use crate::sink::PersistenceSink;

/// Entry point for publishing and processing entity events.
#[derive(Debug)]
pub struct EntityEventManager<C: Content> {
    config: EngineConfig,
    registry: Arc<ProcessorRegistry<C>>,
    dispatcher: ChainDispatcher<C>,
    sink: Arc<PersistenceSink>,
    scheduler: AdmissionScheduler,
    resurrector: Resurrector<C>,
    recovery: RecoverySweep,
}

impl<C: Content> EntityEventManager<C> {
    /// Starts building a manager for `config` on top of the given repositories.
    pub fn builder(
        config: EngineConfig,
        events: Arc<dyn PersistedEventRepository>,
        states: Arc<dyn EntityStateRepository>,
    ) -> EntityEventManagerBuilder<C> {
        EntityEventManagerBuilder {
            config,
            events,
            states,
            clock: Arc::new(SystemClock),
            registry: None,
            resurrector: Resurrector::new(),
        }
    }

    /// Settings of this instance.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Processors this manager dispatches to.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProcessorRegistry<C>> {
        &self.registry
    }

    /// Sink that queues deferred events.
    #[must_use]
    pub fn sink(&self) -> &Arc<PersistenceSink> {
        &self.sink
    }

    /// Runs the chain for a root event.
    ///
    /// # Errors
    ///
    /// See [`ChainDispatcher::process`].
    pub async fn process(&self, event: &mut Event<C>) -> Result<EventContext<C>, EventError> {
        self.dispatcher.process(event, None).await
    }

    /// Processes `event` as a child of `parent`: it runs inline when
    /// `IMMEDIATE`, and is queued otherwise.
    ///
    /// # Errors
    ///
    /// See [`ChainDispatcher::process`].
    pub async fn process_with_parent(
        &self,
        event: &mut Event<C>,
        parent: &Event<C>,
    ) -> Result<EventContext<C>, EventError> {
        self.dispatcher.process(event, Some(parent)).await
    }

    /// Queues `event` for asynchronous processing by this instance.
    ///
    /// # Errors
    ///
    /// See [`PersistenceSink::persist`].
    pub async fn persist(&self, event: &Event<C>) -> Result<PersistedEvent, EventError> {
        self.sink.persist(event).await
    }

    /// Queues a prepared row.
    ///
    /// # Errors
    ///
    /// See [`PersistenceSink::publish`].
    pub async fn publish(&self, row: PersistedEvent) -> Result<PersistedEvent, EventError> {
        self.sink.publish(row).await
    }

    /// Selects the next batch for `instance_id`.
    ///
    /// # Errors
    ///
    /// See [`AdmissionScheduler::admit`].
    pub async fn admit(
        &self,
        instance_id: &str,
        batch_size: usize,
    ) -> Result<Vec<PersistedEvent>, EventError> {
        self.scheduler.admit(instance_id, batch_size).await
    }

    /// Rebuilds the event stored in `row`.
    ///
    /// # Errors
    ///
    /// See [`Resurrector::to_event`].
    pub async fn to_event(&self, row: &PersistedEvent) -> Result<Event<C>, EventError> {
        self.resurrector.to_event(row).await
    }

    /// Highest priority voted by the processors the event would run through.
    #[must_use]
    pub fn evaluate_priority(&self, event: &Event<C>) -> Option<Priority> {
        evaluate_priority(event, &self.registry.chain_for(event))
    }

    /// Cancels the events this instance left running.
    ///
    /// # Errors
    ///
    /// See [`RecoverySweep::init`].
    pub async fn init(&self) -> Result<RecoveryReport, EventError> {
        self.recovery.init().await
    }
}

/// Builder for [`EntityEventManager`].
pub struct EntityEventManagerBuilder<C: Content> {
    config: EngineConfig,
    events: Arc<dyn PersistedEventRepository>,
    states: Arc<dyn EntityStateRepository>,
    clock: Arc<dyn Clock>,
    registry: Option<Arc<ProcessorRegistry<C>>>,
    resurrector: Resurrector<C>,
}

impl<C: Content> EntityEventManagerBuilder<C> {
    /// Replaces the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Shares an existing registry instead of creating an empty one.
    #[must_use]
    pub fn registry(mut self, registry: Arc<ProcessorRegistry<C>>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Registers the content lookup for rows of `owner_type`.
    #[must_use]
    pub fn lookup(
        mut self,
        owner_type: impl Into<String>,
        lookup: Arc<dyn ContentLookup<C>>,
    ) -> Self {
        self.resurrector = self.resurrector.with_lookup(owner_type, lookup);
        self
    }

    /// Wires the manager. Without a registry an empty one is created.
    #[must_use]
    pub fn build(self) -> EntityEventManager<C> {
        let registry = self.registry.unwrap_or_default();
        let sink = Arc::new(PersistenceSink::new(
            Arc::clone(&self.events),
            Arc::clone(&self.clock),
            self.config.instance_id.clone(),
        ));
        let dispatcher = ChainDispatcher::new(Arc::clone(&registry))
            .with_sink(Arc::clone(&sink), self.config.asynchronous);
        let scheduler = AdmissionScheduler::new(Arc::clone(&self.events), self.clock);
        let recovery =
            RecoverySweep::new(self.events, self.states, self.config.instance_id.clone());

        EntityEventManager {
            config: self.config,
            registry,
            dispatcher,
            sink,
            scheduler,
            resurrector: self.resurrector,
            recovery,
        }
    }
}
