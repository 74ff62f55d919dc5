//! Chain dispatcher.
//!
//! Runs the resolved processor chain over one event. Each processor works on
//! a copy of the event that is committed only when the processor succeeds,
//! so a failing processor leaves the event as the previous processor left
//! it. Children emitted by a processor are linked to the event and either
//! run inline (immediate priority, or synchronous mode) or persisted for
//! later admission.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use entity_events_core::content::Content;
use entity_events_core::context::{ChainOutcome, EventContext, EventResult, OperationResult};
use entity_events_core::error::EventError;
use entity_events_core::event::{Event, Priority};
use tracing::{debug, info, warn};

use crate::priority::resolve_child_priority;
use crate::registry::ProcessorRegistry;
use crate::sink::PersistenceSink;

/// Future returned by [`ChainDispatcher::process`].
pub type ProcessFuture<'a, C> =
    Pin<Box<dyn Future<Output = Result<EventContext<C>, EventError>> + Send + 'a>>;

/// Runs processor chains.
pub struct ChainDispatcher<C: Content> {
    registry: Arc<ProcessorRegistry<C>>,
    sink: Option<Arc<PersistenceSink>>,
    asynchronous: bool,
}

impl<C: Content> std::fmt::Debug for ChainDispatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainDispatcher")
            .field("sink", &self.sink)
            .field("asynchronous", &self.asynchronous)
            .finish_non_exhaustive()
    }
}

impl<C: Content> ChainDispatcher<C> {
    /// A dispatcher that runs every event inline.
    #[must_use]
    pub fn new(registry: Arc<ProcessorRegistry<C>>) -> Self {
        Self {
            registry,
            sink: None,
            asynchronous: false,
        }
    }

    /// Defers non-immediate children to `sink` when `asynchronous` is set.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<PersistenceSink>, asynchronous: bool) -> Self {
        self.sink = Some(sink);
        self.asynchronous = asynchronous;
        self
    }

    /// Registry the chains are resolved from.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProcessorRegistry<C>> {
        &self.registry
    }

    /// Processes `event`, optionally as a child of `parent`.
    ///
    /// A child is linked to its parent and its priority resolved first. A
    /// child that is not `IMMEDIATE` is persisted and returned unprocessed
    /// when the dispatcher defers children. Otherwise the chain runs: the
    /// processors the context already holds results for are skipped, and
    /// the run stops on the first close, suspend or fault.
    ///
    /// Returns the event's context.
    ///
    /// # Errors
    ///
    /// Returns `EventError::ChainFault` naming the failing processor, or a
    /// persistence error for a deferred child.
    pub fn process<'a>(
        &'a self,
        event: &'a mut Event<C>,
        parent: Option<&'a Event<C>>,
    ) -> ProcessFuture<'a, C> {
        Box::pin(async move {
            if let Some(parent) = parent {
                event.link_to_parent(parent);
                let voters = self.registry.chain_for(event);
                let priority = resolve_child_priority(event, parent, &voters);
                event.priority = Some(priority);

                if priority != Priority::Immediate && self.asynchronous {
                    if let Some(sink) = &self.sink {
                        sink.persist(event).await?;
                        debug!(
                            event_id = %event.id,
                            parent_id = %parent.id,
                            priority = %priority,
                            "child event deferred"
                        );
                        return Ok(event.context().clone());
                    }
                }
            }
            self.run_chain(event).await
        })
    }

    async fn run_chain(&self, event: &mut Event<C>) -> Result<EventContext<C>, EventError> {
        if event.is_closed() {
            debug!(event_id = %event.id, "chain already closed");
            return Ok(event.context().clone());
        }
        event.context_mut().resume();

        let chain = self.registry.chain_for(event);
        let skip = event.context().processed_order();
        if chain.is_empty() {
            debug!(event_id = %event.id, event_type = %event.event_type, "no processors");
        }

        for processor in chain.into_iter().skip(skip) {
            let name = processor.name().to_owned();
            let context = std::mem::take(event.context_mut());
            let mut working = event.clone();

            let output = match processor.process(&mut working).await {
                Ok(output) => output,
                Err(source) => {
                    *event.context_mut() = context;
                    warn!(
                        event_id = %event.id,
                        processor = %name,
                        error = %source,
                        "processor failed"
                    );
                    return Err(EventError::ChainFault {
                        processor: name,
                        source: Box::new(source),
                    });
                }
            };

            *event = working;
            *event.context_mut() = context;
            let results = if output.results.is_empty() {
                vec![OperationResult::executed()]
            } else {
                output.results
            };
            let content = event.content.clone();
            event.context_mut().record(EventResult {
                processor: name.clone(),
                order: processor.order(),
                outcome: output.outcome,
                results,
                content,
            });
            debug!(
                event_id = %event.id,
                processor = %name,
                outcome = ?output.outcome,
                "processor ran"
            );

            for mut child in output.children {
                self.process(&mut child, Some(&*event))
                    .await
                    .map_err(|source| EventError::ChainFault {
                        processor: name.clone(),
                        source: Box::new(source),
                    })?;
            }

            match output.outcome {
                ChainOutcome::Continue => {}
                ChainOutcome::Close => {
                    debug!(event_id = %event.id, processor = %name, "chain closed");
                    break;
                }
                ChainOutcome::Suspend => {
                    info!(
                        event_id = %event.id,
                        processor = %name,
                        processed = event.context().processed_order(),
                        "chain suspended"
                    );
                    break;
                }
            }
        }

        Ok(event.context().clone())
    }
}
