//! Processor abstraction.

use async_trait::async_trait;

use crate::content::Content;
use crate::context::{ChainOutcome, OperationResult};
use crate::error::EventError;
use crate::event::{Event, EventType, Priority};

/// Default processor order.
pub const DEFAULT_ORDER: i32 = 0;

/// What a processor returns when it completes normally.
#[derive(Debug, Clone)]
pub struct ProcessorResult<C: Content> {
    /// How the chain continues.
    pub outcome: ChainOutcome,
    /// Reported operation results. An empty list is recorded as a single
    /// executed result.
    pub results: Vec<OperationResult>,
    /// Events produced by the processor. They are processed as children of
    /// the current event.
    pub children: Vec<Event<C>>,
}

impl<C: Content> ProcessorResult<C> {
    fn with_outcome(outcome: ChainOutcome) -> Self {
        Self {
            outcome,
            results: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Continue with the next processor.
    #[must_use]
    pub fn proceed() -> Self {
        Self::with_outcome(ChainOutcome::Continue)
    }

    /// Close the chain.
    #[must_use]
    pub fn close() -> Self {
        Self::with_outcome(ChainOutcome::Close)
    }

    /// Suspend the chain.
    #[must_use]
    pub fn suspend() -> Self {
        Self::with_outcome(ChainOutcome::Suspend)
    }

    /// Adds an operation result.
    #[must_use]
    pub fn with_result(mut self, result: OperationResult) -> Self {
        self.results.push(result);
        self
    }

    /// Adds a child event.
    #[must_use]
    pub fn with_child(mut self, child: Event<C>) -> Self {
        self.children.push(child);
        self
    }
}

/// A unit of chain logic.
///
/// The registry selects processors for an event by content type, event type,
/// and [`conditional`](Self::conditional), and the dispatcher runs them in
/// ascending [`order`](Self::order).
#[async_trait]
pub trait EntityEventProcessor<C: Content>: Send + Sync {
    /// Stable, unique processor name.
    fn name(&self) -> &str;

    /// Position in the chain; lower runs first.
    fn order(&self) -> i32 {
        DEFAULT_ORDER
    }

    /// Content type tags this processor accepts. Empty accepts all content.
    fn content_types(&self) -> Vec<String> {
        Vec::new()
    }

    /// Event types this processor handles. Empty handles all types.
    fn event_types(&self) -> Vec<EventType> {
        Vec::new()
    }

    /// Runtime predicate evaluated against the live event.
    fn conditional(&self, _event: &Event<C>) -> bool {
        true
    }

    /// Priority this processor asks for, or `None` to abstain.
    fn priority_vote(&self, _event: &Event<C>) -> Option<Priority> {
        None
    }

    /// Whether the processor starts disabled when registered.
    fn disabled_by_default(&self) -> bool {
        false
    }

    /// Processes the event.
    ///
    /// The processor may mutate the event's content and properties. An `Err`
    /// aborts the chain; mutations made by the failing call are discarded.
    ///
    /// # Errors
    ///
    /// Returns an `EventError` on any unexpected failure.
    async fn process(&self, event: &mut Event<C>) -> Result<ProcessorResult<C>, EventError>;
}
