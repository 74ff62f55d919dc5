//! Test processors: a configurable `EntityEventProcessor` for chain tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use entity_events_core::context::{ChainOutcome, OperationResult};
use entity_events_core::error::EventError;
use entity_events_core::event::{Event, EventType, Priority};
use entity_events_core::processor::{EntityEventProcessor, ProcessorResult};
use uuid::Uuid;

use crate::content::TestContent;

/// A processor that appends its suffix to `TestContent::value` and then
/// signals the configured outcome. It can be configured to fail, to run only
/// when a property flag is set, to vote on priority, and to emit children.
#[derive(Debug)]
pub struct StepProcessor {
    name: String,
    order: i32,
    suffix: String,
    outcome: ChainOutcome,
    fault: Option<String>,
    event_types: Vec<EventType>,
    content_types: Vec<String>,
    required_flag: Option<String>,
    vote: Option<Priority>,
    result: Option<OperationResult>,
    children: Vec<Event<TestContent>>,
    disabled_by_default: bool,
    calls: AtomicUsize,
    seen_values: Mutex<Vec<String>>,
}

impl StepProcessor {
    /// A processor that appends `suffix` and continues the chain.
    pub fn new(name: impl Into<String>, order: i32, suffix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order,
            suffix: suffix.into(),
            outcome: ChainOutcome::Continue,
            fault: None,
            event_types: Vec::new(),
            content_types: Vec::new(),
            required_flag: None,
            vote: None,
            result: None,
            children: Vec::new(),
            disabled_by_default: false,
            calls: AtomicUsize::new(0),
            seen_values: Mutex::new(Vec::new()),
        }
    }

    /// Signal close after processing.
    #[must_use]
    pub fn closing(mut self) -> Self {
        self.outcome = ChainOutcome::Close;
        self
    }

    /// Signal suspend after processing.
    #[must_use]
    pub fn suspending(mut self) -> Self {
        self.outcome = ChainOutcome::Suspend;
        self
    }

    /// Mutate the content and then fail with `message`.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fault = Some(message.into());
        self
    }

    /// Handle only the given event types.
    #[must_use]
    pub fn for_event_types(mut self, event_types: Vec<EventType>) -> Self {
        self.event_types = event_types;
        self
    }

    /// Accept only the given content types.
    #[must_use]
    pub fn for_content_types(mut self, content_types: Vec<&str>) -> Self {
        self.content_types = content_types.into_iter().map(str::to_owned).collect();
        self
    }

    /// Run only when the property `flag` is set to `true`.
    #[must_use]
    pub fn when_flag(mut self, flag: impl Into<String>) -> Self {
        self.required_flag = Some(flag.into());
        self
    }

    /// Vote for `priority`.
    #[must_use]
    pub fn voting(mut self, priority: Priority) -> Self {
        self.vote = Some(priority);
        self
    }

    /// Report `result` instead of the default executed result.
    #[must_use]
    pub fn reporting(mut self, result: OperationResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Emit a copy of `child`, with a fresh id, on every call.
    #[must_use]
    pub fn emitting(mut self, child: Event<TestContent>) -> Self {
        self.children.push(child);
        self
    }

    /// Start disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.disabled_by_default = true;
        self
    }

    /// Number of times `process` was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Content values seen on entry, one per call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seen_values(&self) -> Vec<String> {
        self.seen_values.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntityEventProcessor<TestContent> for StepProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn content_types(&self) -> Vec<String> {
        self.content_types.clone()
    }

    fn event_types(&self) -> Vec<EventType> {
        self.event_types.clone()
    }

    fn conditional(&self, event: &Event<TestContent>) -> bool {
        self.required_flag
            .as_ref()
            .is_none_or(|flag| event.property_flag(flag))
    }

    fn priority_vote(&self, _event: &Event<TestContent>) -> Option<Priority> {
        self.vote
    }

    fn disabled_by_default(&self) -> bool {
        self.disabled_by_default
    }

    async fn process(
        &self,
        event: &mut Event<TestContent>,
    ) -> Result<ProcessorResult<TestContent>, EventError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_values
            .lock()
            .unwrap()
            .push(event.content.value.clone());

        event.content.value.push_str(&self.suffix);

        if let Some(message) = &self.fault {
            return Err(EventError::Validation(message.clone()));
        }

        let mut result = ProcessorResult {
            outcome: self.outcome,
            results: Vec::new(),
            children: self
                .children
                .iter()
                .map(|child| {
                    let mut child = child.clone();
                    child.id = Uuid::new_v4();
                    child
                })
                .collect(),
        };
        if let Some(reported) = &self.result {
            result = result.with_result(reported.clone());
        }
        Ok(result)
    }
}
