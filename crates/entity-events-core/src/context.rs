//! Chain processing context and results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::content::Content;
use crate::error::EventError;
use crate::event::Properties;

/// State of an operation or a persisted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    /// Waiting for admission.
    Created,
    /// Claimed by a worker.
    Running,
    /// Completed successfully.
    Executed,
    /// Completed with a failure.
    Exception,
    /// Cancelled before completion.
    Canceled,
    /// Stopped, waiting for an outside decision.
    Blocked,
}

impl OperationState {
    /// Returns the stored representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Running => "RUNNING",
            Self::Executed => "EXECUTED",
            Self::Exception => "EXCEPTION",
            Self::Canceled => "CANCELED",
            Self::Blocked => "BLOCKED",
        }
    }

    /// Whether the state ends the lifecycle of a persisted event.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Executed | Self::Exception | Self::Canceled | Self::Blocked
        )
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationState {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "RUNNING" => Ok(Self::Running),
            "EXECUTED" => Ok(Self::Executed),
            "EXCEPTION" => Ok(Self::Exception),
            "CANCELED" => Ok(Self::Canceled),
            "BLOCKED" => Ok(Self::Blocked),
            other => Err(EventError::Validation(format!(
                "unknown operation state: {other}"
            ))),
        }
    }
}

/// Outcome of a single operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Resulting state.
    pub state: OperationState,
    /// Failure description, if any.
    pub exception: Option<String>,
    /// Additional result data.
    #[serde(default)]
    pub properties: Properties,
}

impl OperationResult {
    /// Creates a result in the given state.
    #[must_use]
    pub fn new(state: OperationState) -> Self {
        Self {
            state,
            exception: None,
            properties: Properties::new(),
        }
    }

    /// A successful result.
    #[must_use]
    pub fn executed() -> Self {
        Self::new(OperationState::Executed)
    }

    /// A failed result.
    pub fn exception(message: impl Into<String>) -> Self {
        Self {
            exception: Some(message.into()),
            ..Self::new(OperationState::Exception)
        }
    }

    /// A cancelled result.
    pub fn canceled(reason: impl Into<String>) -> Self {
        Self {
            exception: Some(reason.into()),
            ..Self::new(OperationState::Canceled)
        }
    }

    /// Adds a result property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// How the chain continues after a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Run the next processor.
    Continue,
    /// The event is fully processed; no further processors run.
    Close,
    /// Stop here; a later run with the same context resumes after this
    /// processor.
    Suspend,
}

/// Result recorded for one processor of the chain.
#[derive(Debug, Clone)]
pub struct EventResult<C: Content> {
    /// Name of the processor.
    pub processor: String,
    /// Declared order of the processor.
    pub order: i32,
    /// Chain outcome the processor signalled.
    pub outcome: ChainOutcome,
    /// Operation results reported by the processor.
    pub results: Vec<OperationResult>,
    /// Event content after the processor ran.
    pub content: C,
}

impl<C: Content> EventResult<C> {
    /// Whether any reported operation failed.
    #[must_use]
    pub fn has_exception(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.state == OperationState::Exception)
    }
}

/// Results accumulated while running the chain for one event.
///
/// The processed order is the number of results recorded, so a context
/// handed back to the dispatcher always skips exactly the processors that
/// already produced a result.
#[derive(Debug, Clone)]
pub struct EventContext<C: Content> {
    results: Vec<EventResult<C>>,
    closed: bool,
    suspended: bool,
}

impl<C: Content> Default for EventContext<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Content> EventContext<C> {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
            closed: false,
            suspended: false,
        }
    }

    /// Results in processing order.
    #[must_use]
    pub fn results(&self) -> &[EventResult<C>] {
        &self.results
    }

    /// Number of processors that produced a result so far.
    #[must_use]
    pub fn processed_order(&self) -> usize {
        self.results.len()
    }

    /// The most recent result.
    #[must_use]
    pub fn last_result(&self) -> Option<&EventResult<C>> {
        self.results.last()
    }

    /// Whether a processor closed the chain.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a processor suspended the chain.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Whether any processor reported a failed operation.
    #[must_use]
    pub fn has_exception(&self) -> bool {
        self.results.iter().any(EventResult::has_exception)
    }

    /// Records the result of a processor and applies its outcome.
    pub fn record(&mut self, result: EventResult<C>) {
        match result.outcome {
            ChainOutcome::Continue => {}
            ChainOutcome::Close => self.closed = true,
            ChainOutcome::Suspend => self.suspended = true,
        }
        self.results.push(result);
    }

    /// Clears the suspended flag before the chain is resumed.
    pub fn resume(&mut self) {
        self.suspended = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note(String);

    impl Content for Note {
        fn owner_type(&self) -> &str {
            "note"
        }

        fn owner_id(&self) -> Option<Uuid> {
            None
        }
    }

    fn result(
        processor: &str,
        outcome: ChainOutcome,
        results: Vec<OperationResult>,
    ) -> EventResult<Note> {
        EventResult {
            processor: processor.to_owned(),
            order: 0,
            outcome,
            results,
            content: Note(processor.to_owned()),
        }
    }

    #[test]
    fn test_processed_order_tracks_recorded_results() {
        let mut context = EventContext::new();

        context.record(result("a", ChainOutcome::Continue, vec![]));
        context.record(result("b", ChainOutcome::Continue, vec![]));

        assert_eq!(context.processed_order(), 2);
        assert_eq!(context.results().len(), 2);
        assert_eq!(context.last_result().unwrap().content, Note("b".to_owned()));
        assert!(!context.is_closed());
        assert!(!context.is_suspended());
    }

    #[test]
    fn test_record_applies_close_and_suspend() {
        let mut closed = EventContext::new();
        closed.record(result("a", ChainOutcome::Close, vec![]));
        let mut suspended = EventContext::new();
        suspended.record(result("a", ChainOutcome::Suspend, vec![]));

        assert!(closed.is_closed());
        assert!(suspended.is_suspended());

        suspended.resume();
        assert!(!suspended.is_suspended());
        assert_eq!(suspended.processed_order(), 1);
    }

    #[test]
    fn test_has_exception_inspects_operation_results() {
        let mut context = EventContext::new();
        context.record(result(
            "a",
            ChainOutcome::Continue,
            vec![OperationResult::executed()],
        ));
        assert!(!context.has_exception());

        context.record(result(
            "b",
            ChainOutcome::Continue,
            vec![OperationResult::exception("provisioning failed")],
        ));
        assert!(context.has_exception());
    }

    #[test]
    fn test_operation_state_terminal_states() {
        assert!(!OperationState::Created.is_terminal());
        assert!(!OperationState::Running.is_terminal());
        for state in [
            OperationState::Executed,
            OperationState::Exception,
            OperationState::Canceled,
            OperationState::Blocked,
        ] {
            assert!(state.is_terminal());
            assert_eq!(state.as_str().parse::<OperationState>().unwrap(), state);
        }
    }

    #[test]
    fn test_operation_result_serializes_state_in_screaming_case() {
        let value = serde_json::to_value(OperationResult::canceled("owner removed")).unwrap();

        assert_eq!(value["state"], "CANCELED");
        assert_eq!(value["exception"], "owner removed");
    }
}
