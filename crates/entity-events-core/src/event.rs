//! Event abstractions.
//!
//! An [`Event`] is the in-flight description of a change to some content.
//! It is processed by a chain of processors and may be persisted for
//! asynchronous execution.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::Content;
use crate::context::EventContext;
use crate::error::EventError;

/// Side-channel properties read and written by processors.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Named event type tag.
///
/// Domain enums convert into it (see [`CoreEventType`]); ad-hoc types are
/// built from any string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    /// Creates an event type from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the event type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Event types shared by all content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreEventType {
    /// Content was created.
    Create,
    /// Content was updated.
    Update,
    /// Content was deleted.
    Delete,
    /// Extended attributes of the content were saved.
    EavSave,
    /// Listeners should be notified about a change of the content.
    Notify,
}

impl CoreEventType {
    /// Returns the event type name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::EavSave => "EAV_SAVE",
            Self::Notify => "NOTIFY",
        }
    }
}

impl From<CoreEventType> for EventType {
    fn from(kind: CoreEventType) -> Self {
        Self(kind.as_str().to_owned())
    }
}

impl PartialEq<CoreEventType> for EventType {
    fn eq(&self, other: &CoreEventType) -> bool {
        self.0 == other.as_str()
    }
}

/// Event priority. `Immediate > High > Normal`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Queued, admitted after all eligible high priority events.
    #[default]
    Normal,
    /// Queued, admitted first.
    High,
    /// Processed synchronously, never queued.
    Immediate,
}

impl Priority {
    /// Returns the stored representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Immediate => "IMMEDIATE",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(Self::Normal),
            "HIGH" => Ok(Self::High),
            "IMMEDIATE" => Ok(Self::Immediate),
            other => Err(EventError::Validation(format!("unknown priority: {other}"))),
        }
    }
}

/// An event describing a change to `content`.
#[derive(Debug, Clone)]
pub struct Event<C: Content> {
    /// Unique event identifier. Persisted events keep the same id.
    pub id: Uuid,
    /// Event type.
    pub event_type: EventType,
    /// Current payload, replaced by every processor in the chain.
    pub content: C,
    /// Snapshot of the content as first seen.
    pub original_source: C,
    /// Explicit priority. `None` lets the engine decide.
    pub priority: Option<Priority>,
    /// The event is not eligible for execution before this instant.
    pub execute_date: Option<DateTime<Utc>>,
    /// The event whose processing produced this one.
    pub parent_id: Option<Uuid>,
    /// Type of the parent event.
    pub parent_event_type: Option<EventType>,
    /// The event at the root of the causal tree.
    pub root_id: Option<Uuid>,
    /// Processor side channel.
    pub properties: Properties,
    context: EventContext<C>,
}

impl<C: Content> Event<C> {
    /// Creates a new event. The content is also used as the original source.
    pub fn new(event_type: impl Into<EventType>, content: C) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            original_source: content.clone(),
            content,
            priority: None,
            execute_date: None,
            parent_id: None,
            parent_event_type: None,
            root_id: None,
            properties: Properties::new(),
            context: EventContext::new(),
        }
    }

    /// Sets the original source (for example the previously stored state of
    /// an updated owner).
    #[must_use]
    pub fn with_original_source(mut self, original_source: C) -> Self {
        self.original_source = original_source;
        self
    }

    /// Sets an explicit priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Defers eligibility until `execute_date`.
    #[must_use]
    pub fn with_execute_date(mut self, execute_date: DateTime<Utc>) -> Self {
        self.execute_date = Some(execute_date);
        self
    }

    /// Sets a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Attaches a context returned by an earlier, suspended run so that the
    /// next run resumes after the processors it already holds results for.
    #[must_use]
    pub fn with_context(mut self, context: EventContext<C>) -> Self {
        self.context = context;
        self
    }

    /// Returns the processing context.
    #[must_use]
    pub fn context(&self) -> &EventContext<C> {
        &self.context
    }

    /// Returns the processing context mutably.
    pub fn context_mut(&mut self) -> &mut EventContext<C> {
        &mut self.context
    }

    /// Whether a processor closed the chain.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.context.is_closed()
    }

    /// Whether a processor suspended the chain.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.context.is_suspended()
    }

    /// Effective priority: the explicit one, or `Normal`.
    #[must_use]
    pub fn effective_priority(&self) -> Priority {
        self.priority.unwrap_or_default()
    }

    /// Root of the causal tree this event belongs to. A root event is its own
    /// root.
    #[must_use]
    pub fn root(&self) -> Uuid {
        self.root_id.unwrap_or(self.id)
    }

    /// Links this event as a child of `parent`.
    pub fn link_to_parent(&mut self, parent: &Event<C>) {
        self.parent_id = Some(parent.id);
        self.parent_event_type = Some(parent.event_type.clone());
        self.root_id = Some(parent.root());
    }

    /// Returns a property value.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    /// Returns `true` when the property is set to JSON `true`.
    #[must_use]
    pub fn property_flag(&self, key: &str) -> bool {
        self.properties
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Role {
        id: Uuid,
        code: String,
    }

    impl Content for Role {
        fn owner_type(&self) -> &str {
            "role"
        }

        fn owner_id(&self) -> Option<Uuid> {
            Some(self.id)
        }
    }

    fn role(code: &str) -> Role {
        Role {
            id: Uuid::new_v4(),
            code: code.to_owned(),
        }
    }

    #[test]
    fn test_priority_is_totally_ordered() {
        assert!(Priority::Immediate > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert_eq!(
            [Priority::High, Priority::Normal, Priority::Immediate]
                .into_iter()
                .max(),
            Some(Priority::Immediate)
        );
    }

    #[test]
    fn test_priority_parses_stored_representation() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("URGENT".parse::<Priority>().is_err());
        assert_eq!(
            serde_json::to_value(Priority::Immediate).unwrap(),
            serde_json::json!("IMMEDIATE")
        );
    }

    #[test]
    fn test_core_event_type_converts_to_named_type() {
        let event_type = EventType::from(CoreEventType::EavSave);

        assert_eq!(event_type.name(), "EAV_SAVE");
        assert_eq!(event_type, CoreEventType::EavSave);
        assert_ne!(EventType::new("CUSTOM"), CoreEventType::Create);
    }

    #[test]
    fn test_new_event_uses_content_as_original_source() {
        let content = role("admin");

        let event = Event::new(CoreEventType::Create, content.clone());

        assert_eq!(event.original_source, content);
        assert_eq!(event.content, content);
        assert!(event.priority.is_none());
        assert_eq!(event.effective_priority(), Priority::Normal);
        assert_eq!(event.root(), event.id);
        assert_eq!(event.context().processed_order(), 0);
    }

    #[test]
    fn test_link_to_parent_uses_parent_root_when_present() {
        let mut root = Event::new(CoreEventType::Update, role("root"));
        root.root_id = None;
        let mut parent = Event::new(CoreEventType::Update, role("parent"));
        parent.link_to_parent(&root);
        let mut child = Event::new(CoreEventType::Notify, role("child"));

        child.link_to_parent(&parent);

        assert_eq!(parent.root_id, Some(root.id));
        assert_eq!(child.parent_id, Some(parent.id));
        assert_eq!(
            child.parent_event_type,
            Some(EventType::from(CoreEventType::Update))
        );
        assert_eq!(child.root_id, Some(root.id));
    }

    #[test]
    fn test_property_flag_reads_boolean_properties_only() {
        let event = Event::new(CoreEventType::Update, role("x"))
            .with_property("skip", serde_json::json!(true))
            .with_property("count", serde_json::json!(1));

        assert!(event.property_flag("skip"));
        assert!(!event.property_flag("count"));
        assert!(!event.property_flag("missing"));
    }
}
