//! Processor registry.
//!
//! Holds every registered processor keyed by its stable name together with
//! its runtime configuration (enabled flag, event type override). The
//! registry is shared by all dispatches; changes are visible to the next
//! chain resolution and never to a chain that is already running, because a
//! chain works on the snapshot returned by [`ProcessorRegistry::chain_for`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use entity_events_core::content::Content;
use entity_events_core::error::EventError;
use entity_events_core::event::{Event, EventType};
use entity_events_core::processor::EntityEventProcessor;
use tracing::info;

/// Read-only view of a registered processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorDescriptor {
    /// Stable processor name.
    pub name: String,
    /// Declared order.
    pub order: i32,
    /// Accepted content types. Empty accepts all content.
    pub content_types: Vec<String>,
    /// Effective event types. Empty handles all types.
    pub event_types: Vec<EventType>,
    /// Whether the event types come from a runtime override.
    pub event_types_configured: bool,
    /// Whether the processor is disabled.
    pub disabled: bool,
    /// Registration sequence, used to order processors with equal `order`.
    pub sequence: u64,
}

impl ProcessorDescriptor {
    /// Whether the processor accepts content assignable to any of
    /// `content_types`.
    #[must_use]
    pub fn supports_content(&self, content_types: &[&str]) -> bool {
        self.content_types.is_empty()
            || self
                .content_types
                .iter()
                .any(|declared| content_types.contains(&declared.as_str()))
    }

    /// Whether the processor handles `event_type`.
    #[must_use]
    pub fn supports_event_type(&self, event_type: &EventType) -> bool {
        self.event_types.is_empty() || self.event_types.contains(event_type)
    }
}

/// Criteria for [`ProcessorRegistry::find`]. Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct ProcessorFilter {
    /// Substring of the processor name.
    pub text: Option<String>,
    /// Content type the processor must accept.
    pub content_type: Option<String>,
    /// Event type the processor must handle.
    pub event_type: Option<EventType>,
    /// Disabled flag.
    pub disabled: Option<bool>,
}

impl ProcessorFilter {
    fn matches(&self, descriptor: &ProcessorDescriptor) -> bool {
        self.text
            .as_ref()
            .is_none_or(|text| descriptor.name.contains(text.as_str()))
            && self
                .content_type
                .as_ref()
                .is_none_or(|t| descriptor.supports_content(&[t.as_str()]))
            && self
                .event_type
                .as_ref()
                .is_none_or(|t| descriptor.supports_event_type(t))
            && self.disabled.is_none_or(|d| d == descriptor.disabled)
    }
}

struct Registration<C: Content> {
    processor: Arc<dyn EntityEventProcessor<C>>,
    sequence: u64,
    disabled: bool,
    event_types: Option<Vec<EventType>>,
}

impl<C: Content> Registration<C> {
    fn descriptor(&self) -> ProcessorDescriptor {
        ProcessorDescriptor {
            name: self.processor.name().to_owned(),
            order: self.processor.order(),
            content_types: self.processor.content_types(),
            event_types: self
                .event_types
                .clone()
                .unwrap_or_else(|| self.processor.event_types()),
            event_types_configured: self.event_types.is_some(),
            disabled: self.disabled,
            sequence: self.sequence,
        }
    }
}

struct RegistryState<C: Content> {
    processors: HashMap<String, Registration<C>>,
    next_sequence: u64,
}

/// Ordered, configurable set of processors for one content type family.
pub struct ProcessorRegistry<C: Content> {
    state: RwLock<RegistryState<C>>,
}

impl<C: Content> Default for ProcessorRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Content> std::fmt::Debug for ProcessorRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.find(&ProcessorFilter::default()))
            .finish()
    }
}

impl<C: Content> ProcessorRegistry<C> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                processors: HashMap::new(),
                next_sequence: 0,
            }),
        }
    }

    /// Registers a processor.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DuplicateProcessor` if the name is taken.
    pub fn register(
        &self,
        processor: Arc<dyn EntityEventProcessor<C>>,
    ) -> Result<ProcessorDescriptor, EventError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let name = processor.name().to_owned();
        if state.processors.contains_key(&name) {
            return Err(EventError::DuplicateProcessor(name));
        }

        let registration = Registration {
            disabled: processor.disabled_by_default(),
            processor,
            sequence: state.next_sequence,
            event_types: None,
        };
        state.next_sequence += 1;
        let descriptor = registration.descriptor();
        state.processors.insert(name, registration);

        info!(
            processor = %descriptor.name,
            order = descriptor.order,
            disabled = descriptor.disabled,
            "processor registered"
        );
        Ok(descriptor)
    }

    /// Removes a processor.
    ///
    /// # Errors
    ///
    /// Returns `EventError::ProcessorNotFound` if no processor has the name.
    pub fn unregister(&self, name: &str) -> Result<ProcessorDescriptor, EventError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let registration = state
            .processors
            .remove(name)
            .ok_or_else(|| EventError::ProcessorNotFound(name.to_owned()))?;
        info!(processor = name, "processor unregistered");
        Ok(registration.descriptor())
    }

    /// Enables a processor.
    ///
    /// # Errors
    ///
    /// Returns `EventError::ProcessorNotFound` if no processor has the name.
    pub fn enable(&self, name: &str) -> Result<ProcessorDescriptor, EventError> {
        self.update(name, |registration| registration.disabled = false)
    }

    /// Disables a processor.
    ///
    /// # Errors
    ///
    /// Returns `EventError::ProcessorNotFound` if no processor has the name.
    pub fn disable(&self, name: &str) -> Result<ProcessorDescriptor, EventError> {
        self.update(name, |registration| registration.disabled = true)
    }

    /// Replaces the declared event types of a processor, or restores them
    /// with `None`.
    ///
    /// # Errors
    ///
    /// Returns `EventError::ProcessorNotFound` if no processor has the name.
    pub fn configure_event_types(
        &self,
        name: &str,
        event_types: Option<Vec<EventType>>,
    ) -> Result<ProcessorDescriptor, EventError> {
        self.update(name, move |registration| {
            registration.event_types = event_types;
        })
    }

    fn update(
        &self,
        name: &str,
        change: impl FnOnce(&mut Registration<C>),
    ) -> Result<ProcessorDescriptor, EventError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let registration = state
            .processors
            .get_mut(name)
            .ok_or_else(|| EventError::ProcessorNotFound(name.to_owned()))?;
        change(registration);
        let descriptor = registration.descriptor();
        info!(
            processor = name,
            disabled = descriptor.disabled,
            event_types = ?descriptor.event_types,
            "processor configuration changed"
        );
        Ok(descriptor)
    }

    /// Returns the descriptor of a processor.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<ProcessorDescriptor> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.processors.get(name).map(Registration::descriptor)
    }

    /// Returns the descriptors matching `filter`, in chain order.
    #[must_use]
    pub fn find(&self, filter: &ProcessorFilter) -> Vec<ProcessorDescriptor> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut descriptors: Vec<ProcessorDescriptor> = state
            .processors
            .values()
            .map(Registration::descriptor)
            .filter(|d| filter.matches(d))
            .collect();
        descriptors.sort_by_key(|d| (d.order, d.sequence));
        descriptors
    }

    /// Returns the enabled processors accepting `content_type` and
    /// `event_type`, in chain order. Conditional predicates are not
    /// evaluated.
    #[must_use]
    pub fn candidates_for(
        &self,
        content_type: &str,
        event_type: &EventType,
    ) -> Vec<ProcessorDescriptor> {
        self.find(&ProcessorFilter {
            content_type: Some(content_type.to_owned()),
            event_type: Some(event_type.clone()),
            disabled: Some(false),
            ..ProcessorFilter::default()
        })
    }

    /// Resolves the chain for `event`: enabled processors accepting its
    /// content and event type whose conditional predicate holds, in chain
    /// order.
    #[must_use]
    pub fn chain_for(&self, event: &Event<C>) -> Vec<Arc<dyn EntityEventProcessor<C>>> {
        let content_types = event.content.content_types();
        let candidates: Vec<(i32, u64, Arc<dyn EntityEventProcessor<C>>)> = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            state
                .processors
                .values()
                .filter(|registration| {
                    let descriptor = registration.descriptor();
                    !descriptor.disabled
                        && descriptor.supports_content(&content_types)
                        && descriptor.supports_event_type(&event.event_type)
                })
                .map(|registration| {
                    (
                        registration.processor.order(),
                        registration.sequence,
                        Arc::clone(&registration.processor),
                    )
                })
                .collect()
        };
        // Predicates are user code and may call back into the registry.
        let mut chain: Vec<_> = candidates
            .into_iter()
            .filter(|(_, _, processor)| processor.conditional(event))
            .collect();
        chain.sort_by_key(|(order, sequence, _)| (*order, *sequence));
        chain.into_iter().map(|(_, _, processor)| processor).collect()
    }
}
