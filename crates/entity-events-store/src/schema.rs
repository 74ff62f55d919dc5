//! Table and column names of the entity event schema.
//!
//! The DDL lives in the workspace `migrations/` directory.

/// Persisted event queue.
pub const EVENTS_TABLE: &str = "entity_events";

/// Side-effect states linked to events.
pub const STATES_TABLE: &str = "entity_states";

/// Columns selected for a persisted event, in `EventRow` order.
pub const EVENT_COLUMNS: &str = "id, owner_type, owner_id, event_type, content, priority, \
     execute_date, instance_id, state, exception, result_properties, parent_id, \
     parent_event_type, root_id, properties, created";

/// Columns selected for an entity state, in `StateRow` order.
pub const STATE_COLUMNS: &str =
    "id, owner_type, owner_id, event_id, instance_id, state, exception, result_properties, created";
