//! Routes for the persisted event queue.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use entity_events_core::context::{OperationResult, OperationState};
use entity_events_core::error::EventError;
use entity_events_core::event::{Priority, Properties};
use entity_events_core::repository::{PersistedEvent, PersistedEventFilter};
use entity_events_core::state::EntityState;

use crate::error::ApiError;
use crate::state::AppState;

/// Default number of rows returned by the list endpoint.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Reason recorded on events canceled through the API.
pub const CANCELED_BY_REQUEST: &str = "canceled by request";

/// Query string of GET /.
#[derive(Debug, Default, Deserialize)]
pub struct ListEventsQuery {
    /// Owner type to match.
    pub owner_type: Option<String>,
    /// Owner to match.
    pub owner_id: Option<Uuid>,
    /// Event type name to match.
    pub event_type: Option<String>,
    /// Queue state to match.
    pub state: Option<OperationState>,
    /// Owning instance to match.
    pub instance_id: Option<String>,
    /// Priority to match.
    pub priority: Option<Priority>,
    /// Direct parent to match.
    pub parent_id: Option<Uuid>,
    /// Root of the causal tree to match.
    pub root_id: Option<Uuid>,
    /// Lower bound on the creation time, inclusive.
    pub created_from: Option<DateTime<Utc>>,
    /// Upper bound on the creation time, inclusive.
    pub created_till: Option<DateTime<Utc>>,
    /// Maximum rows returned, `DEFAULT_LIST_LIMIT` when absent.
    pub limit: Option<usize>,
}

impl From<ListEventsQuery> for PersistedEventFilter {
    fn from(query: ListEventsQuery) -> Self {
        Self {
            owner_type: query.owner_type,
            owner_id: query.owner_id,
            event_type: query.event_type,
            states: query.state.into_iter().collect(),
            instance_id: query.instance_id,
            priority: query.priority,
            parent_id: query.parent_id,
            root_id: query.root_id,
            created_from: query.created_from,
            created_till: query.created_till,
            limit: Some(query.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
        }
    }
}

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct PublishEventRequest {
    /// Event type name.
    pub event_type: String,
    /// Type tag of the content owner.
    pub owner_type: String,
    /// Owner whose current content is loaded on execution.
    pub owner_id: Option<Uuid>,
    /// Inline content, for events that carry their own payload.
    pub content: Option<serde_json::Value>,
    /// Queue priority; `NORMAL` when absent, `IMMEDIATE` is rejected.
    #[serde(default)]
    pub priority: Priority,
    /// Earliest time the event may be admitted.
    pub execute_date: Option<DateTime<Utc>>,
    /// Event that caused this one.
    pub parent_id: Option<Uuid>,
    /// Type of the causing event.
    pub parent_event_type: Option<String>,
    /// First event of the causal tree.
    pub root_id: Option<Uuid>,
    /// Free-form properties carried to the processors.
    #[serde(default)]
    pub properties: Properties,
}

impl PublishEventRequest {
    fn validate(&self) -> Result<(), EventError> {
        if self.event_type.trim().is_empty() {
            return Err(EventError::Validation("event_type must not be empty".into()));
        }
        if self.owner_type.trim().is_empty() {
            return Err(EventError::Validation("owner_type must not be empty".into()));
        }
        if self.owner_id.is_none() && self.content.is_none() {
            return Err(EventError::Validation(
                "either owner_id or content is required".into(),
            ));
        }
        Ok(())
    }
}

/// GET /
#[instrument(skip(state))]
async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<Vec<PersistedEvent>>, ApiError> {
    let filter = PersistedEventFilter::from(query);
    let events = state.event_repository.find(&filter).await?;
    Ok(Json(events))
}

/// POST /
#[instrument(skip_all)]
async fn publish_event(
    State(state): State<AppState>,
    Json(request): Json<PublishEventRequest>,
) -> Result<(StatusCode, Json<PersistedEvent>), ApiError> {
    request.validate()?;

    let row = PersistedEvent {
        id: Uuid::new_v4(),
        owner_type: request.owner_type,
        owner_id: request.owner_id,
        event_type: request.event_type,
        content: request.content,
        priority: request.priority,
        execute_date: request.execute_date,
        instance_id: state.sink.instance_id().to_owned(),
        result: OperationResult::new(OperationState::Created),
        parent_id: request.parent_id,
        parent_event_type: request.parent_event_type,
        root_id: request.root_id,
        properties: request.properties,
        created: state.clock.now(),
    };
    let published = state.sink.publish(row).await?;

    info!(event_id = %published.id, event_type = %published.event_type, "event published");
    Ok((StatusCode::CREATED, Json(published)))
}

async fn load(state: &AppState, id: Uuid) -> Result<PersistedEvent, EventError> {
    state
        .event_repository
        .find_by_id(id)
        .await?
        .ok_or(EventError::EventNotFound(id))
}

/// GET /{id}
#[instrument(skip(state))]
async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PersistedEvent>, ApiError> {
    Ok(Json(load(&state, id).await?))
}

/// DELETE /{id}
#[instrument(skip(state))]
async fn delete_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.event_repository.delete(id).await? {
        return Err(EventError::EventNotFound(id).into());
    }
    info!(event_id = %id, "event deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /{id}/cancel
#[instrument(skip(state))]
async fn cancel_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PersistedEvent>, ApiError> {
    let canceled = OperationResult::canceled(CANCELED_BY_REQUEST);
    let moved = state
        .event_repository
        .transition(id, OperationState::Created, &canceled)
        .await?;
    let event = load(&state, id).await?;
    if !moved {
        return Err(EventError::StateConflict {
            id,
            expected: OperationState::Created.to_string(),
            actual: event.state().to_string(),
        }
        .into());
    }

    info!(event_id = %id, "event canceled");
    Ok(Json(event))
}

/// GET /{id}/states
#[instrument(skip(state))]
async fn list_states(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EntityState>>, ApiError> {
    let states = state.state_repository.find_by_event(id).await?;
    Ok(Json(states))
}

/// Returns the router for the event queue.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_events).post(publish_event))
        .route("/{id}", get(get_event).delete(delete_event))
        .route("/{id}/cancel", post(cancel_event))
        .route("/{id}/states", get(list_states))
}
