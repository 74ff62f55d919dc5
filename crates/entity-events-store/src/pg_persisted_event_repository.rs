//! `PostgreSQL` implementation of the `PersistedEventRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use entity_events_core::context::{OperationResult, OperationState};
use entity_events_core::error::EventError;
use entity_events_core::event::{Priority, Properties};
use entity_events_core::repository::{
    PersistedEvent, PersistedEventFilter, PersistedEventRepository,
};

use crate::infrastructure;
use crate::schema::{EVENT_COLUMNS, EVENTS_TABLE};

#[derive(Debug, FromRow)]
struct EventRow {
    id: Uuid,
    owner_type: String,
    owner_id: Option<Uuid>,
    event_type: String,
    content: Option<serde_json::Value>,
    priority: String,
    execute_date: Option<DateTime<Utc>>,
    instance_id: String,
    state: String,
    exception: Option<String>,
    result_properties: Json<Properties>,
    parent_id: Option<Uuid>,
    parent_event_type: Option<String>,
    root_id: Option<Uuid>,
    properties: Json<Properties>,
    created: DateTime<Utc>,
}

impl TryFrom<EventRow> for PersistedEvent {
    type Error = EventError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner_type: row.owner_type,
            owner_id: row.owner_id,
            event_type: row.event_type,
            content: row.content,
            priority: row.priority.parse()?,
            execute_date: row.execute_date,
            instance_id: row.instance_id,
            result: OperationResult {
                state: row.state.parse()?,
                exception: row.exception,
                properties: row.result_properties.0,
            },
            parent_id: row.parent_id,
            parent_event_type: row.parent_event_type,
            root_id: row.root_id,
            properties: row.properties.0,
            created: row.created,
        })
    }
}

fn into_events(rows: Vec<EventRow>) -> Result<Vec<PersistedEvent>, EventError> {
    rows.into_iter().map(PersistedEvent::try_from).collect()
}

fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// PostgreSQL-backed persisted event repository.
#[derive(Debug, Clone)]
pub struct PgPersistedEventRepository {
    pool: PgPool,
}

impl PgPersistedEventRepository {
    /// Creates a new `PgPersistedEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistedEventRepository for PgPersistedEventRepository {
    async fn insert(&self, event: &PersistedEvent) -> Result<(), EventError> {
        let sql = format!("INSERT INTO {EVENTS_TABLE} ({EVENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)");
        sqlx::query(&sql)
            .bind(event.id)
            .bind(&event.owner_type)
            .bind(event.owner_id)
            .bind(&event.event_type)
            .bind(event.content.as_ref())
            .bind(event.priority.as_str())
            .bind(event.execute_date)
            .bind(&event.instance_id)
            .bind(event.result.state.as_str())
            .bind(event.result.exception.as_deref())
            .bind(Json(&event.result.properties))
            .bind(event.parent_id)
            .bind(event.parent_event_type.as_deref())
            .bind(event.root_id)
            .bind(Json(&event.properties))
            .bind(event.created)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        debug!(event_id = %event.id, "event row inserted");
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PersistedEvent>, EventError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM {EVENTS_TABLE} WHERE id = $1");
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?
            .map(PersistedEvent::try_from)
            .transpose()
    }

    async fn find(
        &self,
        filter: &PersistedEventFilter,
    ) -> Result<Vec<PersistedEvent>, EventError> {
        let mut query: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {EVENT_COLUMNS} FROM {EVENTS_TABLE} WHERE TRUE"
        ));
        if let Some(owner_type) = &filter.owner_type {
            query.push(" AND owner_type = ").push_bind(owner_type.clone());
        }
        if let Some(owner_id) = filter.owner_id {
            query.push(" AND owner_id = ").push_bind(owner_id);
        }
        if let Some(event_type) = &filter.event_type {
            query.push(" AND event_type = ").push_bind(event_type.clone());
        }
        if !filter.states.is_empty() {
            let states: Vec<String> = filter
                .states
                .iter()
                .map(|s| s.as_str().to_owned())
                .collect();
            query.push(" AND state = ANY(").push_bind(states).push(")");
        }
        if let Some(instance_id) = &filter.instance_id {
            query.push(" AND instance_id = ").push_bind(instance_id.clone());
        }
        if let Some(priority) = filter.priority {
            query.push(" AND priority = ").push_bind(priority.as_str());
        }
        if let Some(parent_id) = filter.parent_id {
            query.push(" AND parent_id = ").push_bind(parent_id);
        }
        if let Some(root_id) = filter.root_id {
            query.push(" AND root_id = ").push_bind(root_id);
        }
        if let Some(from) = filter.created_from {
            query.push(" AND created >= ").push_bind(from);
        }
        if let Some(till) = filter.created_till {
            query.push(" AND created <= ").push_bind(till);
        }
        query.push(" ORDER BY created, id");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(clamp_limit(limit));
        }

        let rows = query
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
        into_events(rows)
    }

    async fn find_to_execute(
        &self,
        instance_id: &str,
        priority: Priority,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PersistedEvent>, EventError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM {EVENTS_TABLE} \
             WHERE state = $1 AND instance_id = $2 AND priority = $3 \
               AND (execute_date IS NULL OR execute_date <= $4) \
             ORDER BY created, id \
             LIMIT $5"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(OperationState::Created.as_str())
            .bind(instance_id)
            .bind(priority.as_str())
            .bind(now)
            .bind(clamp_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
        into_events(rows)
    }

    async fn find_duplicates(
        &self,
        event: &PersistedEvent,
        now: DateTime<Utc>,
    ) -> Result<Vec<PersistedEvent>, EventError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM {EVENTS_TABLE} \
             WHERE id <> $1 AND state = $2 AND instance_id = $3 \
               AND (execute_date IS NULL OR execute_date <= $4) \
               AND owner_id IS NOT DISTINCT FROM $5 \
               AND owner_type = $6 AND event_type = $7 \
               AND parent_event_type IS NOT DISTINCT FROM $8 \
             ORDER BY created, id"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(event.id)
            .bind(OperationState::Created.as_str())
            .bind(&event.instance_id)
            .bind(now)
            .bind(event.owner_id)
            .bind(&event.owner_type)
            .bind(&event.event_type)
            .bind(event.parent_event_type.as_deref())
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
        into_events(rows)
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: OperationState,
        result: &OperationResult,
    ) -> Result<bool, EventError> {
        let sql = format!(
            "UPDATE {EVENTS_TABLE} SET state = $3, exception = $4, result_properties = $5 \
             WHERE id = $1 AND state = $2"
        );
        let updated = sqlx::query(&sql)
            .bind(id)
            .bind(expected.as_str())
            .bind(result.state.as_str())
            .bind(result.exception.as_deref())
            .bind(Json(&result.properties))
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?
            .rows_affected();
        Ok(updated == 1)
    }

    async fn update_priority(&self, id: Uuid, priority: Priority) -> Result<bool, EventError> {
        let sql = format!("UPDATE {EVENTS_TABLE} SET priority = $2 WHERE id = $1 AND state = $3");
        let updated = sqlx::query(&sql)
            .bind(id)
            .bind(priority.as_str())
            .bind(OperationState::Created.as_str())
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?
            .rows_affected();
        Ok(updated == 1)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, EventError> {
        let sql = format!("DELETE FROM {EVENTS_TABLE} WHERE id = $1");
        let deleted = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?
            .rows_affected();
        Ok(deleted == 1)
    }

    async fn delete_if(&self, id: Uuid, expected: OperationState) -> Result<bool, EventError> {
        let sql = format!("DELETE FROM {EVENTS_TABLE} WHERE id = $1 AND state = $2");
        let deleted = sqlx::query(&sql)
            .bind(id)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?
            .rows_affected();
        Ok(deleted == 1)
    }
}
