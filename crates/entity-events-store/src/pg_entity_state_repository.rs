//! `PostgreSQL` implementation of the `EntityStateRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use entity_events_core::context::OperationResult;
use entity_events_core::error::EventError;
use entity_events_core::event::Properties;
use entity_events_core::state::{EntityState, EntityStateRepository};

use crate::infrastructure;
use crate::schema::{STATE_COLUMNS, STATES_TABLE};

#[derive(Debug, FromRow)]
struct StateRow {
    id: Uuid,
    owner_type: String,
    owner_id: Option<Uuid>,
    event_id: Option<Uuid>,
    instance_id: String,
    state: String,
    exception: Option<String>,
    result_properties: Json<Properties>,
    created: DateTime<Utc>,
}

impl TryFrom<StateRow> for EntityState {
    type Error = EventError;

    fn try_from(row: StateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner_type: row.owner_type,
            owner_id: row.owner_id,
            event_id: row.event_id,
            instance_id: row.instance_id,
            result: OperationResult {
                state: row.state.parse()?,
                exception: row.exception,
                properties: row.result_properties.0,
            },
            created: row.created,
        })
    }
}

/// PostgreSQL-backed entity state repository.
#[derive(Debug, Clone)]
pub struct PgEntityStateRepository {
    pool: PgPool,
}

impl PgEntityStateRepository {
    /// Creates a new `PgEntityStateRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityStateRepository for PgEntityStateRepository {
    async fn insert(&self, state: &EntityState) -> Result<(), EventError> {
        let sql = format!(
            "INSERT INTO {STATES_TABLE} ({STATE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        );
        sqlx::query(&sql)
            .bind(state.id)
            .bind(&state.owner_type)
            .bind(state.owner_id)
            .bind(state.event_id)
            .bind(&state.instance_id)
            .bind(state.result.state.as_str())
            .bind(state.result.exception.as_deref())
            .bind(Json(&state.result.properties))
            .bind(state.created)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }

    async fn find_by_event(&self, event_id: Uuid) -> Result<Vec<EntityState>, EventError> {
        let sql = format!(
            "SELECT {STATE_COLUMNS} FROM {STATES_TABLE} WHERE event_id = $1 ORDER BY created, id"
        );
        sqlx::query_as::<_, StateRow>(&sql)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?
            .into_iter()
            .map(EntityState::try_from)
            .collect()
    }

    async fn update_by_event(
        &self,
        event_id: Uuid,
        result: &OperationResult,
    ) -> Result<u64, EventError> {
        let sql = format!(
            "UPDATE {STATES_TABLE} SET state = $2, exception = $3, result_properties = $4 \
             WHERE event_id = $1 AND state <> $2"
        );
        let updated = sqlx::query(&sql)
            .bind(event_id)
            .bind(result.state.as_str())
            .bind(result.exception.as_deref())
            .bind(Json(&result.properties))
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?
            .rows_affected();
        Ok(updated)
    }
}
