//! Entity events API server entry point.

use std::sync::Arc;

use entity_events_core::clock::SystemClock;
use entity_events_store::{PgEntityStateRepository, PgPersistedEventRepository};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use entity_events_api::config::AppConfig;
use entity_events_api::error::AppError;
use entity_events_api::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(instance_id = %config.engine.instance_id, "Starting entity events API server");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let event_repository = Arc::new(PgPersistedEventRepository::new(pool.clone()));
    let state_repository = Arc::new(PgEntityStateRepository::new(pool));

    // No worker runs here: RUNNING rows belong to the instance's worker, which
    // sweeps them itself when it starts.
    let app_state = AppState::new(
        Arc::new(SystemClock),
        event_repository,
        state_repository,
        config.engine.instance_id.clone(),
    );
    let app = entity_events_api::app(app_state);

    let addr = config.socket_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
