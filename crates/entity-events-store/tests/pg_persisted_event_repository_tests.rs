//! Integration tests for `PgPersistedEventRepository`.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use entity_events_core::context::{OperationResult, OperationState};
use entity_events_core::event::{Priority, Properties};
use entity_events_core::repository::{
    PersistedEvent, PersistedEventFilter, PersistedEventRepository,
};
use entity_events_engine::admission::AdmissionScheduler;
use entity_events_store::PgPersistedEventRepository;
use entity_events_test_support::FixedClock;
use sqlx::PgPool;
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Helper to build a `CREATED` row owned by `node-a` with sensible defaults.
fn make_row(priority: Priority, minutes_ago: i64) -> PersistedEvent {
    PersistedEvent {
        id: Uuid::new_v4(),
        owner_type: "identity".to_string(),
        owner_id: Some(Uuid::new_v4()),
        event_type: "UPDATE".to_string(),
        content: None,
        priority,
        execute_date: None,
        instance_id: "node-a".to_string(),
        result: OperationResult::new(OperationState::Created),
        parent_id: None,
        parent_event_type: None,
        root_id: None,
        properties: Properties::new(),
        created: now() - Duration::minutes(minutes_ago),
    }
}

// --- insert + find_by_id round-trip ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_by_id_returns_none_for_unknown_event(pool: PgPool) {
    let repo = PgPersistedEventRepository::new(pool);

    let found = repo.find_by_id(Uuid::new_v4()).await.unwrap();

    assert!(found.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_insert_and_find_by_id_round_trip(pool: PgPool) {
    let repo = PgPersistedEventRepository::new(pool);
    let mut row = make_row(Priority::High, 5);
    row.content = Some(serde_json::json!({
        "nested": {"key": "value", "number": 42},
        "array": [1, "two", null, true],
    }));
    row.execute_date = Some(now() + Duration::minutes(1));
    row.parent_id = Some(Uuid::new_v4());
    row.parent_event_type = Some("CREATE".to_string());
    row.root_id = row.parent_id;
    row.properties
        .insert("template".to_string(), serde_json::json!("welcome"));

    repo.insert(&row).await.unwrap();

    let loaded = repo.find_by_id(row.id).await.unwrap().unwrap();
    assert_eq!(loaded, row);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_insert_rejects_duplicate_id(pool: PgPool) {
    let repo = PgPersistedEventRepository::new(pool);
    let row = make_row(Priority::Normal, 1);
    repo.insert(&row).await.unwrap();

    let result = repo.insert(&row).await;

    assert!(result.is_err());
}

// --- find ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_applies_filter_and_orders_oldest_first(pool: PgPool) {
    // Arrange
    let repo = PgPersistedEventRepository::new(pool);
    let newer = make_row(Priority::Normal, 1);
    let older = make_row(Priority::High, 10);
    let mut running = make_row(Priority::Normal, 5);
    running.result = OperationResult::new(OperationState::Running);
    let mut foreign = make_row(Priority::Normal, 3);
    foreign.instance_id = "node-b".to_string();
    for row in [&newer, &older, &running, &foreign] {
        repo.insert(row).await.unwrap();
    }

    // Act
    let created = repo
        .find(&PersistedEventFilter::in_state(OperationState::Created).for_instance("node-a"))
        .await
        .unwrap();
    let high = repo
        .find(&PersistedEventFilter {
            priority: Some(Priority::High),
            ..PersistedEventFilter::default()
        })
        .await
        .unwrap();
    let limited = repo
        .find(&PersistedEventFilter {
            limit: Some(2),
            ..PersistedEventFilter::default()
        })
        .await
        .unwrap();

    // Assert
    let ids = |rows: &[PersistedEvent]| rows.iter().map(|r| r.id).collect::<Vec<_>>();
    assert_eq!(ids(&created), vec![older.id, newer.id]);
    assert_eq!(ids(&high), vec![older.id]);
    assert_eq!(ids(&limited), vec![older.id, running.id]);
}

// --- find_to_execute ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_to_execute_respects_priority_state_and_execute_date(pool: PgPool) {
    // Arrange
    let repo = PgPersistedEventRepository::new(pool);
    let due = make_row(Priority::Normal, 10);
    let mut deferred = make_row(Priority::Normal, 20);
    deferred.execute_date = Some(now() + Duration::minutes(5));
    let high = make_row(Priority::High, 30);
    let mut running = make_row(Priority::Normal, 40);
    running.result = OperationResult::new(OperationState::Running);
    for row in [&due, &deferred, &high, &running] {
        repo.insert(row).await.unwrap();
    }

    // Act
    let normal = repo
        .find_to_execute("node-a", Priority::Normal, now(), 10)
        .await
        .unwrap();

    // Assert
    assert_eq!(normal.len(), 1);
    assert_eq!(normal[0].id, due.id);
}

// --- conditional updates ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_claim_succeeds_once(pool: PgPool) {
    let repo = PgPersistedEventRepository::new(pool);
    let row = make_row(Priority::Normal, 1);
    repo.insert(&row).await.unwrap();

    let first = repo.claim(row.id).await.unwrap();
    let second = repo.claim(row.id).await.unwrap();

    assert!(first);
    assert!(!second);
    let loaded = repo.find_by_id(row.id).await.unwrap().unwrap();
    assert_eq!(loaded.state(), OperationState::Running);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_transition_stores_exception_and_properties(pool: PgPool) {
    let repo = PgPersistedEventRepository::new(pool);
    let row = make_row(Priority::Normal, 1);
    repo.insert(&row).await.unwrap();
    repo.claim(row.id).await.unwrap();
    let result = OperationResult::exception("disk full")
        .with_property("processor", serde_json::json!("save"));

    let moved = repo
        .transition(row.id, OperationState::Running, &result)
        .await
        .unwrap();

    assert!(moved);
    let loaded = repo.find_by_id(row.id).await.unwrap().unwrap();
    assert_eq!(loaded.result, result);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_update_priority_only_applies_to_created_rows(pool: PgPool) {
    let repo = PgPersistedEventRepository::new(pool);
    let created = make_row(Priority::Normal, 1);
    let running = make_row(Priority::Normal, 2);
    repo.insert(&created).await.unwrap();
    repo.insert(&running).await.unwrap();
    repo.claim(running.id).await.unwrap();

    assert!(repo.update_priority(created.id, Priority::High).await.unwrap());
    assert!(!repo.update_priority(running.id, Priority::High).await.unwrap());

    let loaded = repo.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(loaded.priority, Priority::High);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_delete_if_requires_expected_state(pool: PgPool) {
    let repo = PgPersistedEventRepository::new(pool);
    let row = make_row(Priority::Normal, 1);
    repo.insert(&row).await.unwrap();
    repo.claim(row.id).await.unwrap();

    assert!(!repo.delete_if(row.id, OperationState::Created).await.unwrap());
    assert!(repo.delete_if(row.id, OperationState::Running).await.unwrap());
    assert!(!repo.delete(row.id).await.unwrap());
}

// --- duplicates ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_duplicates_matches_key_including_missing_parent_type(pool: PgPool) {
    // Arrange
    let repo = PgPersistedEventRepository::new(pool);
    let original = make_row(Priority::Normal, 10);
    let duplicate = PersistedEvent {
        id: Uuid::new_v4(),
        created: now() - Duration::minutes(5),
        ..original.clone()
    };
    let other_parent = PersistedEvent {
        id: Uuid::new_v4(),
        parent_event_type: Some("CREATE".to_string()),
        ..original.clone()
    };
    for row in [&original, &duplicate, &other_parent] {
        repo.insert(row).await.unwrap();
    }

    // Act
    let found = repo.find_duplicates(&original, now()).await.unwrap();

    // Assert
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, duplicate.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_admission_collapses_duplicates_in_postgres(pool: PgPool) {
    // Arrange
    let repo = Arc::new(PgPersistedEventRepository::new(pool));
    let older_high = make_row(Priority::High, 10);
    let newer_normal = PersistedEvent {
        id: Uuid::new_v4(),
        priority: Priority::Normal,
        created: now() - Duration::minutes(1),
        ..older_high.clone()
    };
    repo.insert(&older_high).await.unwrap();
    repo.insert(&newer_normal).await.unwrap();
    let scheduler = AdmissionScheduler::new(
        Arc::clone(&repo) as Arc<dyn PersistedEventRepository>,
        Arc::new(FixedClock(now())),
    );

    // Act
    let batch = scheduler.admit("node-a", 15).await.unwrap();

    // Assert
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, newer_normal.id);
    assert_eq!(batch[0].priority, Priority::High);
    assert!(repo.find_by_id(older_high.id).await.unwrap().is_none());
    let survivor = repo.find_by_id(newer_normal.id).await.unwrap().unwrap();
    assert_eq!(survivor.priority, Priority::High);
}
