// ABOUTME: Pipeline tests against the SQLite record store
// ABOUTME: Verifies that documents, sessions and assembled versions survive a reconnect

mod common;

use common::{analyzed_document, manager_with_store, FakeModel, Route};
use docforge_pipeline::{SectionKey, SessionStatus};
use docforge_storage::SqliteStore;
use std::sync::Arc;

#[tokio::test]
async fn test_pipeline_state_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("docforge.db").display());
    let model = FakeModel::new();

    let id = {
        let store = Arc::new(SqliteStore::connect(&url).await.unwrap());
        let manager = manager_with_store(model.clone(), store);
        let id = analyzed_document(&manager).await;
        manager.start_session(&id, None, false).await.unwrap();
        manager
            .save_answer(&id, "personas_roles", "Admin: Jane", false)
            .await
            .unwrap();
        manager.build_document(&id).await.unwrap();
        id
    };

    let store = Arc::new(SqliteStore::connect(&url).await.unwrap());
    let manager = manager_with_store(model.clone(), store);

    assert_eq!(manager.session_status(&id).await.unwrap(), SessionStatus::InProgress);
    let document = manager.latest_document(&id).await.unwrap();
    assert_eq!(
        document.section(SectionKey::PersonasRoles).unwrap().resolved,
        "Admin: Jane"
    );

    let calls = model.calls(Route::Questions);
    let view = manager.start_session(&id, None, false).await.unwrap();
    assert!(view.from_cache);
    assert_eq!(model.calls(Route::Questions), calls);
    println!("✓ Session, cache and assembled document persisted in SQLite");
}
