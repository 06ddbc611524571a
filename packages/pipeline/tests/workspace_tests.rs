// ABOUTME: Workspace tests: merged analyses across runs, propagation into children and cascading deletes
// ABOUTME: Analyses come from the scripted model so merge results are exact

mod common;

use common::{source, workspace_manager, workspace_manager_with_store, FakeModel, FlakyStore, Route, SOURCE};
use docforge_pipeline::{ErrorKind, PipelineError};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_reanalysis_merges_new_first() {
    let model = FakeModel::new();
    let workspaces = workspace_manager(model.clone());
    let workspace = workspaces.create_workspace("Retail suite", "").await.unwrap();
    assert_eq!(workspace.analysis_version, 0);
    workspaces
        .add_context_files(&workspace.id, &[source("brief.txt", SOURCE)])
        .await
        .unwrap();

    let first = workspaces.analyze_workspace(&workspace.id).await.unwrap();
    assert_eq!(first.technical_risks, vec!["Risk A"]);

    model.set_default(
        Route::Workspace,
        json!({"executive_summary": "", "technical_risks": ["Risk B"]}).to_string(),
    );
    workspaces
        .add_context_files(&workspace.id, &[source("risks.txt", "Risk B")])
        .await
        .unwrap();
    let merged = workspaces.analyze_workspace(&workspace.id).await.unwrap();
    assert_eq!(merged.technical_risks, vec!["Risk B", "Risk A"]);
    assert_eq!(merged.executive_summary, "Ledger suite");

    let again = workspaces.analyze_workspace(&workspace.id).await.unwrap();
    assert_eq!(again.technical_risks, vec!["Risk B", "Risk A"]);
    assert_eq!(
        workspaces.get_workspace(&workspace.id).await.unwrap().analysis_version,
        3
    );
    println!("✓ Workspace analyses merge new-first without duplicates");
}

#[tokio::test]
async fn test_analysis_propagates_to_children() {
    let model = FakeModel::new();
    let workspaces = workspace_manager(model.clone());
    let workspace = workspaces.create_workspace("Retail suite", "").await.unwrap();
    let child = workspaces
        .create_child_document(&workspace.id, "Checkout")
        .await
        .unwrap();
    workspaces
        .documents()
        .process_inputs(&child.id, &[source("a.txt", SOURCE)])
        .await
        .unwrap();

    workspaces.analyze_workspace(&workspace.id).await.unwrap();
    let record = workspaces.documents().get_record(&child.id).await.unwrap();
    assert!(!record.propagated.is_empty());
    assert!(record.propagated.iter().all(|e| e.source_version == 1));

    workspaces.analyze_workspace(&workspace.id).await.unwrap();
    let record = workspaces.documents().get_record(&child.id).await.unwrap();
    assert!(record.propagated.iter().all(|e| e.source_version == 2));

    workspaces.documents().analyze_gaps(&child.id).await.unwrap();
    let requests = model.requests(Route::Extraction);
    let last = requests.last().unwrap();
    assert!(last.user_prompt.contains("Workspace Context (analysis v2)"));
    println!("✓ Children carry only the latest propagated analysis");
}

#[tokio::test]
async fn test_failed_propagation_keeps_workspace_version() {
    let store = FlakyStore::new();
    let workspaces = workspace_manager_with_store(FakeModel::new(), store.clone());
    let workspace = workspaces.create_workspace("Retail suite", "").await.unwrap();
    workspaces
        .add_context_files(&workspace.id, &[source("brief.txt", SOURCE)])
        .await
        .unwrap();
    let a = workspaces.create_child_document(&workspace.id, "Checkout").await.unwrap();
    let b = workspaces.create_child_document(&workspace.id, "Payouts").await.unwrap();

    store.fail_document(Some(&b.id));
    let err = workspaces.analyze_workspace(&workspace.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    let stale = workspaces.get_workspace(&workspace.id).await.unwrap();
    assert_eq!(stale.analysis_version, 0);
    assert!(stale.analysis.is_none());

    store.fail_document(None);
    workspaces.analyze_workspace(&workspace.id).await.unwrap();
    assert_eq!(
        workspaces.get_workspace(&workspace.id).await.unwrap().analysis_version,
        1
    );
    for child in [&a.id, &b.id] {
        let record = workspaces.documents().get_record(child).await.unwrap();
        assert!(!record.propagated.is_empty());
        assert!(record.propagated.iter().all(|e| e.source_version == 1));
    }
    println!("✓ A failed child save leaves the workspace version untouched");
}

#[tokio::test]
async fn test_add_existing_document_as_child() {
    let workspaces = workspace_manager(FakeModel::new());
    let first = workspaces.create_workspace("One", "").await.unwrap();
    let second = workspaces.create_workspace("Two", "").await.unwrap();
    let document = workspaces.documents().create_document("Loose").await.unwrap();

    let updated = workspaces.add_child(&first.id, &document.id).await.unwrap();
    assert_eq!(updated.children, vec![document.id.clone()]);

    let err = workspaces.add_child(&second.id, &document.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn test_delete_child_updates_workspace() {
    let workspaces = workspace_manager(FakeModel::new());
    let workspace = workspaces.create_workspace("Retail suite", "").await.unwrap();
    let child = workspaces
        .create_child_document(&workspace.id, "Checkout")
        .await
        .unwrap();

    assert!(workspaces.documents().delete_document(&child.id).await.unwrap());
    let workspace = workspaces.get_workspace(&workspace.id).await.unwrap();
    assert!(workspace.children.is_empty());
}

#[tokio::test]
async fn test_delete_workspace_cascades() {
    let workspaces = workspace_manager(FakeModel::new());
    let workspace = workspaces.create_workspace("Retail suite", "").await.unwrap();
    for name in ["Checkout", "Payouts"] {
        workspaces
            .create_child_document(&workspace.id, name)
            .await
            .unwrap();
    }

    assert!(workspaces.delete_workspace(&workspace.id).await.unwrap());
    assert!(workspaces.documents().list_documents().await.unwrap().is_empty());
    assert!(matches!(
        workspaces.get_workspace(&workspace.id).await,
        Err(PipelineError::WorkspaceNotFound(_))
    ));
    assert!(!workspaces.delete_workspace(&workspace.id).await.unwrap());
}

#[tokio::test]
async fn test_empty_workspace_cannot_be_analyzed() {
    let model = FakeModel::new();
    let workspaces = workspace_manager(model.clone());
    let workspace = workspaces.create_workspace("Empty", "").await.unwrap();

    let err = workspaces.analyze_workspace(&workspace.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    assert_eq!(model.calls(Route::Workspace), 0);
    assert_eq!(
        workspaces.get_workspace(&workspace.id).await.unwrap().analysis_version,
        0
    );
}
