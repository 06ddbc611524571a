// ABOUTME: Common test utilities for pipeline integration tests
// ABOUTME: Scripted language model routed by prompt, with call counting, plus manager setup helpers

#![allow(dead_code)]

use async_trait::async_trait;
use docforge_ai::{AIServiceError, AIServiceResult, CompletionRequest, LanguageModel};
use docforge_config::PipelineConfig;
use docforge_pipeline::{DocumentManager, SourceFile, WorkspaceManager};
use docforge_prompts::PromptManager;
use docforge_storage::{MemoryStore, RecordKind, StorageError, StorageResult, Store};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source material used across the suites
pub const SOURCE: &str = "Ledger is a bookkeeping tool for SMB retailers. \
Feature X integrates with payment gateway Y. \
Checkout must answer within 300 ms. \
Finance teams reconcile payouts every Friday.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Language,
    Workspace,
    Extraction,
    Questions,
    Format,
    Summary,
    Backlog,
}

impl Route {
    const ORDER: [Route; 7] = [
        Route::Language,
        Route::Workspace,
        Route::Extraction,
        Route::Questions,
        Route::Format,
        Route::Summary,
        Route::Backlog,
    ];

    fn phrase(&self) -> &'static str {
        match self {
            Route::Language => "Identify the language",
            Route::Workspace => "combined material of the workspace",
            Route::Extraction => "copy the facts",
            Route::Questions => "Write one clarifying question",
            Route::Format => "Reformat the content",
            Route::Summary => "Summarize the differences",
            Route::Backlog => "engineering backlog",
        }
    }

    fn of(prompt: &str) -> Option<Route> {
        Route::ORDER.into_iter().find(|r| prompt.contains(r.phrase()))
    }
}

pub enum Reply {
    Text(String),
    Fail,
}

/// Deterministic stand-in for the language model.
///
/// Queued replies are consumed first; otherwise the route's default applies.
/// Questions default to one per requested section, formatting echoes its input.
#[derive(Default)]
pub struct FakeModel {
    queued: Mutex<HashMap<Route, VecDeque<Reply>>>,
    defaults: Mutex<HashMap<Route, String>>,
    calls: Mutex<Vec<(Route, CompletionRequest)>>,
}

impl FakeModel {
    pub fn new() -> Arc<Self> {
        let model = Self::default();
        model.set_default(Route::Language, json!({"language_code": "en"}).to_string());
        model.set_default(Route::Extraction, default_extraction().to_string());
        model.set_default(Route::Summary, "A risks section was added.".to_string());
        model.set_default(
            Route::Backlog,
            json!({"items": [
                {"issue_type": "Epic", "summary": "Payments", "description": "Gateway Y", "priority": "High", "story_points": 13},
                {"issue_type": "Story", "summary": "Weekly reconciliation", "priority": "Medium", "story_points": 5}
            ]})
            .to_string(),
        );
        model.set_default(
            Route::Workspace,
            json!({"executive_summary": "Ledger suite", "technical_risks": ["Risk A"]}).to_string(),
        );
        Arc::new(model)
    }

    pub fn set_default(&self, route: Route, reply: impl Into<String>) {
        self.defaults.lock().unwrap().insert(route, reply.into());
    }

    pub fn queue(&self, route: Route, reply: Reply) {
        self.queued
            .lock()
            .unwrap()
            .entry(route)
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self, route: Route) -> usize {
        self.calls.lock().unwrap().iter().filter(|(r, _)| *r == route).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn requests(&self, route: Route) -> Vec<CompletionRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == route)
            .map(|(_, req)| req.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn complete(&self, request: CompletionRequest) -> AIServiceResult<String> {
        let route = Route::of(&request.user_prompt)
            .ok_or_else(|| AIServiceError::ApiError("unroutable prompt".to_string()))?;
        self.calls.lock().unwrap().push((route, request.clone()));

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&route)
            .and_then(|q| q.pop_front());
        match queued {
            Some(Reply::Text(text)) => return Ok(text),
            Some(Reply::Fail) => return Err(AIServiceError::ApiError("scripted failure".to_string())),
            None => {}
        }

        match route {
            Route::Questions => Ok(questions_for(&request.user_prompt)),
            Route::Format => Ok(echo_content(&request.user_prompt)),
            _ => Ok(self
                .defaults
                .lock()
                .unwrap()
                .get(&route)
                .cloned()
                .unwrap_or_default()),
        }
    }
}

/// Extraction reply for SOURCE: solution overview and requirements, nothing about roles
pub fn default_extraction() -> serde_json::Value {
    json!({
        "product_name": "Ledger",
        "extracted_info": {
            "business_context": "Ledger is a bookkeeping tool for SMB retailers.",
            "solution_overview": "Feature X integrates with payment gateway Y.",
            "technical_requirements": "Checkout must answer within 300 ms.",
            "functional_requirements": "Finance teams reconcile payouts every Friday."
        },
        "confidence_scores": {
            "business_context": 1.0,
            "solution_overview": 1.0,
            "technical_requirements": 1.0,
            "functional_requirements": 0.8
        },
        "explicit_features": ["Feature X"],
        "inferred_features": []
    })
}

fn questions_for(prompt: &str) -> String {
    let questions: Vec<serde_json::Value> = prompt
        .lines()
        .filter_map(|line| line.strip_prefix("- "))
        .filter_map(|rest| rest.split_once(" ("))
        .map(|(key, _)| key)
        .filter(|key| !key.is_empty() && key.chars().all(|c| c.is_ascii_lowercase() || c == '_'))
        .map(|key| {
            json!({
                "section_key": key,
                "question": format!("What should we know about {}?", key.replace('_', " ")),
                "context": "Needed for the document"
            })
        })
        .collect();
    json!({ "questions": questions }).to_string()
}

fn echo_content(prompt: &str) -> String {
    prompt
        .split("CONTENT:\n")
        .nth(1)
        .and_then(|rest| rest.split("\n\nRespond").next())
        .unwrap_or_default()
        .to_string()
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        model_timeout: Duration::from_secs(5),
        ..PipelineConfig::default()
    }
}

pub fn manager_with_store(model: Arc<FakeModel>, store: Arc<dyn Store>) -> DocumentManager {
    DocumentManager::new(store, model, PromptManager::builtin().unwrap(), &test_config())
}

pub fn manager(model: Arc<FakeModel>) -> DocumentManager {
    manager_with_store(model, Arc::new(MemoryStore::new()))
}

pub fn workspace_manager(model: Arc<FakeModel>) -> WorkspaceManager {
    WorkspaceManager::new(Arc::new(manager(model)))
}

pub fn workspace_manager_with_store(model: Arc<FakeModel>, store: Arc<dyn Store>) -> WorkspaceManager {
    WorkspaceManager::new(Arc::new(manager_with_store(model, store)))
}

/// In-memory store whose document saves fail for one chosen id
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<Option<String>>,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_document(&self, id: Option<&str>) {
        *self.failing.lock().unwrap() = id.map(str::to_string);
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn load(&self, kind: RecordKind, id: &str) -> StorageResult<Option<serde_json::Value>> {
        self.inner.load(kind, id).await
    }

    async fn save(&self, kind: RecordKind, id: &str, record: &serde_json::Value) -> StorageResult<()> {
        let failing = self.failing.lock().unwrap().clone();
        if kind == RecordKind::Document && failing.as_deref() == Some(id) {
            return Err(StorageError::InvalidInput(format!("scripted save failure for {}", id)));
        }
        self.inner.save(kind, id, record).await
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> StorageResult<bool> {
        self.inner.delete(kind, id).await
    }

    async fn list(&self, kind: RecordKind) -> StorageResult<Vec<(String, serde_json::Value)>> {
        self.inner.list(kind).await
    }
}

pub fn source(name: &str, text: &str) -> SourceFile {
    SourceFile::text(name, text).unwrap()
}

/// Create a document and run it through ingestion and gap analysis
pub async fn analyzed_document(manager: &DocumentManager) -> String {
    let record = manager.create_document("Ledger").await.unwrap();
    manager
        .process_inputs(&record.id, &[source("brief.txt", SOURCE)])
        .await
        .unwrap();
    manager.analyze_gaps(&record.id).await.unwrap();
    record.id
}
