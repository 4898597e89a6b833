#![allow(unused_imports, dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use hark_core::config::AssistantConfig;
use hark_core::error::{HarkError, Result};
use hark_core::llm::{ChatMessage, ChatModel, Completion, ToolCall};
use hark_core::model::{ActiveTimer, TimerRecord};
use hark_core::storage::{SqliteStorage, TimerStore};
use hark_core::tools::ToolDefinition;
use hark_core::CommandService;

/// A chat model that replays a fixed script of completions and records
/// every conversation it was shown.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<Completion>>>,
    repeat: Option<Completion>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    offered_tools: Mutex<Vec<usize>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Completion>) -> Self {
        Self::with_results(script.into_iter().map(Ok).collect())
    }

    pub fn with_results(script: Vec<Result<Completion>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
            offered_tools: Mutex::new(Vec::new()),
        }
    }

    /// Answers every round with the same completion.
    pub fn repeating(completion: Completion) -> Self {
        Self {
            repeat: Some(completion),
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The messages submitted on call `n` (0-based).
    pub fn request(&self, n: usize) -> Vec<ChatMessage> {
        self.requests.lock().unwrap()[n].clone()
    }

    pub fn offered_tools(&self) -> Vec<usize> {
        self.offered_tools.lock().unwrap().clone()
    }
}

impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<Completion> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.offered_tools.lock().unwrap().push(tools.len());

        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.repeat) {
            (Some(result), _) => result,
            (None, Some(completion)) => Ok(completion.clone()),
            (None, None) => Err(HarkError::Llm("script exhausted".into())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// In-memory SQLite store that counts every operation.
pub struct CountingStore {
    inner: SqliteStorage,
    ops: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStorage::open_in_memory().expect("in-memory store"),
            ops: AtomicUsize::new(0),
        }
    }

    pub fn ops(&self) -> usize {
        self.ops.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.ops.fetch_add(1, Ordering::SeqCst);
    }
}

impl TimerStore for CountingStore {
    async fn create(&self, duration_seconds: u32, label: Option<String>) -> Result<TimerRecord> {
        self.tick();
        self.inner.create(duration_seconds, label).await
    }

    async fn list_active_at(&self, now: DateTime<Utc>) -> Result<Vec<ActiveTimer>> {
        self.tick();
        self.inner.list_active_at(now).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<TimerRecord>> {
        self.tick();
        self.inner.find_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        self.tick();
        self.inner.delete(id).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}

/// A store whose every operation fails with an I/O error.
pub struct FailingStore;

fn io_error() -> HarkError {
    HarkError::Storage("disk I/O error".into())
}

impl TimerStore for FailingStore {
    async fn create(&self, _duration_seconds: u32, _label: Option<String>) -> Result<TimerRecord> {
        Err(io_error())
    }

    async fn list_active_at(&self, _now: DateTime<Utc>) -> Result<Vec<ActiveTimer>> {
        Err(io_error())
    }

    async fn find_by_id(&self, _id: i64) -> Result<Option<TimerRecord>> {
        Err(io_error())
    }

    async fn delete(&self, _id: i64) -> Result<bool> {
        Err(io_error())
    }

    async fn count(&self) -> Result<usize> {
        Err(io_error())
    }
}

pub fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

/// A single-call tool round.
pub fn tool_round(id: &str, name: &str, arguments: &str) -> Completion {
    Completion::tool_calls(vec![call(id, name, arguments)])
}

pub fn service(
    script: Vec<Completion>,
) -> CommandService<ScriptedModel, CountingStore> {
    CommandService::new(
        ScriptedModel::new(script),
        CountingStore::new(),
        AssistantConfig::default(),
    )
}

pub fn service_with(
    model: ScriptedModel,
    settings: AssistantConfig,
) -> CommandService<ScriptedModel, CountingStore> {
    CommandService::new(model, CountingStore::new(), settings)
}
