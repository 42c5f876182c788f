// Copyright (c) 2026 TunaCode Contributors
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;
use uuid::Uuid;

use tunacode_config::Settings;
use tunacode_model::{from_transport, to_transport, Message, UsageMetrics};

// ─── Tool-call tracking ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
    Cancelled,
}

/// Mutable tracking record for one tool call.  The message part with the
/// same id stays immutable; this record is where status and result live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub args: Value,
    pub status: ToolCallStatus,
    pub result: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Single source of truth for tool-call state, keyed by call id.
///
/// Models occasionally reuse an id within one response; `register` keeps
/// both calls by appending a positional suffix to the colliding key and
/// returns the effective key for later status updates.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ToolCallRegistry {
    records: HashMap<String, ToolCallRecord>,
    order: Vec<String>,
}

impl ToolCallRegistry {
    pub fn register(&mut self, id: &str, name: &str, args: Value) -> String {
        let mut key = id.to_string();
        if self.records.contains_key(&key) {
            key = format!("{id}#{}", self.order.len());
        }
        self.records.insert(
            key.clone(),
            ToolCallRecord {
                id: id.to_string(),
                name: name.to_string(),
                args,
                status: ToolCallStatus::Pending,
                result: None,
                started_at: None,
                completed_at: None,
            },
        );
        self.order.push(key.clone());
        key
    }

    pub fn get(&self, key: &str) -> Option<&ToolCallRecord> {
        self.records.get(key)
    }

    pub fn start(&mut self, key: &str) {
        if let Some(rec) = self.records.get_mut(key) {
            rec.status = ToolCallStatus::InFlight;
            rec.started_at = Some(Utc::now());
        }
    }

    pub fn complete(&mut self, key: &str, result: impl Into<String>) {
        if let Some(rec) = self.records.get_mut(key) {
            rec.status = ToolCallStatus::Completed;
            rec.result = Some(result.into());
            rec.completed_at = Some(Utc::now());
        }
    }

    pub fn fail(&mut self, key: &str, error: impl Into<String>) {
        if let Some(rec) = self.records.get_mut(key) {
            rec.status = ToolCallStatus::Failed;
            rec.result = Some(error.into());
            rec.completed_at = Some(Utc::now());
        }
    }

    pub fn cancel(&mut self, key: &str) {
        if let Some(rec) = self.records.get_mut(key) {
            rec.status = ToolCallStatus::Cancelled;
            rec.completed_at = Some(Utc::now());
        }
    }

    /// Mark every pending or in-flight record cancelled.  Returns the
    /// affected keys so the caller can append matching tool returns.
    pub fn cancel_open(&mut self) -> Vec<String> {
        let open: Vec<String> = self
            .order
            .iter()
            .filter(|k| {
                matches!(
                    self.records.get(*k).map(|r| r.status),
                    Some(ToolCallStatus::Pending) | Some(ToolCallStatus::InFlight)
                )
            })
            .cloned()
            .collect();
        for key in &open {
            self.cancel(key);
        }
        open
    }

    /// All records in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolCallRecord> {
        self.order.iter().filter_map(|k| self.records.get(k))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ─── Todos ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
}

// ─── ReAct scratchpad ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReActKind {
    Thought,
    Action,
    Observation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReActEntry {
    pub kind: ReActKind,
    pub content: String,
}

/// Ordered Thought/Action/Observation log for the current turn.  Never sent
/// back to the model on subsequent turns.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ReActScratchpad {
    pub entries: Vec<ReActEntry>,
}

impl ReActScratchpad {
    pub fn push(&mut self, kind: ReActKind, content: impl Into<String>) {
        self.entries.push(ReActEntry { kind, content: content.into() });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ─── Cancellation ─────────────────────────────────────────────────────────────

/// Clonable cancellation handle shared between the session, the UI task
/// that triggers cancellation, and in-flight tool tasks.
///
/// The atomic flag is what the orchestrator polls between nodes; the watch
/// channel is what parallel tool tasks select against.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    tx: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { flag: Arc::new(AtomicBool::new(false)), tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
        let _ = self.tx.send(false);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Runtime flags ────────────────────────────────────────────────────────────

/// Per-turn mutable facts that are not conversation content.
#[derive(Debug, Clone)]
pub struct RuntimeState {
    pub cancel: CancelSignal,
    pub plan_mode: bool,
    pub yolo: bool,
    pub current_iteration: u32,
    pub iteration_count: u32,
    pub current_model: String,
    pub run_id: String,
    pub is_streaming_active: bool,
}

impl RuntimeState {
    fn from_settings(settings: &Settings) -> Self {
        Self {
            cancel: CancelSignal::new(),
            plan_mode: settings.plan_mode,
            yolo: settings.yolo,
            current_iteration: 0,
            iteration_count: 0,
            current_model: settings.default_model.clone(),
            run_id: Uuid::new_v4().to_string(),
            is_streaming_active: false,
        }
    }

    pub fn operation_cancelled(&self) -> bool {
        self.cancel.is_triggered()
    }
}

// ─── Session ──────────────────────────────────────────────────────────────────

/// The root aggregate owned by the orchestrator for the duration of a turn.
///
/// Background tasks never write to `messages`, `tool_calls`, `todos`,
/// `usage`, or `react`; they only read immutable config.
#[derive(Debug)]
pub struct Session {
    pub messages: Vec<Message>,
    pub tool_calls: ToolCallRegistry,
    pub todos: Vec<TodoItem>,
    pub usage: UsageMetrics,
    pub react: ReActScratchpad,
    pub runtime: RuntimeState,
    pub settings: Arc<Settings>,
}

impl Session {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            messages: Vec::new(),
            tool_calls: ToolCallRegistry::default(),
            todos: Vec::new(),
            usage: UsageMetrics::default(),
            react: ReActScratchpad::default(),
            runtime: RuntimeState::from_settings(&settings),
            settings,
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// Signal cancellation of the running turn.  The orchestrator polls the
    /// flag between nodes and in-flight tools observe the watch channel.
    pub fn cancel(&self) {
        self.runtime.cancel.trigger();
    }

    /// Clonable cancellation handle for a UI task that outlives the borrow
    /// on the session (e.g. the escape-key listener).
    pub fn cancel_handle(&self) -> CancelSignal {
        self.runtime.cancel.clone()
    }

    /// Serialize the restorable state as JSON.  Messages use the canonical
    /// transport shape so snapshots survive model-provider changes.
    pub fn snapshot(&self) -> Value {
        json!({
            "version": 1,
            "messages": self.messages.iter().map(to_transport).collect::<Vec<_>>(),
            "todos": self.todos,
            "usage": self.usage,
        })
    }

    /// Rebuild a session from a [`Session::snapshot`] value.  Unparseable
    /// messages are skipped rather than failing the whole restore.
    pub fn restore(settings: Arc<Settings>, snapshot: &Value) -> Self {
        let mut session = Self::new(settings);
        if let Some(raw_msgs) = snapshot.get("messages").and_then(Value::as_array) {
            for raw in raw_msgs {
                match from_transport(raw) {
                    Ok(msg) => session.messages.push(msg),
                    Err(e) => tracing::warn!("skipping unparseable snapshot message: {e}"),
                }
            }
        }
        if let Some(todos) = snapshot.get("todos") {
            if let Ok(todos) = serde_json::from_value::<Vec<TodoItem>>(todos.clone()) {
                session.todos = todos;
            }
        }
        if let Some(usage) = snapshot.get("usage") {
            if let Ok(usage) = serde_json::from_value::<UsageMetrics>(usage.clone()) {
                session.usage = usage;
            }
        }
        session
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
