//! Domain event definitions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event name the dev server emits once the app is ready
pub const APP_STARTED: &str = "app.started";

/// Event name the dev server emits while building / reloading
pub const APP_PROGRESS: &str = "app.progress";

// ─────────────────────────────────────────────────────────
// Process Output
// ─────────────────────────────────────────────────────────

/// One entry of a process's output log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputEvent {
    Stdout { text: String },
    Stderr { text: String },
    Exit { code: Option<i32> },
}

impl OutputEvent {
    /// Text of a stdout/stderr chunk
    pub fn text(&self) -> Option<&str> {
        match self {
            OutputEvent::Stdout { text } | OutputEvent::Stderr { text } => Some(text),
            OutputEvent::Exit { .. } => None,
        }
    }
}

/// Serialisable view of everything a process has produced so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSnapshot {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit_code: Option<i32>,
    pub finished: bool,
}

impl OutputSnapshot {
    pub fn stdout_text(&self) -> String {
        self.stdout.join("\n")
    }

    pub fn stderr_text(&self) -> String {
        self.stderr.join("\n")
    }
}

// ─────────────────────────────────────────────────────────
// Dev-server Sub-protocol
// ─────────────────────────────────────────────────────────

/// A decoded event from the dev server's `[{"event": .., "params": {..}}]` lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolEvent {
    pub event: String,
    pub params: Map<String, Value>,
}

impl ProtocolEvent {
    /// The app id this event correlates to, if it carries one
    pub fn app_id(&self) -> Option<&str> {
        self.params.get("appId").and_then(Value::as_str)
    }

    pub fn is_app_started(&self) -> bool {
        self.event == APP_STARTED
    }

    /// `app.progress` with `finished: true` marks the end of a reload
    pub fn is_progress_finished(&self) -> bool {
        self.event == APP_PROGRESS && self.params.get("finished") == Some(&Value::Bool(true))
    }
}

// ─────────────────────────────────────────────────────────
// Broadcast Messages
// ─────────────────────────────────────────────────────────

/// Event names delivered to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BroadcastEvent {
    #[serde(rename = "app:info")]
    AppInfo,
    #[serde(rename = "app:error")]
    AppError,
    #[serde(rename = "app:exit")]
    AppExit,
}

/// A structured message fanned out to every open subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub event: BroadcastEvent,
    pub params: Map<String, Value>,
}

impl BroadcastMessage {
    pub fn new(event: BroadcastEvent, params: Map<String, Value>) -> Self {
        Self {
            id: None,
            event,
            params,
        }
    }

    /// Unstructured output line from the app
    pub fn app_info_text(message: impl Into<String>) -> Self {
        let mut params = Map::new();
        params.insert("message".to_string(), Value::String(message.into()));
        Self::new(BroadcastEvent::AppInfo, params)
    }

    /// A decoded protocol event, flattened as `{event, ...params}`
    pub fn app_event(event: &ProtocolEvent) -> Self {
        let mut params = Map::new();
        params.insert("event".to_string(), Value::String(event.event.clone()));
        for (key, value) in &event.params {
            params.insert(key.clone(), value.clone());
        }
        Self::new(BroadcastEvent::AppInfo, params)
    }

    pub fn app_error(error: impl Into<String>) -> Self {
        let mut params = Map::new();
        params.insert("error".to_string(), Value::String(error.into()));
        Self::new(BroadcastEvent::AppError, params)
    }

    pub fn app_exit(code: Option<i32>, error: Option<String>) -> Self {
        let mut params = Map::new();
        params.insert("code".to_string(), code.map_or(Value::Null, Value::from));
        params.insert("error".to_string(), error.map_or(Value::Null, Value::String));
        Self::new(BroadcastEvent::AppExit, params)
    }
}
