//! Commands sent to the dev server over stdin

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Value};

/// Strictly increasing request ids, starting at 1.
///
/// Scoped to one owner; never reset, not even across app restarts.
#[derive(Debug)]
pub struct RequestIds {
    next: AtomicU64,
}

impl Default for RequestIds {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl RequestIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Why a restart was requested
pub const RESTART_REASON_MANUAL: &str = "manual";

/// Requests understood by the dev server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// app.restart; `full_restart` selects restart over hot reload
    Restart {
        app_id: Option<String>,
        full_restart: bool,
        pause: bool,
        reason: String,
    },
    /// app.stop
    Stop { app_id: Option<String> },
}

impl AppCommand {
    /// The restart issued by a supervisor reload
    pub fn reload(app_id: Option<String>) -> Self {
        AppCommand::Restart {
            app_id,
            full_restart: true,
            pause: false,
            reason: RESTART_REASON_MANUAL.to_string(),
        }
    }

    pub fn stop(app_id: Option<String>) -> Self {
        AppCommand::Stop { app_id }
    }

    pub fn method(&self) -> &'static str {
        match self {
            AppCommand::Restart { .. } => "app.restart",
            AppCommand::Stop { .. } => "app.stop",
        }
    }

    /// Build the JSON request object
    pub fn build(&self, id: u64) -> Value {
        let params = match self {
            AppCommand::Restart {
                app_id,
                full_restart,
                pause,
                reason,
            } => json!({
                "appId": app_id,
                "fullRestart": full_restart,
                "pause": pause,
                "reason": reason,
            }),
            AppCommand::Stop { app_id } => json!({ "appId": app_id }),
        };

        json!({
            "id": id,
            "method": self.method(),
            "params": params,
        })
    }

    /// Wire form: a one-element JSON array terminated by a newline
    pub fn to_line(&self, id: u64) -> String {
        format!("{}\n", Value::Array(vec![self.build(id)]))
    }
}
