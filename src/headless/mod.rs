//! Headless mode - NDJSON control loop on stdin/stdout
//!
//! Commands are read line by line from stdin (`start`, `reload`, `stop`,
//! `status`, `output`, `exec <command>`, `quit`). Every outcome is written to
//! stdout as one JSON object per line, with an "event" field naming it.
//!
//! # Example Output
//!
//! ```json
//! {"event":"server_listening","address":"127.0.0.1:3000","timestamp":1704700001000}
//! {"event":"app_started","app_id":"abc-123","timestamp":1704700002000}
//! {"event":"app_reloaded","app_id":"abc-123","duration_ms":850,"timestamp":1704700003000}
//! ```

pub mod runner;

pub use runner::{run_headless, HeadlessCommand, HeadlessRunner};

use chrono::Utc;
use sandbox_core::prelude::*;
use sandbox_core::{AppStatus, OutputSnapshot};
use serde::Serialize;
use std::io::{self, Write};

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// WebSocket transport accepting clients
    ServerListening { address: String, timestamp: i64 },

    /// Dependencies fetched before boot
    DependenciesInstalled { runtime: String, timestamp: i64 },

    /// App process launched (and ready, when started with wait)
    AppStarted {
        app_id: Option<String>,
        timestamp: i64,
    },

    /// Full restart finished
    AppReloaded {
        app_id: Option<String>,
        duration_ms: u64,
        timestamp: i64,
    },

    /// App process ended
    AppStopped {
        exit_code: Option<i32>,
        timestamp: i64,
    },

    Status {
        status: AppStatus,
        app_id: Option<String>,
        timestamp: i64,
    },

    /// Captured output of the current app process
    Output {
        output: Option<OutputSnapshot>,
        timestamp: i64,
    },

    /// One-shot command ran to completion
    CommandCompleted {
        command: String,
        output: OutputSnapshot,
        timestamp: i64,
    },

    Error {
        message: String,
        code: String,
        fatal: bool,
        timestamp: i64,
    },

    ShuttingDown { timestamp: i64 },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn server_listening(address: &str) -> Self {
        Self::ServerListening {
            address: address.to_string(),
            timestamp: Self::now(),
        }
    }

    pub fn dependencies_installed(runtime: &str) -> Self {
        Self::DependenciesInstalled {
            runtime: runtime.to_string(),
            timestamp: Self::now(),
        }
    }

    pub fn app_started(app_id: Option<String>) -> Self {
        Self::AppStarted {
            app_id,
            timestamp: Self::now(),
        }
    }

    pub fn app_reloaded(app_id: Option<String>, duration_ms: u64) -> Self {
        Self::AppReloaded {
            app_id,
            duration_ms,
            timestamp: Self::now(),
        }
    }

    pub fn app_stopped(exit_code: Option<i32>) -> Self {
        Self::AppStopped {
            exit_code,
            timestamp: Self::now(),
        }
    }

    pub fn status(status: AppStatus, app_id: Option<String>) -> Self {
        Self::Status {
            status,
            app_id,
            timestamp: Self::now(),
        }
    }

    pub fn output(output: Option<OutputSnapshot>) -> Self {
        Self::Output {
            output,
            timestamp: Self::now(),
        }
    }

    pub fn command_completed(command: &str, output: OutputSnapshot) -> Self {
        Self::CommandCompleted {
            command: command.to_string(),
            output,
            timestamp: Self::now(),
        }
    }

    pub fn error(message: String, fatal: bool) -> Self {
        Self::Error {
            message,
            code: "INTERNAL_ERROR".to_string(),
            fatal,
            timestamp: Self::now(),
        }
    }

    /// Error event carrying the error's stable code
    pub fn from_error(err: &Error) -> Self {
        Self::Error {
            message: err.to_string(),
            code: err.error_code().to_string(),
            fatal: err.is_fatal(),
            timestamp: Self::now(),
        }
    }

    pub fn shutting_down() -> Self {
        Self::ShuttingDown {
            timestamp: Self::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox_core::AppOperation;

    fn to_value(event: &HeadlessEvent) -> serde_json::Value {
        let json = serde_json::to_string(event).expect("serialization failed");
        serde_json::from_str(&json).expect("invalid JSON")
    }

    #[test]
    fn test_app_started_serialization() {
        let value = to_value(&HeadlessEvent::app_started(Some("abc".to_string())));

        assert_eq!(value["event"], "app_started");
        assert_eq!(value["app_id"], "abc");
        assert!(value["timestamp"].is_number());
    }

    #[test]
    fn test_app_reloaded_serialization() {
        let value = to_value(&HeadlessEvent::app_reloaded(None, 1250));

        assert_eq!(value["event"], "app_reloaded");
        assert!(value["app_id"].is_null());
        assert_eq!(value["duration_ms"], 1250);
    }

    #[test]
    fn test_status_serialization() {
        let value = to_value(&HeadlessEvent::status(AppStatus::Running, None));

        assert_eq!(value["event"], "status");
        assert_eq!(value["status"], "running");
    }

    #[test]
    fn test_command_completed_serialization() {
        let output = OutputSnapshot {
            stdout: vec!["ok".to_string()],
            exit_code: Some(0),
            finished: true,
            ..OutputSnapshot::default()
        };
        let value = to_value(&HeadlessEvent::command_completed("ls", output));

        assert_eq!(value["event"], "command_completed");
        assert_eq!(value["command"], "ls");
        assert_eq!(value["output"]["stdout"][0], "ok");
        assert_eq!(value["output"]["exitCode"], 0);
    }

    #[test]
    fn test_error_from_domain_error() {
        let err = Error::AppNotRunning {
            operation: AppOperation::Reload,
        };
        let value = to_value(&HeadlessEvent::from_error(&err));

        assert_eq!(value["event"], "error");
        assert_eq!(value["code"], "APP_NOT_RUNNING");
        assert_eq!(value["fatal"], false);
    }
}
