//! Lifecycle state shared by the process and application layers

use serde::{Deserialize, Serialize};

/// Terminal or running state of a spawned process.
///
/// Once a process leaves `Running` it never goes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessStatus {
    #[default]
    Running,
    /// Exited on its own (or after a handled signal) with an exit code
    Finished { code: i32 },
    /// Terminated by a signal; the OS reported no exit code
    Killed { signal: Option<i32> },
}

impl ProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_running()
    }

    /// Exit code, if the process finished with one
    pub fn code(&self) -> Option<i32> {
        match self {
            ProcessStatus::Finished { code } => Some(*code),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code() == Some(0)
    }
}

/// Observable state of the supervised application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    /// No process was ever created
    Idle,
    /// A process exists and is alive
    Running,
    /// The process exited or was killed
    Stopped,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::Idle => "idle",
            AppStatus::Running => "running",
            AppStatus::Stopped => "stopped",
        }
    }
}
