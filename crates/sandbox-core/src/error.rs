//! Error types with enough context for callers to decide on remediation

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of waiting on a process that did not end in success.
///
/// Returned by the wait primitives of a managed process. Callers routinely
/// need to tell these apart (retry a start after a timeout, surface the exit
/// code after a crash), so this is a closed sum type rather than a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("timed out after {}ms", .timeout.as_millis())]
    Timeout { timeout: Duration },

    #[error("process exited with code {code:?}")]
    Exit { code: Option<i32> },
}

impl ProcessError {
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    pub fn exit(code: Option<i32>) -> Self {
        Self::Exit { code }
    }
}

/// Readiness-aware operations of the application supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppOperation {
    Init,
    Start,
    Reload,
    Stop,
}

impl AppOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppOperation::Init => "init",
            AppOperation::Start => "start",
            AppOperation::Reload => "reload",
            AppOperation::Stop => "stop",
        }
    }
}

impl fmt::Display for AppOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Process Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to spawn `{command}`: {reason}")]
    ProcessSpawn { command: String, reason: String },

    #[error("No stdin available for the process")]
    StdinUnavailable,

    #[error("Command `{command}` failed: {source}")]
    Command {
        command: String,
        #[source]
        source: ProcessError,
    },

    #[error("Required tool not found on PATH: {tool}")]
    ToolNotFound { tool: String },

    // ─────────────────────────────────────────────────────────────
    // Application Supervisor Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Another app is already running")]
    AppAlreadyRunning,

    #[error("Cannot {operation}: app is not running")]
    AppNotRunning { operation: AppOperation },

    #[error("No run command provided")]
    NoRunCommand,

    #[error("App {operation} failed: {source}")]
    AppOperation {
        operation: AppOperation,
        #[source]
        source: ProcessError,
    },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },

    // ─────────────────────────────────────────────────────────────
    // Channel/Transport Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel send error: {message}")]
    ChannelSend { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn process_spawn(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProcessSpawn {
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub fn command(command: impl Into<String>, source: ProcessError) -> Self {
        Self::Command {
            command: command.into(),
            source,
        }
    }

    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    pub fn app_operation(operation: AppOperation, source: ProcessError) -> Self {
        Self::AppOperation { operation, source }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// The wait outcome behind this error, if it came from a wait
    pub fn process_error(&self) -> Option<&ProcessError> {
        match self {
            Error::Command { source, .. } | Error::AppOperation { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Operation requested in a state that forbids it
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::AppAlreadyRunning
                | Error::AppNotRunning { .. }
                | Error::NoRunCommand
                | Error::StdinUnavailable
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.process_error(), Some(ProcessError::Timeout { .. }))
    }

    /// The deadline that elapsed, for timeout errors
    pub fn timeout(&self) -> Option<Duration> {
        match self.process_error() {
            Some(ProcessError::Timeout { timeout }) => Some(*timeout),
            _ => None,
        }
    }

    /// The exit code of a process that ended before the awaited condition.
    ///
    /// `Some(None)` means the process exited without a code (killed by a signal).
    pub fn exit_code(&self) -> Option<Option<i32>> {
        match self.process_error() {
            Some(ProcessError::Exit { code }) => Some(*code),
            _ => None,
        }
    }

    /// HTTP status an outer request layer should answer with
    pub fn status_code(&self) -> u16 {
        if self.is_precondition() {
            400
        } else if self.is_timeout() {
            504
        } else {
            500
        }
    }

    /// Stable machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::AppAlreadyRunning => "APP_ALREADY_RUNNING",
            Error::AppNotRunning { .. } => "APP_NOT_RUNNING",
            Error::NoRunCommand => "NO_RUN_COMMAND",
            Error::StdinUnavailable => "NO_STDIN",
            Error::AppOperation {
                source: ProcessError::Timeout { .. },
                ..
            } => "APP_TIMEOUT_ERROR",
            Error::AppOperation {
                source: ProcessError::Exit { .. },
                ..
            } => "APP_EXIT_ERROR",
            Error::Command {
                source: ProcessError::Timeout { .. },
                ..
            } => "COMMAND_TIMEOUT_ERROR",
            Error::Command {
                source: ProcessError::Exit { .. },
                ..
            } => "COMMAND_EXIT_ERROR",
            Error::ProcessSpawn { .. } => "PROCESS_SPAWN_ERROR",
            Error::ToolNotFound { .. } => "TOOL_NOT_FOUND",
            Error::Config { .. } | Error::ConfigInvalid { .. } => "CONFIG_ERROR",
            Error::ChannelSend { .. } | Error::Transport { .. } => "TRANSPORT_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
        }
    }

    /// Check if this error should abort the server at boot
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::ConfigInvalid { .. })
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }
}
