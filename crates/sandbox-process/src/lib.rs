//! # sandbox-process - Process Supervision
//!
//! Spawns shell commands in their own process group, captures their output
//! line by line and exposes async wait primitives that race readiness,
//! exit and deadlines. Also speaks the dev server's stdin/stdout protocol.
//!
//! Depends on [`sandbox_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Process Management
//! - [`ProcessSupervisor`] - Spawn commands through the platform shell
//! - [`SpawnOptions`] - Command, working directory and stream callbacks
//! - [`ManagedProcess`] - Wait, write stdin, kill the process group
//! - [`ProcessOutput`] - Ordered, append-only output log
//! - [`KillSignal`] - Graceful (SIGTERM) or forced (SIGKILL) termination
//!
//! ### Dev-server Protocol
//! - [`parse_protocol_line()`] - Decode an `[{"event", "params"}]` stdout line
//! - [`AppCommand`] - `app.restart` / `app.stop` requests
//! - [`RequestIds`] - Per-owner request id sequence

pub mod commands;
pub mod kill;
pub mod output;
pub mod process;
pub mod protocol;
pub mod supervisor;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Public API re-exports
pub use commands::{AppCommand, RequestIds};
pub use kill::KillSignal;
pub use output::ProcessOutput;
pub use process::ManagedProcess;
pub use protocol::{line_has_event, parse_protocol_line};
pub use supervisor::{ChunkCallback, ExitCallback, ProcessSupervisor, SpawnOptions};
