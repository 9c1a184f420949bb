//! # sandbox-core - Core Domain Types
//!
//! Foundation crate for the sandbox server. Provides the error taxonomy,
//! lifecycle state, event definitions and logging setup shared by the
//! process and application layers.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Lifecycle State (`types`)
//! - [`ProcessStatus`] - Running, finished with a code, or killed by a signal
//! - [`AppStatus`] - Idle, running or stopped application
//!
//! ### Events (`events`)
//! - [`OutputEvent`] - One entry of a process's ordered output log
//! - [`ProtocolEvent`] - Decoded dev-server event (`app.started`, `app.progress`, ...)
//! - [`BroadcastMessage`] - Structured message delivered to subscribers
//! - [`OutputSnapshot`] - Accumulated output of the current process
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with precondition/timeout/exit classification
//! - [`ProcessError`] - Closed outcome of a failed wait (timeout or exit)
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use sandbox_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod prelude;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use error::{AppOperation, Error, ProcessError, Result, ResultExt};
pub use events::{
    BroadcastEvent, BroadcastMessage, OutputEvent, OutputSnapshot, ProtocolEvent, APP_PROGRESS,
    APP_STARTED,
};
pub use types::{AppStatus, ProcessStatus};
