//! sandbox-app - Application supervision for the sandbox server
//!
//! Owns the long-running dev-server process and everything around it:
//! readiness-aware lifecycle operations, debounced fan-out of its output to
//! connected subscribers, one-shot project commands and configuration
//! loading.

pub mod app_supervisor;
pub mod broadcaster;
pub mod command_runner;
pub mod config;
pub mod debounce;

// Re-export primary types
pub use app_supervisor::{AppConfig, ApplicationSupervisor, WaitOptions, DEFAULT_WAIT_TIMEOUT};
pub use broadcaster::{Broadcaster, ChannelSubscriber, Subscriber, SubscriberId, DEFAULT_COOLDOWN};
pub use command_runner::{require_tool, CommandRunner};
pub use config::{AppRuntime, Settings};
pub use debounce::DebounceBuffer;
