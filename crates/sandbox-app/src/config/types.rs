//! Configuration types for the sandbox server
//!
//! Defines:
//! - `Settings` - Server settings (`.sandbox/config.toml`)
//! - `AppRuntime` - SDK used to install dependencies
//! - Related sub-types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Directory holding the settings file, relative to the working directory
pub const CONFIG_DIR: &str = ".sandbox";

/// Settings file name inside [`CONFIG_DIR`]
pub const CONFIG_FILENAME: &str = "config.toml";

/// Project template, relative to the working directory
pub const TEMPLATE_FILENAME: &str = "template.json";

/// Application settings (.sandbox/config.toml)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub app: AppSettings,

    #[serde(default)]
    pub broadcast: BroadcastSettings,

    #[serde(default)]
    pub commands: CommandSettings,
}

/// Transport listener settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// `host:port` for binding the listener
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Supervised application settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppSettings {
    /// Command that starts the dev server; falls back to the template's web preview command
    #[serde(default)]
    pub run_command: Option<String>,

    #[serde(default)]
    pub runtime: AppRuntime,

    /// Install dependencies and start the app when the server boots
    #[serde(default = "default_true")]
    pub start_on_boot: bool,

    /// Wait for readiness during the boot start
    #[serde(default = "default_true")]
    pub start_await: bool,

    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,

    /// Time between SIGTERM and SIGKILL when stopping
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// Quiet window before buffered stderr is broadcast
    #[serde(default = "default_stderr_debounce_ms")]
    pub stderr_debounce_ms: u64,

    /// Template location; defaults to `<working_dir>/template.json`
    #[serde(default)]
    pub template_path: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            run_command: None,
            runtime: AppRuntime::default(),
            start_on_boot: true,
            start_await: true,
            start_timeout_ms: default_start_timeout_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            stderr_debounce_ms: default_stderr_debounce_ms(),
            template_path: None,
        }
    }
}

impl AppSettings {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn stderr_debounce(&self) -> Duration {
        Duration::from_millis(self.stderr_debounce_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_start_timeout_ms() -> u64 {
    60_000
}

fn default_stop_grace_ms() -> u64 {
    60_000
}

fn default_stderr_debounce_ms() -> u64 {
    3_000
}

/// SDK the project is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppRuntime {
    #[default]
    Flutter,
    Dart,
}

impl AppRuntime {
    /// Executable that must be on PATH
    pub fn binary(&self) -> &'static str {
        match self {
            AppRuntime::Flutter => "flutter",
            AppRuntime::Dart => "dart",
        }
    }

    pub fn install_command(&self) -> String {
        format!("{} pub get", self.binary())
    }
}

impl std::str::FromStr for AppRuntime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flutter" => Ok(AppRuntime::Flutter),
            "dart" => Ok(AppRuntime::Dart),
            other => Err(format!("unsupported runtime '{}'", other)),
        }
    }
}

impl std::fmt::Display for AppRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary())
    }
}

/// Broadcaster settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BroadcastSettings {
    /// Quiet window for buffered broadcasts
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl BroadcastSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

fn default_cooldown_ms() -> u64 {
    500
}

/// One-shot command settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CommandSettings {
    /// No timeout when unset
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl CommandSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
