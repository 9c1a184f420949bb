//! Environment variable overrides
//!
//! Environment variables take priority over `.sandbox/config.toml`:
//!
//! | Variable                    | Setting                 |
//! |-----------------------------|-------------------------|
//! | `SANDBOX_PORT`              | `server.port`           |
//! | `SANDBOX_WORKING_DIRECTORY` | working directory       |
//! | `SANDBOX_TEMPLATE_PATH`     | `app.template_path`     |
//! | `SANDBOX_APP_START_ON_BOOT` | `app.start_on_boot`     |
//! | `SANDBOX_APP_START_TIMEOUT` | `app.start_timeout_ms`  |
//! | `SANDBOX_APP_START_AWAIT`   | `app.start_await`       |
//! | `SANDBOX_APP_RUNTIME`       | `app.runtime`           |
//! | `SANDBOX_RUN_COMMAND`       | `app.run_command`       |

use std::path::PathBuf;

use sandbox_core::prelude::*;

use super::types::{AppRuntime, Settings};

pub const ENV_PORT: &str = "SANDBOX_PORT";
pub const ENV_WORKING_DIRECTORY: &str = "SANDBOX_WORKING_DIRECTORY";
pub const ENV_TEMPLATE_PATH: &str = "SANDBOX_TEMPLATE_PATH";
pub const ENV_APP_START_ON_BOOT: &str = "SANDBOX_APP_START_ON_BOOT";
pub const ENV_APP_START_TIMEOUT: &str = "SANDBOX_APP_START_TIMEOUT";
pub const ENV_APP_START_AWAIT: &str = "SANDBOX_APP_START_AWAIT";
pub const ENV_APP_RUNTIME: &str = "SANDBOX_APP_RUNTIME";
pub const ENV_RUN_COMMAND: &str = "SANDBOX_RUN_COMMAND";

/// Read from the process environment
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Non-empty value of `key`
fn lookup_value<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::config_invalid(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::config_invalid(format!("{} must be a number, got '{}'", key, value)))
}

/// Apply overrides from `lookup` on top of file settings
pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup_value(&lookup, ENV_PORT) {
        let port: u32 = parse_number(ENV_PORT, &value)?;
        settings.server.port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                Error::config_invalid(format!(
                    "{} must be between 1 and 65535, got {}",
                    ENV_PORT, port
                ))
            })?;
    }

    if let Some(value) = lookup_value(&lookup, ENV_TEMPLATE_PATH) {
        settings.app.template_path = Some(PathBuf::from(value));
    }

    if let Some(value) = lookup_value(&lookup, ENV_APP_START_ON_BOOT) {
        settings.app.start_on_boot = parse_bool(ENV_APP_START_ON_BOOT, &value)?;
    }

    if let Some(value) = lookup_value(&lookup, ENV_APP_START_TIMEOUT) {
        settings.app.start_timeout_ms = parse_number(ENV_APP_START_TIMEOUT, &value)?;
    }

    if let Some(value) = lookup_value(&lookup, ENV_APP_START_AWAIT) {
        settings.app.start_await = parse_bool(ENV_APP_START_AWAIT, &value)?;
    }

    if let Some(value) = lookup_value(&lookup, ENV_APP_RUNTIME) {
        settings.app.runtime = value
            .parse::<AppRuntime>()
            .map_err(|e| Error::config_invalid(format!("{}: {}", ENV_APP_RUNTIME, e)))?;
    }

    if let Some(value) = lookup_value(&lookup, ENV_RUN_COMMAND) {
        settings.app.run_command = Some(value);
    }

    Ok(())
}

/// Working directory requested through the environment
pub fn working_dir_override<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_value(&lookup, ENV_WORKING_DIRECTORY).map(PathBuf::from)
}
