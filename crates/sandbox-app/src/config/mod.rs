//! Configuration for the sandbox server
//!
//! Supports:
//! - `.sandbox/config.toml` - Server settings
//! - `SANDBOX_*` environment variables - Overrides
//! - `template.json` - Project template with the preview run command

pub mod env;
pub mod settings;
pub mod template;
pub mod types;

pub use env::{apply_env_overrides, process_env, working_dir_override};
pub use settings::{
    load_settings, load_settings_from, resolve_run_command, settings_path, template_path,
    validate_settings, MAX_START_TIMEOUT_MS,
};
pub use template::{load_template, PreviewsTemplate, Template, WebPreview};
pub use types::*;
