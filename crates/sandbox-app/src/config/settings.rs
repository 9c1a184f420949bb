//! Settings loading and validation

use std::path::{Path, PathBuf};

use sandbox_core::prelude::*;

use super::template::load_template;
use super::types::{Settings, CONFIG_DIR, CONFIG_FILENAME, TEMPLATE_FILENAME};

/// Upper bound for the app start timeout, in milliseconds
pub const MAX_START_TIMEOUT_MS: u64 = 600_000;

/// Path of the settings file for a working directory
pub fn settings_path(working_dir: &Path) -> PathBuf {
    working_dir.join(CONFIG_DIR).join(CONFIG_FILENAME)
}

/// Load settings from `<working_dir>/.sandbox/config.toml`
///
/// Returns default settings if file doesn't exist or can't be parsed.
pub fn load_settings(working_dir: &Path) -> Settings {
    load_settings_from(&settings_path(working_dir))
}

/// Load settings from an explicit file
pub fn load_settings_from(config_path: &Path) -> Settings {
    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Reject settings the server cannot boot with
pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.server.port == 0 {
        return Err(Error::config_invalid("server.port must be between 1 and 65535"));
    }

    let timeout = settings.app.start_timeout_ms;
    if !(1..=MAX_START_TIMEOUT_MS).contains(&timeout) {
        return Err(Error::config_invalid(format!(
            "app.start_timeout_ms must be between 1 and {}, got {}",
            MAX_START_TIMEOUT_MS, timeout
        )));
    }

    if settings.server.host.trim().is_empty() {
        return Err(Error::config_invalid("server.host must not be empty"));
    }

    Ok(())
}

/// Template location for a working directory
pub fn template_path(settings: &Settings, working_dir: &Path) -> PathBuf {
    match &settings.app.template_path {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => working_dir.join(path),
        None => working_dir.join(TEMPLATE_FILENAME),
    }
}

/// The command that starts the app: `app.run_command`, else the template's
/// web preview command.
///
/// A missing template is not an error; an unparseable one is.
pub fn resolve_run_command(settings: &Settings, working_dir: &Path) -> Result<Option<String>> {
    if let Some(command) = settings
        .app
        .run_command
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        return Ok(Some(command.to_string()));
    }

    let path = template_path(settings, working_dir);
    let template = load_template(&path)?;
    Ok(template.and_then(|t| t.web_command().map(str::to_string)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(dir: &Path, content: &str) {
        let config_dir = dir.join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join(CONFIG_FILENAME), content).unwrap();
    }

    #[test]
    fn test_load_settings_defaults() {
        let temp = tempdir().unwrap();
        let settings = load_settings(temp.path());

        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_settings_custom() {
        let temp = tempdir().unwrap();
        write_config(
            temp.path(),
            r#"
[server]
port = 4100

[app]
run_command = "flutter run --machine -d web-server"
start_on_boot = false
stop_grace_ms = 250

[broadcast]
cooldown_ms = 100

[commands]
timeout_ms = 30000
"#,
        );

        let settings = load_settings(temp.path());

        assert_eq!(settings.server.port, 4100);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(
            settings.app.run_command.as_deref(),
            Some("flutter run --machine -d web-server")
        );
        assert!(!settings.app.start_on_boot);
        assert!(settings.app.start_await);
        assert_eq!(settings.app.stop_grace_ms, 250);
        assert_eq!(settings.broadcast.cooldown_ms, 100);
        assert_eq!(settings.commands.timeout_ms, Some(30_000));
    }

    #[test]
    fn test_load_settings_invalid_toml() {
        let temp = tempdir().unwrap();
        write_config(temp.path(), "[server\nport = ");

        let settings = load_settings(temp.path());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_settings_from_explicit_path() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("custom.toml");
        std::fs::write(&path, "[server]\nhost = \"0.0.0.0\"\n").unwrap();

        let settings = load_settings_from(&path);
        assert_eq!(settings.server.address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_validate_defaults_ok() {
        assert!(validate_settings(&Settings::default()).is_ok());
    }

    #[test]
    fn test_validate_rejects_port_zero() {
        let mut settings = Settings::default();
        settings.server.port = 0;

        let err = validate_settings(&settings).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_validate_start_timeout_bounds() {
        let mut settings = Settings::default();
        settings.app.start_timeout_ms = 0;
        assert!(validate_settings(&settings).is_err());

        settings.app.start_timeout_ms = MAX_START_TIMEOUT_MS;
        assert!(validate_settings(&settings).is_ok());

        settings.app.start_timeout_ms = MAX_START_TIMEOUT_MS + 1;
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_run_command_prefers_settings() {
        let temp = tempdir().unwrap();
        std::fs::write(
            temp.path().join(TEMPLATE_FILENAME),
            r#"{"previews": {"enabled": true, "web": {"command": "from-template"}}}"#,
        )
        .unwrap();

        let mut settings = Settings::default();
        assert_eq!(
            resolve_run_command(&settings, temp.path()).unwrap().as_deref(),
            Some("from-template")
        );

        settings.app.run_command = Some("from-settings".to_string());
        assert_eq!(
            resolve_run_command(&settings, temp.path()).unwrap().as_deref(),
            Some("from-settings")
        );
    }

    #[test]
    fn test_run_command_missing_template() {
        let temp = tempdir().unwrap();
        let settings = Settings::default();

        assert_eq!(resolve_run_command(&settings, temp.path()).unwrap(), None);
    }

    #[test]
    fn test_template_path_relative_to_working_dir() {
        let mut settings = Settings::default();
        settings.app.template_path = Some(PathBuf::from("meta/template.json"));

        assert_eq!(
            template_path(&settings, Path::new("/work")),
            PathBuf::from("/work/meta/template.json")
        );
    }
}
