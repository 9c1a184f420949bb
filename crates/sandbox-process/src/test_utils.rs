//! Test utilities: scripted stand-ins for a dev server
//!
//! Builds `sh` scripts that speak the dev-server protocol well enough to drive
//! the supervisors without a real SDK installed:
//!
//! - prints `app.start`, then `app.started` once "ready"
//! - echoes every stdin line back as `recv:<line>`
//! - answers `app.restart` with a finished `app.progress`
//! - exits 0 on `app.stop`
//!
//! The knobs below switch individual behaviors off to provoke the failure
//! paths (crash on boot, never ready, ignore stop requests).

/// Builder for a fake dev-server script
#[derive(Debug, Clone)]
pub struct FakeDevServer {
    app_id: String,
    stderr_lines: Vec<String>,
    crash_before_start: Option<i32>,
    never_ready: bool,
    never_finish_reload: bool,
    ignore_stop: bool,
}

impl FakeDevServer {
    /// `app_id` must not contain a single quote
    pub fn new(app_id: &str) -> Self {
        assert!(!app_id.contains('\''), "app id is embedded in a quoted script");
        Self {
            app_id: app_id.to_string(),
            stderr_lines: Vec::new(),
            crash_before_start: None,
            never_ready: false,
            never_finish_reload: false,
            ignore_stop: false,
        }
    }

    /// Print a line on stderr during startup
    pub fn stderr_line(mut self, line: &str) -> Self {
        assert!(!line.contains('\''), "line is embedded in a quoted script");
        self.stderr_lines.push(line.to_string());
        self
    }

    /// Exit with `code` before ever becoming ready
    pub fn crash_before_start(mut self, code: i32) -> Self {
        self.crash_before_start = Some(code);
        self
    }

    /// Keep running without ever printing `app.started`
    pub fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    /// Acknowledge `app.restart` without the finished progress event
    pub fn never_finish_reload(mut self) -> Self {
        self.never_finish_reload = true;
        self
    }

    /// Ignore `app.stop` and SIGTERM; only SIGKILL ends it
    pub fn ignore_stop(mut self) -> Self {
        self.ignore_stop = true;
        self
    }

    fn event(&self, event: &str, extra: &str) -> String {
        format!(
            r#"printf '%s\n' '[{{"event":"{}","params":{{"appId":"{}"{}}}}}]'"#,
            event, self.app_id, extra
        )
    }

    /// The shell command to hand to a supervisor
    pub fn script(&self) -> String {
        let mut lines = Vec::new();

        if self.ignore_stop {
            lines.push("trap '' TERM".to_string());
        }
        lines.push("printf '%s\\n' 'Launching lib/main.dart on Web Server in debug mode...'".to_string());
        lines.push(self.event("app.start", ""));
        for line in &self.stderr_lines {
            lines.push(format!("printf '%s\\n' '{}' 1>&2", line));
        }
        if let Some(code) = self.crash_before_start {
            lines.push(format!("exit {}", code));
        }
        if !self.never_ready {
            lines.push(self.event("app.started", ""));
        }

        let on_restart = if self.never_finish_reload {
            self.event("app.progress", r#","finished":false"#)
        } else {
            self.event("app.progress", r#","finished":true"#)
        };
        let on_stop = if self.ignore_stop {
            ":".to_string()
        } else {
            format!("{}; exit 0", self.event("app.stop", ""))
        };

        lines.push("while IFS= read -r line; do".to_string());
        lines.push("  printf 'recv:%s\\n' \"$line\"".to_string());
        lines.push("  case \"$line\" in".to_string());
        lines.push(format!("    *app.restart*) {} ;;", on_restart));
        lines.push(format!("    *app.stop*) {} ;;", on_stop));
        lines.push("  esac".to_string());
        lines.push("done".to_string());
        if self.ignore_stop {
            // stdin closed: keep ignoring until killed
            lines.push("while true; do sleep 0.1; done".to_string());
        }

        lines.join("\n")
    }
}

/// A well-behaved dev server reporting `app_id`
pub fn fake_dev_server(app_id: &str) -> String {
    FakeDevServer::new(app_id).script()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_contains_protocol_events() {
        let script = fake_dev_server("x");
        assert!(script.contains(r#"[{"event":"app.started","params":{"appId":"x"}}]"#));
        assert!(script.contains(r#""finished":true"#));
        assert!(script.contains("exit 0"));
    }

    #[test]
    fn test_never_ready_omits_started() {
        let script = FakeDevServer::new("x").never_ready().script();
        assert!(!script.contains("app.started"));
    }

    #[test]
    fn test_ignore_stop_traps_term() {
        let script = FakeDevServer::new("x").ignore_stop().script();
        assert!(script.starts_with("trap '' TERM"));
        assert!(!script.contains("exit 0"));
    }
}
