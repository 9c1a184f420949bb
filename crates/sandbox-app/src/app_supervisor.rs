//! Lifecycle of the single long-running dev-server process.
//!
//! The supervisor owns at most one [`ManagedProcess`], translates its output
//! into broadcast messages and drives the stdin request protocol
//! (`app.restart`, `app.stop`). Readiness-aware operations kill the process
//! when it misses its deadline or exits early.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sandbox_core::prelude::*;
use sandbox_core::{
    AppOperation, AppStatus, BroadcastMessage, OutputSnapshot, ProcessError, ProtocolEvent,
};
use sandbox_process::{
    line_has_event, parse_protocol_line, AppCommand, KillSignal, ManagedProcess,
    ProcessSupervisor, RequestIds, SpawnOptions,
};

use crate::broadcaster::Broadcaster;
use crate::config::AppSettings;
use crate::debounce::DebounceBuffer;

/// Timeout used by [`WaitOptions::default`]
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a force-killed app gets to be reaped
const ABORT_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Construction-time configuration of an [`ApplicationSupervisor`]
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub run_command: Option<String>,
    pub working_dir: PathBuf,
    /// Time between the graceful and the forced kill
    pub stop_grace: Duration,
    /// Quiet window before buffered stderr is broadcast
    pub stderr_debounce: Duration,
}

impl AppConfig {
    pub fn new(run_command: Option<String>, working_dir: impl Into<PathBuf>) -> Self {
        let defaults = AppSettings::default();
        Self {
            run_command,
            working_dir: working_dir.into(),
            stop_grace: defaults.stop_grace(),
            stderr_debounce: defaults.stderr_debounce(),
        }
    }

    pub fn from_settings(
        settings: &AppSettings,
        run_command: Option<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            run_command,
            working_dir: working_dir.into(),
            stop_grace: settings.stop_grace(),
            stderr_debounce: settings.stderr_debounce(),
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_stderr_debounce(mut self, period: Duration) -> Self {
        self.stderr_debounce = period;
        self
    }
}

/// Whether an operation waits for its protocol acknowledgement, and for how long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub wait: bool,
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            wait: false,
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl WaitOptions {
    pub fn wait(timeout: Duration) -> Self {
        Self {
            wait: true,
            timeout,
        }
    }

    pub fn no_wait() -> Self {
        Self::default()
    }
}

fn lock_app_id(app_id: &Mutex<Option<String>>) -> std::sync::MutexGuard<'_, Option<String>> {
    app_id.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Force kill after a failed readiness wait and wait for the exit to land
async fn abort(process: &ManagedProcess) {
    process.kill(KillSignal::Force);
    if let Err(e) = process.wait(Some(ABORT_REAP_TIMEOUT)).await {
        error!("App did not exit after force kill: {}", e);
    }
}

/// First `appId` carried by a protocol line, if any
fn app_id_in(line: &str) -> Option<String> {
    parse_protocol_line(line)?
        .iter()
        .find_map(|event| event.app_id().map(str::to_string))
}

/// Supervises the dev server: start, reload, stop and output forwarding.
///
/// Operations take `&mut self`; the owner serializes access.
pub struct ApplicationSupervisor {
    config: AppConfig,
    broadcaster: Arc<Broadcaster>,
    processes: ProcessSupervisor,
    process: Option<ManagedProcess>,
    /// Last `appId` reported by the running app; reset on every start
    app_id: Arc<Mutex<Option<String>>>,
    ids: RequestIds,
    stderr: DebounceBuffer<String>,
}

impl std::fmt::Debug for ApplicationSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationSupervisor")
            .field("config", &self.config)
            .field("status", &self.status())
            .field("app_id", &self.app_id())
            .finish()
    }
}

impl ApplicationSupervisor {
    pub fn new(config: AppConfig, broadcaster: Arc<Broadcaster>) -> Self {
        let sink = Arc::clone(&broadcaster);
        let stderr = DebounceBuffer::new(config.stderr_debounce, move |lines: Vec<String>| {
            sink.broadcast(BroadcastMessage::app_error(lines.join("\n")));
        });

        Self {
            config,
            broadcaster,
            processes: ProcessSupervisor::new(),
            process: None,
            app_id: Arc::new(Mutex::new(None)),
            ids: RequestIds::new(),
            stderr,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn status(&self) -> AppStatus {
        match &self.process {
            None => AppStatus::Idle,
            Some(process) if process.running() => AppStatus::Running,
            Some(_) => AppStatus::Stopped,
        }
    }

    pub fn app_id(&self) -> Option<String> {
        lock_app_id(&self.app_id).clone()
    }

    /// Output of the current (or last) app process
    pub fn output(&self) -> Option<OutputSnapshot> {
        self.process.as_ref().map(ManagedProcess::snapshot)
    }

    fn running_process(&self, operation: AppOperation) -> Result<&ManagedProcess> {
        self.process
            .as_ref()
            .filter(|process| process.running())
            .ok_or(Error::AppNotRunning { operation })
    }

    fn spawn_options(&self, command: String) -> SpawnOptions {
        let stdout_broadcaster = Arc::clone(&self.broadcaster);
        let stdout_app_id = Arc::clone(&self.app_id);
        let stderr = self.stderr.clone();
        let exit_stderr = self.stderr.clone();
        let exit_broadcaster = Arc::clone(&self.broadcaster);

        SpawnOptions::new(command, self.config.working_dir.clone())
            .on_stdout(move |line| match parse_protocol_line(line) {
                Some(events) => {
                    for event in &events {
                        if let Some(id) = event.app_id() {
                            *lock_app_id(&stdout_app_id) = Some(id.to_string());
                        }
                        stdout_broadcaster.broadcast(BroadcastMessage::app_event(event));
                    }
                }
                None => stdout_broadcaster.broadcast(BroadcastMessage::app_info_text(line)),
            })
            .on_stderr(move |line| stderr.add(line.to_string()))
            .on_exit(move |status, output| {
                exit_stderr.flush();
                let code = status.code();
                let error = (code != Some(0)).then(|| output.stderr());
                info!("App exited: {:?}", status);
                exit_broadcaster.broadcast(BroadcastMessage::app_exit(code, error));
            })
    }

    /// Launch the dev server.
    ///
    /// With `wait`, resolves once the app reports `app.started`. A timeout or
    /// an exit before that force-kills the process and fails with
    /// [`Error::AppOperation`].
    pub async fn start(&mut self, options: WaitOptions) -> Result<OutputSnapshot> {
        if self.status() == AppStatus::Running {
            return Err(Error::AppAlreadyRunning);
        }
        let command = self.config.run_command.clone().ok_or(Error::NoRunCommand)?;

        *lock_app_id(&self.app_id) = None;
        info!("Starting app: {}", command);

        let spawned = self.processes.spawn(self.spawn_options(command))?;
        let process = self.process.insert(spawned);

        if options.wait {
            let started = process
                .wait_for_event_since(
                    0,
                    |line: &str| line_has_event(line, ProtocolEvent::is_app_started),
                    options.timeout,
                )
                .await;

            match started {
                Ok(line) => {
                    // The stdout callback may not have seen this line yet
                    if let Some(id) = app_id_in(&line) {
                        *lock_app_id(&self.app_id) = Some(id);
                    }
                    info!("App started");
                }
                Err(source) => {
                    warn!("App did not start: {}", source);
                    abort(process).await;
                    return Err(Error::app_operation(AppOperation::Start, source));
                }
            }
        }

        Ok(process.snapshot())
    }

    /// Ask the running app for a full restart.
    ///
    /// With `wait`, resolves on the `app.progress` event marking the restart
    /// finished; on timeout or exit the process is force-killed.
    pub async fn reload(&mut self, options: WaitOptions) -> Result<OutputSnapshot> {
        let process = self.running_process(AppOperation::Reload)?;
        let cursor = process.event_cursor();
        let request = AppCommand::reload(self.app_id()).to_line(self.ids.next_id());

        info!("Reloading app");
        process.write_input(&request).await?;

        if options.wait {
            let finished = process
                .wait_for_event_since(
                    cursor,
                    |line: &str| line_has_event(line, ProtocolEvent::is_progress_finished),
                    options.timeout,
                )
                .await;

            if let Err(source) = finished {
                warn!("App reload failed: {}", source);
                abort(process).await;
                return Err(Error::app_operation(AppOperation::Reload, source));
            }
            info!("App reloaded");
        }

        Ok(process.snapshot())
    }

    /// Ask the running app to stop.
    ///
    /// With `wait`, the app gets `timeout` to exit on its own before the
    /// kill escalation runs and [`Error::AppOperation`] is returned. Without
    /// `wait`, the escalation runs right away. Delivering the request counts
    /// against the same budget, so an app that never drains stdin cannot
    /// hold the stop up.
    pub async fn stop(&mut self, options: WaitOptions) -> Result<OutputSnapshot> {
        let process = self.running_process(AppOperation::Stop)?;
        let request = AppCommand::stop(self.app_id()).to_line(self.ids.next_id());
        let grace = self.config.stop_grace;
        let budget = if options.wait { options.timeout } else { grace };
        let started = tokio::time::Instant::now();

        info!("Stopping app");
        match tokio::time::timeout(budget, process.write_input(&request)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to send stop request: {}", e),
            Err(_) => warn!("Stop request not accepted within {}ms", budget.as_millis()),
        }

        if !options.wait {
            process.terminate(grace).await;
            return Ok(process.snapshot());
        }

        let remaining = options.timeout.saturating_sub(started.elapsed());
        match process.wait(Some(remaining)).await {
            Ok(status) => {
                info!("App stopped: {:?}", status);
                Ok(process.snapshot())
            }
            Err(source) => {
                process.terminate(grace).await;
                let source = match source {
                    ProcessError::Timeout { .. } => ProcessError::timeout(options.timeout),
                    other => other,
                };
                Err(Error::app_operation(AppOperation::Stop, source))
            }
        }
    }

    /// Start the app unless a process was already created, in which case
    /// the current output is returned. Wait failures are reported as
    /// [`AppOperation::Init`].
    pub async fn init(&mut self, options: WaitOptions) -> Result<OutputSnapshot> {
        match &self.process {
            Some(process) => {
                debug!("App already initialized ({:?})", process.status());
                Ok(process.snapshot())
            }
            None => self.start(options).await.map_err(|e| match e {
                Error::AppOperation { source, .. } => {
                    Error::app_operation(AppOperation::Init, source)
                }
                other => other,
            }),
        }
    }
}
