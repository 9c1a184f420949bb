//! Headless mode runner - stdin command loop driving the app supervisor
//!
//! Boots the WebSocket transport and (optionally) the app, then executes
//! stdin commands until `quit`, EOF or Ctrl-C. The app is stopped on the
//! way out.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};

use sandbox_app::{
    AppConfig, AppRuntime, ApplicationSupervisor, Broadcaster, CommandRunner, Settings,
    WaitOptions, DEFAULT_WAIT_TIMEOUT,
};
use sandbox_core::prelude::*;
use sandbox_core::AppStatus;

use super::HeadlessEvent;
use crate::transport::WsServer;

/// A parsed stdin line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadlessCommand {
    Start,
    Reload,
    Stop,
    Status,
    Output,
    /// One-shot shell command in the working directory
    Exec(String),
    Quit,
    Unknown(String),
}

impl HeadlessCommand {
    /// `None` for blank lines
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let (word, rest) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(word, rest)| (word, rest.trim()));

        Some(match word {
            "start" => HeadlessCommand::Start,
            "r" | "reload" => HeadlessCommand::Reload,
            "stop" => HeadlessCommand::Stop,
            "status" => HeadlessCommand::Status,
            "output" => HeadlessCommand::Output,
            "exec" if !rest.is_empty() => HeadlessCommand::Exec(rest.to_string()),
            "q" | "quit" => HeadlessCommand::Quit,
            _ => HeadlessCommand::Unknown(trimmed.to_string()),
        })
    }
}

/// Executes headless commands against one app supervisor
pub struct HeadlessRunner {
    app: ApplicationSupervisor,
    commands: CommandRunner,
    runtime: AppRuntime,
    start_on_boot: bool,
    start: WaitOptions,
    reload: WaitOptions,
    stop: WaitOptions,
}

impl HeadlessRunner {
    pub fn new(
        settings: &Settings,
        working_dir: &Path,
        run_command: Option<String>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        let config = AppConfig::from_settings(&settings.app, run_command, working_dir);

        Self {
            app: ApplicationSupervisor::new(config, broadcaster),
            commands: CommandRunner::new(working_dir, settings.commands.timeout()),
            runtime: settings.app.runtime,
            start_on_boot: settings.app.start_on_boot,
            start: WaitOptions {
                wait: settings.app.start_await,
                timeout: settings.app.start_timeout(),
            },
            reload: WaitOptions::wait(settings.app.start_timeout()),
            stop: WaitOptions::wait(DEFAULT_WAIT_TIMEOUT),
        }
    }

    pub fn app(&self) -> &ApplicationSupervisor {
        &self.app
    }

    /// Install dependencies, then start the app.
    ///
    /// Failures are reported as events; the server keeps running without
    /// the app.
    pub async fn boot(&mut self) -> Vec<HeadlessEvent> {
        if !self.start_on_boot {
            info!("Start on boot disabled");
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Err(e) = self.commands.install_dependencies(self.runtime).await {
            error!("Failed to install dependencies: {}", e);
            events.push(HeadlessEvent::from_error(&e));
            return events;
        }
        events.push(HeadlessEvent::dependencies_installed(self.runtime.binary()));

        match self.app.init(self.start).await {
            Ok(_) => events.push(HeadlessEvent::app_started(self.app.app_id())),
            Err(e) => {
                error!("Failed to start app on boot: {}", e);
                events.push(HeadlessEvent::from_error(&e));
            }
        }
        events
    }

    pub async fn execute(&mut self, command: HeadlessCommand) -> HeadlessEvent {
        let result = match command {
            HeadlessCommand::Start => self
                .app
                .start(self.start)
                .await
                .map(|_| HeadlessEvent::app_started(self.app.app_id())),
            HeadlessCommand::Reload => {
                let started = Instant::now();
                self.app.reload(self.reload).await.map(|_| {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    HeadlessEvent::app_reloaded(self.app.app_id(), duration_ms)
                })
            }
            HeadlessCommand::Stop => self
                .app
                .stop(self.stop)
                .await
                .map(|output| HeadlessEvent::app_stopped(output.exit_code)),
            HeadlessCommand::Status => Ok(HeadlessEvent::status(
                self.app.status(),
                self.app.app_id(),
            )),
            HeadlessCommand::Output => Ok(HeadlessEvent::output(self.app.output())),
            HeadlessCommand::Exec(command) => self
                .commands
                .execute(&command)
                .await
                .map(|output| HeadlessEvent::command_completed(&command, output)),
            HeadlessCommand::Quit => Ok(HeadlessEvent::shutting_down()),
            HeadlessCommand::Unknown(line) => {
                warn!("Unknown stdin command: {}", line);
                return HeadlessEvent::error(format!("Unknown command: {}", line), false);
            }
        };

        result.unwrap_or_else(|e| {
            warn!("Command failed: {}", e);
            HeadlessEvent::from_error(&e)
        })
    }

    /// Stop the app if it is still running
    pub async fn shutdown(&mut self) {
        if self.app.status() != AppStatus::Running {
            return;
        }
        match self.app.stop(self.stop).await {
            Ok(output) => HeadlessEvent::app_stopped(output.exit_code).emit(),
            Err(e) => {
                warn!("Failed to stop app cleanly: {}", e);
                HeadlessEvent::from_error(&e).emit();
            }
        }
    }
}

/// Run in headless mode until quit, EOF or Ctrl-C
pub async fn run_headless(
    settings: Settings,
    working_dir: &Path,
    run_command: Option<String>,
) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("Sandbox server starting in HEADLESS mode");
    info!("Working directory: {}", working_dir.display());
    info!("═══════════════════════════════════════════════════════");

    let broadcaster = Arc::new(Broadcaster::new(settings.broadcast.cooldown()));

    let server = WsServer::bind(&settings.server.address(), Arc::clone(&broadcaster))
        .await
        .context("Failed to start WebSocket transport")?;
    let address = server.local_addr()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = server.spawn(shutdown_rx);
    HeadlessEvent::server_listening(&address.to_string()).emit();

    if run_command.is_none() {
        warn!("No run command configured; the app cannot be started");
    }
    let mut runner = HeadlessRunner::new(&settings, working_dir, run_command, broadcaster);

    let (command_tx, mut command_rx) = mpsc::channel(32);
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(command_tx);
    });

    let interrupted = tokio::select! {
        events = runner.boot() => {
            events.iter().for_each(HeadlessEvent::emit);
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };

    if !interrupted {
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(HeadlessCommand::Quit) | None => {
                        info!("Quit requested");
                        break;
                    }
                    Some(command) => runner.execute(command).await.emit(),
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }
    }

    HeadlessEvent::shutting_down().emit();
    runner.shutdown().await;

    // Ignore send error: the server task may have exited already
    let _ = shutdown_tx.send(true);
    if let Err(e) = server_task.await {
        warn!("WebSocket server task failed: {}", e);
    }

    info!("Sandbox server exiting");
    Ok(())
}

/// Forward parsed stdin lines to the command loop (blocking, own thread)
fn spawn_stdin_reader_blocking(command_tx: mpsc::Sender<HeadlessCommand>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) => {
                let Some(command) = HeadlessCommand::parse(&line) else {
                    continue;
                };
                let quit = command == HeadlessCommand::Quit;
                if command_tx.blocking_send(command).is_err() || quit {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    info!("Stdin reader exiting");
}
