//! Spawning shell commands into supervised processes

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use sandbox_core::prelude::*;
use sandbox_core::{OutputEvent, ProcessError, ProcessStatus};

use crate::output::ProcessOutput;
use crate::process::ManagedProcess;

/// Upper bound on draining the pipes once the process has exited.
///
/// A background grandchild can hold the pipe open after the shell is gone.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Called with each captured chunk, after it is appended to the output log
pub type ChunkCallback = Box<dyn Fn(&str) + Send + Sync + 'static>;

/// Called once with the terminal status before pending waits resolve
pub type ExitCallback = Box<dyn FnOnce(ProcessStatus, &ProcessOutput) + Send + 'static>;

/// What to run and who to tell about it
pub struct SpawnOptions {
    pub command: String,
    pub working_dir: PathBuf,
    pub on_stdout: Option<ChunkCallback>,
    pub on_stderr: Option<ChunkCallback>,
    pub on_exit: Option<ExitCallback>,
}

impl SpawnOptions {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
            on_stdout: None,
            on_stderr: None,
            on_exit: None,
        }
    }

    pub fn on_stdout(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_stdout = Some(Box::new(callback));
        self
    }

    pub fn on_stderr(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_stderr = Some(Box::new(callback));
        self
    }

    pub fn on_exit(
        mut self,
        callback: impl FnOnce(ProcessStatus, &ProcessOutput) + Send + 'static,
    ) -> Self {
        self.on_exit = Some(Box::new(callback));
        self
    }
}

impl std::fmt::Debug for SpawnOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnOptions")
            .field("command", &self.command)
            .field("working_dir", &self.working_dir)
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn event(self, text: String) -> OutputEvent {
        match self {
            Stream::Stdout => OutputEvent::Stdout { text },
            Stream::Stderr => OutputEvent::Stderr { text },
        }
    }
}

/// Spawns commands through the platform shell and wires their streams into
/// a [`ManagedProcess`].
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    shell: String,
    shell_arg: String,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        if cfg!(windows) {
            Self::with_shell("cmd", "/C")
        } else {
            Self::with_shell("sh", "-c")
        }
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific shell, e.g. `("bash", "-c")`
    pub fn with_shell(shell: impl Into<String>, shell_arg: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            shell_arg: shell_arg.into(),
        }
    }

    /// Spawn `options.command` in its own process group.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self, options: SpawnOptions) -> Result<ManagedProcess> {
        let SpawnOptions {
            command,
            working_dir,
            on_stdout,
            on_stderr,
            on_exit,
        } = options;

        info!("Spawning `{}` in {}", command, working_dir.display());

        let mut cmd = Command::new(&self.shell);
        cmd.arg(&self.shell_arg)
            .arg(&command)
            .current_dir(&working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::process_spawn(&command, e.to_string()))?;

        let pid = child.id();
        info!("`{}` started with PID: {:?}", command, pid);

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(Error::process_spawn(&command, "stdio pipes unavailable"));
        };

        let output = Arc::new(ProcessOutput::new());
        let stdin = Arc::new(tokio::sync::Mutex::new(Some(stdin)));

        let stdout_task = tokio::spawn(read_stream(
            stdout,
            Stream::Stdout,
            Arc::clone(&output),
            on_stdout,
        ));
        let stderr_task = tokio::spawn(read_stream(
            stderr,
            Stream::Stderr,
            Arc::clone(&output),
            on_stderr,
        ));

        let (status_tx, status_rx) = watch::channel(ProcessStatus::Running);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(supervise(Supervised {
            child,
            command: command.clone(),
            kill_rx,
            readers: [stdout_task, stderr_task],
            stdin: Arc::clone(&stdin),
            output: Arc::clone(&output),
            status_tx,
            on_exit,
        }));

        Ok(ManagedProcess::new(
            pid, command, output, stdin, status_rx, kill_tx,
        ))
    }

    /// Spawn and wait for exit; only a zero exit code counts as success
    pub async fn start_and_wait(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Option<Duration>,
    ) -> Result<ManagedProcess> {
        let process = self.spawn(SpawnOptions::new(command, working_dir))?;

        match process.wait(timeout).await {
            Ok(status) if status.is_success() => Ok(process),
            Ok(status) => {
                debug!("`{}` failed: {}", command, process.accumulated_stderr());
                Err(Error::command(command, ProcessError::exit(status.code())))
            }
            Err(e) => Err(Error::command(command, e)),
        }
    }
}

/// Read newline-delimited chunks, append each to the log, then notify the caller
async fn read_stream<R>(
    stream: R,
    kind: Stream,
    output: Arc<ProcessOutput>,
    callback: Option<ChunkCallback>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                let chunk = String::from_utf8_lossy(&buf).into_owned();
                trace!("{:?}: {}", kind, chunk);

                output.push(kind.event(chunk.clone()));
                if let Some(callback) = &callback {
                    // A panicking callback must not stop the pipe from draining
                    let delivered = panic::catch_unwind(AssertUnwindSafe(|| callback(&chunk)));
                    if let Err(payload) = delivered {
                        warn!("{:?} callback panicked: {}", kind, panic_message(&*payload));
                    }
                }
            }
            Err(e) => {
                debug!("{:?} reader error: {}", kind, e);
                break;
            }
        }
    }

    debug!("{:?} reader finished", kind);
}

struct Supervised {
    child: Child,
    command: String,
    kill_rx: oneshot::Receiver<()>,
    readers: [JoinHandle<()>; 2],
    stdin: Arc<tokio::sync::Mutex<Option<ChildStdin>>>,
    output: Arc<ProcessOutput>,
    status_tx: watch::Sender<ProcessStatus>,
    on_exit: Option<ExitCallback>,
}

/// Owns the child until it exits, then publishes the terminal status.
///
/// Publication order: readers drained, stdin closed, status recorded,
/// `on_exit` called, waiters woken.
async fn supervise(task: Supervised) {
    let Supervised {
        mut child,
        command,
        kill_rx,
        readers: [mut stdout_task, mut stderr_task],
        stdin,
        output,
        status_tx,
        on_exit,
    } = task;

    let exit = tokio::select! {
        result = child.wait() => result,
        // Explicit request or the handle was dropped
        _ = kill_rx => {
            debug!("Kill requested for `{}`", command);
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill `{}`: {}", command, e);
            }
            child.wait().await
        }
    };

    let status = match exit {
        Ok(exit_status) => status_from_exit(exit_status),
        Err(e) => {
            error!("Error waiting for `{}`: {}", command, e);
            ProcessStatus::Killed { signal: None }
        }
    };
    info!("`{}` exited: {:?}", command, status);

    let drained = tokio::time::timeout(
        READER_DRAIN_TIMEOUT,
        future::join(&mut stdout_task, &mut stderr_task),
    )
    .await;
    if drained.is_err() {
        debug!("Output of `{}` still open after exit, detaching", command);
        stdout_task.abort();
        stderr_task.abort();
    }

    stdin.lock().await.take();

    output.finish(status);
    if let Some(on_exit) = on_exit {
        let notified = panic::catch_unwind(AssertUnwindSafe(|| on_exit(status, &output)));
        if let Err(payload) = notified {
            warn!("Exit callback of `{}` panicked: {}", command, panic_message(&*payload));
        }
    }
    status_tx.send_replace(status);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic>"
    }
}

fn status_from_exit(exit_status: ExitStatus) -> ProcessStatus {
    match exit_status.code() {
        Some(code) => ProcessStatus::Finished { code },
        None => ProcessStatus::Killed {
            signal: exit_signal(&exit_status),
        },
    }
}

#[cfg(unix)]
fn exit_signal(exit_status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    exit_status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_exit_status: &ExitStatus) -> Option<i32> {
    None
}
