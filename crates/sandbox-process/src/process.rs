//! Handle to one spawned OS process

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{oneshot, watch};

use sandbox_core::prelude::*;
use sandbox_core::{OutputSnapshot, ProcessError, ProcessStatus};

use crate::kill::{self, KillSignal};
use crate::output::ProcessOutput;

/// How long to wait for the exit to be observed after a force kill
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// A running (or finished) child process and its captured output.
///
/// The `Child` itself is owned by the supervising task spawned alongside it;
/// this handle observes it through a [`watch`] channel and the shared
/// [`ProcessOutput`]. Signals go to the whole process group so that commands
/// started by the shell die with it.
///
/// Dropping a handle whose process is still running force-kills the group.
pub struct ManagedProcess {
    pid: Option<u32>,
    command: String,
    output: Arc<ProcessOutput>,
    /// Shared with the supervising task, which takes it on exit
    stdin: Arc<tokio::sync::Mutex<Option<ChildStdin>>>,
    status_rx: watch::Receiver<ProcessStatus>,
    /// Asks the supervising task to kill the direct child. Used when the group
    /// cannot be signalled. Dropping it has the same effect.
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("pid", &self.pid)
            .field("command", &self.command)
            .field("status", &self.status())
            .finish()
    }
}

impl ManagedProcess {
    pub(crate) fn new(
        pid: Option<u32>,
        command: String,
        output: Arc<ProcessOutput>,
        stdin: Arc<tokio::sync::Mutex<Option<ChildStdin>>>,
        status_rx: watch::Receiver<ProcessStatus>,
        kill_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            pid,
            command,
            output,
            stdin,
            status_rx,
            kill_tx: Mutex::new(Some(kill_tx)),
        }
    }

    // ─────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn status(&self) -> ProcessStatus {
        self.output.status()
    }

    pub fn running(&self) -> bool {
        self.status().is_running()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.output.exit_code()
    }

    pub fn accumulated_stdout(&self) -> String {
        self.output.stdout()
    }

    pub fn accumulated_stderr(&self) -> String {
        self.output.stderr()
    }

    pub fn output(&self) -> &ProcessOutput {
        &self.output
    }

    pub fn snapshot(&self) -> OutputSnapshot {
        self.output.snapshot()
    }

    /// Position in the output log for a later [`wait_for_event_since`](Self::wait_for_event_since)
    pub fn event_cursor(&self) -> usize {
        self.output.len()
    }

    // ─────────────────────────────────────────────────────────
    // Waiting
    // ─────────────────────────────────────────────────────────

    /// Wait for the process to reach a terminal state.
    ///
    /// With a timeout, the process group is sent a graceful kill before
    /// `Timeout` is returned. Without one this waits indefinitely.
    pub async fn wait(
        &self,
        timeout: Option<Duration>,
    ) -> std::result::Result<ProcessStatus, ProcessError> {
        let Some(limit) = timeout else {
            return self.wait_terminal().await;
        };

        match tokio::time::timeout(limit, self.wait_terminal()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "`{}` did not exit within {}ms, killing",
                    self.command,
                    limit.as_millis()
                );
                self.kill(KillSignal::Graceful);
                Err(ProcessError::timeout(limit))
            }
        }
    }

    async fn wait_terminal(&self) -> std::result::Result<ProcessStatus, ProcessError> {
        let mut status_rx = self.status_rx.clone();
        let status = match status_rx.wait_for(ProcessStatus::is_terminal).await {
            Ok(status) => *status,
            // Supervising task is gone without publishing an exit
            Err(_) => self.status(),
        };

        if status.is_terminal() {
            Ok(status)
        } else {
            Err(ProcessError::exit(None))
        }
    }

    /// Wait for the first stdout/stderr chunk captured from now on that
    /// satisfies `predicate`.
    pub async fn wait_for_event<F>(
        &self,
        predicate: F,
        timeout: Duration,
    ) -> std::result::Result<String, ProcessError>
    where
        F: FnMut(&str) -> bool,
    {
        self.wait_for_event_since(self.event_cursor(), predicate, timeout)
            .await
    }

    /// Like [`wait_for_event`](Self::wait_for_event) but scans from `cursor`,
    /// so chunks captured before the call are considered too.
    ///
    /// Exactly one outcome: the matching chunk, `Exit` if the process ends
    /// first, or `Timeout`. The process is left alone on timeout.
    pub async fn wait_for_event_since<F>(
        &self,
        cursor: usize,
        mut predicate: F,
        timeout: Duration,
    ) -> std::result::Result<String, ProcessError>
    where
        F: FnMut(&str) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut cursor = cursor;
        let mut status_rx = self.status_rx.clone();

        loop {
            // Register before scanning so an append between the scan and the
            // select cannot be missed.
            let notified = self.output.captured().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            // Status is published after the last chunk, so reading it first
            // guarantees a terminal status comes with a complete log.
            let status = *status_rx.borrow_and_update();

            if let Some(chunk) = self.output.scan_since(&mut cursor, &mut predicate) {
                return Ok(chunk);
            }
            if status.is_terminal() {
                return Err(ProcessError::exit(status.code()));
            }

            tokio::select! {
                _ = &mut notified => {}
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        return Err(ProcessError::exit(self.exit_code()));
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(ProcessError::timeout(timeout));
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────
    // Input and termination
    // ─────────────────────────────────────────────────────────

    /// Write raw text to the process's stdin
    pub async fn write_input(&self, text: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(Error::StdinUnavailable)?;

        stdin.write_all(text.as_bytes()).await?;
        stdin.flush().await?;

        debug!("Sent to `{}`: {}", self.command, text.trim_end());
        Ok(())
    }

    /// Signal the whole process group. No-op once the process has exited.
    pub fn kill(&self, signal: KillSignal) {
        if !self.running() {
            return;
        }

        info!("Killing `{}` ({:?}, pid {:?})", self.command, signal, self.pid);
        let delivered = self
            .pid
            .is_some_and(|pid| kill::signal_group(pid, signal));

        if !delivered {
            self.request_child_kill();
        }
    }

    fn request_child_kill(&self) {
        let sender = self
            .kill_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = sender {
            // Ignore send error: the supervising task may have exited already
            let _ = tx.send(());
        }
    }

    /// Graceful kill, wait up to `grace`, then force kill if still alive.
    ///
    /// Returns the terminal status, or `Running` if even the force kill was
    /// not observed in time.
    pub async fn terminate(&self, grace: Duration) -> ProcessStatus {
        if !self.running() {
            return self.status();
        }

        self.kill(KillSignal::Graceful);
        if let Ok(Ok(status)) = tokio::time::timeout(grace, self.wait_terminal()).await {
            return status;
        }

        warn!(
            "`{}` survived {}ms grace period, force killing",
            self.command,
            grace.as_millis()
        );
        self.kill(KillSignal::Force);

        match tokio::time::timeout(REAP_TIMEOUT, self.wait_terminal()).await {
            Ok(Ok(status)) => status,
            _ => {
                error!("`{}` did not exit after force kill", self.command);
                self.status()
            }
        }
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if self.running() {
            warn!("ManagedProcess for `{}` dropped while running", self.command);
            self.kill(KillSignal::Force);
        }
        // The dropped kill_tx wakes the supervising task, which kills the
        // direct child if the group signal did not land.
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::supervisor::{ProcessSupervisor, SpawnOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn spawn(command: &str) -> ManagedProcess {
        ProcessSupervisor::new()
            .spawn(SpawnOptions::new(command, std::env::temp_dir()))
            .expect("sh must be available in test environment")
    }

    /// Alive and not a zombie, per /proc
    #[cfg(target_os = "linux")]
    fn is_alive(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z" && state != "X"),
            Err(_) => false,
        }
    }

    #[tokio::test]
    async fn test_captures_both_streams_and_exit_code() {
        let process = spawn("echo hi && sleep 1 && echo bye 1>&2");

        let status = process.wait(None).await.unwrap();

        assert_eq!(status, ProcessStatus::Finished { code: 0 });
        assert!(!process.running());
        assert_eq!(process.accumulated_stdout(), "hi");
        assert_eq!(process.accumulated_stderr(), "bye");
        assert_eq!(process.exit_code(), Some(0));
    }

    #[tokio::test]
    async fn test_wait_timeout_kills_process() {
        let process = spawn("sleep 5");

        let result = process.wait(Some(Duration::from_millis(200))).await;
        assert_eq!(
            result,
            Err(ProcessError::timeout(Duration::from_millis(200)))
        );

        let status = process.wait(Some(Duration::from_secs(2))).await.unwrap();
        assert!(!process.running());
        assert_eq!(status.code(), None);
    }

    #[tokio::test]
    async fn test_nonzero_exit_code() {
        let process = spawn("echo failing 1>&2; exit 3");

        let status = process.wait(None).await.unwrap();
        assert_eq!(status, ProcessStatus::Finished { code: 3 });
        assert_eq!(process.accumulated_stderr(), "failing");
    }

    #[tokio::test]
    async fn test_wait_for_event_matches_chunk() {
        let process = spawn("sleep 0.2; echo starting; echo ready; sleep 5");

        let chunk = process
            .wait_for_event(|line| line == "ready", Duration::from_secs(3))
            .await
            .unwrap();

        assert_eq!(chunk, "ready");
        assert!(process.running());
    }

    #[tokio::test]
    async fn test_wait_for_event_sees_stderr() {
        let process = spawn("sleep 0.2; echo warning 1>&2; sleep 5");

        let chunk = process
            .wait_for_event(|line| line.starts_with("warn"), Duration::from_secs(3))
            .await
            .unwrap();

        assert_eq!(chunk, "warning");
    }

    #[tokio::test]
    async fn test_wait_for_event_exit_first() {
        let process = spawn("sleep 0.1; echo nope; exit 3");

        let result = process
            .wait_for_event(|line| line == "ready", Duration::from_secs(3))
            .await;

        assert_eq!(result, Err(ProcessError::exit(Some(3))));
    }

    #[tokio::test]
    async fn test_wait_for_event_timeout_leaves_process_running() {
        let process = spawn("sleep 5");

        let result = process
            .wait_for_event(|_| true, Duration::from_millis(100))
            .await;

        assert_eq!(
            result,
            Err(ProcessError::timeout(Duration::from_millis(100)))
        );
        assert!(process.running());
    }

    #[tokio::test]
    async fn test_wait_for_event_since_cursor_sees_earlier_chunks() {
        let process = spawn("echo early; sleep 5");

        let chunk = process
            .wait_for_event_since(0, |line| line == "early", Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(chunk, "early");
    }

    #[tokio::test]
    async fn test_match_wins_over_exit_of_same_process() {
        let process = spawn("echo ready");

        let result = process
            .wait_for_event_since(0, |line| line == "ready", Duration::from_secs(3))
            .await;

        assert_eq!(result, Ok("ready".to_string()));
    }

    #[tokio::test]
    async fn test_wait_for_event_settles_once_across_runs() {
        for round in 0..50 {
            let process = spawn("echo ready; exit 0");
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&calls);

            let result = process
                .wait_for_event_since(
                    0,
                    move |line| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        line == "ready"
                    },
                    Duration::from_secs(3),
                )
                .await;
            assert_eq!(result, Ok("ready".to_string()), "round {}", round);

            let settled = calls.load(Ordering::SeqCst);
            process.wait(Some(Duration::from_secs(3))).await.unwrap();
            assert_eq!(
                calls.load(Ordering::SeqCst),
                settled,
                "predicate ran after the wait settled in round {}",
                round
            );
        }
    }

    #[tokio::test]
    async fn test_repeated_waits_on_one_process() {
        let process = spawn(r#"while read line; do echo "got:$line"; done"#);

        for i in 0..50 {
            let cursor = process.event_cursor();
            process.write_input(&format!("{}\n", i)).await.unwrap();
            let expected = format!("got:{}", i);

            let chunk = process
                .wait_for_event_since(cursor, |line| line == expected, Duration::from_secs(3))
                .await
                .unwrap();
            assert_eq!(chunk, expected);
        }

        let timed_out = process
            .wait_for_event(|line| line == "never", Duration::from_millis(50))
            .await;
        assert_eq!(timed_out, Err(ProcessError::timeout(Duration::from_millis(50))));
        assert_eq!(process.output().stdout_chunks().len(), 50);
        assert!(process.running());
    }

    #[tokio::test]
    async fn test_panicking_callback_keeps_capturing() {
        let options = SpawnOptions::new(
            "echo a; sleep 0.2; echo b; sleep 0.2; echo c",
            std::env::temp_dir(),
        )
        .on_stdout(|line| {
            if line == "a" {
                panic!("callback failed on {}", line);
            }
        });
        let process = ProcessSupervisor::new().spawn(options).unwrap();

        let status = process.wait(Some(Duration::from_secs(5))).await.unwrap();

        assert_eq!(status, ProcessStatus::Finished { code: 0 });
        assert_eq!(process.accumulated_stdout(), "a\nb\nc");
    }

    #[tokio::test]
    async fn test_panicking_exit_callback_still_publishes_status() {
        let options = SpawnOptions::new("echo done", std::env::temp_dir())
            .on_exit(|_, _| panic!("exit callback failed"));
        let process = ProcessSupervisor::new().spawn(options).unwrap();

        let status = process.wait(Some(Duration::from_secs(5))).await.unwrap();

        assert_eq!(status, ProcessStatus::Finished { code: 0 });
        assert_eq!(process.accumulated_stdout(), "done");
    }

    #[tokio::test]
    async fn test_write_input_round_trip() {
        let process = spawn(r#"read line; echo "got:$line""#);

        let cursor = process.event_cursor();
        process.write_input("hello\n").await.unwrap();
        let chunk = process
            .wait_for_event_since(cursor, |line| line.starts_with("got:"), Duration::from_secs(3))
            .await
            .unwrap();

        assert_eq!(chunk, "got:hello");
    }

    #[tokio::test]
    async fn test_write_input_after_exit_fails() {
        let process = spawn("true");
        process.wait(None).await.unwrap();

        let result = process.write_input("late\n").await;
        assert!(matches!(result, Err(Error::StdinUnavailable)));
    }

    #[tokio::test]
    async fn test_kill_after_exit_is_noop() {
        let process = spawn("exit 0");
        process.wait(None).await.unwrap();

        process.kill(KillSignal::Force);
        assert_eq!(process.status(), ProcessStatus::Finished { code: 0 });
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_force_kill() {
        let process = spawn("trap '' TERM; echo armed; while true; do sleep 0.1; done");
        process
            .wait_for_event_since(0, |line| line == "armed", Duration::from_secs(3))
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let status = process.terminate(Duration::from_millis(200)).await;

        assert_eq!(status, ProcessStatus::Killed { signal: Some(9) });
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(!process.running());
    }

    #[tokio::test]
    async fn test_terminate_graceful_exit() {
        let process = spawn("sleep 5");

        let status = process.terminate(Duration::from_secs(2)).await;
        assert_eq!(status, ProcessStatus::Killed { signal: Some(15) });
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_kill_reaches_grandchildren() {
        let process = spawn("sleep 30 & echo $!; wait");
        let line = process
            .wait_for_event_since(0, |line| line.parse::<u32>().is_ok(), Duration::from_secs(3))
            .await
            .unwrap();
        let grandchild: u32 = line.parse().unwrap();
        assert!(is_alive(grandchild));

        process.terminate(Duration::from_secs(2)).await;

        let mut alive = true;
        for _ in 0..40 {
            if !is_alive(grandchild) {
                alive = false;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!alive, "grandchild {} survived group kill", grandchild);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_drop_kills_running_process() {
        let process = spawn("sleep 30");
        let pid = process.pid().unwrap();
        assert!(is_alive(pid));

        drop(process);

        let mut alive = true;
        for _ in 0..40 {
            if !is_alive(pid) {
                alive = false;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!alive, "process {} survived drop", pid);
    }
}
