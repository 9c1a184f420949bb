//! Append-only capture of a process's output

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use sandbox_core::{OutputEvent, OutputSnapshot, ProcessStatus};

#[derive(Debug, Default)]
struct OutputState {
    events: Vec<OutputEvent>,
    status: ProcessStatus,
}

/// Ordered log of everything a process wrote plus its terminal status.
///
/// Written only by the reader and supervising tasks of one process. Every
/// appended chunk wakes the tasks waiting for new output.
#[derive(Debug, Default)]
pub struct ProcessOutput {
    state: Mutex<OutputState>,
    captured: Notify,
}

impl ProcessOutput {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, OutputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, event: OutputEvent) {
        self.state().events.push(event);
        self.captured.notify_waiters();
    }

    /// Record the terminal status and the trailing `Exit` entry.
    ///
    /// Waiters are not woken here; they observe the exit through the
    /// process's status channel once the exit callback has run.
    pub(crate) fn finish(&self, status: ProcessStatus) {
        let mut state = self.state();
        if state.status.is_terminal() {
            return;
        }
        state.events.push(OutputEvent::Exit {
            code: status.code(),
        });
        state.status = status;
    }

    /// Notification fired after every append
    pub(crate) fn captured(&self) -> &Notify {
        &self.captured
    }

    pub fn status(&self) -> ProcessStatus {
        self.state().status
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.status().code()
    }

    /// Number of entries captured so far; usable as a scan cursor
    pub fn len(&self) -> usize {
        self.state().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.state().events.clone()
    }

    pub fn stdout_chunks(&self) -> Vec<String> {
        self.state()
            .events
            .iter()
            .filter_map(|event| match event {
                OutputEvent::Stdout { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn stderr_chunks(&self) -> Vec<String> {
        self.state()
            .events
            .iter()
            .filter_map(|event| match event {
                OutputEvent::Stderr { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// All stdout chunks joined with newlines
    pub fn stdout(&self) -> String {
        self.stdout_chunks().join("\n")
    }

    /// All stderr chunks joined with newlines
    pub fn stderr(&self) -> String {
        self.stderr_chunks().join("\n")
    }

    pub fn snapshot(&self) -> OutputSnapshot {
        let state = self.state();
        let mut snapshot = OutputSnapshot {
            exit_code: state.status.code(),
            finished: state.status.is_terminal(),
            ..OutputSnapshot::default()
        };
        for event in &state.events {
            match event {
                OutputEvent::Stdout { text } => snapshot.stdout.push(text.clone()),
                OutputEvent::Stderr { text } => snapshot.stderr.push(text.clone()),
                OutputEvent::Exit { .. } => {}
            }
        }
        snapshot
    }

    /// Find the first stdout/stderr chunk at or after `cursor` matching `predicate`.
    ///
    /// `cursor` is advanced past every entry inspected so repeated scans never
    /// look at the same chunk twice.
    pub(crate) fn scan_since<F>(&self, cursor: &mut usize, predicate: &mut F) -> Option<String>
    where
        F: FnMut(&str) -> bool,
    {
        let state = self.state();
        while *cursor < state.events.len() {
            let event = &state.events[*cursor];
            *cursor += 1;
            if let Some(text) = event.text() {
                if predicate(text) {
                    return Some(text.to_string());
                }
            }
        }
        None
    }
}
