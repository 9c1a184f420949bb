//! One-shot shell commands run in the project directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use sandbox_core::prelude::*;
use sandbox_core::OutputSnapshot;
use sandbox_process::ProcessSupervisor;

use crate::config::AppRuntime;

/// Locate `tool` on PATH
pub fn require_tool(tool: &str) -> Result<PathBuf> {
    which::which(tool)
        .inspect_err(|e| debug!("{} lookup failed: {}", tool, e))
        .map_err(|_| Error::tool_not_found(tool))
}

/// Runs commands to completion and returns their captured output
#[derive(Debug, Clone)]
pub struct CommandRunner {
    supervisor: ProcessSupervisor,
    working_dir: PathBuf,
    timeout: Option<Duration>,
}

impl CommandRunner {
    /// `timeout` of `None` waits indefinitely
    pub fn new(working_dir: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            supervisor: ProcessSupervisor::new(),
            working_dir: working_dir.into(),
            timeout,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Run `command`; fails on a non-zero exit or when the timeout elapses
    pub async fn execute(&self, command: &str) -> Result<OutputSnapshot> {
        let process = self
            .supervisor
            .start_and_wait(command, &self.working_dir, self.timeout)
            .await?;
        Ok(process.snapshot())
    }

    /// Fetch the project's packages with the runtime's package manager
    pub async fn install_dependencies(&self, runtime: AppRuntime) -> Result<OutputSnapshot> {
        let binary = require_tool(runtime.binary())?;
        info!("Installing dependencies with {}", binary.display());

        let snapshot = self.execute(&runtime.install_command()).await?;
        info!("Dependencies installed");
        Ok(snapshot)
    }
}
