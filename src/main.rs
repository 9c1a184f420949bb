//! Sandbox Server - supervisor for a project's dev server
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::{info, warn};

use sandbox_app::config::{
    apply_env_overrides, load_settings, load_settings_from, process_env, resolve_run_command,
    validate_settings, working_dir_override,
};

/// Sandbox Server - supervise a dev server and stream its events
#[derive(Parser, Debug)]
#[command(name = "sandbox-server")]
#[command(about = "Supervise a dev server and stream its events over WebSocket", long_about = None)]
struct Args {
    /// Project working directory
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Settings file (defaults to <PATH>/.sandbox/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// WebSocket port, overriding settings and environment
    #[arg(long)]
    port: Option<u16>,

    /// Do not install dependencies or start the app on boot
    #[arg(long)]
    no_boot: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    sandbox_core::logging::init()?;

    let args = Args::parse();

    // CLI path wins over the environment, then the current directory
    let working_dir = args
        .path
        .or_else(|| working_dir_override(process_env))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut settings = match &args.config {
        Some(path) => load_settings_from(path),
        None => load_settings(&working_dir),
    };
    apply_env_overrides(&mut settings, process_env)?;
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if args.no_boot {
        settings.app.start_on_boot = false;
    }
    validate_settings(&settings)?;

    let run_command = match resolve_run_command(&settings, &working_dir) {
        Ok(command) => command,
        Err(e) => {
            warn!("Failed to resolve run command: {}", e);
            None
        }
    };
    info!("Run command: {:?}", run_command);

    sandbox_server::run_headless(settings, &working_dir, run_command).await?;
    Ok(())
}
