//! Process-group signalling

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

use sandbox_core::prelude::*;

/// Strength of a termination request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KillSignal {
    /// SIGTERM: the process may clean up or ignore it
    #[default]
    Graceful,
    /// SIGKILL: cannot be caught
    Force,
}

impl KillSignal {
    #[cfg(unix)]
    fn as_nix(self) -> Signal {
        match self {
            KillSignal::Graceful => Signal::SIGTERM,
            KillSignal::Force => Signal::SIGKILL,
        }
    }
}

/// Send `signal` to every process in the group led by `pgid`.
///
/// Returns `false` when the signal could not be delivered and the caller
/// should fall back to killing the direct child. A group that no longer
/// exists counts as delivered.
#[cfg(unix)]
pub(crate) fn signal_group(pgid: u32, signal: KillSignal) -> bool {
    let Ok(raw) = i32::try_from(pgid) else {
        warn!("Process group id {} out of range", pgid);
        return false;
    };

    match killpg(Pid::from_raw(raw), signal.as_nix()) {
        Ok(()) => {
            debug!("Sent {:?} to process group {}", signal, pgid);
            true
        }
        Err(Errno::ESRCH) => {
            debug!("Process group {} already gone", pgid);
            true
        }
        Err(e) => {
            warn!("Failed to signal process group {}: {}", pgid, e);
            false
        }
    }
}

/// No process groups to signal; the caller kills the direct child instead.
#[cfg(not(unix))]
pub(crate) fn signal_group(_pgid: u32, _signal: KillSignal) -> bool {
    false
}
