//! Child process handle shared by the native backends.

use std::io;
use std::process::ExitStatus;

use parking_lot::Mutex;
use tokio::process::Child;

use lokinet_supervisor_core::{ExitInfo, SignalError, SpawnError};

/// A spawned daemon process.
///
/// The child sits behind a mutex that is only held for non-blocking calls
/// (`try_wait`, `start_kill`). The exit status is cached the first time it
/// is observed, because the OS hands it out only once.
#[derive(Debug)]
pub struct ChildHandle {
    pid: u32,
    child: Mutex<Child>,
    exit: Mutex<Option<ExitInfo>>,
}

impl ChildHandle {
    /// Wraps a freshly spawned child.
    ///
    /// # Errors
    /// Returns an error if the child has no PID, which only happens once it
    /// has already been reaped.
    pub fn new(child: Child) -> Result<Self, SpawnError> {
        let pid = child
            .id()
            .ok_or_else(|| SpawnError::Io(io::Error::other("child exited before reporting a PID")))?;

        Ok(Self {
            pid,
            child: Mutex::new(child),
            exit: Mutex::new(None),
        })
    }

    /// Returns the OS process ID.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns the exit status if the process has terminated.
    ///
    /// Never blocks.
    pub fn try_exit(&self) -> Option<ExitInfo> {
        let mut exit = self.exit.lock();
        if exit.is_some() {
            return *exit;
        }

        match self.child.lock().try_wait() {
            Ok(Some(status)) => {
                let info = exit_info(status);
                tracing::debug!(pid = self.pid, exit = %info, "reaped daemon process");
                *exit = Some(info);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(pid = self.pid, error = %e, "failed to poll daemon exit status"),
        }
        *exit
    }

    /// Returns true while the process has not been observed to exit.
    pub fn is_alive(&self) -> bool {
        self.try_exit().is_none()
    }

    /// Forcibly terminates the process (SIGKILL / `TerminateProcess`).
    ///
    /// Does not wait for the process to die.
    ///
    /// # Errors
    /// Returns `AlreadyExited` if the exit has been observed, or the OS error.
    pub fn kill(&self) -> Result<(), SignalError> {
        if !self.is_alive() {
            return Err(SignalError::AlreadyExited);
        }
        self.child.lock().start_kill().map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => {
                SignalError::permission_denied(format!("pid {}: {e}", self.pid))
            }
            io::ErrorKind::InvalidInput => SignalError::AlreadyExited,
            _ => SignalError::Io(e),
        })
    }
}

/// Converts an OS exit status into the supervisor's representation.
#[must_use]
pub fn exit_info(status: ExitStatus) -> ExitInfo {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return ExitInfo::signal(sig);
        }
    }

    status.code().map_or(ExitInfo::default(), ExitInfo::code)
}
