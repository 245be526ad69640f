//! Windows backend.
//!
//! The daemon is created in its own process group, attached to the host's
//! console (a hidden one is allocated if the host has none). Graceful stop
//! sends `CTRL_BREAK_EVENT` to that process group; if the event cannot be
//! delivered, `taskkill` is asked to close the process tree instead.
//! Forced stop is `TerminateProcess` through the child handle.
//!
//! Elevation is enforced by the executable's manifest: `CreateProcess`
//! fails with `ERROR_ELEVATION_REQUIRED` when the host is not elevated, and
//! a declined UAC prompt reports `ERROR_CANCELLED`. Both are classified by
//! [`SpawnError::from_io`].

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use lokinet_supervisor_core::{
    ExitInfo, LaunchSpec, Platform, ProcessBackend, SignalError, SpawnError,
};

use crate::handle::ChildHandle;

const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// `taskkill` exit code when no process matches the PID.
const TASKKILL_NOT_FOUND: i32 = 128;

/// Console control events.
mod console {
    use std::io;

    use windows_sys::Win32::System::Console::{
        AllocConsole, CTRL_BREAK_EVENT, GenerateConsoleCtrlEvent, GetConsoleWindow,
    };
    use windows_sys::Win32::UI::WindowsAndMessaging::{SW_HIDE, ShowWindow};

    /// Makes sure the host owns a console the daemon can share.
    ///
    /// Console events only reach processes attached to the sender's console.
    pub(super) fn ensure_console() {
        // SAFETY: takes no arguments; returns null when there is no console.
        if !unsafe { GetConsoleWindow() }.is_null() {
            return;
        }

        // SAFETY: AllocConsole has no preconditions and fails cleanly if a
        // console already exists.
        if unsafe { AllocConsole() } == 0 {
            tracing::warn!(
                error = %io::Error::last_os_error(),
                "failed to allocate console, graceful stop will use taskkill"
            );
            return;
        }

        // SAFETY: the window belongs to the console allocated above.
        unsafe {
            ShowWindow(GetConsoleWindow(), SW_HIDE);
        }
        tracing::debug!("allocated hidden console for daemon control events");
    }

    /// Sends `CTRL_BREAK_EVENT` to the process group led by `pid`.
    pub(super) fn send_ctrl_break(pid: u32) -> io::Result<()> {
        // SAFETY: plain value arguments. The group ID is the daemon's PID,
        // which leads its own group (CREATE_NEW_PROCESS_GROUP), so the host
        // is never in the target group.
        if unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) } == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

/// Process backend for Windows hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsBackend;

impl WindowsBackend {
    /// Creates a new Windows backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn command(spec: &LaunchSpec) -> Command {
        let mut cmd = Command::new(&spec.executable);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .creation_flags(CREATE_NEW_PROCESS_GROUP)
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Asks the process tree to close via `taskkill` (no `/F`).
    ///
    /// Only windowed processes honor this.
    async fn taskkill(handle: &ChildHandle) -> Result<(), SignalError> {
        let pid = handle.pid().to_string();
        let output = Command::new("taskkill")
            .args(["/PID", pid.as_str(), "/T"])
            .stdin(Stdio::null())
            .creation_flags(CREATE_NO_WINDOW)
            .output()
            .await?;

        if output.status.success() {
            tracing::debug!(pid = handle.pid(), "requested close via taskkill");
            return Ok(());
        }
        if output.status.code() == Some(TASKKILL_NOT_FOUND) || !handle.is_alive() {
            return Err(SignalError::AlreadyExited);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("Access is denied") {
            Err(SignalError::permission_denied(stderr))
        } else {
            Err(SignalError::failed(format!("taskkill /PID {pid}: {stderr}")))
        }
    }
}

#[async_trait]
impl ProcessBackend for WindowsBackend {
    type Handle = ChildHandle;

    fn platform(&self) -> Platform {
        Platform::Windows
    }

    async fn spawn(&self, spec: &LaunchSpec) -> Result<ChildHandle, SpawnError> {
        console::ensure_console();

        let child = Self::command(spec)
            .spawn()
            .map_err(|e| SpawnError::from_io(&spec.executable, e))?;
        let handle = ChildHandle::new(child)?;

        tracing::info!(
            executable = %spec.executable.display(),
            pid = handle.pid(),
            "spawned daemon process"
        );
        Ok(handle)
    }

    async fn request_graceful_stop(&self, handle: &ChildHandle) -> Result<(), SignalError> {
        if !handle.is_alive() {
            return Err(SignalError::AlreadyExited);
        }

        match console::send_ctrl_break(handle.pid()) {
            Ok(()) => {
                tracing::debug!(pid = handle.pid(), "sent CTRL_BREAK_EVENT");
                Ok(())
            }
            Err(e) => {
                tracing::debug!(
                    pid = handle.pid(),
                    error = %e,
                    "console break not delivered, falling back to taskkill"
                );
                Self::taskkill(handle).await
            }
        }
    }

    async fn force_terminate(&self, handle: &ChildHandle) -> Result<(), SignalError> {
        match handle.kill() {
            Err(SignalError::AlreadyExited) => Ok(()),
            other => other,
        }
    }

    fn query_pid(&self, handle: &ChildHandle) -> u32 {
        handle.pid()
    }

    fn poll_exit_status(&self, handle: &ChildHandle) -> Option<ExitInfo> {
        handle.try_exit()
    }
}
