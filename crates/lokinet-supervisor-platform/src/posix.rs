//! POSIX backend: direct fork/exec with signal-based stop.
//!
//! Graceful stop is `SIGTERM`, forced stop is `SIGKILL`. Signals are only
//! sent while the child is unreaped, so the PID cannot have been recycled.

use std::process::Stdio;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::{Pid, geteuid};
use tokio::process::Command;

use lokinet_supervisor_core::{
    ExitInfo, LaunchSpec, Platform, ProcessBackend, SignalError, SpawnError,
};

use crate::handle::ChildHandle;

/// Process backend for Linux, macOS and other Unix-like hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixBackend;

impl PosixBackend {
    /// Creates a new POSIX backend.
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
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn send(handle: &ChildHandle, sig: Signal) -> Result<(), SignalError> {
        if !handle.is_alive() {
            return Err(SignalError::AlreadyExited);
        }

        let raw = i32::try_from(handle.pid())
            .map_err(|_| SignalError::failed(format!("pid {} out of range", handle.pid())))?;

        match signal::kill(Pid::from_raw(raw), sig) {
            Ok(()) => {
                tracing::debug!(pid = raw, signal = %sig, "sent signal");
                Ok(())
            }
            Err(Errno::ESRCH) => Err(SignalError::AlreadyExited),
            Err(Errno::EPERM) => Err(SignalError::permission_denied(format!(
                "{sig} to pid {raw}: operation not permitted"
            ))),
            Err(e) => Err(SignalError::failed(format!("{sig} to pid {raw}: {e}"))),
        }
    }
}

#[async_trait]
impl ProcessBackend for PosixBackend {
    type Handle = ChildHandle;

    fn platform(&self) -> Platform {
        Platform::Posix
    }

    async fn spawn(&self, spec: &LaunchSpec) -> Result<ChildHandle, SpawnError> {
        if spec.require_elevation && !geteuid().is_root() {
            return Err(SpawnError::ElevationRequired);
        }

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
        Self::send(handle, Signal::SIGTERM)
    }

    async fn force_terminate(&self, handle: &ChildHandle) -> Result<(), SignalError> {
        match Self::send(handle, Signal::SIGKILL) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use lokinet_supervisor_core::{
        ProcessSupervisor, StopError, SupervisorConfig, SupervisorState, TransitionCause,
    };

    /// Ignores SIGTERM; the disposition survives the exec.
    const STUBBORN: &str = "trap '' TERM; exec sleep 30";

    fn sleep_spec() -> LaunchSpec {
        LaunchSpec::new("/bin/sleep").with_args(["30"])
    }

    async fn wait_exit(backend: &PosixBackend, handle: &ChildHandle) -> Option<ExitInfo> {
        for _ in 0..300 {
            if let Some(exit) = backend.poll_exit_status(handle) {
                return Some(exit);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    fn supervisor(executable: &str, args: &[&str]) -> ProcessSupervisor<PosixBackend> {
        let config = SupervisorConfig::new(executable)
            .with_args(args.iter().copied())
            .with_require_elevation(false)
            .with_poll_interval(Duration::from_millis(20))
            .with_kill_timeout(Duration::from_secs(3));
        ProcessSupervisor::new(PosixBackend::new(), config).unwrap()
    }

    #[test]
    fn test_posix_platform() {
        assert_eq!(PosixBackend::new().platform(), Platform::Posix);
    }

    #[tokio::test]
    async fn test_spawn_and_terminate() {
        let backend = PosixBackend::new();
        let handle = backend.spawn(&sleep_spec()).await.unwrap();

        assert!(backend.query_pid(&handle) > 0);
        assert_eq!(backend.poll_exit_status(&handle), None);

        assert_ok!(backend.request_graceful_stop(&handle).await);
        assert_eq!(
            wait_exit(&backend, &handle).await,
            Some(ExitInfo::signal(Signal::SIGTERM as i32))
        );

        // Both requests are harmless once the process is gone
        let err = assert_err!(backend.request_graceful_stop(&handle).await);
        assert!(err.is_already_exited());
        assert_ok!(backend.force_terminate(&handle).await);
    }

    #[tokio::test]
    async fn test_force_terminate_ignores_term_handler() {
        let backend = PosixBackend::new();
        let spec = LaunchSpec::new("/bin/sh").with_args(["-c", STUBBORN]);
        let handle = backend.spawn(&spec).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        backend.request_graceful_stop(&handle).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(backend.poll_exit_status(&handle), None);

        backend.force_terminate(&handle).await.unwrap();
        assert_eq!(
            wait_exit(&backend, &handle).await,
            Some(ExitInfo::signal(Signal::SIGKILL as i32))
        );
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let backend = PosixBackend::new();
        let spec = LaunchSpec::new("/nonexistent/lokinet");

        let err = backend.spawn(&spec).await.unwrap_err();
        assert!(matches!(err, SpawnError::BinaryNotFound(_)));
    }

    #[tokio::test]
    async fn test_spawn_requires_root() {
        let backend = PosixBackend::new();
        let spec = sleep_spec().with_require_elevation(true);

        let result = backend.spawn(&spec).await;
        if geteuid().is_root() {
            let handle = result.unwrap();
            backend.force_terminate(&handle).await.unwrap();
        } else {
            assert!(matches!(result, Err(SpawnError::ElevationRequired)));
        }
    }

    #[tokio::test]
    async fn test_supervisor_graceful_stop() {
        let sup = supervisor("/bin/sleep", &["30"]);

        let identity = sup.start().await.unwrap();
        assert_eq!(sup.get_pid(), Some(identity));

        sup.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert_eq!(
            sup.events().last().unwrap().cause,
            TransitionCause::ExitConfirmed(ExitInfo::signal(Signal::SIGTERM as i32))
        );
    }

    #[tokio::test]
    async fn test_supervisor_stubborn_daemon() {
        let sup = supervisor("/bin/sh", &["-c", STUBBORN]);
        sup.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let err = assert_err!(sup.stop(Duration::from_millis(300)).await);
        assert!(matches!(err, StopError::GracefulStopTimedOut(_)));
        assert_eq!(sup.state(), SupervisorState::FailedToStop);

        assert_ok!(sup.force_stop().await);
        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert_eq!(sup.get_pid(), None);
    }

    #[tokio::test]
    async fn test_supervisor_detects_external_kill() {
        let sup = supervisor("/bin/sleep", &["30"]);
        let identity = sup.start().await.unwrap();

        #[allow(clippy::cast_possible_wrap)]
        signal::kill(Pid::from_raw(identity.pid as i32), Signal::SIGKILL).unwrap();

        let state = sup
            .wait_for_state(|s| s == SupervisorState::Stopped, Duration::from_secs(3))
            .await;
        assert_eq!(state, Some(SupervisorState::Stopped));
        assert!(sup.events().last().unwrap().cause.is_unexpected_exit());
    }
}
