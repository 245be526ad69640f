//! Error types for lokinet-supervisor-core.
//!
//! All errors are explicit, no panics allowed. Backend errors are wrapped,
//! never swallowed, and the supervisor never retries on the caller's behalf.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::SupervisorState;

/// Windows: the requested operation requires elevation.
const ERROR_ELEVATION_REQUIRED: i32 = 740;
/// Windows: the operation was canceled by the user (UAC prompt declined).
const ERROR_CANCELLED: i32 = 1223;

// =============================================================================
// SpawnError
// =============================================================================

/// The backend could not create the daemon process.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The daemon executable does not exist.
    #[error("daemon binary not found: {}", .0.display())]
    BinaryNotFound(PathBuf),

    /// The OS refused to execute the binary.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The daemon needs elevated privileges the host process lacks.
    #[error("elevated privileges required to launch daemon")]
    ElevationRequired,

    /// The user declined the privilege-elevation prompt.
    #[error("privilege elevation declined")]
    ElevationDeclined,

    /// The OS ran out of processes, memory or handles.
    #[error("resources exhausted: {0}")]
    ResourceExhausted(String),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SpawnError {
    /// Classifies an I/O error from process creation.
    #[must_use]
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(ERROR_ELEVATION_REQUIRED) if cfg!(windows) => return Self::ElevationRequired,
            Some(ERROR_CANCELLED) if cfg!(windows) => return Self::ElevationDeclined,
            _ => {}
        }

        match err.kind() {
            io::ErrorKind::NotFound => Self::BinaryNotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => {
                Self::PermissionDenied(format!("{}: {err}", path.display()))
            }
            io::ErrorKind::OutOfMemory | io::ErrorKind::WouldBlock => {
                Self::ResourceExhausted(err.to_string())
            }
            _ => Self::Io(err),
        }
    }

    /// Returns true if the failure is about privileges rather than the binary.
    #[must_use]
    pub const fn is_privilege_error(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_) | Self::ElevationRequired | Self::ElevationDeclined
        )
    }
}

// =============================================================================
// SignalError
// =============================================================================

/// A stop or kill request could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// The process is already gone.
    #[error("process already exited")]
    AlreadyExited,

    /// The OS refused to deliver the request.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The request failed for another reason.
    #[error("signal failed: {0}")]
    Failed(String),

    /// I/O error while delivering the request.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SignalError {
    /// Creates a generic signal failure.
    #[must_use]
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Creates a permission failure.
    #[must_use]
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Returns true if the target process no longer exists.
    #[must_use]
    pub const fn is_already_exited(&self) -> bool {
        matches!(self, Self::AlreadyExited)
    }
}

// =============================================================================
// StartError / StopError
// =============================================================================

/// Failure of [`ProcessSupervisor::start`](crate::ProcessSupervisor::start).
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// The daemon is running or a start is already in flight.
    #[error("daemon already running")]
    AlreadyRunning,

    /// A previous run still holds a live process.
    #[error("previous daemon process still alive (state: {0})")]
    StopPending(SupervisorState),

    /// The backend could not create the process.
    #[error("spawn failed: {0}")]
    SpawnFailed(#[from] SpawnError),

    /// `force_stop()` was called while the spawn was in flight.
    #[error("start aborted by forced stop")]
    Aborted,
}

/// Failure of a stop operation.
#[derive(Debug, thiserror::Error)]
pub enum StopError {
    /// The daemon ignored the graceful request; call `force_stop()`.
    #[error("graceful stop timed out after {0:?}")]
    GracefulStopTimedOut(Duration),

    /// There is no process to terminate.
    #[error("no daemon process to kill")]
    NoHandleToKill,

    /// The OS refused to terminate the process.
    #[error("termination denied: {0}")]
    TerminationDenied(String),

    /// The graceful stop request could not be delivered.
    #[error("stop request failed: {0}")]
    Signal(#[from] SignalError),

    /// The operation does not apply in the current state.
    #[error("cannot stop in state {0}")]
    InvalidState(SupervisorState),
}

impl StopError {
    /// Returns true if this error cannot be resolved by this process.
    ///
    /// The daemon survived a forced kill and must be escalated to an operator.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::TerminationDenied(_))
    }

    /// Returns true if `force_stop()` is the expected next step.
    #[must_use]
    pub const fn needs_force(&self) -> bool {
        matches!(self, Self::GracefulStopTimedOut(_) | Self::Signal(_))
    }
}

/// Umbrella error for compound operations such as `restart()`.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The start half failed.
    #[error(transparent)]
    Start(#[from] StartError),

    /// The stop half failed.
    #[error(transparent)]
    Stop(#[from] StopError),
}

// =============================================================================
// ConfigError
// =============================================================================

/// Invalid or unreadable supervisor configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A field failed validation.
    #[error("configuration error: {0}")]
    Invalid(String),

    /// The configuration file could not be read.
    #[error("failed to read config: {0}")]
    Read(#[from] io::Error),

    /// The configuration file could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    /// Creates a validation error.
    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
