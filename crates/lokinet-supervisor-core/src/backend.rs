//! Platform backend abstraction for daemon process control.
//!
//! # Standardized Work
//! Every backend follows the same contract, so the supervisor's state
//! machine behaves identically on Windows and POSIX hosts.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{SignalError, SpawnError};
use crate::platform::Platform;
use crate::types::ExitInfo;

/// Everything a backend needs to launch the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Path to the daemon executable.
    pub executable: PathBuf,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
    /// Working directory.
    pub working_dir: Option<PathBuf>,
    /// Refuse to spawn unless the host process is privileged.
    pub require_elevation: bool,
}

impl LaunchSpec {
    /// Creates a launch spec with no arguments.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            require_elevation: false,
        }
    }

    /// Sets the arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether privileges are required.
    #[must_use]
    pub const fn with_require_elevation(mut self, required: bool) -> Self {
        self.require_elevation = required;
        self
    }
}

/// Platform-specific process control.
///
/// One implementation exists per OS process model. The handle is opaque to
/// the supervisor: it is created by [`spawn`](Self::spawn), handed back to
/// the other operations by reference, and dropped exactly once after the
/// process has been confirmed dead.
///
/// `query_pid` and `poll_exit_status` must not block. The async operations
/// may block on the OS and are always called without the supervisor's state
/// lock held.
#[async_trait]
pub trait ProcessBackend: Send + Sync + 'static {
    /// Opaque reference to a running child.
    type Handle: Send + Sync + 'static;

    /// Returns the process model this backend drives.
    fn platform(&self) -> Platform;

    /// Creates the daemon process.
    ///
    /// Must not leak a handle on failure.
    ///
    /// # Errors
    /// Returns an error if the binary is missing, privileges are lacking, or
    /// the OS cannot create the process.
    async fn spawn(&self, spec: &LaunchSpec) -> Result<Self::Handle, SpawnError>;

    /// Asks the daemon to shut down cooperatively.
    ///
    /// Best effort: success means the request was delivered, not that the
    /// process will exit.
    ///
    /// # Errors
    /// Returns an error if the request cannot be delivered.
    async fn request_graceful_stop(&self, handle: &Self::Handle) -> Result<(), SignalError>;

    /// Kills the daemon unconditionally.
    ///
    /// Idempotent: terminating an already-dead process succeeds.
    ///
    /// # Errors
    /// Returns an error if the OS refuses the termination.
    async fn force_terminate(&self, handle: &Self::Handle) -> Result<(), SignalError>;

    /// Returns the OS process ID. Pure read.
    fn query_pid(&self, handle: &Self::Handle) -> u32;

    /// Returns exit information once the process has died, `None` while it
    /// is alive. Never blocks.
    fn poll_exit_status(&self, handle: &Self::Handle) -> Option<ExitInfo>;
}
