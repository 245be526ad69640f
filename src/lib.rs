//! lokinet-supervisor: lifecycle supervision for the lokinet daemon.
//!
//! Starts, stops and monitors exactly one lokinet process on behalf of a
//! host application, using the native process backend for the build target.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use lokinet_supervisor::prelude::*;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let supervisor = native_supervisor(SupervisorConfig::new("/usr/bin/lokinet"))?;
//! let identity = supervisor.start().await?;
//! println!("lokinet running as {identity}");
//!
//! supervisor.stop(Duration::from_secs(10)).await?;
//! # Ok(())
//! # }
//! ```

pub use lokinet_supervisor_core as core;
pub use lokinet_supervisor_platform as platform;

use lokinet_supervisor_core::{ConfigError, ProcessSupervisor, SupervisorConfig};
use lokinet_supervisor_platform::{NativeBackend, native_backend};

/// A supervisor driving the host OS backend.
pub type NativeSupervisor = ProcessSupervisor<NativeBackend>;

/// Creates a supervisor for `config` on the host OS backend.
///
/// # Errors
/// Returns an error if the configuration is invalid.
pub fn native_supervisor(config: SupervisorConfig) -> Result<NativeSupervisor, ConfigError> {
    tracing::debug!(
        daemon = %config.name,
        platform = %lokinet_supervisor_platform::detect_platform(),
        "building native supervisor"
    );
    ProcessSupervisor::new(native_backend(), config)
}

/// Prelude module for common imports.
pub mod prelude {
    pub use super::{NativeSupervisor, native_supervisor};
    pub use lokinet_supervisor_core::{
        LifecycleEvent, ProcessBackend, ProcessIdentity, ProcessSupervisor, StartError,
        StopError, SupervisorConfig, SupervisorState, TransitionCause,
    };
    pub use lokinet_supervisor_platform::{NativeBackend, Platform, native_backend};
}
