// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # lokinet-supervisor-platform
//!
//! Native process backends for the lokinet supervisor.
//!
//! - **POSIX** (Linux, macOS, BSD): fork/exec, `SIGTERM` then `SIGKILL`
//! - **Windows**: `CreateProcess` in a new process group, `CTRL_BREAK_EVENT`
//!   close request, `TerminateProcess`
//!
//! Exactly one backend is compiled in, selected by target OS and exposed as
//! [`NativeBackend`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use lokinet_supervisor_core::{ProcessSupervisor, SupervisorConfig};
//! use lokinet_supervisor_platform::native_backend;
//!
//! let supervisor = ProcessSupervisor::new(native_backend(), SupervisorConfig::load("lokinet-supervisor.toml")?)?;
//! supervisor.start().await?;
//! ```

#![warn(missing_docs)]

pub mod handle;

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows;

pub use handle::{ChildHandle, exit_info};
pub use lokinet_supervisor_core::{Platform, detect_platform};

#[cfg(unix)]
pub use posix::PosixBackend;

#[cfg(windows)]
pub use windows::WindowsBackend;

/// The backend for the host OS.
#[cfg(unix)]
pub type NativeBackend = PosixBackend;

/// The backend for the host OS.
#[cfg(windows)]
pub type NativeBackend = WindowsBackend;

/// Creates the backend for the host OS.
#[cfg(any(unix, windows))]
#[must_use]
pub const fn native_backend() -> NativeBackend {
    NativeBackend::new()
}
