// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # lokinet-supervisor-core
//!
//! Lifecycle supervision primitives for the lokinet daemon.
//!
//! This crate provides the platform-independent half of the supervisor:
//!
//! - [`ProcessSupervisor`] owning the state machine and the process handle
//! - [`ProcessBackend`] trait implemented once per OS process model
//! - [`SupervisorConfig`] for launch parameters and timing
//! - [`LifecycleEvent`] log and subscriptions for the host application
//!
//! ## Example
//!
//! ```rust,ignore
//! use lokinet_supervisor_core::{ProcessSupervisor, SupervisorConfig};
//! use std::time::Duration;
//!
//! let supervisor = ProcessSupervisor::new(backend, SupervisorConfig::new("/usr/bin/lokinet"))?;
//! let identity = supervisor.start().await?;
//! println!("lokinet running as {identity}");
//!
//! if supervisor.stop(Duration::from_secs(2)).await.is_err() {
//!     supervisor.force_stop().await?;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Allow significant_drop_tightening - overly aggressive for the state lock
#![allow(clippy::significant_drop_tightening)]

pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod platform;
pub mod supervisor;
#[cfg(test)]
pub mod tests;
pub mod types;

pub use backend::{LaunchSpec, ProcessBackend};
pub use config::{MAX_TIMEOUT, SupervisorConfig};
pub use error::{ConfigError, SignalError, SpawnError, StartError, StopError, SupervisorError};
pub use events::{EventLog, EventReceiver};
pub use platform::{Platform, detect_platform};
pub use supervisor::ProcessSupervisor;
pub use types::{ExitInfo, LifecycleEvent, ProcessIdentity, SupervisorState, TransitionCause};
