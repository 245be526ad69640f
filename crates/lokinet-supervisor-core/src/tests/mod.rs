//! Test infrastructure for supervisor behavior.
//!
//! | Module | Covers |
//! |--------|--------|
//! | `lifecycle` | State machine transitions and scenarios |
//! | `concurrency` | Foreground calls racing the exit watcher |
//! | `properties` | Random operation sequences against a reference model |


pub use mocks::{MockBackend, MockProcess};

use std::time::Duration;

use crate::config::SupervisorConfig;
use crate::supervisor::ProcessSupervisor;

/// Poll interval used by every supervisor built in tests.
pub const POLL: Duration = Duration::from_millis(100);

/// Builds a supervisor over `backend` with test timings.
pub fn supervisor(backend: &MockBackend) -> ProcessSupervisor<MockBackend> {
    let config = SupervisorConfig::new("/usr/bin/lokinet")
        .with_require_elevation(false)
        .with_poll_interval(POLL)
        .with_stop_timeout(Duration::from_secs(2))
        .with_kill_timeout(Duration::from_secs(1));
    ProcessSupervisor::new(backend.clone(), config).unwrap()
}
