//! Core types for daemon supervision.
//!
//! Explicit state machine, no implicit transitions. Every change of
//! [`SupervisorState`] is recorded as a [`LifecycleEvent`].

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Supervisor lifecycle state.
///
/// State transitions follow a strict state machine:
/// ```text
/// Stopped ──start──→ Starting ──spawn ok──→ Running ──stop──→ Stopping ──exit──→ Stopped
///                       │                                        │
///                  spawn fail                                 timeout
///                       ↓                                        ↓
///                 FailedToStart ──start──→ Starting         FailedToStop ──force_stop──→ Stopped
/// ```
/// Any state holding a process moves to `Stopped` when that process exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupervisorState {
    /// No daemon process exists.
    Stopped,
    /// A spawn is in flight.
    Starting,
    /// The daemon is running and has a PID.
    Running,
    /// A graceful stop was requested and exit is awaited.
    Stopping,
    /// The last spawn attempt failed.
    FailedToStart,
    /// The daemon did not stop when asked (or refused to be killed).
    FailedToStop,
}

impl SupervisorState {
    /// Returns true if a live process handle may exist in this state.
    #[must_use]
    pub const fn holds_process(&self) -> bool {
        matches!(self, Self::Running | Self::Stopping | Self::FailedToStop)
    }

    /// Returns true if no process exists and none is being spawned.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Stopped | Self::FailedToStart)
    }

    /// Returns true if this is one of the failure states.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::FailedToStart | Self::FailedToStop)
    }

    /// Returns true if the exit watcher may move this state to `Stopped`.
    #[must_use]
    pub const fn observes_exit(&self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Running | Self::Stopping | Self::FailedToStop
        )
    }

    /// Returns the state name as a static string.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::FailedToStart => "failed-to-start",
            Self::FailedToStop => "failed-to-stop",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// PID of a supervised run plus the generation it belongs to.
///
/// The generation increments on every successful start, so a PID captured
/// during an earlier run can be told apart from the current one even if the
/// OS recycles the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessIdentity {
    /// OS process ID.
    pub pid: u32,
    /// Run counter, starting at 1 for the first successful start.
    pub generation: u64,
}

impl ProcessIdentity {
    /// Creates a new identity.
    #[must_use]
    pub const fn new(pid: u32, generation: u64) -> Self {
        Self { pid, generation }
    }

    /// Returns true if this identity belongs to the given generation.
    #[must_use]
    pub const fn is_generation(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid{}@gen{}", self.pid, self.generation)
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number (Unix only).
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Exit with a status code.
    #[must_use]
    pub const fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Termination by a signal.
    #[must_use]
    pub const fn signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Returns true if the process exited with code 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(sig)) => write!(f, "signal {sig}"),
            (None, None) => f.write_str("unknown exit"),
        }
    }
}

/// Why a state transition happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransitionCause {
    /// `start()` was called.
    StartRequested,
    /// The backend created the process.
    Spawned {
        /// PID of the new process.
        pid: u32,
    },
    /// The backend could not create the process.
    SpawnFailed {
        /// Rendered spawn error.
        reason: String,
    },
    /// `force_stop()` arrived while the spawn was in flight.
    StartAborted,
    /// `stop()` was called.
    StopRequested,
    /// The process exited while a stop was pending.
    ExitConfirmed(ExitInfo),
    /// The graceful stop request did not lead to exit in time.
    GracefulStopTimedOut {
        /// The timeout that elapsed.
        #[serde(with = "humantime_serde")]
        timeout: Duration,
    },
    /// The graceful stop request could not be delivered.
    SignalFailed {
        /// Rendered signal error.
        reason: String,
    },
    /// `force_stop()` was called.
    ForceStopRequested,
    /// The process was forcibly terminated.
    ForceKilled {
        /// Exit status, if it could be collected.
        exit: Option<ExitInfo>,
    },
    /// The OS refused to terminate the process.
    TerminationDenied {
        /// Rendered failure.
        reason: String,
    },
    /// The process exited without anyone asking it to.
    UnexpectedExit(ExitInfo),
}

impl TransitionCause {
    /// Returns true if this cause reports a crash or external kill.
    #[must_use]
    pub const fn is_unexpected_exit(&self) -> bool {
        matches!(self, Self::UnexpectedExit(_))
    }
}

/// Immutable record of one state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Position in the supervisor's event stream, starting at 0.
    pub sequence: u64,
    /// Wall-clock time of the transition (Unix epoch ms).
    pub timestamp_epoch_ms: u64,
    /// State before the transition.
    pub from: SupervisorState,
    /// State after the transition.
    pub to: SupervisorState,
    /// Why it happened.
    pub cause: TransitionCause,
    /// Generation the transition applies to.
    pub generation: u64,
}

impl LifecycleEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn now(
        sequence: u64,
        from: SupervisorState,
        to: SupervisorState,
        cause: TransitionCause,
        generation: u64,
    ) -> Self {
        Self {
            sequence,
            timestamp_epoch_ms: epoch_ms(),
            from,
            to,
            cause,
            generation,
        }
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Serde helper for humantime durations.
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serializes a duration as a human-readable string.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    /// Deserializes a duration from a human-readable string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
