//! Process supervisor - owns the daemon lifecycle state machine.
//!
//! # Jidoka (自働化)
//! Failures are surfaced, never retried behind the caller's back. The only
//! condition absorbed locally is an unexpected exit, which is recovered into
//! a clean `Stopped` state and recorded in the event log.
//!
//! # Locking
//! A single state lock guards the [`SupervisorState`], the generation
//! counter, the process handle and the event log. It is held only while
//! reading or writing that slot, never across an `.await` or a blocking OS
//! call. Spawning, signalling and waiting all happen with the lock released,
//! and every path re-checks the generation after re-acquiring it.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::backend::ProcessBackend;
use crate::config::SupervisorConfig;
use crate::error::{ConfigError, StartError, StopError, SupervisorError};
use crate::events::{EventLog, EventReceiver};
use crate::platform::Platform;
use crate::types::{LifecycleEvent, ProcessIdentity, SupervisorState, TransitionCause};

use SupervisorState::{FailedToStart, FailedToStop, Running, Starting, Stopped, Stopping};

// =============================================================================
// Slot
// =============================================================================

/// Everything guarded by the state lock.
struct Slot<H> {
    state: SupervisorState,
    /// Incremented on every successful spawn.
    generation: u64,
    identity: Option<ProcessIdentity>,
    handle: Option<Arc<H>>,
    /// Set by `force_stop()` while a spawn is in flight.
    abort_start: bool,
    events: EventLog,
}

/// Result of checking the current run for exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observation {
    /// The process is still alive.
    Alive,
    /// The process exited and the slot was moved to `Stopped`.
    Exited,
    /// The run was already resolved elsewhere, or a newer run replaced it.
    Superseded,
}

struct Inner<B: ProcessBackend> {
    backend: B,
    config: SupervisorConfig,
    slot: Mutex<Slot<B::Handle>>,
    state_tx: watch::Sender<SupervisorState>,
}

impl<B: ProcessBackend> Inner<B> {
    /// Applies a transition. Caller holds the lock.
    fn transition(&self, slot: &mut Slot<B::Handle>, to: SupervisorState, cause: TransitionCause) {
        let from = slot.state;
        slot.state = to;
        let event = slot.events.record(from, to, cause, slot.generation);
        self.state_tx.send_replace(to);

        tracing::info!(
            daemon = %self.config.name,
            from = %from,
            to = %to,
            generation = event.generation,
            cause = ?event.cause,
            "state transition"
        );
    }

    /// Drops the handle and moves to `Stopped`. Caller holds the lock.
    fn release(&self, slot: &mut Slot<B::Handle>, cause: TransitionCause) {
        slot.handle = None;
        slot.identity = None;
        self.transition(slot, Stopped, cause);
    }

    /// Polls the run of `generation` for exit. Caller holds the lock.
    ///
    /// `poll_exit_status` never blocks, so calling it under the lock is fine.
    fn observe_exit(&self, slot: &mut Slot<B::Handle>, generation: u64) -> Observation {
        if slot.generation != generation || !slot.state.observes_exit() {
            return Observation::Superseded;
        }
        let Some(handle) = slot.handle.as_ref() else {
            return Observation::Superseded;
        };
        let Some(exit) = self.backend.poll_exit_status(handle) else {
            return Observation::Alive;
        };

        let cause = match slot.state {
            Stopping | FailedToStop => TransitionCause::ExitConfirmed(exit),
            _ => {
                tracing::warn!(
                    daemon = %self.config.name,
                    generation,
                    exit = %exit,
                    "daemon exited unexpectedly"
                );
                TransitionCause::UnexpectedExit(exit)
            }
        };
        self.release(slot, cause);
        Observation::Exited
    }

    /// Returns the live handle and its generation, if any.
    fn current_handle(slot: &Slot<B::Handle>) -> Option<(Arc<B::Handle>, u64)> {
        slot.handle
            .as_ref()
            .map(|handle| (Arc::clone(handle), slot.generation))
    }
}

/// Deadline `timeout` from now; `None` if the clock cannot represent it.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

/// Time to sleep before the next poll, never past the deadline.
fn next_poll(interval: Duration, deadline: Option<Instant>) -> Duration {
    deadline.map_or(interval, |deadline| {
        interval.min(deadline.saturating_duration_since(Instant::now()))
    })
}

// =============================================================================
// ProcessSupervisor
// =============================================================================

/// Supervises one daemon process through one [`ProcessBackend`].
///
/// Explicitly constructed and owned by the host application. Dropping the
/// supervisor drops the process handle, and backends spawn with kill-on-drop,
/// so no daemon outlives its supervisor.
pub struct ProcessSupervisor<B: ProcessBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: ProcessBackend> ProcessSupervisor<B> {
    /// Creates a supervisor in the `Stopped` state.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(backend: B, config: SupervisorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let (state_tx, _) = watch::channel(Stopped);
        let slot = Slot {
            state: Stopped,
            generation: 0,
            identity: None,
            handle: None,
            abort_start: false,
            events: EventLog::new(config.event_log_capacity),
        };

        tracing::debug!(
            daemon = %config.name,
            platform = %backend.platform(),
            executable = %config.executable_path.display(),
            "created supervisor"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                backend,
                config,
                slot: Mutex::new(slot),
                state_tx,
            }),
        })
    }

    /// Starts the daemon.
    ///
    /// Concurrent calls are serialized on the state lock: while one start is
    /// in flight, every other call observes `AlreadyRunning`.
    ///
    /// # Errors
    /// - `AlreadyRunning` if the state is `Running` or `Starting`
    /// - `StopPending` if a previous process is still alive
    /// - `SpawnFailed` if the backend cannot create the process
    /// - `Aborted` if `force_stop()` was called during the spawn
    pub async fn start(&self) -> Result<ProcessIdentity, StartError> {
        {
            let mut slot = self.inner.slot.lock();
            match slot.state {
                Running | Starting => return Err(StartError::AlreadyRunning),
                Stopping | FailedToStop => return Err(StartError::StopPending(slot.state)),
                Stopped | FailedToStart => {}
            }
            slot.abort_start = false;
            self.inner
                .transition(&mut slot, Starting, TransitionCause::StartRequested);
        }

        let spec = self.inner.config.launch_spec();
        let spawned = self.inner.backend.spawn(&spec).await;

        let mut slot = self.inner.slot.lock();
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(daemon = %self.inner.config.name, error = %err, "spawn failed");
                self.inner.transition(
                    &mut slot,
                    FailedToStart,
                    TransitionCause::SpawnFailed {
                        reason: err.to_string(),
                    },
                );
                return Err(StartError::SpawnFailed(err));
            }
        };

        let pid = self.inner.backend.query_pid(&handle);
        slot.generation += 1;
        let generation = slot.generation;
        let identity = ProcessIdentity::new(pid, generation);
        slot.identity = Some(identity);
        slot.handle = Some(Arc::new(handle));

        let aborted = std::mem::take(&mut slot.abort_start);
        if aborted {
            // force_stop() is waiting on the state watch and will kill it.
            self.inner
                .transition(&mut slot, Stopping, TransitionCause::StartAborted);
        } else {
            self.inner
                .transition(&mut slot, Running, TransitionCause::Spawned { pid });
        }
        drop(slot);

        self.spawn_watcher(generation);

        if aborted {
            return Err(StartError::Aborted);
        }
        tracing::info!(daemon = %self.inner.config.name, pid, generation, "daemon started");
        Ok(identity)
    }

    /// Asks the daemon to exit and waits up to `timeout` for it to do so.
    ///
    /// Succeeds without touching the backend if nothing is running.
    ///
    /// # Errors
    /// - `GracefulStopTimedOut` if the daemon is still alive after `timeout`
    ///   (state becomes `FailedToStop`; call [`force_stop`](Self::force_stop))
    /// - `Signal` if the stop request could not be delivered
    /// - `InvalidState` from `Starting`, `Stopping` or `FailedToStop`
    pub async fn stop(&self, timeout: Duration) -> Result<(), StopError> {
        let (handle, generation) = {
            let mut slot = self.inner.slot.lock();
            match slot.state {
                Stopped | FailedToStart => {
                    tracing::debug!(daemon = %self.inner.config.name, state = %slot.state, "stop: nothing to do");
                    return Ok(());
                }
                Starting | Stopping | FailedToStop => {
                    return Err(StopError::InvalidState(slot.state));
                }
                Running => {}
            }
            let Some(current) = Inner::<B>::current_handle(&slot) else {
                return Err(StopError::InvalidState(slot.state));
            };
            self.inner
                .transition(&mut slot, Stopping, TransitionCause::StopRequested);
            current
        };

        if let Err(err) = self.inner.backend.request_graceful_stop(&handle).await {
            if !err.is_already_exited() {
                let mut slot = self.inner.slot.lock();
                if slot.generation == generation && slot.state == Stopping {
                    tracing::error!(daemon = %self.inner.config.name, error = %err, "graceful stop request failed");
                    self.inner.transition(
                        &mut slot,
                        FailedToStop,
                        TransitionCause::SignalFailed {
                            reason: err.to_string(),
                        },
                    );
                    return Err(StopError::Signal(err));
                }
                // Resolved concurrently by the watcher or force_stop()
                return Ok(());
            }
        }
        drop(handle);

        let interval = self.inner.config.poll_interval;
        let deadline = deadline_after(timeout);
        loop {
            {
                let mut slot = self.inner.slot.lock();
                match self.inner.observe_exit(&mut slot, generation) {
                    Observation::Exited | Observation::Superseded => return Ok(()),
                    Observation::Alive => {}
                }

                if expired(deadline) {
                    if slot.state != Stopping {
                        return Err(StopError::InvalidState(slot.state));
                    }
                    tracing::warn!(
                        daemon = %self.inner.config.name,
                        timeout = ?timeout,
                        "daemon ignored graceful stop"
                    );
                    self.inner.transition(
                        &mut slot,
                        FailedToStop,
                        TransitionCause::GracefulStopTimedOut { timeout },
                    );
                    return Err(StopError::GracefulStopTimedOut(timeout));
                }
            }

            tokio::time::sleep(next_poll(interval, deadline)).await;
        }
    }

    /// Kills the daemon unconditionally.
    ///
    /// Works from every state that holds a process, and from `Starting`
    /// (waits for the spawn to resolve, then kills what it produced).
    /// Returns once the death is confirmed or `kill_timeout` elapses.
    ///
    /// # Errors
    /// - `NoHandleToKill` if there is no process
    /// - `TerminationDenied` if the OS refused the kill or the process
    ///   survived it (state stays `FailedToStop`)
    pub async fn force_stop(&self) -> Result<(), StopError> {
        let (handle, generation) = loop {
            let mut state_rx = {
                let mut slot = self.inner.slot.lock();
                match slot.state {
                    Stopped | FailedToStart => return Err(StopError::NoHandleToKill),
                    Starting => {
                        slot.abort_start = true;
                        self.inner.state_tx.subscribe()
                    }
                    Running | Stopping | FailedToStop => {
                        let Some(current) = Inner::<B>::current_handle(&slot) else {
                            return Err(StopError::NoHandleToKill);
                        };
                        if slot.state == Running {
                            self.inner.transition(
                                &mut slot,
                                Stopping,
                                TransitionCause::ForceStopRequested,
                            );
                        }
                        break current;
                    }
                }
            };

            tracing::debug!(daemon = %self.inner.config.name, "force_stop: waiting for spawn to resolve");
            if state_rx.wait_for(|state| *state != Starting).await.is_err() {
                return Err(StopError::NoHandleToKill);
            }
        };

        if let Err(err) = self.inner.backend.force_terminate(&handle).await {
            if !err.is_already_exited() {
                let mut slot = self.inner.slot.lock();
                if slot.generation == generation && slot.state.holds_process() {
                    tracing::error!(
                        daemon = %self.inner.config.name,
                        error = %err,
                        "daemon could not be terminated"
                    );
                    self.inner.transition(
                        &mut slot,
                        FailedToStop,
                        TransitionCause::TerminationDenied {
                            reason: err.to_string(),
                        },
                    );
                    return Err(StopError::TerminationDenied(err.to_string()));
                }
                return Ok(());
            }
        }

        let interval = self.inner.config.poll_interval;
        let kill_timeout = self.inner.config.kill_timeout;
        let deadline = deadline_after(kill_timeout);
        loop {
            {
                let mut slot = self.inner.slot.lock();
                if slot.generation != generation || !slot.state.observes_exit() {
                    return Ok(());
                }
                if let Some(exit) = self.inner.backend.poll_exit_status(&handle) {
                    self.inner
                        .release(&mut slot, TransitionCause::ForceKilled { exit: Some(exit) });
                    return Ok(());
                }
                if expired(deadline) {
                    let reason = format!("process survived forced termination for {kill_timeout:?}");
                    tracing::error!(daemon = %self.inner.config.name, %reason, "daemon could not be terminated");
                    self.inner.transition(
                        &mut slot,
                        FailedToStop,
                        TransitionCause::TerminationDenied {
                            reason: reason.clone(),
                        },
                    );
                    return Err(StopError::TerminationDenied(reason));
                }
            }

            tokio::time::sleep(next_poll(interval, deadline)).await;
        }
    }

    /// Graceful stop with the configured timeout, then forced if needed.
    ///
    /// # Errors
    /// Returns the `force_stop()` error if the fallback kill fails, or the
    /// `stop()` error if it is not one `force_stop()` can resolve.
    pub async fn shutdown(&self) -> Result<(), StopError> {
        self.shutdown_within(self.inner.config.stop_timeout).await
    }

    /// Graceful stop waiting up to `timeout`, then forced if needed.
    async fn shutdown_within(&self, timeout: Duration) -> Result<(), StopError> {
        match self.stop(timeout).await {
            Err(err) if err.needs_force() => {
                tracing::warn!(daemon = %self.inner.config.name, error = %err, "escalating to forced stop");
                match self.force_stop().await {
                    Err(StopError::NoHandleToKill) => Ok(()),
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Shuts the daemon down (if running) and starts a fresh generation.
    ///
    /// The graceful half waits up to `timeout` before escalating to
    /// [`force_stop`](Self::force_stop).
    ///
    /// # Errors
    /// Returns the failing half of the operation.
    pub async fn restart(&self, timeout: Duration) -> Result<ProcessIdentity, SupervisorError> {
        self.shutdown_within(timeout).await?;
        Ok(self.start().await?)
    }

    /// Returns the identity of the running daemon.
    ///
    /// `None` unless the state is `Running`, so an identity from an earlier
    /// generation is never returned.
    pub fn get_pid(&self) -> Option<ProcessIdentity> {
        let slot = self.inner.slot.lock();
        if slot.state == Running {
            slot.identity
        } else {
            None
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> SupervisorState {
        self.inner.slot.lock().state
    }

    /// Returns the generation of the most recent successful start.
    pub fn generation(&self) -> u64 {
        self.inner.slot.lock().generation
    }

    /// Subscribes to lifecycle events.
    ///
    /// Every event recorded after this call is delivered, regardless of how
    /// slowly the receiver is drained.
    pub fn subscribe(&self) -> EventReceiver {
        self.inner.slot.lock().events.subscribe()
    }

    /// Returns the retained event history, oldest first.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.inner.slot.lock().events.snapshot()
    }

    /// Returns the retained event history as JSON, for diagnostics dumps.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn events_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events())
    }

    /// Waits until the state satisfies `predicate`, up to `timeout`.
    ///
    /// Returns the matching state, or `None` on timeout.
    pub async fn wait_for_state(
        &self,
        mut predicate: impl FnMut(SupervisorState) -> bool,
        timeout: Duration,
    ) -> Option<SupervisorState> {
        let mut state_rx = self.inner.state_tx.subscribe();
        let waited = tokio::time::timeout(timeout, async {
            state_rx
                .wait_for(|state| predicate(*state))
                .await
                .map(|state| *state)
        })
        .await;

        match waited {
            Ok(Ok(state)) => Some(state),
            _ => None,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Returns the backend's platform.
    pub fn platform(&self) -> Platform {
        self.inner.backend.platform()
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// Watches the run of `generation` for exit until it is resolved.
    ///
    /// Holds only a weak reference, so it never keeps the supervisor alive.
    fn spawn_watcher(&self, generation: u64) {
        let inner: Weak<Inner<B>> = Arc::downgrade(&self.inner);
        let interval = self.inner.config.poll_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let observation = {
                    let mut slot = inner.slot.lock();
                    inner.observe_exit(&mut slot, generation)
                };
                if observation != Observation::Alive {
                    break;
                }
            }

            tracing::debug!(generation, "exit watcher finished");
        });
    }
}

impl<B: ProcessBackend> std::fmt::Debug for ProcessSupervisor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.inner.slot.lock();
        f.debug_struct("ProcessSupervisor")
            .field("daemon", &self.inner.config.name)
            .field("state", &slot.state)
            .field("generation", &slot.generation)
            .field("identity", &slot.identity)
            .finish_non_exhaustive()
    }
}
