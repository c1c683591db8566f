//! Per-channel deployment state machine.
//!
//! Reads are a single atomic load. Transition requests are serialized per
//! channel by an async mutex, so compound transitions (stop = STOPPING, drain,
//! STOPPED) are never interleaved with another request for the same channel.
//! Message workers never take that mutex; they register through [`WorkGuard`]s,
//! which is how a stop or pause knows when in-flight work has come to rest.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

use crate::channel::state::DeployedState;
use crate::error::ChannelError;

/// Default number of transitions kept per channel.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// A recorded state change.
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub from: DeployedState,
    pub to: DeployedState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Lifecycle owner for one channel.
pub struct ChannelStateMachine {
    channel_id: String,
    state: AtomicU8,
    transition_lock: tokio::sync::Mutex<()>,
    history: Mutex<VecDeque<StateTransition>>,
    history_limit: usize,
    in_flight: AtomicUsize,
    drained: Notify,
    watch_tx: watch::Sender<DeployedState>,
}

impl std::fmt::Debug for ChannelStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelStateMachine")
            .field("channel_id", &self.channel_id)
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Marks one unit of admitted work. Dropping it releases the channel's drain wait.
#[must_use = "dropping the guard immediately ends the admitted work"]
pub struct WorkGuard<'a> {
    machine: &'a ChannelStateMachine,
}

impl Drop for WorkGuard<'_> {
    fn drop(&mut self) {
        if self.machine.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.machine.drained.notify_waiters();
        }
    }
}

impl ChannelStateMachine {
    /// Create a machine in `UNDEPLOYED`.
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self::with_history_limit(channel_id, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(channel_id: impl Into<String>, history_limit: usize) -> Self {
        let (watch_tx, _) = watch::channel(DeployedState::Undeployed);
        Self {
            channel_id: channel_id.into(),
            state: AtomicU8::new(DeployedState::Undeployed as u8),
            transition_lock: tokio::sync::Mutex::new(()),
            history: Mutex::new(VecDeque::new()),
            history_limit,
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
            watch_tx,
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Current state. Lock-free.
    pub fn state(&self) -> DeployedState {
        DeployedState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True while a pause, stop or undeploy is winding work down.
    ///
    /// Workers check this at each stage boundary.
    pub fn is_draining(&self) -> bool {
        self.state().is_draining()
    }

    /// Number of admitted, unfinished units of work.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<DeployedState> {
        self.watch_tx.subscribe()
    }

    /// Recorded transitions, oldest first.
    pub fn history(&self) -> Vec<StateTransition> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Admit one unit of work. Fails unless the channel is `STARTED`.
    pub fn admit(&self) -> Result<WorkGuard<'_>, ChannelError> {
        // Count first, then check: a concurrent stop either sees this work
        // in flight or this check sees the stop.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = WorkGuard { machine: self };
        let state = self.state();
        if state != DeployedState::Started {
            drop(guard);
            return Err(ChannelError::ChannelNotRunning {
                channel_id: self.channel_id.clone(),
                state,
            });
        }
        Ok(guard)
    }

    /// Apply a single transition, returning the previous state.
    ///
    /// Does not drain: entering PAUSED or STOPPED is refused while work is
    /// in flight. [`pause`](Self::pause) and [`stop`](Self::stop) wait instead.
    pub async fn request_transition(
        &self,
        target: DeployedState,
        reason: Option<String>,
    ) -> Result<DeployedState, ChannelError> {
        let _lock = self.transition_lock.lock().await;
        self.ensure_at_rest(target)?;
        self.apply(target, reason)
    }

    /// Apply `path` as one exclusive compound transition.
    ///
    /// Every edge is validated before any is applied, so a rejected path
    /// leaves the state unchanged.
    pub async fn transition_path(
        &self,
        path: &[DeployedState],
        reason: &str,
    ) -> Result<DeployedState, ChannelError> {
        let _lock = self.transition_lock.lock().await;
        let start = self.state();
        self.validate_path(start, path)?;
        for &target in path {
            self.ensure_at_rest(target)?;
        }
        for &target in path {
            self.apply(target, Some(reason.to_string()))?;
        }
        Ok(start)
    }

    fn validate_path(&self, start: DeployedState, path: &[DeployedState]) -> Result<(), ChannelError> {
        let mut from = start;
        for &to in path {
            if !from.can_transition_to(to) {
                return Err(self.illegal(from, to));
            }
            from = to;
        }
        Ok(())
    }

    /// Refuse a resting state that would strand admitted work.
    fn ensure_at_rest(&self, target: DeployedState) -> Result<(), ChannelError> {
        if !matches!(target, DeployedState::Paused | DeployedState::Stopped) {
            return Ok(());
        }
        let in_flight = self.in_flight();
        if in_flight == 0 {
            return Ok(());
        }
        warn!(
            channel_id = %self.channel_id,
            to = %target,
            in_flight,
            "Rejected transition with work in flight"
        );
        Err(ChannelError::WorkInFlight {
            channel_id: self.channel_id.clone(),
            to: target,
            in_flight,
        })
    }

    fn illegal(&self, from: DeployedState, to: DeployedState) -> ChannelError {
        warn!(
            channel_id = %self.channel_id,
            from = %from,
            to = %to,
            "Rejected illegal channel state transition"
        );
        ChannelError::IllegalStateTransition {
            channel_id: self.channel_id.clone(),
            from,
            to,
        }
    }

    /// Caller must hold `transition_lock`.
    fn apply(&self, target: DeployedState, reason: Option<String>) -> Result<DeployedState, ChannelError> {
        let from = self.state();
        if !from.can_transition_to(target) {
            return Err(self.illegal(from, target));
        }
        self.state.store(target as u8, Ordering::SeqCst);

        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            history.push_back(StateTransition {
                from,
                to: target,
                timestamp: Utc::now(),
                reason,
            });
            while history.len() > self.history_limit {
                history.pop_front();
            }
        }

        self.watch_tx.send_replace(target);
        info!(
            channel_id = %self.channel_id,
            from = %from,
            to = %target,
            "Channel state changed"
        );
        Ok(from)
    }

    /// Wait until no admitted work remains.
    async fn wait_drained(&self, timeout: Duration) -> Result<(), ChannelError> {
        let wait = async {
            loop {
                let notified = self.drained.notified();
                if self.in_flight() == 0 {
                    return;
                }
                debug!(
                    channel_id = %self.channel_id,
                    in_flight = self.in_flight(),
                    "Waiting for in-flight messages to drain"
                );
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            ChannelError::DrainTimeout {
                channel_id: self.channel_id.clone(),
                timeout,
                in_flight: self.in_flight(),
            }
        })
    }

    /// UNDEPLOYED → DEPLOYING → STARTING → STARTED.
    pub async fn deploy(&self) -> Result<(), ChannelError> {
        use DeployedState::*;
        self.transition_path(&[Deploying, Starting, Started], "deploy")
            .await
            .map(|_| ())
    }

    /// STOPPED → STARTING → STARTED.
    pub async fn start(&self) -> Result<(), ChannelError> {
        use DeployedState::*;
        self.transition_path(&[Starting, Started], "start").await.map(|_| ())
    }

    /// PAUSED → STARTING → STARTED.
    pub async fn resume(&self) -> Result<(), ChannelError> {
        use DeployedState::*;
        let _lock = self.transition_lock.lock().await;
        if self.state() != Paused {
            return Err(self.illegal(self.state(), Starting));
        }
        self.apply(Starting, Some("resume".to_string()))?;
        self.apply(Started, Some("resume".to_string()))?;
        Ok(())
    }

    /// STARTED → PAUSING, drain, → PAUSED.
    pub async fn pause(&self, drain_timeout: Duration) -> Result<(), ChannelError> {
        use DeployedState::*;
        let _lock = self.transition_lock.lock().await;
        if self.state() != Pausing {
            self.validate_path(self.state(), &[Pausing, Paused])?;
            self.apply(Pausing, Some("pause".to_string()))?;
        }
        self.wait_drained(drain_timeout).await?;
        self.apply(Paused, Some("pause".to_string()))?;
        Ok(())
    }

    /// STARTED or PAUSED → STOPPING, drain, → STOPPED.
    ///
    /// A stop that previously timed out while draining can be retried.
    pub async fn stop(&self, drain_timeout: Duration) -> Result<(), ChannelError> {
        use DeployedState::*;
        let _lock = self.transition_lock.lock().await;
        if self.state() != Stopping {
            self.validate_path(self.state(), &[Stopping, Stopped])?;
            self.apply(Stopping, Some("stop".to_string()))?;
        }
        self.wait_drained(drain_timeout).await?;
        self.apply(Stopped, Some("stop".to_string()))?;
        Ok(())
    }

    /// STOPPED → UNDEPLOYING → UNDEPLOYED.
    pub async fn undeploy(&self) -> Result<(), ChannelError> {
        use DeployedState::*;
        self.transition_path(&[Undeploying, Undeployed], "undeploy")
            .await
            .map(|_| ())
    }

    /// Enter SYNCING to reconcile with an external source of truth.
    pub async fn begin_sync(&self) -> Result<DeployedState, ChannelError> {
        self.request_transition(DeployedState::Syncing, Some("sync".to_string()))
            .await
    }

    /// Leave SYNCING for the state reconciliation determined.
    pub async fn resolve_sync(&self, resolved: DeployedState) -> Result<(), ChannelError> {
        let _lock = self.transition_lock.lock().await;
        let current = self.state();
        if current != DeployedState::Syncing {
            return Err(self.illegal(current, resolved));
        }
        self.ensure_at_rest(resolved)?;
        self.apply(resolved, Some("sync resolved".to_string()))?;
        Ok(())
    }

    /// Record that the true state cannot be determined.
    pub async fn mark_unknown(&self, reason: impl Into<String>) -> Result<DeployedState, ChannelError> {
        self.request_transition(DeployedState::Unknown, Some(reason.into()))
            .await
    }
}
