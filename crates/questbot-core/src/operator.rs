//! Operator control state for a running engine.
//!
//! This module provides shared state used by the quest runner and whatever
//! surface the operator drives it from (a panel, a hotkey handler, a test).
//! The operator can start and stop the engine, queue registry and skip
//! changes, adjust the inter-step wait and read a status snapshot, all
//! without touching the flow directly.
//!
//! # Architecture
//!
//! Start/stop flags are atomics so the runner can check them between every
//! effect. Commands that edit the flow's own state are queued and applied by
//! the runner between continuations, which keeps the flow single-owner.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, RwLock};

use questbot_types::{FailureReason, FlowState, GoalType, RunId};

use crate::flow::FlowStatus;

/// A queued operator request that edits flow state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum OperatorCommand {
    /// Clear all completion flags and restart from the first location.
    ResetAll,
    /// Enable or disable a location by registry index.
    ToggleLocation(usize),
    /// Flip the skip flag of a quest category.
    ToggleSkip(GoalType),
    /// Set the inter-step wait in milliseconds.
    SetWaitTime(u64),
}

/// Snapshot of the engine for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Locations done, skips included.
    pub completed_count: usize,
    /// Locations in the registry.
    pub total_count: usize,
    /// Location being worked on.
    pub current_location_name: Option<String>,
    /// Human-readable state label.
    pub current_state_label: String,
    /// Last status line.
    pub status_message: String,
    /// Why the last attempt failed.
    pub last_failure: Option<FailureReason>,
    /// Whether the engine is running.
    pub active: bool,
    /// Identifier of the current (or last) run.
    pub run_id: Option<RunId>,
    /// When this snapshot was published.
    pub updated_at: DateTime<Utc>,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            completed_count: 0,
            total_count: 0,
            current_location_name: None,
            current_state_label: FlowState::Idle.label().to_owned(),
            status_message: String::from("Idle"),
            last_failure: None,
            active: false,
            run_id: None,
            updated_at: Utc::now(),
        }
    }
}

/// Shared operator control state.
///
/// Wrapped in [`Arc`](std::sync::Arc) and shared between the runner and the
/// operator surface.
#[derive(Debug, Default)]
pub struct OperatorState {
    /// Whether the engine should be running.
    active: AtomicBool,

    /// Whether the process is shutting down.
    shutdown: AtomicBool,

    /// Wakes the runner when it is parked.
    wake: Notify,

    /// Commands awaiting application by the runner.
    commands: Mutex<Vec<OperatorCommand>>,

    /// Last published status.
    status: RwLock<EngineStatus>,
}

impl OperatorState {
    /// Create an inactive operator state.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Start / Stop
    // -----------------------------------------------------------------------

    /// Start (or resume) the engine and wake the runner.
    pub fn start(&self) {
        self.active.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Stop the engine. The runner abandons the current attempt, stops any
    /// running activity and parks.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
        self.wake.notify_one();
    }

    /// Check whether the engine should be running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Request process shutdown. Implies [`stop`](Self::stop).
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.stop();
    }

    /// Check whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Wait until [`start`](Self::start), [`stop`](Self::stop) or a queued
    /// command wakes the runner.
    pub async fn wait_for_change(&self) {
        self.wake.notified().await;
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Queue a full progress reset.
    pub async fn reset_all_progress(&self) {
        self.push(OperatorCommand::ResetAll).await;
    }

    /// Queue enabling or disabling the location at `index`.
    pub async fn toggle_location_enabled(&self, index: usize) {
        self.push(OperatorCommand::ToggleLocation(index)).await;
    }

    /// Queue flipping the skip flag of `goal_type`.
    pub async fn toggle_skip(&self, goal_type: GoalType) {
        self.push(OperatorCommand::ToggleSkip(goal_type)).await;
    }

    /// Queue a new inter-step wait. `0` restores the default.
    pub async fn set_wait_time_ms(&self, ms: u64) {
        self.push(OperatorCommand::SetWaitTime(ms)).await;
    }

    /// Drain all queued commands in arrival order.
    pub async fn drain_commands(&self) -> Vec<OperatorCommand> {
        let mut queue = self.commands.lock().await;
        std::mem::take(&mut *queue)
    }

    async fn push(&self, command: OperatorCommand) {
        self.commands.lock().await.push(command);
        self.wake.notify_one();
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// The last published status.
    pub async fn status(&self) -> EngineStatus {
        self.status.read().await.clone()
    }

    /// Publish a fresh status from the flow.
    pub async fn publish_status(&self, flow: FlowStatus, run_id: Option<RunId>) {
        let snapshot = EngineStatus {
            completed_count: flow.completed_count,
            total_count: flow.total_count,
            current_location_name: flow.current_location_name,
            current_state_label: flow.state.label().to_owned(),
            status_message: flow.status_message,
            last_failure: flow.last_failure,
            active: self.is_active(),
            run_id,
            updated_at: Utc::now(),
        };
        *self.status.write().await = snapshot;
    }
}
