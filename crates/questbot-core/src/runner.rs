//! Quest loop runner with operator controls.
//!
//! This module provides [`run_quests`], the top-level async function that
//! drives a [`QuestFlow`] against a game session with support for:
//!
//! - **Start/stop**: the operator can stop at any point; the current attempt
//!   is abandoned and running activities are stopped
//! - **Queued commands**: registry, skip and timing changes are applied
//!   between continuations
//! - **Bounded waits**: every delay the flow asks for is a timer, never a
//!   busy loop
//!
//! The runner owns the only suspension points of the engine. The flow
//! decides, the [`ActionDispatcher`] carries out, and the runner sleeps in
//! between.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, info_span, warn};

use questbot_types::{FlowState, RunId};

use crate::dispatcher::{ActionDispatcher, DispatchError};
use crate::flow::{Continuation, Event, QuestFlow, Step};
use crate::operator::{OperatorCommand, OperatorState};
use crate::session::GameSession;

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Running activities could not be stopped.
    #[error("failed to stop activities: {source}")]
    Stop {
        /// The underlying dispatch error.
        #[from]
        source: DispatchError,
    },
}

/// How long [`run_quests`] keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Return as soon as the engine goes inactive.
    UntilIdle,
    /// Park while inactive and wait for the operator; return on shutdown.
    Forever,
}

/// Reason a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEndReason {
    /// No eligible location remained.
    AllCompleted,
    /// The operator stopped the engine.
    OperatorStop,
    /// Shutdown was requested.
    Shutdown,
}

/// Result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Why the run ended.
    pub end_reason: RunEndReason,
    /// Identifier of the last run, if the engine was ever started.
    pub run_id: Option<RunId>,
    /// Events handled by the flow.
    pub steps: u64,
    /// Effects carried out.
    pub effects: u64,
    /// Locations done, skips included.
    pub completed_count: usize,
    /// Locations in the registry.
    pub total_count: usize,
}

/// Callback invoked after the flow handles each event.
pub trait StepCallback: Send {
    /// Called with the step the flow produced, before its effects run.
    fn on_step(&mut self, step: &Step, flow: &QuestFlow);
}

/// A no-op step callback.
pub struct NoOpCallback;

impl StepCallback for NoOpCallback {
    fn on_step(&mut self, _step: &Step, _flow: &QuestFlow) {}
}

/// Drive the flow until the mode's end condition is met.
///
/// # Errors
///
/// Returns [`RunnerError`] if running activities cannot be stopped when
/// the engine stops. Every other session failure is fed back to the flow
/// as [`Event::SessionFault`].
pub async fn run_quests<S: GameSession>(
    flow: &mut QuestFlow,
    dispatcher: &mut ActionDispatcher<S>,
    operator: &Arc<OperatorState>,
    mode: RunMode,
    callback: &mut dyn StepCallback,
) -> Result<RunSummary, RunnerError> {
    let mut run_id: Option<RunId> = None;
    let mut last_run_id: Option<RunId> = None;
    let mut pending = Event::Resume;
    let mut steps: u64 = 0;
    let mut effects: u64 = 0;
    let mut end_reason = RunEndReason::OperatorStop;

    info!(
        locations = flow.registry().len(),
        wait_time_ms = flow.settings().engine.wait_time_ms,
        ?mode,
        "Quest runner starting"
    );

    loop {
        // --- Operator commands ---
        if apply_commands(flow, dispatcher, operator).await? {
            pending = Event::Resume;
        }
        operator.publish_status(flow.status(), run_id.or(last_run_id)).await;

        // --- Inactive: park ---
        if !operator.is_active() {
            if let Some(id) = run_id.take() {
                let stopped = dispatcher.stop_all()?;
                if flow.state() != FlowState::Idle {
                    flow.abort();
                }
                info!(run_id = %id, stopped, "Engine stopped");
                last_run_id = Some(id);
                operator.publish_status(flow.status(), last_run_id).await;
            }
            if operator.is_shutdown() {
                end_reason = RunEndReason::Shutdown;
                break;
            }
            match mode {
                RunMode::UntilIdle => break,
                RunMode::Forever => {
                    operator.wait_for_change().await;
                    continue;
                }
            }
        }

        let id = *run_id.get_or_insert_with(|| {
            let id = RunId::new();
            info!(run_id = %id, "Engine started");
            pending = Event::Resume;
            end_reason = RunEndReason::OperatorStop;
            id
        });

        // --- One transition ---
        let event = std::mem::replace(&mut pending, Event::Resume);
        let step = flow.handle(event);
        steps = steps.saturating_add(1);
        callback.on_step(&step, flow);

        let outcome = info_span!("step", run_id = %id, state = %flow.state())
            .in_scope(|| carry_out(&step, dispatcher, operator));
        effects = effects.saturating_add(outcome.executed);

        if let Some(detail) = outcome.fault {
            pending = Event::SessionFault(detail);
            continue;
        }
        if !operator.is_active() {
            continue;
        }

        // --- Continue ---
        if step.next == Continuation::Halt {
            info!(
                completed = flow.registry().completed_count(),
                total = flow.registry().len(),
                "No eligible locations left"
            );
            end_reason = RunEndReason::AllCompleted;
            operator.stop();
            continue;
        }
        if let Some(event) = advance(step.next, dispatcher, operator).await {
            pending = event;
        }
    }

    Ok(RunSummary {
        end_reason,
        run_id: run_id.or(last_run_id),
        steps,
        effects,
        completed_count: flow.registry().completed_count(),
        total_count: flow.registry().len(),
    })
}

/// Log the end of a run.
pub fn log_run_end(summary: &RunSummary) {
    info!(
        reason = ?summary.end_reason,
        run_id = ?summary.run_id,
        steps = summary.steps,
        effects = summary.effects,
        completed = summary.completed_count,
        total = summary.total_count,
        "Quest run ended"
    );
    if summary.completed_count < summary.total_count {
        warn!(
            remaining = summary.total_count.saturating_sub(summary.completed_count),
            "Run ended with locations left"
        );
    }
}

struct Outcome {
    executed: u64,
    fault: Option<String>,
}

fn carry_out<S: GameSession>(
    step: &Step,
    dispatcher: &mut ActionDispatcher<S>,
    operator: &OperatorState,
) -> Outcome {
    let mut executed: u64 = 0;
    for effect in &step.effects {
        if !operator.is_active() {
            break;
        }
        if let Err(err) = dispatcher.execute(effect) {
            warn!(error = %err, ?effect, "Effect failed");
            return Outcome {
                executed,
                fault: Some(err.to_string()),
            };
        }
        executed = executed.saturating_add(1);
    }
    Outcome {
        executed,
        fault: None,
    }
}

/// Wait out a continuation and produce the next event. `None` when the
/// engine was stopped during the wait.
async fn advance<S: GameSession>(
    next: Continuation,
    dispatcher: &mut ActionDispatcher<S>,
    operator: &OperatorState,
) -> Option<Event> {
    match next {
        Continuation::Halt => None,
        Continuation::Resume { after } => {
            pause(operator, after).await;
            Some(Event::Resume)
        }
        Continuation::Probe { after, probe } => {
            pause(operator, after).await;
            if !operator.is_active() {
                return None;
            }
            Some(dispatcher.observe(probe).map_or_else(
                |err| {
                    warn!(error = %err, ?probe, "Probe failed");
                    Event::SessionFault(err.to_string())
                },
                Event::Observed,
            ))
        }
    }
}

/// Apply queued operator commands. Returns `true` when the current attempt
/// was abandoned and the flow must restart from `Idle`.
async fn apply_commands<S: GameSession>(
    flow: &mut QuestFlow,
    dispatcher: &mut ActionDispatcher<S>,
    operator: &OperatorState,
) -> Result<bool, RunnerError> {
    let mut interrupted = false;
    for command in operator.drain_commands().await {
        info!(?command, "Applying operator command");
        match command {
            OperatorCommand::ResetAll => {
                interrupted |= flow.state() != FlowState::Idle;
                flow.reset_all_progress();
            }
            OperatorCommand::ToggleLocation(index) => match flow.toggle_location(index) {
                Ok(toggle) => interrupted |= toggle.interrupted,
                Err(err) => warn!(error = %err, "Ignoring toggle"),
            },
            OperatorCommand::ToggleSkip(goal_type) => {
                flow.toggle_skip(goal_type);
            }
            OperatorCommand::SetWaitTime(ms) => flow.set_wait_time_ms(ms),
        }
    }
    if interrupted {
        dispatcher.stop_all()?;
    }
    Ok(interrupted)
}

/// Sleep for `after`, returning early if the engine is stopped.
async fn pause(operator: &OperatorState, after: Duration) {
    if after.is_zero() {
        return;
    }
    let sleep = tokio::time::sleep(after);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return,
            () = operator.wait_for_change() => {
                if !operator.is_active() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use questbot_types::{LocationId, LocationSpec, Tile};
    use questbot_world::LocationRegistry;

    use super::*;
    use crate::flow::FlowSettings;
    use crate::sim::{SimMap, SimulatedSession};

    fn setup(ids: &[&str]) -> (QuestFlow, ActionDispatcher<SimulatedSession>) {
        let specs: Vec<LocationSpec> = ids
            .iter()
            .map(|id| LocationSpec {
                id: LocationId::new(*id),
                name: format!("Giver {id}"),
                coordinates: Tile::new(3, 3),
            })
            .collect();
        let mut session =
            SimulatedSession::new(LocationId::new("hub"), SimMap::open(8, 8, Tile::new(0, 0)));
        for spec in &specs {
            session.add_map(spec.id.clone(), SimMap::open(8, 8, Tile::new(1, 1)));
            session.add_giver(&spec.id, spec.coordinates, None);
        }
        let flow = QuestFlow::new(
            LocationRegistry::initialize(&specs),
            FlowSettings::default(),
        );
        (flow, ActionDispatcher::new(session))
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_engine_returns_immediately() {
        let (mut flow, mut dispatcher) = setup(&["1"]);
        let operator = Arc::new(OperatorState::new());
        let summary = run_quests(
            &mut flow,
            &mut dispatcher,
            &operator,
            RunMode::UntilIdle,
            &mut NoOpCallback,
        )
        .await
        .unwrap();
        assert_eq!(summary.end_reason, RunEndReason::OperatorStop);
        assert_eq!(summary.steps, 0);
        assert_eq!(summary.run_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn completes_every_location() {
        let (mut flow, mut dispatcher) = setup(&["1", "2"]);
        let operator = Arc::new(OperatorState::new());
        operator.start();
        let summary = run_quests(
            &mut flow,
            &mut dispatcher,
            &operator,
            RunMode::UntilIdle,
            &mut NoOpCallback,
        )
        .await
        .unwrap();
        assert_eq!(summary.end_reason, RunEndReason::AllCompleted);
        assert_eq!(summary.completed_count, 2);
        assert!(summary.run_id.is_some());
        assert!(!operator.is_active());
        assert_eq!(dispatcher.session().teleport_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_sees_every_step() {
        struct CountCallback {
            count: u64,
        }
        impl StepCallback for CountCallback {
            fn on_step(&mut self, _step: &Step, _flow: &QuestFlow) {
                self.count = self.count.saturating_add(1);
            }
        }

        let (mut flow, mut dispatcher) = setup(&["1"]);
        let operator = Arc::new(OperatorState::new());
        operator.start();
        let mut cb = CountCallback { count: 0 };
        let summary = run_quests(
            &mut flow,
            &mut dispatcher,
            &operator,
            RunMode::UntilIdle,
            &mut cb,
        )
        .await
        .unwrap();
        assert_eq!(cb.count, summary.steps);
        assert!(cb.count > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_skip_is_applied_before_first_step() {
        let (mut flow, mut dispatcher) = setup(&["1"]);
        let operator = Arc::new(OperatorState::new());
        operator
            .toggle_skip(questbot_types::GoalType::Expedition)
            .await;
        operator.set_wait_time_ms(0).await;
        operator.start();
        run_quests(
            &mut flow,
            &mut dispatcher,
            &operator,
            RunMode::UntilIdle,
            &mut NoOpCallback,
        )
        .await
        .unwrap();
        assert!(flow.settings().skip.expedition);
        assert_eq!(flow.settings().engine.wait_time_ms, 40);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_ends_forever_mode() {
        let (mut flow, mut dispatcher) = setup(&["1"]);
        let operator = Arc::new(OperatorState::new());
        operator.shutdown();
        let summary = run_quests(
            &mut flow,
            &mut dispatcher,
            &operator,
            RunMode::Forever,
            &mut NoOpCallback,
        )
        .await
        .unwrap();
        assert_eq!(summary.end_reason, RunEndReason::Shutdown);
    }
}
