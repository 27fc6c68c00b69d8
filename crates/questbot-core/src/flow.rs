//! The quest flow state machine.
//!
//! [`QuestFlow`] owns the [`LocationRegistry`] and the single
//! [`RuntimeState`] of the engine. It is driven purely by events:
//! [`QuestFlow::handle`] takes an [`Event`] and returns a [`Step`], the
//! effects to carry out plus how to continue. It never sleeps and never
//! touches the game session, so every transition can be tested without
//! timers or a client.
//!
//! # Per-location sequence
//!
//! ```text
//! Idle -> Teleporting -> Moving(to start) -> Interacting(start)
//!      -> DetectingQuest -> ExecutingQuest -> Moving(to complete)
//!      -> Interacting(complete) -> Completed -> Idle
//! ```
//!
//! Any bounded wait that runs out lands in `Failed`, which retries the
//! location from `Idle` until the retry budget is spent and then skips it.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use questbot_types::{
    ActivityRequest, FailureReason, FlowState, GoalType, InteractionPhase, Location, MoveTarget,
    QuestDescriptor, QuestGoal, Tile,
};
use questbot_world::{LocationRegistry, WorldError, find_path};

use crate::classifier::{Classification, classify_descriptor};
use crate::config::{EngineConfig, QuestbotConfig, SkipConfig};
use crate::dispatcher::{Effect, Observation, Probe};
use crate::progress::{ProgressMonitor, Verdict, first_unsatisfied, reconcile};

// ---------------------------------------------------------------------------
// Events and steps
// ---------------------------------------------------------------------------

/// Input to [`QuestFlow::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A delay elapsed, or the run (re)started.
    Resume,
    /// The session answered the last probe.
    Observed(Observation),
    /// Carrying out an effect or probe failed.
    SessionFault(String),
}

/// How the driver continues after carrying out a step's effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Wait, ask the session, and feed the answer back as
    /// [`Event::Observed`].
    Probe {
        /// Delay before probing.
        after: Duration,
        /// What to ask.
        probe: Probe,
    },
    /// Wait, then feed back [`Event::Resume`].
    Resume {
        /// Delay before resuming.
        after: Duration,
    },
    /// Nothing left to do.
    Halt,
}

/// Output of [`QuestFlow::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Effects to carry out, in order.
    pub effects: Vec<Effect>,
    /// What to do afterwards.
    pub next: Continuation,
}

impl Step {
    const fn probe(after: Duration, probe: Probe) -> Self {
        Self {
            effects: Vec::new(),
            next: Continuation::Probe { after, probe },
        }
    }

    const fn resume(after: Duration) -> Self {
        Self {
            effects: Vec::new(),
            next: Continuation::Resume { after },
        }
    }

    const fn halt() -> Self {
        Self {
            effects: Vec::new(),
            next: Continuation::Halt,
        }
    }

    fn with_effects(mut self, mut effects: Vec<Effect>) -> Self {
        effects.append(&mut self.effects);
        self.effects = effects;
        self
    }
}

// ---------------------------------------------------------------------------
// Settings and runtime state
// ---------------------------------------------------------------------------

/// Tunables the flow reads on every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowSettings {
    /// Timing and attempt ceilings.
    pub engine: EngineConfig,
    /// Skipped quest categories.
    pub skip: SkipConfig,
}

/// Everything the flow knows about its position. One per engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeState {
    /// Registry index of the location being worked on.
    pub current_location_index: Option<usize>,
    /// Current state.
    pub state: FlowState,
    /// Category of the open quest.
    pub quest_type: Option<GoalType>,
    /// Goals of the open quest, replaced wholesale on every poll.
    pub goals: Vec<QuestGoal>,
    /// Goal the running activity works on.
    pub current_goal_index: usize,
    /// Failed attempts at the current location.
    pub failed_attempts: u32,
    /// Remaining tiles of the planned walk.
    pub pending_path: VecDeque<Tile>,
    /// Walking straight at the target because no path exists.
    pub greedy: bool,
    /// Tile the last step should have reached.
    pub expected_tile: Option<Tile>,
    /// Steps taken in the current navigation.
    pub move_steps: u32,
    /// Whether the teleport command was sent for this attempt.
    pub teleport_issued: bool,
    /// Location-id polls since the teleport.
    pub teleport_polls: u32,
    /// Interactions tried in the current `Interacting` state.
    pub interaction_attempts: u32,
    /// Dialogue seen before the last interaction; `None` until the first
    /// snapshot.
    pub dialogue_before: Option<Option<QuestDescriptor>>,
    /// Dialogue opened by the start interaction.
    pub dialogue: Option<QuestDescriptor>,
    /// Activity loop the flow started.
    pub running_activity: Option<ActivityRequest>,
    /// Stagnation tracking for the running quest.
    pub monitor: ProgressMonitor,
    /// Why the last attempt failed.
    pub last_failure: Option<FailureReason>,
    /// Operator-facing one-line status.
    pub status_message: String,
}

impl RuntimeState {
    /// Fresh state in `Idle`.
    pub fn new(stagnation_limit: u32) -> Self {
        Self {
            current_location_index: None,
            state: FlowState::Idle,
            quest_type: None,
            goals: Vec::new(),
            current_goal_index: 0,
            failed_attempts: 0,
            pending_path: VecDeque::new(),
            greedy: false,
            expected_tile: None,
            move_steps: 0,
            teleport_issued: false,
            teleport_polls: 0,
            interaction_attempts: 0,
            dialogue_before: None,
            dialogue: None,
            running_activity: None,
            monitor: ProgressMonitor::new(stagnation_limit),
            last_failure: None,
            status_message: String::from("Idle"),
        }
    }

    /// Clear everything tied to one attempt at a location. The location
    /// index and the failure counter survive.
    fn reset_attempt(&mut self) {
        self.quest_type = None;
        self.goals.clear();
        self.current_goal_index = 0;
        self.pending_path.clear();
        self.greedy = false;
        self.expected_tile = None;
        self.move_steps = 0;
        self.teleport_issued = false;
        self.teleport_polls = 0;
        self.interaction_attempts = 0;
        self.dialogue_before = None;
        self.dialogue = None;
        self.running_activity = None;
        self.monitor.reset();
    }
}

/// Read-only summary for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatus {
    /// Locations marked completed, skips included.
    pub completed_count: usize,
    /// Locations in the registry.
    pub total_count: usize,
    /// Name of the location being worked on.
    pub current_location_name: Option<String>,
    /// Current state.
    pub state: FlowState,
    /// Last status line.
    pub status_message: String,
    /// Why the last attempt failed.
    pub last_failure: Option<FailureReason>,
}

/// Result of toggling a location from the operator panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationToggle {
    /// New `disabled` value.
    pub disabled: bool,
    /// The location was being worked on and the attempt was abandoned.
    pub interrupted: bool,
}

// ---------------------------------------------------------------------------
// QuestFlow
// ---------------------------------------------------------------------------

/// The engine's explicit context: registry, runtime state and settings.
#[derive(Debug, Clone)]
pub struct QuestFlow {
    runtime: RuntimeState,
    registry: LocationRegistry,
    settings: FlowSettings,
}

impl QuestFlow {
    /// Create a flow in `Idle`.
    pub fn new(registry: LocationRegistry, settings: FlowSettings) -> Self {
        Self {
            runtime: RuntimeState::new(settings.engine.stagnation_limit),
            registry,
            settings,
        }
    }

    /// Create a flow from a loaded configuration.
    pub fn from_config(config: &QuestbotConfig) -> Self {
        Self::new(
            LocationRegistry::initialize(&config.locations),
            FlowSettings {
                engine: config.engine.clone(),
                skip: config.skip,
            },
        )
    }

    /// The runtime state.
    pub const fn runtime(&self) -> &RuntimeState {
        &self.runtime
    }

    /// The location registry.
    pub const fn registry(&self) -> &LocationRegistry {
        &self.registry
    }

    /// The current settings.
    pub const fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    /// The current state.
    pub const fn state(&self) -> FlowState {
        self.runtime.state
    }

    /// Status summary for the operator.
    pub fn status(&self) -> FlowStatus {
        FlowStatus {
            completed_count: self.registry.completed_count(),
            total_count: self.registry.len(),
            current_location_name: self.current_location().map(|l| l.name),
            state: self.runtime.state,
            status_message: self.runtime.status_message.clone(),
            last_failure: self.runtime.last_failure.clone(),
        }
    }

    /// Advance the machine by one event.
    pub fn handle(&mut self, event: Event) -> Step {
        let event = match event {
            Event::SessionFault(detail) => return self.on_fault(detail),
            other => other,
        };
        match self.runtime.state {
            FlowState::Idle => self.on_idle(),
            FlowState::Teleporting => self.on_teleporting(event),
            FlowState::Moving(target) => self.on_moving(target, event),
            FlowState::Interacting(phase) => self.on_interacting(phase, event),
            FlowState::DetectingQuest => self.on_detecting(event),
            FlowState::ExecutingQuest => self.on_executing(event),
            FlowState::Completed => self.on_completed(),
            FlowState::Failed => self.on_failed(),
        }
    }

    // -----------------------------------------------------------------------
    // Operator controls
    // -----------------------------------------------------------------------

    /// Abandon the current attempt and return to `Idle`.
    ///
    /// The caller is responsible for stopping any activity loop that is
    /// still running in the session.
    pub fn abort(&mut self) {
        if self.runtime.state != FlowState::Idle {
            info!(from = %self.runtime.state, "Flow aborted");
        }
        self.runtime.reset_attempt();
        self.runtime.current_location_index = None;
        self.runtime.failed_attempts = 0;
        self.runtime.state = FlowState::Idle;
        self.runtime.status_message = String::from("Stopped");
    }

    /// Clear all completion flags and start over from the first location.
    pub fn reset_all_progress(&mut self) {
        self.registry.reset_all();
        self.abort();
        self.announce(String::from("Progress reset"));
    }

    /// Enable or disable a location. Disabling the location being worked
    /// on abandons the attempt.
    pub fn toggle_location(&mut self, index: usize) -> Result<LocationToggle, WorldError> {
        let disabled = self.registry.toggle_disabled(index)?;
        let interrupted = disabled && self.runtime.current_location_index == Some(index);
        if interrupted {
            self.abort();
        }
        Ok(LocationToggle {
            disabled,
            interrupted,
        })
    }

    /// Flip the skip flag of a quest category. Returns the new value.
    pub fn toggle_skip(&mut self, goal_type: GoalType) -> bool {
        let skipped = self.settings.skip.toggle(goal_type);
        info!(%goal_type, skipped, "Skip flag toggled");
        skipped
    }

    /// Change the inter-step wait. `0` restores the default.
    pub fn set_wait_time_ms(&mut self, ms: u64) {
        self.settings.engine.wait_time_ms = ms;
        self.settings.engine.normalize();
        info!(wait_time_ms = self.settings.engine.wait_time_ms, "Wait time changed");
    }

    // -----------------------------------------------------------------------
    // States
    // -----------------------------------------------------------------------

    fn on_fault(&mut self, detail: String) -> Step {
        match self.runtime.state {
            FlowState::Idle | FlowState::Completed | FlowState::Failed => {
                warn!(state = %self.runtime.state, %detail, "Session fault outside an attempt");
                self.handle(Event::Resume)
            }
            _ => self.fail(FailureReason::SessionFault(detail)),
        }
    }

    fn on_idle(&mut self) -> Step {
        let cursor = self.registry.cursor();
        let next = self
            .registry
            .next_eligible(cursor)
            .or_else(|| self.registry.next_eligible(0));
        let Some(index) = next else {
            self.runtime.current_location_index = None;
            self.announce(String::from("All quests completed"));
            return Step::halt();
        };

        if self.runtime.current_location_index != Some(index) {
            self.runtime.failed_attempts = 0;
        }
        self.runtime.current_location_index = Some(index);
        self.registry.set_cursor(index);
        self.runtime.reset_attempt();

        let name = self.current_location().map(|l| l.name).unwrap_or_default();
        self.announce(format!("Heading to {name}"));
        self.transition(FlowState::Teleporting);
        Step::probe(Duration::ZERO, Probe::LocationId)
    }

    fn on_teleporting(&mut self, event: Event) -> Step {
        let Some(location) = self.current_location() else {
            return self.lost_location();
        };
        match event {
            Event::Resume => Step::probe(Duration::ZERO, Probe::LocationId),
            Event::Observed(Observation::LocationId(id)) if id == location.id => {
                debug!(location = %location.id, "Teleport confirmed");
                self.start_moving(MoveTarget::ToStart)
            }
            Event::Observed(Observation::LocationId(id)) => {
                if self.runtime.teleport_polls >= self.settings.engine.max_teleport_polls {
                    return self.fail(FailureReason::TeleportTimeout);
                }
                let mut effects = Vec::new();
                if !self.runtime.teleport_issued {
                    self.runtime.teleport_issued = true;
                    debug!(from = %id, to = %location.id, "Teleporting");
                    effects.push(Effect::Teleport(location.id));
                }
                self.runtime.teleport_polls = self.runtime.teleport_polls.saturating_add(1);
                Step::probe(
                    self.settings.engine.teleport_poll_interval(),
                    Probe::LocationId,
                )
                .with_effects(effects)
            }
            other => self.unexpected(&other),
        }
    }

    fn on_moving(&mut self, target: MoveTarget, event: Event) -> Step {
        let Some(location) = self.current_location() else {
            return self.lost_location();
        };
        let goal = location.coordinates;
        match event {
            Event::Resume => Step::probe(Duration::ZERO, Probe::Navigation),
            Event::Observed(Observation::Navigation { position, matrix }) => {
                if position == goal {
                    return self.arrive(target);
                }
                let path = find_path(&matrix, position, goal);
                self.runtime.greedy = path.is_none();
                if self.runtime.greedy {
                    warn!(from = %position, to = %goal, "No path found, stepping directly");
                } else {
                    debug!(
                        from = %position,
                        to = %goal,
                        len = path.as_ref().map_or(0, Vec::len),
                        "Path planned"
                    );
                }
                self.runtime.pending_path = path.unwrap_or_default().into();
                self.walk_from(position, goal)
            }
            Event::Observed(Observation::Position(position)) => {
                if position == goal {
                    return self.arrive(target);
                }
                let landed = self.runtime.expected_tile == Some(position);
                let path_left = !self.runtime.pending_path.is_empty();
                if landed && (self.runtime.greedy || path_left) {
                    self.walk_from(position, goal)
                } else {
                    // Off course or out of path: plan again from here.
                    self.runtime.pending_path.clear();
                    Step::probe(self.settings.engine.wait_time(), Probe::Navigation)
                }
            }
            other => self.unexpected(&other),
        }
    }

    fn walk_from(&mut self, position: Tile, goal: Tile) -> Step {
        if self.runtime.move_steps >= self.settings.engine.max_move_steps {
            return self.fail(FailureReason::MovementExhausted);
        }
        self.runtime.move_steps = self.runtime.move_steps.saturating_add(1);

        let next = if self.runtime.greedy {
            position.direction_to(goal).and_then(|d| position.step(d))
        } else {
            self.runtime.pending_path.pop_front()
        };
        let Some((next, direction)) = next.and_then(|t| Some((t, position.direction_to(t)?)))
        else {
            self.runtime.pending_path.clear();
            return Step::probe(self.settings.engine.wait_time(), Probe::Navigation);
        };

        self.runtime.expected_tile = Some(next);
        Step::probe(self.settings.engine.wait_time(), Probe::Position)
            .with_effects(vec![Effect::Step(direction)])
    }

    fn arrive(&mut self, target: MoveTarget) -> Step {
        self.runtime.pending_path.clear();
        self.runtime.expected_tile = None;
        debug!(steps = self.runtime.move_steps, "Arrived at quest giver");
        let phase = match target {
            MoveTarget::ToStart => InteractionPhase::Start,
            MoveTarget::ToComplete => InteractionPhase::Complete,
        };
        self.enter_interacting(phase)
    }

    fn on_interacting(&mut self, phase: InteractionPhase, event: Event) -> Step {
        match event {
            Event::Resume => Step::probe(Duration::ZERO, Probe::Dialogue),
            Event::Observed(Observation::Dialogue(dialogue)) => {
                let changed = self
                    .runtime
                    .dialogue_before
                    .as_ref()
                    .is_some_and(|before| *before != dialogue);
                if changed {
                    return self.after_interaction(phase, dialogue);
                }
                if self.runtime.interaction_attempts >= self.settings.engine.max_interaction_attempts
                {
                    return self.fail(FailureReason::InteractionTimeout);
                }
                self.runtime.interaction_attempts =
                    self.runtime.interaction_attempts.saturating_add(1);
                self.runtime.dialogue_before = Some(dialogue);
                Step::probe(self.settings.engine.interaction_wait(), Probe::Dialogue)
                    .with_effects(vec![Effect::Interact])
            }
            other => self.unexpected(&other),
        }
    }

    fn after_interaction(
        &mut self,
        phase: InteractionPhase,
        dialogue: Option<QuestDescriptor>,
    ) -> Step {
        match phase {
            InteractionPhase::Start => {
                self.runtime.dialogue = dialogue;
                self.transition(FlowState::DetectingQuest);
            }
            InteractionPhase::Complete => self.transition(FlowState::Completed),
        }
        Step::resume(Duration::ZERO)
    }

    fn on_detecting(&mut self, event: Event) -> Step {
        match event {
            Event::Resume => {}
            Event::Observed(Observation::Dialogue(dialogue)) => self.runtime.dialogue = dialogue,
            other => return self.unexpected(&other),
        }

        let classification = self
            .runtime
            .dialogue
            .as_ref()
            .map_or(Classification::None, classify_descriptor);
        let (goal_type, goals) = match classification {
            Classification::None => {
                self.announce(String::from("No quest detected, finishing conversation"));
                return self.enter_interacting(InteractionPhase::Complete);
            }
            Classification::Recognized { goal_type, goals } => (goal_type, goals),
        };

        self.runtime.quest_type = Some(goal_type);
        if self.settings.skip.is_skipped(goal_type) {
            self.announce(format!("Skipping {goal_type} quest"));
            return self.enter_interacting(InteractionPhase::Complete);
        }
        if goal_type.activity().is_none() || goals.is_empty() {
            self.announce(format!("Handing in {goal_type} quest"));
            return self.enter_interacting(InteractionPhase::Complete);
        }

        self.announce(format!(
            "Executing {goal_type} quest with {} goal(s)",
            goals.len()
        ));
        self.runtime.goals = goals;
        self.runtime.current_goal_index = 0;
        self.runtime.monitor.reset();
        self.transition(FlowState::ExecutingQuest);
        self.drive_goals(Vec::new())
    }

    fn on_executing(&mut self, event: Event) -> Step {
        match event {
            Event::Resume => self.drive_goals(Vec::new()),
            Event::Observed(Observation::Dialogue(None)) => {
                debug!("Quest dialogue not visible during progress poll");
                let verdict = self.runtime.monitor.record_unchanged();
                self.apply_verdict(verdict)
            }
            Event::Observed(Observation::Dialogue(Some(dialogue))) => {
                let classification = classify_descriptor(&dialogue);
                if classification.goal_type() != self.runtime.quest_type {
                    warn!(
                        expected = ?self.runtime.quest_type,
                        seen = ?classification.goal_type(),
                        "Dialogue no longer shows the running quest"
                    );
                    let verdict = self.runtime.monitor.record_unchanged();
                    return self.apply_verdict(verdict);
                }
                let fresh = classification.into_goals();
                if fresh.is_empty() {
                    self.announce(String::from("Quest lists no goals, returning"));
                    return self.finish_execution();
                }
                let merged = reconcile(&self.runtime.goals, fresh);
                let verdict = self.runtime.monitor.observe(&self.runtime.goals, &merged);
                self.runtime.goals = merged;
                if first_unsatisfied(&self.runtime.goals).is_none() {
                    return self.finish_execution();
                }
                self.apply_verdict(verdict)
            }
            other => self.unexpected(&other),
        }
    }

    fn apply_verdict(&mut self, verdict: Verdict) -> Step {
        match verdict {
            Verdict::Advanced | Verdict::Unchanged { .. } => {
                debug!(
                    ?verdict,
                    stagnant_polls = self.runtime.monitor.stagnant_polls(),
                    goals = ?self.goal_progress(),
                    "Progress poll"
                );
                self.drive_goals(Vec::new())
            }
            Verdict::Retrigger => {
                warn!(
                    retriggered = self.runtime.monitor.retriggered(),
                    goals = ?self.goal_progress(),
                    "Goal progress stalled, restarting activity"
                );
                let effects = self
                    .runtime
                    .running_activity
                    .map(|request| {
                        vec![Effect::StartActivity {
                            request,
                            retrigger: true,
                        }]
                    })
                    .unwrap_or_default();
                Step::probe(
                    self.settings.engine.progress_poll_interval(),
                    Probe::Dialogue,
                )
                .with_effects(effects)
            }
            Verdict::Stalled => self.fail(FailureReason::GoalStagnation),
        }
    }

    /// Make sure the activity for the first unmet goal runs, then poll.
    fn drive_goals(&mut self, mut effects: Vec<Effect>) -> Step {
        let Some(index) = first_unsatisfied(&self.runtime.goals) else {
            return self.finish_execution();
        };
        if index != self.runtime.current_goal_index {
            info!(
                from = self.runtime.current_goal_index,
                to = index,
                "Goal satisfied, moving to next goal"
            );
            self.runtime.current_goal_index = index;
        }
        let Some(request) = self
            .runtime
            .goals
            .get(index)
            .and_then(QuestGoal::activity_request)
        else {
            return self.finish_execution();
        };

        if self.runtime.running_activity != Some(request) {
            if self.runtime.running_activity.is_some() {
                effects.push(Effect::StopActivities);
            }
            effects.push(Effect::StartActivity {
                request,
                retrigger: false,
            });
            self.runtime.running_activity = Some(request);
            self.runtime.monitor.reset();
            debug!(kind = ?request.kind, tier = ?request.mob_tier, "Activity requested");
        }
        Step::probe(
            self.settings.engine.progress_poll_interval(),
            Probe::Dialogue,
        )
        .with_effects(effects)
    }

    fn finish_execution(&mut self) -> Step {
        let mut effects = Vec::new();
        if self.runtime.running_activity.take().is_some() {
            effects.push(Effect::StopActivities);
        }
        self.announce(String::from("Quest goals met, returning to quest giver"));
        self.start_moving(MoveTarget::ToComplete)
            .with_effects(effects)
    }

    fn on_completed(&mut self) -> Step {
        let name = self.current_location().map(|l| l.name).unwrap_or_default();
        if let Some(index) = self.runtime.current_location_index {
            if let Err(err) = self.registry.mark_completed(index) {
                warn!(error = %err, "Could not mark location completed");
            }
            self.registry.set_cursor(index.saturating_add(1));
        }
        self.runtime.current_location_index = None;
        self.runtime.failed_attempts = 0;
        self.runtime.reset_attempt();
        info!(
            location = %name,
            completed = self.registry.completed_count(),
            total = self.registry.len(),
            "Location completed"
        );
        self.announce(format!("Completed {name}"));
        self.transition(FlowState::Idle);
        Step::resume(self.settings.engine.settle_delay())
    }

    fn on_failed(&mut self) -> Step {
        let Some(index) = self.runtime.current_location_index else {
            self.transition(FlowState::Idle);
            return Step::resume(Duration::ZERO);
        };
        let name = self.current_location().map(|l| l.name).unwrap_or_default();
        let max_retries = self.settings.engine.max_retries;
        self.runtime.failed_attempts = self.runtime.failed_attempts.saturating_add(1);
        self.runtime.reset_attempt();

        if self.runtime.failed_attempts < max_retries {
            self.announce(format!(
                "Retrying {name} ({}/{max_retries})",
                self.runtime.failed_attempts
            ));
        } else {
            if let Err(err) = self.registry.mark_skipped(index) {
                warn!(error = %err, "Could not mark location skipped");
            }
            self.registry.set_cursor(index.saturating_add(1));
            self.runtime.current_location_index = None;
            self.runtime.failed_attempts = 0;
            self.announce(format!(
                "Skipping {name} after {max_retries} failed attempts"
            ));
        }
        self.transition(FlowState::Idle);
        Step::resume(self.settings.engine.settle_delay())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn start_moving(&mut self, target: MoveTarget) -> Step {
        self.runtime.pending_path.clear();
        self.runtime.greedy = false;
        self.runtime.expected_tile = None;
        self.runtime.move_steps = 0;
        self.transition(FlowState::Moving(target));
        Step::probe(self.settings.engine.wait_time(), Probe::Navigation)
    }

    fn enter_interacting(&mut self, phase: InteractionPhase) -> Step {
        self.runtime.interaction_attempts = 0;
        self.runtime.dialogue_before = None;
        self.transition(FlowState::Interacting(phase));
        Step::probe(Duration::ZERO, Probe::Dialogue)
    }

    fn fail(&mut self, reason: FailureReason) -> Step {
        let name = self.current_location().map(|l| l.name).unwrap_or_default();
        warn!(
            location = %name,
            state = %self.runtime.state,
            %reason,
            attempt = self.runtime.failed_attempts.saturating_add(1),
            "Attempt failed"
        );
        self.runtime.running_activity = None;
        self.runtime.status_message = format!("Failed at {name}: {reason}");
        self.runtime.last_failure = Some(reason);
        self.transition(FlowState::Failed);
        Step::resume(self.settings.engine.wait_time()).with_effects(vec![Effect::StopActivities])
    }

    fn unexpected(&mut self, event: &Event) -> Step {
        warn!(state = %self.runtime.state, ?event, "Event does not fit the current state");
        self.fail(FailureReason::UnexpectedObservation)
    }

    fn lost_location(&mut self) -> Step {
        warn!(state = %self.runtime.state, "No current location, returning to idle");
        self.runtime.reset_attempt();
        self.transition(FlowState::Idle);
        Step::resume(Duration::ZERO)
    }

    fn current_location(&self) -> Option<Location> {
        self.runtime
            .current_location_index
            .and_then(|index| self.registry.get(index))
            .cloned()
    }

    fn transition(&mut self, next: FlowState) {
        if self.runtime.state != next {
            debug!(from = %self.runtime.state, to = %next, "State transition");
            self.runtime.state = next;
        }
    }

    fn announce(&mut self, message: String) {
        info!(location = ?self.runtime.current_location_index, "{message}");
        self.runtime.status_message = message;
    }

    fn goal_progress(&self) -> Vec<(u32, u32)> {
        self.runtime
            .goals
            .iter()
            .map(|goal| (goal.current, goal.required))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use questbot_types::{
        ActivityKind, GoalCounter, LocationId, LocationSpec, MobTier,
    };
    use questbot_world::Matrix;

    use super::*;

    fn spec(id: &str, x: u32, y: u32) -> LocationSpec {
        LocationSpec {
            id: LocationId::new(id),
            name: format!("Giver {id}"),
            coordinates: Tile::new(x, y),
        }
    }

    fn flow(specs: &[LocationSpec]) -> QuestFlow {
        QuestFlow::new(LocationRegistry::initialize(specs), FlowSettings::default())
    }

    fn observed(observation: Observation) -> Event {
        Event::Observed(observation)
    }

    fn dialogue(text: &str, counters: &[(&str, u32, u32)]) -> Observation {
        Observation::Dialogue(Some(QuestDescriptor {
            text: text.to_owned(),
            counters: counters
                .iter()
                .map(|&(label, current, required)| GoalCounter {
                    label: label.to_owned(),
                    current,
                    required,
                })
                .collect(),
            can_finish: false,
        }))
    }

    /// Drive a flow from `Idle` to standing at the giver in
    /// `Interacting(Start)` with the first snapshot taken.
    fn to_interacting(flow: &mut QuestFlow) {
        flow.handle(Event::Resume);
        flow.handle(observed(Observation::LocationId(LocationId::new("1"))));
        let at = flow.current_location().unwrap().coordinates;
        flow.handle(observed(Observation::Navigation {
            position: at,
            matrix: Matrix::new(10, 10).unwrap(),
        }));
        assert_eq!(flow.state(), FlowState::Interacting(InteractionPhase::Start));
        let step = flow.handle(observed(Observation::Dialogue(None)));
        assert_eq!(step.effects, vec![Effect::Interact]);
    }

    #[test]
    fn idle_picks_first_eligible_and_probes_location() {
        let mut flow = flow(&[spec("1", 2, 2), spec("2", 3, 3)]);
        let step = flow.handle(Event::Resume);
        assert_eq!(flow.state(), FlowState::Teleporting);
        assert_eq!(flow.runtime().current_location_index, Some(0));
        assert_eq!(step.next, Continuation::Probe {
            after: Duration::ZERO,
            probe: Probe::LocationId,
        });
    }

    #[test]
    fn idle_halts_when_nothing_eligible() {
        let mut flow = flow(&[spec("1", 2, 2)]);
        flow.toggle_location(0).unwrap();
        let step = flow.handle(Event::Resume);
        assert_eq!(step.next, Continuation::Halt);
        assert_eq!(flow.runtime().status_message, "All quests completed");
    }

    #[test]
    fn idle_wraps_to_reenabled_location() {
        let mut flow = flow(&[spec("1", 2, 2), spec("2", 3, 3)]);
        flow.registry.set_cursor(2);
        flow.handle(Event::Resume);
        assert_eq!(flow.runtime().current_location_index, Some(0));
    }

    #[test]
    fn teleport_issued_once_then_polled() {
        let mut flow = flow(&[spec("414", 2, 2)]);
        flow.handle(Event::Resume);
        let step = flow.handle(observed(Observation::LocationId(LocationId::new("hub"))));
        assert_eq!(step.effects, vec![Effect::Teleport(LocationId::new("414"))]);
        let step = flow.handle(observed(Observation::LocationId(LocationId::new("hub"))));
        assert!(step.effects.is_empty());
        assert_eq!(flow.runtime().teleport_polls, 2);
    }

    #[test]
    fn teleport_times_out_after_poll_budget() {
        let mut flow = flow(&[spec("414", 2, 2)]);
        flow.handle(Event::Resume);
        let hub = || observed(Observation::LocationId(LocationId::new("hub")));
        for _ in 0..5 {
            flow.handle(hub());
            assert_eq!(flow.state(), FlowState::Teleporting);
        }
        let step = flow.handle(hub());
        assert_eq!(flow.state(), FlowState::Failed);
        assert_eq!(step.effects, vec![Effect::StopActivities]);
        assert_eq!(
            flow.runtime().last_failure,
            Some(FailureReason::TeleportTimeout)
        );
    }

    #[test]
    fn moving_follows_planned_path() {
        let mut flow = flow(&[spec("1", 4, 0)]);
        flow.handle(Event::Resume);
        flow.handle(observed(Observation::LocationId(LocationId::new("1"))));
        assert_eq!(flow.state(), FlowState::Moving(MoveTarget::ToStart));

        let matrix = Matrix::from_rows(&["..#..", "..#..", "....."]).unwrap();
        let step = flow.handle(observed(Observation::Navigation {
            position: Tile::new(0, 0),
            matrix,
        }));
        assert_eq!(step.effects.len(), 1);
        assert!(matches!(step.next, Continuation::Probe {
            probe: Probe::Position,
            ..
        }));
        assert!(!flow.runtime().greedy);
        let expected = flow.runtime().expected_tile.unwrap();
        let step = flow.handle(observed(Observation::Position(expected)));
        assert_eq!(step.effects.len(), 1);
    }

    #[test]
    fn missing_path_falls_back_to_greedy() {
        let mut flow = flow(&[spec("1", 4, 0)]);
        flow.handle(Event::Resume);
        flow.handle(observed(Observation::LocationId(LocationId::new("1"))));
        let matrix = Matrix::from_rows(&["..#..", "..#..", "..#.."]).unwrap();
        let step = flow.handle(observed(Observation::Navigation {
            position: Tile::new(0, 0),
            matrix,
        }));
        assert!(flow.runtime().greedy);
        assert_eq!(step.effects, vec![Effect::Step(questbot_types::Direction::Right)]);
    }

    #[test]
    fn blocked_greedy_walk_exhausts_step_budget() {
        let mut flow = flow(&[spec("1", 4, 0)]);
        flow.settings.engine.max_move_steps = 3;
        flow.handle(Event::Resume);
        flow.handle(observed(Observation::LocationId(LocationId::new("1"))));
        let wall = || Observation::Navigation {
            position: Tile::new(1, 0),
            matrix: Matrix::from_rows(&["..#..", "..#.."]).unwrap(),
        };
        for _ in 0..3 {
            flow.handle(observed(wall()));
            // The step bumps into the wall: position unchanged.
            let step = flow.handle(observed(Observation::Position(Tile::new(1, 0))));
            assert!(matches!(step.next, Continuation::Probe {
                probe: Probe::Navigation,
                ..
            }));
        }
        flow.handle(observed(wall()));
        assert_eq!(flow.state(), FlowState::Failed);
        assert_eq!(
            flow.runtime().last_failure,
            Some(FailureReason::MovementExhausted)
        );
    }

    #[test]
    fn interaction_waits_for_dialogue_change() {
        let mut flow = flow(&[spec("1", 1, 1)]);
        to_interacting(&mut flow);
        // Nothing changed: interact again.
        let step = flow.handle(observed(Observation::Dialogue(None)));
        assert_eq!(step.effects, vec![Effect::Interact]);
        // Dialogue opened: detection.
        flow.handle(observed(dialogue("Zbierz zasób Drewno 0/2", &[])));
        assert_eq!(flow.state(), FlowState::DetectingQuest);
    }

    #[test]
    fn interaction_times_out() {
        let mut flow = flow(&[spec("1", 1, 1)]);
        flow.settings.engine.max_interaction_attempts = 2;
        to_interacting(&mut flow);
        flow.handle(observed(Observation::Dialogue(None)));
        flow.handle(observed(Observation::Dialogue(None)));
        assert_eq!(flow.state(), FlowState::Failed);
        assert_eq!(
            flow.runtime().last_failure,
            Some(FailureReason::InteractionTimeout)
        );
    }

    #[test]
    fn unrecognized_quest_goes_to_completion() {
        let mut flow = flow(&[spec("1", 1, 1)]);
        to_interacting(&mut flow);
        flow.handle(observed(dialogue("Witaj, wędrowcze.", &[])));
        let step = flow.handle(Event::Resume);
        assert_eq!(
            flow.state(),
            FlowState::Interacting(InteractionPhase::Complete)
        );
        assert_eq!(step.next, Continuation::Probe {
            after: Duration::ZERO,
            probe: Probe::Dialogue,
        });
    }

    #[test]
    fn skipped_category_goes_to_completion() {
        let mut flow = flow(&[spec("1", 1, 1)]);
        flow.toggle_skip(GoalType::Pvp);
        to_interacting(&mut flow);
        flow.handle(observed(dialogue("Wygrane walki PvP 0/3", &[])));
        flow.handle(Event::Resume);
        assert_eq!(
            flow.state(),
            FlowState::Interacting(InteractionPhase::Complete)
        );
        assert_eq!(flow.runtime().quest_type, Some(GoalType::Pvp));
    }

    #[test]
    fn mob_quest_starts_tiered_combat() {
        let mut flow = flow(&[spec("1", 1, 1)]);
        to_interacting(&mut flow);
        flow.handle(observed(dialogue("", &[("Pokonaj Yeti (Bossek)", 0, 1)])));
        let step = flow.handle(Event::Resume);
        assert_eq!(flow.state(), FlowState::ExecutingQuest);
        assert_eq!(step.effects, vec![Effect::StartActivity {
            request: ActivityRequest {
                kind: ActivityKind::MonsterCombat,
                mob_tier: Some(MobTier::Boss),
            },
            retrigger: false,
        }]);
    }

    #[test]
    fn activity_switches_between_goals() {
        let mut flow = flow(&[spec("1", 1, 1)]);
        to_interacting(&mut flow);
        let both = |first: u32| {
            dialogue("", &[
                ("Pokonaj Wilk", first, 1),
                ("Pokonaj Yeti (Elitarny)", 0, 1),
            ])
        };
        flow.handle(observed(both(0)));
        flow.handle(Event::Resume);
        let step = flow.handle(observed(both(1)));
        assert_eq!(step.effects, vec![
            Effect::StopActivities,
            Effect::StartActivity {
                request: ActivityRequest {
                    kind: ActivityKind::MonsterCombat,
                    mob_tier: Some(MobTier::Elite),
                },
                retrigger: false,
            },
        ]);
        assert_eq!(flow.runtime().current_goal_index, 1);
    }

    #[test]
    fn stagnation_retriggers_then_fails() {
        let mut flow = flow(&[spec("1", 1, 1)]);
        to_interacting(&mut flow);
        let same = || observed(dialogue("", &[("Zbierz zasób Drewno", 1, 3)]));
        flow.handle(same());
        flow.handle(Event::Resume);
        let step = flow.handle(same());
        assert!(step.effects.is_empty());
        let step = flow.handle(same());
        assert_eq!(step.effects, vec![Effect::StartActivity {
            request: ActivityRequest::plain(ActivityKind::Gathering),
            retrigger: true,
        }]);
        flow.handle(same());
        assert_eq!(flow.state(), FlowState::Failed);
        assert_eq!(
            flow.runtime().last_failure,
            Some(FailureReason::GoalStagnation)
        );
    }

    #[test]
    fn satisfied_goals_stop_activity_and_return() {
        let mut flow = flow(&[spec("1", 1, 1)]);
        to_interacting(&mut flow);
        flow.handle(observed(dialogue("", &[("Zbierz zasób Drewno", 1, 2)])));
        flow.handle(Event::Resume);
        let step = flow.handle(observed(dialogue("", &[("Zbierz zasób Drewno", 2, 2)])));
        assert_eq!(step.effects, vec![Effect::StopActivities]);
        assert_eq!(flow.state(), FlowState::Moving(MoveTarget::ToComplete));
    }

    #[test]
    fn goal_met_exactly_on_third_poll() {
        let mut flow = flow(&[spec("1", 1, 1)]);
        to_interacting(&mut flow);
        flow.handle(observed(dialogue("", &[("Zbierz zasób Drewno", 1, 3)])));
        assert_eq!(flow.state(), FlowState::ExecutingQuest);

        flow.handle(Event::Resume);
        let step = flow.handle(observed(dialogue("", &[("Zbierz zasób Drewno", 2, 3)])));
        assert_eq!(flow.state(), FlowState::ExecutingQuest);
        assert!(!step.effects.contains(&Effect::StopActivities));

        flow.handle(Event::Resume);
        let step = flow.handle(observed(dialogue("", &[("Zbierz zasób Drewno", 3, 3)])));
        assert_eq!(step.effects, vec![Effect::StopActivities]);
        assert_eq!(flow.state(), FlowState::Moving(MoveTarget::ToComplete));
        assert_eq!(flow.runtime().goals.first().map(|g| g.current), Some(3));
    }

    #[test]
    fn goal_decrease_is_clamped() {
        let mut flow = flow(&[spec("1", 1, 1)]);
        to_interacting(&mut flow);
        flow.handle(observed(dialogue("", &[("Zbierz zasób Drewno", 2, 5)])));
        flow.handle(Event::Resume);
        flow.handle(observed(dialogue("", &[("Zbierz zasób Drewno", 1, 5)])));
        assert_eq!(flow.runtime().goals.first().map(|g| g.current), Some(2));
    }

    #[test]
    fn failures_retry_then_skip() {
        let mut flow = flow(&[spec("1", 1, 1), spec("2", 1, 1)]);
        for attempt in 1..=3_u32 {
            flow.handle(Event::Resume);
            assert_eq!(flow.runtime().current_location_index, Some(0));
            flow.handle(Event::SessionFault(String::from("link lost")));
            assert_eq!(flow.state(), FlowState::Failed);
            flow.handle(Event::Resume);
            assert_eq!(flow.state(), FlowState::Idle);
            if attempt < 3 {
                assert_eq!(flow.runtime().failed_attempts, attempt);
            }
        }
        let skipped = flow.registry().get(0).unwrap();
        assert!(skipped.completed && skipped.skipped);
        flow.handle(Event::Resume);
        assert_eq!(flow.runtime().current_location_index, Some(1));
        assert_eq!(flow.runtime().failed_attempts, 0);
    }

    #[test]
    fn completion_marks_and_advances() {
        let mut flow = flow(&[spec("1", 1, 1), spec("2", 1, 1)]);
        flow.handle(Event::Resume);
        flow.runtime.state = FlowState::Completed;
        let step = flow.handle(Event::Resume);
        assert_eq!(flow.state(), FlowState::Idle);
        assert!(flow.registry().get(0).unwrap().completed);
        assert_eq!(flow.registry().cursor(), 1);
        assert_eq!(step.next, Continuation::Resume {
            after: Duration::from_millis(2_000),
        });
    }

    #[test]
    fn unexpected_observation_fails_attempt() {
        let mut flow = flow(&[spec("1", 1, 1)]);
        flow.handle(Event::Resume);
        flow.handle(observed(Observation::Position(Tile::new(0, 0))));
        assert_eq!(
            flow.runtime().last_failure,
            Some(FailureReason::UnexpectedObservation)
        );
    }

    #[test]
    fn disabling_current_location_aborts() {
        let mut flow = flow(&[spec("1", 1, 1), spec("2", 1, 1)]);
        flow.handle(Event::Resume);
        let toggle = flow.toggle_location(0).unwrap();
        assert!(toggle.disabled && toggle.interrupted);
        assert_eq!(flow.state(), FlowState::Idle);
        flow.handle(Event::Resume);
        assert_eq!(flow.runtime().current_location_index, Some(1));
    }

    #[test]
    fn status_reports_counts() {
        let mut flow = flow(&[spec("1", 1, 1), spec("2", 1, 1)]);
        flow.handle(Event::Resume);
        let status = flow.status();
        assert_eq!(status.total_count, 2);
        assert_eq!(status.completed_count, 0);
        assert_eq!(status.current_location_name.as_deref(), Some("Giver 1"));
        assert_eq!(status.state, FlowState::Teleporting);
    }
}
