//! In-memory game session.
//!
//! [`SimulatedSession`] implements [`GameSession`] over a handful of tile
//! maps and scripted quest givers. It stands in for the client transport
//! in the engine binary and in end-to-end tests.
//!
//! The simulation keeps the rules simple:
//!
//! - Teleporting places the avatar on the target map's spawn tile, unless
//!   the destination was blocked with [`SimulatedSession::block_teleport`].
//! - Steps into blocked or out-of-map tiles are silently ignored.
//! - Interacting within one tile of a quest giver opens its quest; a second
//!   interaction hands it in (or abandons it) and closes the dialogue.
//! - Each read of an open quest dialogue adds one unit of progress to the
//!   first unfinished goal whose activity loop is currently running.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use questbot_types::{
    ActivityKind, ActivityRequest, Direction, GoalCounter, LocationId, LocationSpec, MapSnapshot,
    MobTier, QuestDescriptor, Tile,
};
use questbot_world::{Matrix, WorldError};

use crate::session::{GameSession, SessionError};

/// Greeting shown by a quest giver without a quest.
pub const GREETING_TEXT: &str = "Witaj, wędrowcze. Dziś nie mam dla ciebie zadań.";

/// Text shown by a quest giver whose quest was handed in.
pub const FAREWELL_TEXT: &str = "Dziękuję. Wróć jutro po kolejne zadanie.";

// ---------------------------------------------------------------------------
// Maps
// ---------------------------------------------------------------------------

/// One simulated map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimMap {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
    /// Tiles the avatar cannot enter.
    pub blocked: BTreeSet<Tile>,
    /// Where teleports land.
    pub spawn: Tile,
}

impl SimMap {
    /// A map without obstacles.
    pub const fn open(width: u32, height: u32, spawn: Tile) -> Self {
        Self {
            width,
            height,
            blocked: BTreeSet::new(),
            spawn,
        }
    }

    /// Parse a textual map (`#` blocked, `.` free).
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::MalformedGrid`] on ragged rows or unknown
    /// characters.
    pub fn from_rows(rows: &[&str], spawn: Tile) -> Result<Self, WorldError> {
        let matrix = Matrix::from_rows(rows)?;
        let blocked = (0..matrix.height())
            .flat_map(|y| (0..matrix.width()).map(move |x| Tile::new(x, y)))
            .filter(|&tile| matrix.is_blocked(tile))
            .collect();
        Ok(Self {
            width: matrix.width(),
            height: matrix.height(),
            blocked,
            spawn,
        })
    }

    /// Whether the avatar can stand on `tile`.
    pub fn is_walkable(&self, tile: Tile) -> bool {
        tile.x < self.width && tile.y < self.height && !self.blocked.contains(&tile)
    }

    fn snapshot(&self) -> MapSnapshot {
        MapSnapshot {
            width: self.width,
            height: self.height,
            blocked: self.blocked.iter().copied().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Quests
// ---------------------------------------------------------------------------

/// One goal of a scripted quest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimGoal {
    /// Counter label as the dialogue shows it.
    pub label: String,
    /// Activity loop that advances this goal; `None` never advances.
    pub progress_by: Option<ActivityRequest>,
    /// Progress so far.
    pub current: u32,
    /// Amount needed.
    pub required: u32,
}

impl SimGoal {
    /// A resource gathering goal.
    pub fn resource(name: &str, current: u32, required: u32) -> Self {
        Self {
            label: format!("Zbierz zasób {name}"),
            progress_by: Some(ActivityRequest::plain(ActivityKind::Gathering)),
            current,
            required,
        }
    }

    /// A monster goal. Only combat with the matching tier filter advances
    /// it.
    pub fn mob(name: &str, tier: MobTier, current: u32, required: u32) -> Self {
        let qualifier = match tier {
            MobTier::Normal => "",
            MobTier::Elite => " (Elitarny)",
            MobTier::Champion => " (Czempion)",
            MobTier::Boss => " (Bossek)",
        };
        Self {
            label: format!("Pokonaj {name}{qualifier}"),
            progress_by: Some(ActivityRequest {
                kind: ActivityKind::MonsterCombat,
                mob_tier: Some(tier),
            }),
            current,
            required,
        }
    }

    /// A player combat goal.
    pub fn pvp(current: u32, required: u32) -> Self {
        Self {
            label: String::from("Wygrane walki PvP"),
            progress_by: Some(ActivityRequest::plain(ActivityKind::PlayerCombat)),
            current,
            required,
        }
    }

    /// A wanted-list goal, advanced by unfiltered monster combat.
    pub fn wanted_lists(current: u32, required: u32) -> Self {
        Self {
            label: String::from("Wykonane Listy Gończe PvM"),
            progress_by: Some(ActivityRequest::plain(ActivityKind::MonsterCombat)),
            current,
            required,
        }
    }

    /// An expedition goal. No activity loop advances it.
    pub fn expedition(current: u32, required: u32) -> Self {
        Self {
            label: String::from("Udaj się na wyprawy"),
            progress_by: None,
            current,
            required,
        }
    }

    const fn is_satisfied(&self) -> bool {
        self.current >= self.required
    }
}

/// A quest a simulated giver hands out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedQuest {
    /// Description text shown above the counters.
    pub intro: String,
    /// Goals in display order.
    pub goals: Vec<SimGoal>,
}

impl ScriptedQuest {
    /// A quest with the given goals.
    pub fn new(intro: &str, goals: Vec<SimGoal>) -> Self {
        Self {
            intro: intro.to_owned(),
            goals,
        }
    }

    /// A donation quest: no counters, finished by handing it in.
    pub fn donation(item: &str) -> Self {
        Self {
            intro: format!("Oddaj przedmiot: {item}"),
            goals: Vec::new(),
        }
    }

    fn is_satisfied(&self) -> bool {
        self.goals.iter().all(SimGoal::is_satisfied)
    }
}

/// Lifecycle of a simulated quest giver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiverPhase {
    /// Nobody has talked to the giver yet.
    Waiting,
    /// The quest (or greeting) has been shown.
    Offered,
    /// The quest was handed in or abandoned.
    Finished,
}

/// A quest giver standing on a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestGiver {
    /// Map the giver stands on.
    pub location: LocationId,
    /// Tile the giver stands on.
    pub position: Tile,
    /// The quest handed out; `None` for a greeting only.
    pub quest: Option<ScriptedQuest>,
    /// Where the conversation is.
    pub phase: GiverPhase,
}

/// How progress polls behave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StallMode {
    /// Running activities advance goals.
    #[default]
    Flowing,
    /// No progress until the next activity start.
    UntilRestart,
    /// No progress ever.
    Forever,
}

/// A call the engine made, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    /// `teleport`
    Teleport(LocationId),
    /// `step`
    Step(Direction),
    /// `interact`
    Interact,
    /// `start_activity`
    StartActivity(ActivityRequest),
    /// `stop_activity`
    StopActivity(ActivityKind),
}

// ---------------------------------------------------------------------------
// SimulatedSession
// ---------------------------------------------------------------------------

/// In-memory [`GameSession`].
#[derive(Debug, Clone)]
pub struct SimulatedSession {
    maps: BTreeMap<LocationId, SimMap>,
    location: LocationId,
    position: Tile,
    givers: Vec<QuestGiver>,
    open_dialogue: Option<usize>,
    running: BTreeMap<ActivityKind, ActivityRequest>,
    blocked_teleports: BTreeSet<LocationId>,
    stall: StallMode,
    pending_fault: Option<String>,
    calls: Vec<SessionCall>,
    handed_in: Vec<usize>,
}

impl SimulatedSession {
    /// Start the avatar on `map`'s spawn tile at `location`.
    pub fn new(location: LocationId, map: SimMap) -> Self {
        let position = map.spawn;
        let mut maps = BTreeMap::new();
        maps.insert(location.clone(), map);
        Self {
            maps,
            location,
            position,
            givers: Vec::new(),
            open_dialogue: None,
            running: BTreeMap::new(),
            blocked_teleports: BTreeSet::new(),
            stall: StallMode::Flowing,
            pending_fault: None,
            calls: Vec::new(),
            handed_in: Vec::new(),
        }
    }

    /// Build a demo world with one map per configured location id and a
    /// scripted giver at every configured coordinate.
    ///
    /// Quests rotate through a fixed set of templates so a run exercises
    /// every kind of goal.
    pub fn from_locations(specs: &[LocationSpec]) -> Self {
        let mut session = Self::new(LocationId::new("hub"), SimMap::open(12, 12, Tile::new(6, 6)));
        for (index, spec) in specs.iter().enumerate() {
            let width = spec.coordinates.x.saturating_add(6).max(24);
            let height = spec.coordinates.y.saturating_add(6).max(24);
            if !session.maps.contains_key(&spec.id) {
                let mut map = SimMap::open(width, height, Tile::new(1, 1));
                // A wall across the middle with a gap near the bottom.
                let wall_x = width.checked_div(2).unwrap_or_default();
                for y in 0..height.saturating_sub(3) {
                    map.blocked.insert(Tile::new(wall_x, y));
                }
                session.add_map(spec.id.clone(), map);
            }
            // Keep every giver tile walkable even if another map's wall
            // layout would cover it.
            if let Some(map) = session.maps.get_mut(&spec.id) {
                map.width = map.width.max(width);
                map.height = map.height.max(height);
                map.blocked.remove(&spec.coordinates);
            }
            session.add_giver(&spec.id, spec.coordinates, demo_quest(index));
        }
        session
    }

    /// Add or replace a map.
    pub fn add_map(&mut self, location: LocationId, map: SimMap) {
        self.maps.insert(location, map);
    }

    /// Place a quest giver.
    pub fn add_giver(&mut self, location: &LocationId, position: Tile, quest: Option<ScriptedQuest>) {
        self.givers.push(QuestGiver {
            location: location.clone(),
            position,
            quest,
            phase: GiverPhase::Waiting,
        });
    }

    /// Make teleports to `location` silently do nothing.
    pub fn block_teleport(&mut self, location: LocationId) {
        self.blocked_teleports.insert(location);
    }

    /// Change how progress polls behave.
    pub const fn stall_progress(&mut self, mode: StallMode) {
        self.stall = mode;
    }

    /// Make the next command fail with a transport error.
    pub fn fail_next(&mut self, message: &str) {
        self.pending_fault = Some(message.to_owned());
    }

    /// Every command the engine issued, in order.
    pub fn calls(&self) -> &[SessionCall] {
        &self.calls
    }

    /// Number of teleport commands issued.
    pub fn teleport_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, SessionCall::Teleport(_)))
            .count()
    }

    /// The quest givers and their state.
    pub fn givers(&self) -> &[QuestGiver] {
        &self.givers
    }

    /// Indices of givers whose quest was handed in with every goal met.
    pub fn handed_in(&self) -> &[usize] {
        &self.handed_in
    }

    /// Activity loops running right now.
    pub fn running_activities(&self) -> Vec<ActivityRequest> {
        self.running.values().copied().collect()
    }

    fn take_fault(&mut self) -> Result<(), SessionError> {
        match self.pending_fault.take() {
            Some(message) => Err(SessionError::Transport { message }),
            None => Ok(()),
        }
    }

    fn current_map(&self) -> Result<&SimMap, SessionError> {
        self.maps.get(&self.location).ok_or_else(|| SessionError::Rejected {
            operation: "map_blocked_cells",
            reason: format!("no map for location {}", self.location),
        })
    }

    /// Index of the giver within reach of the avatar.
    fn giver_in_reach(&self) -> Option<usize> {
        self.givers.iter().position(|giver| {
            giver.location == self.location
                && (giver.position == self.position || giver.position.is_adjacent(self.position))
        })
    }

    fn advance_progress(&mut self) {
        if self.stall != StallMode::Flowing {
            return;
        }
        let Some(giver) = self.open_dialogue.and_then(|i| self.givers.get_mut(i)) else {
            return;
        };
        if giver.phase != GiverPhase::Offered {
            return;
        }
        let Some(quest) = giver.quest.as_mut() else {
            return;
        };
        let running = &self.running;
        let next = quest.goals.iter_mut().find(|goal| {
            !goal.is_satisfied()
                && goal
                    .progress_by
                    .is_some_and(|request| running.get(&request.kind) == Some(&request))
        });
        if let Some(goal) = next {
            goal.current = goal.current.saturating_add(1);
            debug!(label = %goal.label, current = goal.current, "Simulated progress");
        }
    }

    fn render(&self, index: usize) -> Option<QuestDescriptor> {
        let giver = self.givers.get(index)?;
        let descriptor = match (giver.phase, &giver.quest) {
            (GiverPhase::Waiting, _) => return None,
            (GiverPhase::Finished, _) => QuestDescriptor::from_text(FAREWELL_TEXT),
            (GiverPhase::Offered, None) => QuestDescriptor::from_text(GREETING_TEXT),
            (GiverPhase::Offered, Some(quest)) => QuestDescriptor {
                text: quest.intro.clone(),
                counters: quest
                    .goals
                    .iter()
                    .map(|goal| GoalCounter {
                        label: goal.label.clone(),
                        current: goal.current,
                        required: goal.required,
                    })
                    .collect(),
                can_finish: quest.is_satisfied(),
            },
        };
        Some(descriptor)
    }
}

impl GameSession for SimulatedSession {
    fn current_position(&self) -> Result<Tile, SessionError> {
        Ok(self.position)
    }

    fn current_location_id(&self) -> Result<LocationId, SessionError> {
        Ok(self.location.clone())
    }

    fn map_blocked_cells(&self) -> Result<MapSnapshot, SessionError> {
        self.current_map().map(SimMap::snapshot)
    }

    fn teleport(&mut self, location: &LocationId) -> Result<(), SessionError> {
        self.calls.push(SessionCall::Teleport(location.clone()));
        self.take_fault()?;
        if self.blocked_teleports.contains(location) {
            debug!(%location, "Simulated teleport swallowed");
            return Ok(());
        }
        let spawn = self
            .maps
            .get(location)
            .map(|map| map.spawn)
            .ok_or_else(|| SessionError::Rejected {
                operation: "teleport",
                reason: format!("unknown location {location}"),
            })?;
        self.location = location.clone();
        self.position = spawn;
        self.open_dialogue = None;
        Ok(())
    }

    fn step(&mut self, direction: Direction) -> Result<(), SessionError> {
        self.calls.push(SessionCall::Step(direction));
        self.take_fault()?;
        let Some(next) = self.position.step(direction) else {
            return Ok(());
        };
        if self.current_map()?.is_walkable(next) {
            self.position = next;
        }
        Ok(())
    }

    fn interact(&mut self) -> Result<(), SessionError> {
        self.calls.push(SessionCall::Interact);
        self.take_fault()?;
        let Some(index) = self.giver_in_reach() else {
            return Ok(());
        };
        let is_open = self.open_dialogue == Some(index);
        let Some(giver) = self.givers.get_mut(index) else {
            return Ok(());
        };
        match giver.phase {
            GiverPhase::Waiting => {
                giver.phase = GiverPhase::Offered;
                self.open_dialogue = Some(index);
            }
            GiverPhase::Offered if is_open => {
                giver.phase = GiverPhase::Finished;
                if giver.quest.as_ref().is_some_and(ScriptedQuest::is_satisfied) {
                    self.handed_in.push(index);
                }
                self.open_dialogue = None;
            }
            GiverPhase::Offered => self.open_dialogue = Some(index),
            GiverPhase::Finished => {
                self.open_dialogue = if is_open { None } else { Some(index) };
            }
        }
        Ok(())
    }

    fn visible_quest_dialogue(&mut self) -> Result<Option<QuestDescriptor>, SessionError> {
        self.advance_progress();
        Ok(self.open_dialogue.and_then(|index| self.render(index)))
    }

    fn start_activity(&mut self, request: ActivityRequest) -> Result<(), SessionError> {
        self.calls.push(SessionCall::StartActivity(request));
        self.take_fault()?;
        if self.stall == StallMode::UntilRestart {
            self.stall = StallMode::Flowing;
        }
        self.running.insert(request.kind, request);
        Ok(())
    }

    fn stop_activity(&mut self, kind: ActivityKind) -> Result<(), SessionError> {
        self.calls.push(SessionCall::StopActivity(kind));
        self.take_fault()?;
        self.running.remove(&kind);
        Ok(())
    }

    fn is_activity_running(&self, kind: ActivityKind) -> Result<bool, SessionError> {
        Ok(self.running.contains_key(&kind))
    }
}

/// Quest template for the `index`-th demo giver.
fn demo_quest(index: usize) -> Option<ScriptedQuest> {
    match index.checked_rem(6).unwrap_or_default() {
        0 => Some(ScriptedQuest::new(
            "Zadanie dzienne: zapasy dla kuźni.",
            vec![SimGoal::resource("Kryształ Mocy", 0, 3)],
        )),
        1 => Some(ScriptedQuest::new(
            "Zadanie dzienne: oczyść okolicę.",
            vec![
                SimGoal::mob("Lodowy Wilk", MobTier::Normal, 0, 2),
                SimGoal::mob("Yeti", MobTier::Elite, 0, 1),
            ],
        )),
        2 => None,
        3 => Some(ScriptedQuest::new(
            "Zadanie dzienne: arena.",
            vec![SimGoal::pvp(1, 3)],
        )),
        4 => Some(ScriptedQuest::donation("Złota Moneta")),
        _ => Some(ScriptedQuest::new(
            "Zadanie dzienne: listy gończe.",
            vec![SimGoal::wanted_lists(0, 2)],
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session_with_giver(quest: Option<ScriptedQuest>) -> SimulatedSession {
        let mut session = SimulatedSession::new(
            LocationId::new("650"),
            SimMap::open(10, 10, Tile::new(2, 2)),
        );
        session.add_giver(&LocationId::new("650"), Tile::new(3, 2), quest);
        session
    }

    fn first_counter(session: &mut SimulatedSession) -> u32 {
        let dialogue = session.visible_quest_dialogue().unwrap().unwrap();
        dialogue.counters.first().unwrap().current
    }

    #[test]
    fn blocked_steps_are_ignored() {
        let map = SimMap::from_rows(&["...", ".#.", "..."], Tile::new(0, 1)).unwrap();
        let mut session = SimulatedSession::new(LocationId::new("1"), map);
        session.step(Direction::Right).unwrap();
        assert_eq!(session.current_position().unwrap(), Tile::new(0, 1));
        session.step(Direction::Left).unwrap();
        assert_eq!(session.current_position().unwrap(), Tile::new(0, 1));
        session.step(Direction::UpRight).unwrap();
        assert_eq!(session.current_position().unwrap(), Tile::new(1, 0));
    }

    #[test]
    fn interaction_needs_reach() {
        let mut session = session_with_giver(None);
        session.step(Direction::Left).unwrap();
        session.interact().unwrap();
        assert_eq!(session.visible_quest_dialogue().unwrap(), None);

        session.step(Direction::Right).unwrap();
        session.interact().unwrap();
        let dialogue = session.visible_quest_dialogue().unwrap().unwrap();
        assert_eq!(dialogue.text, GREETING_TEXT);
    }

    #[test]
    fn matching_activity_advances_goal() {
        let quest = ScriptedQuest::new("", vec![SimGoal::resource("Drewno", 0, 2)]);
        let mut session = session_with_giver(Some(quest));
        session.interact().unwrap();
        assert_eq!(first_counter(&mut session), 0);
        session
            .start_activity(ActivityRequest::plain(ActivityKind::Gathering))
            .unwrap();
        let first = session.visible_quest_dialogue().unwrap().unwrap();
        assert_eq!(first.counters.first().unwrap().current, 1);
        assert!(!first.can_finish);
        let second = session.visible_quest_dialogue().unwrap().unwrap();
        assert!(second.can_finish);
    }

    #[test]
    fn wrong_tier_does_not_advance() {
        let quest = ScriptedQuest::new("", vec![SimGoal::mob("Yeti", MobTier::Boss, 0, 1)]);
        let mut session = session_with_giver(Some(quest));
        session.interact().unwrap();
        session
            .start_activity(ActivityRequest {
                kind: ActivityKind::MonsterCombat,
                mob_tier: Some(MobTier::Normal),
            })
            .unwrap();
        assert_eq!(first_counter(&mut session), 0);
    }

    #[test]
    fn stall_until_restart_clears_on_start() {
        let quest = ScriptedQuest::new("", vec![SimGoal::pvp(0, 5)]);
        let mut session = session_with_giver(Some(quest));
        session.interact().unwrap();
        let request = ActivityRequest::plain(ActivityKind::PlayerCombat);
        session.start_activity(request).unwrap();
        session.stall_progress(StallMode::UntilRestart);
        assert_eq!(first_counter(&mut session), 0);
        session.start_activity(request).unwrap();
        assert_eq!(first_counter(&mut session), 1);
    }

    #[test]
    fn second_interaction_hands_in() {
        let quest = ScriptedQuest::new("", vec![SimGoal::resource("Drewno", 1, 1)]);
        let mut session = session_with_giver(Some(quest));
        session.interact().unwrap();
        session.interact().unwrap();
        assert_eq!(session.visible_quest_dialogue().unwrap(), None);
        assert_eq!(session.handed_in(), &[0]);
        assert_eq!(session.givers().first().unwrap().phase, GiverPhase::Finished);
    }

    #[test]
    fn blocked_teleport_is_swallowed() {
        let mut session = SimulatedSession::from_locations(&[LocationSpec {
            id: LocationId::new("414"),
            name: String::from("Wieczny Mrok"),
            coordinates: Tile::new(14, 22),
        }]);
        session.block_teleport(LocationId::new("414"));
        session.teleport(&LocationId::new("414")).unwrap();
        assert_eq!(session.current_location_id().unwrap(), LocationId::new("hub"));
        assert_eq!(session.teleport_count(), 1);
    }

    #[test]
    fn unknown_teleport_rejected() {
        let mut session = session_with_giver(None);
        let err = session.teleport(&LocationId::new("999")).unwrap_err();
        assert!(matches!(err, SessionError::Rejected { operation: "teleport", .. }));
    }

    #[test]
    fn injected_fault_fails_once() {
        let mut session = session_with_giver(None);
        session.fail_next("link lost");
        assert!(session.interact().is_err());
        assert!(session.interact().is_ok());
    }

    #[test]
    fn demo_world_keeps_giver_tiles_free() {
        let specs = [
            LocationSpec {
                id: LocationId::new("661"),
                name: String::from("Planeta Beerusa"),
                coordinates: Tile::new(32, 10),
            },
            LocationSpec {
                id: LocationId::new("661"),
                name: String::from("Planeta Beerusa"),
                coordinates: Tile::new(26, 12),
            },
        ];
        let mut session = SimulatedSession::from_locations(&specs);
        session.teleport(&LocationId::new("661")).unwrap();
        let snapshot = session.map_blocked_cells().unwrap();
        assert!(!snapshot.blocked.contains(&Tile::new(32, 10)));
        assert!(!snapshot.blocked.contains(&Tile::new(26, 12)));
        assert!(snapshot.width > 32);
    }
}
