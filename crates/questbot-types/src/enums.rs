//! Enumeration types for the quest automation engine.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Goals
// ---------------------------------------------------------------------------

/// The kind of measurable objective a quest goal asks for.
///
/// Variant order is the classifier's declaration order: when a description
/// matches several categories, the earlier variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    /// Collect a named resource from the map.
    Resource,
    /// Defeat monsters, optionally of a specific tier.
    Mob,
    /// Win player-versus-player fights.
    Pvp,
    /// Complete monster wanted lists.
    Lpvm,
    /// Go on expeditions.
    Expedition,
    /// Complete any instances.
    Instance,
    /// Hand over an item or currency to the quest giver.
    Donation,
}

impl GoalType {
    /// All goal types in classifier declaration order.
    pub const ALL: [Self; 7] = [
        Self::Resource,
        Self::Mob,
        Self::Pvp,
        Self::Lpvm,
        Self::Expedition,
        Self::Instance,
        Self::Donation,
    ];

    /// The activity loop that drives this goal type, if any.
    ///
    /// Expedition, instance and donation goals have no farming loop; the
    /// engine resolves them through the quest giver's default interaction.
    pub const fn activity(self) -> Option<ActivityKind> {
        match self {
            Self::Resource => Some(ActivityKind::Gathering),
            Self::Mob | Self::Lpvm => Some(ActivityKind::MonsterCombat),
            Self::Pvp => Some(ActivityKind::PlayerCombat),
            Self::Expedition | Self::Instance | Self::Donation => None,
        }
    }

    /// Lowercase name used in logs and config keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Mob => "mob",
            Self::Pvp => "pvp",
            Self::Lpvm => "lpvm",
            Self::Expedition => "expedition",
            Self::Instance => "instance",
            Self::Donation => "donation",
        }
    }
}

impl core::fmt::Display for GoalType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Difficulty tier of a monster, taken from a parenthetical qualifier in
/// the goal descriptor.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MobTier {
    /// Ordinary monsters.
    #[default]
    Normal,
    /// Elite monsters.
    Elite,
    /// Champion monsters.
    Champion,
    /// Boss monsters.
    Boss,
}

impl MobTier {
    /// The game's numeric code for the tier filter.
    pub const fn code(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Elite => 1,
            Self::Champion => 2,
            Self::Boss => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Activities
// ---------------------------------------------------------------------------

/// One of the external farming loops the engine starts and stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Resource gathering loop.
    Gathering,
    /// Monster combat loop.
    MonsterCombat,
    /// Player combat loop.
    PlayerCombat,
}

impl ActivityKind {
    /// All activity loops.
    pub const ALL: [Self; 3] = [Self::Gathering, Self::MonsterCombat, Self::PlayerCombat];
}

// ---------------------------------------------------------------------------
// Movement
// ---------------------------------------------------------------------------

/// One of the eight walking directions. `y` grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards smaller `y`.
    Up,
    /// Larger `x`, smaller `y`.
    UpRight,
    /// Towards larger `x`.
    Right,
    /// Larger `x`, larger `y`.
    DownRight,
    /// Towards larger `y`.
    Down,
    /// Smaller `x`, larger `y`.
    DownLeft,
    /// Towards smaller `x`.
    Left,
    /// Smaller `x`, smaller `y`.
    UpLeft,
}

/// Lookup table indexed by `[sign(dy) + 1][sign(dx) + 1]`.
const DIRECTION_TABLE: [[Option<Direction>; 3]; 3] = [
    [Some(Direction::UpLeft), Some(Direction::Up), Some(Direction::UpRight)],
    [Some(Direction::Left), None, Some(Direction::Right)],
    [Some(Direction::DownLeft), Some(Direction::Down), Some(Direction::DownRight)],
];

impl Direction {
    /// Map the sign of a `(dx, dy)` delta to a direction.
    ///
    /// Returns `None` for a zero delta.
    pub fn from_delta(dx: i64, dy: i64) -> Option<Self> {
        let row = usize::try_from(dy.signum().saturating_add(1)).ok()?;
        let col = usize::try_from(dx.signum().saturating_add(1)).ok()?;
        DIRECTION_TABLE.get(row)?.get(col).copied().flatten()
    }

    /// Unit offset `(dx, dy)` of one step in this direction.
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::UpRight => (1, -1),
            Self::Right => (1, 0),
            Self::DownRight => (1, 1),
            Self::Down => (0, 1),
            Self::DownLeft => (-1, 1),
            Self::Left => (-1, 0),
            Self::UpLeft => (-1, -1),
        }
    }

    /// The game's wire code, clockwise from `Up = 0`.
    pub const fn code(self) -> u8 {
        match self {
            Self::Up => 0,
            Self::UpRight => 1,
            Self::Right => 2,
            Self::DownRight => 3,
            Self::Down => 4,
            Self::DownLeft => 5,
            Self::Left => 6,
            Self::UpLeft => 7,
        }
    }
}

// ---------------------------------------------------------------------------
// Flow states
// ---------------------------------------------------------------------------

/// Where a `Moving` state is heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveTarget {
    /// Walking to the quest giver to open the quest.
    ToStart,
    /// Walking back to the quest giver to hand the quest in.
    ToComplete,
}

/// Which conversation an `Interacting` state is having.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionPhase {
    /// Opening the quest dialogue.
    Start,
    /// Finishing the quest and collecting the reward.
    Complete,
}

/// Position of the quest flow for the current location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "phase", rename_all = "snake_case")]
pub enum FlowState {
    /// Waiting to pick the next eligible location.
    #[default]
    Idle,
    /// Teleporting to the location's map.
    Teleporting,
    /// Walking to the quest giver.
    Moving(MoveTarget),
    /// Talking to the quest giver.
    Interacting(InteractionPhase),
    /// Classifying the open dialogue.
    DetectingQuest,
    /// Running an activity loop until the goals are met.
    ExecutingQuest,
    /// The location's quest is done.
    Completed,
    /// The current attempt failed.
    Failed,
}

impl FlowState {
    /// Short human-readable label for status displays.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Teleporting => "Teleporting",
            Self::Moving(MoveTarget::ToStart) => "Moving to quest giver",
            Self::Moving(MoveTarget::ToComplete) => "Returning to quest giver",
            Self::Interacting(InteractionPhase::Start) => "Starting quest",
            Self::Interacting(InteractionPhase::Complete) => "Finishing quest",
            Self::DetectingQuest => "Detecting quest",
            Self::ExecutingQuest => "Executing quest",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl core::fmt::Display for FlowState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// Why an attempt at a location ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The avatar's location id never matched the target.
    TeleportTimeout,
    /// Interacting never changed the visible dialogue.
    InteractionTimeout,
    /// Goal counters stayed unchanged after the activity was re-triggered.
    GoalStagnation,
    /// Walking used up its step budget without arriving.
    MovementExhausted,
    /// A session call returned an error.
    SessionFault(String),
    /// The driver answered with an observation the state did not ask for.
    UnexpectedObservation,
}

impl core::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TeleportTimeout => f.write_str("teleport timeout"),
            Self::InteractionTimeout => f.write_str("interaction timeout"),
            Self::GoalStagnation => f.write_str("goal stagnation"),
            Self::MovementExhausted => f.write_str("movement exhausted"),
            Self::SessionFault(detail) => write!(f, "session fault: {detail}"),
            Self::UnexpectedObservation => f.write_str("unexpected observation"),
        }
    }
}
