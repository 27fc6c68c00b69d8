//! Core entity structs: tiles, locations, goals and activity requests.

use serde::{Deserialize, Serialize};

use crate::enums::{ActivityKind, Direction, GoalType, MobTier};
use crate::ids::LocationId;

// ---------------------------------------------------------------------------
// Tiles
// ---------------------------------------------------------------------------

/// A tile coordinate on the current map. `(0, 0)` is the top-left corner.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Tile {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
}

impl Tile {
    /// Create a tile coordinate.
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// The neighboring tile one step in `direction`, or `None` when the
    /// step would leave the non-negative quadrant.
    pub fn step(self, direction: Direction) -> Option<Self> {
        let (dx, dy) = direction.offset();
        Some(Self {
            x: self.x.checked_add_signed(dx)?,
            y: self.y.checked_add_signed(dy)?,
        })
    }

    /// Signed `(dx, dy)` from `self` to `other`.
    pub fn delta_to(self, other: Self) -> (i64, i64) {
        (
            i64::from(other.x).saturating_sub(i64::from(self.x)),
            i64::from(other.y).saturating_sub(i64::from(self.y)),
        )
    }

    /// Direction of the first greedy step from `self` towards `other`.
    pub fn direction_to(self, other: Self) -> Option<Direction> {
        let (dx, dy) = self.delta_to(other);
        Direction::from_delta(dx, dy)
    }

    /// Whether `other` is one of the eight neighbors of `self`.
    pub fn is_adjacent(self, other: Self) -> bool {
        let (dx, dy) = self.delta_to(other);
        self != other && dx.abs() <= 1 && dy.abs() <= 1
    }
}

impl core::fmt::Display for Tile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// A configured quest-giver site, as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSpec {
    /// Teleport destination id.
    pub id: LocationId,
    /// Display name.
    pub name: String,
    /// Tile the quest giver stands on.
    pub coordinates: Tile,
}

/// A quest-giver site with its runtime flags.
///
/// Deep-copied from a [`LocationSpec`] when the registry is initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Teleport destination id.
    pub id: LocationId,
    /// Display name.
    pub name: String,
    /// Tile the quest giver stands on.
    pub coordinates: Tile,
    /// Excluded by the operator.
    pub disabled: bool,
    /// Done for this run (including completion by skip).
    pub completed: bool,
    /// Completed only because the retry budget ran out.
    pub skipped: bool,
}

impl From<&LocationSpec> for Location {
    fn from(spec: &LocationSpec) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.name.clone(),
            coordinates: spec.coordinates,
            disabled: false,
            completed: false,
            skipped: false,
        }
    }
}

impl Location {
    /// Whether the location still needs to be visited.
    pub const fn is_eligible(&self) -> bool {
        !self.disabled && !self.completed
    }
}

// ---------------------------------------------------------------------------
// Goals
// ---------------------------------------------------------------------------

/// Descriptor details attached to a goal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalMetadata {
    /// Named resource or monster descriptor, when the goal has one.
    pub label: Option<String>,
    /// Monster tier filter for mob goals.
    pub mob_tier: Option<MobTier>,
}

/// A measurable sub-objective of a quest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestGoal {
    /// What the goal asks for.
    pub goal_type: GoalType,
    /// Progress reported by the quest dialogue.
    pub current: u32,
    /// Amount needed to satisfy the goal.
    pub required: u32,
    /// Descriptor details.
    pub metadata: GoalMetadata,
}

impl QuestGoal {
    /// Create a goal without metadata.
    pub fn new(goal_type: GoalType, current: u32, required: u32) -> Self {
        Self {
            goal_type,
            current,
            required,
            metadata: GoalMetadata::default(),
        }
    }

    /// Whether `current` has reached `required`.
    pub const fn is_satisfied(&self) -> bool {
        self.current >= self.required
    }

    /// Whether `other` describes the same objective (ignores `current`).
    pub fn same_objective(&self, other: &Self) -> bool {
        self.goal_type == other.goal_type
            && self.required == other.required
            && self.metadata == other.metadata
    }

    /// The activity request that works towards this goal, if any.
    pub fn activity_request(&self) -> Option<ActivityRequest> {
        let kind = self.goal_type.activity()?;
        let mob_tier = match self.goal_type {
            GoalType::Mob => Some(self.metadata.mob_tier.unwrap_or_default()),
            _ => None,
        };
        Some(ActivityRequest { kind, mob_tier })
    }
}

// ---------------------------------------------------------------------------
// Activities
// ---------------------------------------------------------------------------

/// A request to start one of the external activity loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityRequest {
    /// Which loop to start.
    pub kind: ActivityKind,
    /// Tier filter for monster combat; `None` fights anything.
    pub mob_tier: Option<MobTier>,
}

impl ActivityRequest {
    /// A request without a tier filter.
    pub const fn plain(kind: ActivityKind) -> Self {
        Self {
            kind,
            mob_tier: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_step_stays_in_quadrant() {
        let origin = Tile::new(0, 0);
        assert_eq!(origin.step(Direction::Up), None);
        assert_eq!(origin.step(Direction::DownRight), Some(Tile::new(1, 1)));
    }

    #[test]
    fn adjacency_excludes_self() {
        let t = Tile::new(3, 3);
        assert!(t.is_adjacent(Tile::new(4, 2)));
        assert!(!t.is_adjacent(t));
        assert!(!t.is_adjacent(Tile::new(5, 3)));
    }

    #[test]
    fn mob_goal_request_defaults_to_normal_tier() {
        let goal = QuestGoal::new(GoalType::Mob, 0, 5);
        let request = goal.activity_request();
        assert_eq!(
            request,
            Some(ActivityRequest {
                kind: ActivityKind::MonsterCombat,
                mob_tier: Some(MobTier::Normal),
            })
        );
    }

    #[test]
    fn lpvm_goal_fights_without_filter() {
        let goal = QuestGoal::new(GoalType::Lpvm, 0, 2);
        assert_eq!(
            goal.activity_request(),
            Some(ActivityRequest::plain(ActivityKind::MonsterCombat))
        );
    }

    #[test]
    fn same_objective_ignores_progress() {
        let a = QuestGoal::new(GoalType::Pvp, 1, 4);
        let b = QuestGoal::new(GoalType::Pvp, 3, 4);
        assert!(a.same_objective(&b));
        assert!(!a.same_objective(&QuestGoal::new(GoalType::Pvp, 1, 5)));
    }

    #[test]
    fn location_copied_from_spec_starts_clean() {
        let spec = LocationSpec {
            id: LocationId::new("650"),
            name: String::from("Zachodnia Stolica"),
            coordinates: Tile::new(14, 16),
        };
        let location = Location::from(&spec);
        assert!(location.is_eligible());
        assert!(!location.skipped);
    }
}
