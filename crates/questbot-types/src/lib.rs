//! Shared type definitions for the Questbot quest automation engine.
//!
//! This crate is the single source of truth for the data model used across
//! the workspace: locations, goals, tiles, directions and flow states.
//!
//! # Modules
//!
//! - [`ids`] -- Run identifiers and the game's location ids
//! - [`enums`] -- Goal types, mob tiers, activity loops, directions, flow states
//! - [`structs`] -- Tiles, locations, quest goals and activity requests
//! - [`dialogue`] -- Quest dialogue and map snapshots produced by the session

pub mod dialogue;
pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use dialogue::{GoalCounter, MapSnapshot, QuestDescriptor};
pub use enums::{
    ActivityKind, Direction, FailureReason, FlowState, GoalType, InteractionPhase, MobTier,
    MoveTarget,
};
pub use ids::{LocationId, RunId};
pub use structs::{ActivityRequest, GoalMetadata, Location, LocationSpec, QuestGoal, Tile};
