//! The boundary to the live game client.
//!
//! The engine never talks to the client directly. Everything it needs goes
//! through [`GameSession`], and only the
//! [`ActionDispatcher`](crate::dispatcher::ActionDispatcher) calls it. A
//! transport adapter implements the trait against the real client;
//! [`SimulatedSession`](crate::sim::SimulatedSession) implements it in
//! memory.

use questbot_types::{
    ActivityKind, ActivityRequest, Direction, LocationId, MapSnapshot, QuestDescriptor, Tile,
};

/// Errors a session call can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The client is not connected or not logged in.
    #[error("game session is not connected")]
    NotConnected,

    /// The client refused the request.
    #[error("{operation} rejected: {reason}")]
    Rejected {
        /// Name of the refused operation.
        operation: &'static str,
        /// Why it was refused.
        reason: String,
    },

    /// The transport failed while carrying the request.
    #[error("session transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },
}

/// Narrow interface to the game client.
///
/// Calls are synchronous and short. Commands such as
/// [`interact`](GameSession::interact) are fire-and-forget: their effect
/// becomes visible through later reads.
pub trait GameSession {
    /// Tile the avatar is standing on.
    fn current_position(&self) -> Result<Tile, SessionError>;

    /// Id of the map the avatar is on.
    fn current_location_id(&self) -> Result<LocationId, SessionError>;

    /// Walkability snapshot of the current map.
    fn map_blocked_cells(&self) -> Result<MapSnapshot, SessionError>;

    /// Ask the client to teleport to `location`.
    fn teleport(&mut self, location: &LocationId) -> Result<(), SessionError>;

    /// Walk one tile in `direction`.
    fn step(&mut self, direction: Direction) -> Result<(), SessionError>;

    /// Interact with whatever stands next to the avatar.
    fn interact(&mut self) -> Result<(), SessionError>;

    /// The open quest dialogue, or `None` when no dialogue is shown.
    ///
    /// Takes `&mut self` because reading may refresh the client's view.
    fn visible_quest_dialogue(&mut self) -> Result<Option<QuestDescriptor>, SessionError>;

    /// Start an activity loop.
    fn start_activity(&mut self, request: ActivityRequest) -> Result<(), SessionError>;

    /// Stop an activity loop. Stopping a loop that is not running is a
    /// no-op.
    fn stop_activity(&mut self, kind: ActivityKind) -> Result<(), SessionError>;

    /// Whether an activity loop is running.
    fn is_activity_running(&self, kind: ActivityKind) -> Result<bool, SessionError>;
}
