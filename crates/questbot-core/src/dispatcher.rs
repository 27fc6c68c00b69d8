//! Translation of abstract intents into game-session calls.
//!
//! The flow speaks in [`Effect`]s (things to do) and [`Probe`]s (things to
//! look at). [`ActionDispatcher`] is the only component that touches the
//! [`GameSession`]; it turns each intent into concrete calls and packs the
//! answers into [`Observation`]s.

use tracing::{debug, trace};

use questbot_types::{
    ActivityKind, ActivityRequest, Direction, LocationId, QuestDescriptor, Tile,
};
use questbot_world::{Matrix, WorldError};

use crate::session::{GameSession, SessionError};

/// Errors raised while executing an intent.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The session refused or failed a call.
    #[error("session call failed: {source}")]
    Session {
        /// The underlying session error.
        #[from]
        source: SessionError,
    },

    /// The session returned a map the engine cannot use.
    #[error("unusable map snapshot: {source}")]
    Map {
        /// The underlying grid error.
        #[from]
        source: WorldError,
    },
}

/// A command for the game session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Teleport to a location.
    Teleport(LocationId),
    /// Walk one tile.
    Step(Direction),
    /// Interact with the quest giver.
    Interact,
    /// Start an activity loop.
    StartActivity {
        /// Loop and filter to start.
        request: ActivityRequest,
        /// Send the start even if the loop already runs.
        retrigger: bool,
    },
    /// Stop every running activity loop.
    StopActivities,
}

/// A question for the game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Which map is the avatar on?
    LocationId,
    /// Where is the avatar, and what does the map look like?
    Navigation,
    /// Where is the avatar?
    Position,
    /// What does the quest dialogue show?
    Dialogue,
}

/// The session's answer to a [`Probe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Answer to [`Probe::LocationId`].
    LocationId(LocationId),
    /// Answer to [`Probe::Navigation`].
    Navigation {
        /// Avatar tile.
        position: Tile,
        /// Freshly built walkability grid.
        matrix: Matrix,
    },
    /// Answer to [`Probe::Position`].
    Position(Tile),
    /// Answer to [`Probe::Dialogue`].
    Dialogue(Option<QuestDescriptor>),
}

/// Sole owner of the [`GameSession`].
#[derive(Debug)]
pub struct ActionDispatcher<S> {
    session: S,
}

impl<S: GameSession> ActionDispatcher<S> {
    /// Wrap a session.
    pub const fn new(session: S) -> Self {
        Self { session }
    }

    /// Borrow the session.
    pub const fn session(&self) -> &S {
        &self.session
    }

    /// Borrow the session mutably.
    pub const fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Unwrap the session.
    pub fn into_session(self) -> S {
        self.session
    }

    /// Carry out one effect.
    ///
    /// Starting an activity that already runs is skipped unless the effect
    /// asks for a re-trigger.
    pub fn execute(&mut self, effect: &Effect) -> Result<(), DispatchError> {
        trace!(?effect, "Dispatching");
        match effect {
            Effect::Teleport(location) => self.session.teleport(location)?,
            Effect::Step(direction) => self.session.step(*direction)?,
            Effect::Interact => self.session.interact()?,
            Effect::StartActivity { request, retrigger } => {
                self.start_activity(*request, *retrigger)?;
            }
            Effect::StopActivities => {
                self.stop_all()?;
            }
        }
        Ok(())
    }

    /// Answer one probe.
    pub fn observe(&mut self, probe: Probe) -> Result<Observation, DispatchError> {
        let observation = match probe {
            Probe::LocationId => Observation::LocationId(self.session.current_location_id()?),
            Probe::Navigation => {
                let snapshot = self.session.map_blocked_cells()?;
                let matrix = Matrix::from_snapshot(&snapshot)?;
                let position = self.session.current_position()?;
                Observation::Navigation { position, matrix }
            }
            Probe::Position => Observation::Position(self.session.current_position()?),
            Probe::Dialogue => Observation::Dialogue(self.session.visible_quest_dialogue()?),
        };
        Ok(observation)
    }

    /// Stop every running activity loop. Returns how many were stopped.
    pub fn stop_all(&mut self) -> Result<usize, DispatchError> {
        let mut stopped: usize = 0;
        for kind in ActivityKind::ALL {
            if self.session.is_activity_running(kind)? {
                self.session.stop_activity(kind)?;
                stopped = stopped.saturating_add(1);
                debug!(?kind, "Activity stopped");
            }
        }
        Ok(stopped)
    }

    fn start_activity(
        &mut self,
        request: ActivityRequest,
        retrigger: bool,
    ) -> Result<(), DispatchError> {
        if !retrigger && self.session.is_activity_running(request.kind)? {
            debug!(kind = ?request.kind, "Activity already running");
            return Ok(());
        }
        self.session.start_activity(request)?;
        debug!(kind = ?request.kind, tier = ?request.mob_tier, retrigger, "Activity started");
        Ok(())
    }
}
