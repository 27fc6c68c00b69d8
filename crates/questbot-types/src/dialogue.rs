//! Values the game session hands to the engine: quest dialogues and map
//! snapshots.
//!
//! The session adapter turns whatever the live client shows into these
//! plain structures, so the classifier and the flow never see presentation
//! details.

use serde::{Deserialize, Serialize};

use crate::structs::Tile;

/// A goal counter sub-field shown in a quest dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalCounter {
    /// Text preceding the counter, e.g. `Zbierz zasób Kryształ Mocy`.
    pub label: String,
    /// Progress so far.
    pub current: u32,
    /// Amount needed.
    pub required: u32,
}

/// Structured contents of an open quest dialogue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestDescriptor {
    /// Quest description text.
    pub text: String,
    /// Goal counters, when the client exposes them separately.
    #[serde(default)]
    pub counters: Vec<GoalCounter>,
    /// Whether a "finish quest" option is offered.
    #[serde(default)]
    pub can_finish: bool,
}

impl QuestDescriptor {
    /// A descriptor consisting only of text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            counters: Vec::new(),
            can_finish: false,
        }
    }
}

/// Walkability snapshot of the avatar's current map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSnapshot {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
    /// Tiles that cannot be walked on.
    pub blocked: Vec<Tile>,
}
