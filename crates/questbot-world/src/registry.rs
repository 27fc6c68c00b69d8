//! The ordered list of quest-giver locations and their runtime flags.
//!
//! The registry is initialized once from configuration and never loses an
//! entry during a run. Flags change only through the methods below; the
//! flow reads the cursor to know where to resume.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use questbot_types::{Location, LocationSpec};

use crate::error::WorldError;

// ---------------------------------------------------------------------------
// LocationRegistry
// ---------------------------------------------------------------------------

/// Ordered collection of [`Location`]s plus the resume cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRegistry {
    /// Locations in configuration order.
    locations: Vec<Location>,
    /// Index the flow resumes from when it next looks for work.
    cursor: usize,
}

impl LocationRegistry {
    /// Build a registry by deep-copying configured entries with clean flags.
    pub fn initialize(specs: &[LocationSpec]) -> Self {
        let locations: Vec<Location> = specs.iter().map(Location::from).collect();
        info!(count = locations.len(), "Location registry initialized");
        Self {
            locations,
            cursor: 0,
        }
    }

    /// Number of locations.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether the registry holds no locations.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// The location at `index`.
    pub fn get(&self, index: usize) -> Option<&Location> {
        self.locations.get(index)
    }

    /// Iterate over all locations in order.
    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.iter()
    }

    /// First index `>= from` that is neither disabled nor completed.
    pub fn next_eligible(&self, from: usize) -> Option<usize> {
        self.locations
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, location)| location.is_eligible())
            .map(|(index, _)| index)
    }

    /// Mark the location at `index` completed. Marking twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::IndexOutOfRange`] for an unknown index.
    pub fn mark_completed(&mut self, index: usize) -> Result<(), WorldError> {
        let location = self.location_mut(index)?;
        if !location.completed {
            location.completed = true;
            debug!(index, name = %location.name, "Location completed");
        }
        Ok(())
    }

    /// Mark the location at `index` completed because it was given up on.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::IndexOutOfRange`] for an unknown index.
    pub fn mark_skipped(&mut self, index: usize) -> Result<(), WorldError> {
        let location = self.location_mut(index)?;
        location.completed = true;
        location.skipped = true;
        debug!(index, name = %location.name, "Location skipped");
        Ok(())
    }

    /// Flip the operator's `disabled` flag. Returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::IndexOutOfRange`] for an unknown index.
    pub fn toggle_disabled(&mut self, index: usize) -> Result<bool, WorldError> {
        let location = self.location_mut(index)?;
        location.disabled = !location.disabled;
        info!(
            index,
            name = %location.name,
            disabled = location.disabled,
            "Location toggled"
        );
        Ok(location.disabled)
    }

    /// Clear every `completed` and `skipped` flag and rewind the cursor.
    ///
    /// `disabled` flags are left untouched.
    pub fn reset_all(&mut self) {
        for location in &mut self.locations {
            location.completed = false;
            location.skipped = false;
        }
        self.cursor = 0;
        info!(count = self.locations.len(), "Location progress reset");
    }

    /// True iff every location is completed or disabled.
    pub fn all_satisfied(&self) -> bool {
        self.locations.iter().all(|location| !location.is_eligible())
    }

    /// Number of completed locations, skips included.
    pub fn completed_count(&self) -> usize {
        self.locations.iter().filter(|l| l.completed).count()
    }

    /// Index the flow resumes from.
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the resume cursor. Values past the end are allowed and simply
    /// find nothing until the flow wraps.
    pub const fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor;
    }

    fn location_mut(&mut self, index: usize) -> Result<&mut Location, WorldError> {
        let len = self.locations.len();
        self.locations
            .get_mut(index)
            .ok_or(WorldError::IndexOutOfRange { index, len })
    }
}
