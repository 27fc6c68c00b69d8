//! Goal progress tracking while an activity runs.
//!
//! Each progress poll re-parses the dialogue into a fresh goal list.
//! [`reconcile`] swaps it in as a whole, and [`ProgressMonitor`] decides
//! whether the poll advanced, stood still, or stood still long enough to
//! re-trigger the activity or give up.

use tracing::warn;

use questbot_types::QuestGoal;

/// What a single progress poll means for the running quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Goal state changed since the previous poll.
    Advanced,
    /// Goal state is unchanged, but not for long enough to act.
    Unchanged {
        /// Consecutive unchanged polls so far.
        stagnant_polls: u32,
    },
    /// Unchanged for `limit` polls: restart the activity once.
    Retrigger,
    /// Still unchanged after the re-trigger.
    Stalled,
}

/// Counts consecutive unchanged polls for one quest execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressMonitor {
    limit: u32,
    stagnant_polls: u32,
    retriggered: bool,
}

impl ProgressMonitor {
    /// Create a monitor that re-triggers after `limit` unchanged polls.
    /// A limit of zero is treated as one.
    pub const fn new(limit: u32) -> Self {
        Self {
            limit: if limit == 0 { 1 } else { limit },
            stagnant_polls: 0,
            retriggered: false,
        }
    }

    /// Forget all history, e.g. when a new quest starts.
    pub const fn reset(&mut self) {
        self.stagnant_polls = 0;
        self.retriggered = false;
    }

    /// Consecutive unchanged polls so far.
    pub const fn stagnant_polls(&self) -> u32 {
        self.stagnant_polls
    }

    /// Whether the one allowed re-trigger has been spent.
    pub const fn retriggered(&self) -> bool {
        self.retriggered
    }

    /// Judge a poll by comparing the goals before and after it.
    pub fn observe(&mut self, previous: &[QuestGoal], current: &[QuestGoal]) -> Verdict {
        if previous == current {
            self.record_unchanged()
        } else {
            self.stagnant_polls = 0;
            self.retriggered = false;
            Verdict::Advanced
        }
    }

    /// Count a poll that produced no new information.
    pub const fn record_unchanged(&mut self) -> Verdict {
        self.stagnant_polls = self.stagnant_polls.saturating_add(1);
        if self.retriggered {
            return Verdict::Stalled;
        }
        if self.stagnant_polls >= self.limit {
            self.retriggered = true;
            self.stagnant_polls = 0;
            return Verdict::Retrigger;
        }
        Verdict::Unchanged {
            stagnant_polls: self.stagnant_polls,
        }
    }
}

/// Whether two goal lists describe the same objectives in the same order.
pub fn same_shape(previous: &[QuestGoal], fresh: &[QuestGoal]) -> bool {
    previous.len() == fresh.len()
        && previous
            .iter()
            .zip(fresh)
            .all(|(old, new)| old.same_objective(new))
}

/// Replace `previous` with `fresh`.
///
/// When both lists have the same shape, each `current` is kept at no less
/// than its previous value and every decrease is logged. A list of a
/// different shape is taken as-is.
pub fn reconcile(previous: &[QuestGoal], fresh: Vec<QuestGoal>) -> Vec<QuestGoal> {
    if !same_shape(previous, &fresh) {
        return fresh;
    }
    fresh
        .into_iter()
        .zip(previous)
        .map(|(mut new, old)| {
            if new.current < old.current {
                warn!(
                    goal_type = %new.goal_type,
                    label = new.metadata.label.as_deref().unwrap_or(""),
                    previous = old.current,
                    reported = new.current,
                    "Goal progress went backwards, keeping previous value"
                );
                new.current = old.current;
            }
            new
        })
        .collect()
}

/// Index of the first goal that is not yet satisfied.
pub fn first_unsatisfied(goals: &[QuestGoal]) -> Option<usize> {
    goals.iter().position(|goal| !goal.is_satisfied())
}
