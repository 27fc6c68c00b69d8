//! Step callback that reports progress to the log.
//!
//! The flow logs its own transitions at debug level. This callback adds
//! one info line whenever the operator-facing picture changes: a new
//! state, a new status message, or a new completion count.

use questbot_core::flow::{QuestFlow, Step};
use questbot_core::runner::StepCallback;
use questbot_types::FlowState;
use tracing::info;

/// Callback that logs a progress line on every visible change.
#[derive(Debug, Default)]
pub struct ProgressLog {
    last_state: Option<FlowState>,
    last_message: String,
    last_completed: usize,
}

impl ProgressLog {
    /// Create a callback that has seen nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `flow`'s status. Returns `true` when it differs from the last
    /// one recorded.
    fn record(&mut self, flow: &QuestFlow) -> bool {
        let status = flow.status();
        let changed = self.last_state != Some(status.state)
            || self.last_message != status.status_message
            || self.last_completed != status.completed_count;
        self.last_state = Some(status.state);
        self.last_completed = status.completed_count;
        self.last_message = status.status_message;
        changed
    }
}

impl StepCallback for ProgressLog {
    fn on_step(&mut self, _step: &Step, flow: &QuestFlow) {
        if !self.record(flow) {
            return;
        }
        let status = flow.status();
        info!(
            progress = %format_args!("{}/{}", status.completed_count, status.total_count),
            location = status.current_location_name.as_deref().unwrap_or("-"),
            state = status.state.label(),
            "{}",
            status.status_message
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use questbot_core::config::QuestbotConfig;
    use questbot_core::flow::Event;

    use super::*;

    fn flow() -> QuestFlow {
        let config = QuestbotConfig::parse(
            "locations:\n  - id: \"1\"\n    name: Brama\n    coordinates: { x: 2, y: 3 }\n",
        )
        .unwrap();
        QuestFlow::from_config(&config)
    }

    #[test]
    fn reports_only_changes() {
        let mut log = ProgressLog::new();
        let mut flow = flow();
        assert!(log.record(&flow));
        assert!(!log.record(&flow));
        flow.handle(Event::Resume);
        assert!(log.record(&flow));
        assert_eq!(log.last_state, Some(FlowState::Teleporting));
    }
}
