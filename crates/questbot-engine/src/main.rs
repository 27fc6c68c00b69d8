//! Quest engine binary for Questbot.
//!
//! This is the main entry point that wires together the configuration,
//! the location registry, the game session, the operator controls and the
//! quest run loop. It loads configuration, initializes all subsystems, and
//! runs until every eligible location is done or a shutdown signal arrives.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `questbot-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the quest flow from the configured locations
//! 4. Open the game session
//! 5. Create operator state and install the shutdown signal handler
//! 6. Run the quest loop
//! 7. Log the result

mod error;
mod progress_log;

use std::path::Path;
use std::sync::Arc;

use questbot_core::config::{DEFAULT_CONFIG_FILE, LoggingConfig, QuestbotConfig};
use questbot_core::dispatcher::ActionDispatcher;
use questbot_core::flow::QuestFlow;
use questbot_core::operator::OperatorState;
use questbot_core::runner::{self, RunMode};
use questbot_core::sim::SimulatedSession;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::progress_log::ProgressLog;

/// Application entry point for the quest engine.
///
/// # Errors
///
/// Returns an error if configuration loading, logging setup or the quest
/// run fails.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!("questbot-engine starting");
    if !from_file {
        info!("Config file not found, using defaults");
    }
    info!(
        locations = config.locations.len(),
        wait_time_ms = config.engine.wait_time_ms,
        max_retries = config.engine.max_retries,
        progress_poll_interval_ms = config.engine.progress_poll_interval_ms,
        "Configuration loaded"
    );

    // 3. Build the quest flow.
    let mut flow = QuestFlow::from_config(&config);
    if flow.registry().is_empty() {
        warn!("No locations configured, nothing to do");
    }

    // 4. Open the game session.
    let session = SimulatedSession::from_locations(&config.locations);
    let mut dispatcher = ActionDispatcher::new(session);
    info!("Game session ready");

    // 5. Create operator state.
    let operator = Arc::new(OperatorState::new());
    setup_shutdown_signal(Arc::clone(&operator));
    operator.start();

    // 6. Run.
    let mut callback = ProgressLog::new();
    let summary = runner::run_quests(
        &mut flow,
        &mut dispatcher,
        &operator,
        RunMode::UntilIdle,
        &mut callback,
    )
    .await
    .map_err(EngineError::from)?;

    // 7. Log results.
    runner::log_run_end(&summary);
    info!(
        end_reason = ?summary.end_reason,
        handed_in = dispatcher.session().handed_in().len(),
        "questbot-engine shutdown complete"
    );

    Ok(())
}

/// Load configuration from `questbot-config.yaml` in the working
/// directory. Returns the defaults and `false` when the file is missing.
fn load_config() -> Result<(QuestbotConfig, bool), EngineError> {
    let config_path = Path::new(DEFAULT_CONFIG_FILE);
    if config_path.exists() {
        let config = QuestbotConfig::from_file(config_path)?;
        Ok((config, true))
    } else {
        let config = QuestbotConfig::parse("")?;
        Ok((config, false))
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
fn init_logging(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|err| EngineError::Logging {
            message: format!("invalid log level {:?}: {err}", logging.level),
        })?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| EngineError::Logging {
        message: err.to_string(),
    })
}

/// Spawn a task that requests shutdown on Ctrl+C.
fn setup_shutdown_signal(operator: Arc<OperatorState>) {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            return;
        }
        info!("Received Ctrl+C, stopping");
        operator.shutdown();
    });
}
