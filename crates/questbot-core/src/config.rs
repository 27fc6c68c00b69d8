//! Configuration loading and typed config structures for the Questbot engine.
//!
//! The configuration lives in `questbot-config.yaml` in the working
//! directory. This module defines strongly-typed structs that mirror the
//! YAML structure, and provides a loader that reads and validates the file.
//! Every field has a default, so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use questbot_types::{GoalType, LocationSpec};

/// Default file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "questbot-config.yaml";

/// Environment variable overriding [`EngineConfig::wait_time_ms`].
pub const WAIT_TIME_ENV: &str = "QUESTBOT_WAIT_TIME_MS";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is not usable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
///
/// Mirrors the structure of `questbot-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QuestbotConfig {
    /// Timing and attempt ceilings for the quest flow.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Quest categories to treat as "no goal".
    #[serde(default)]
    pub skip: SkipConfig,

    /// Quest-giver locations in visiting order.
    #[serde(default)]
    pub locations: Vec<LocationSpec>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl QuestbotConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `QUESTBOT_WAIT_TIME_MS` overrides `engine.wait_time_ms` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value fails validation.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.engine.apply_overrides(|key| std::env::var(key).ok());
        config.engine.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ceilings: [(&'static str, u64); 6] = [
            (
                "engine.max_teleport_polls",
                u64::from(self.engine.max_teleport_polls),
            ),
            (
                "engine.max_interaction_attempts",
                u64::from(self.engine.max_interaction_attempts),
            ),
            ("engine.max_retries", u64::from(self.engine.max_retries)),
            (
                "engine.stagnation_limit",
                u64::from(self.engine.stagnation_limit),
            ),
            ("engine.max_move_steps", u64::from(self.engine.max_move_steps)),
            (
                "engine.progress_poll_interval_ms",
                self.engine.progress_poll_interval_ms,
            ),
        ];
        for (field, value) in ceilings {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: String::from("must be greater than zero"),
                });
            }
        }
        if let Some(empty) = self.locations.iter().find(|l| l.id.as_str().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "locations.id",
                reason: format!("location {:?} has an empty id", empty.name),
            });
        }
        Ok(())
    }
}

/// Timing and attempt ceilings for the quest flow.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Pause between walking steps and other quick actions. `0` means the
    /// default.
    #[serde(default = "default_wait_time_ms")]
    pub wait_time_ms: u64,

    /// Interval between location-id checks after a teleport.
    #[serde(default = "default_teleport_poll_interval_ms")]
    pub teleport_poll_interval_ms: u64,

    /// Location-id checks before the teleport counts as timed out.
    #[serde(default = "default_max_teleport_polls")]
    pub max_teleport_polls: u32,

    /// Wait after each interaction before reading the dialogue again.
    #[serde(default = "default_interaction_wait_ms")]
    pub interaction_wait_ms: u64,

    /// Interactions tried before the quest giver counts as unresponsive.
    #[serde(default = "default_max_interaction_attempts")]
    pub max_interaction_attempts: u32,

    /// Interval between goal progress checks while an activity runs.
    #[serde(default = "default_progress_poll_interval_ms")]
    pub progress_poll_interval_ms: u64,

    /// Consecutive unchanged progress polls that count as stagnation.
    #[serde(default = "default_stagnation_limit")]
    pub stagnation_limit: u32,

    /// Steps one navigation may take before giving up.
    #[serde(default = "default_max_move_steps")]
    pub max_move_steps: u32,

    /// Pause after a location completes before looking for the next one.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Attempts per location before it is skipped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl EngineConfig {
    /// Apply environment overrides through `lookup`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(WAIT_TIME_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.wait_time_ms = ms,
                Err(err) => warn!(value = %raw, error = %err, "Ignoring {WAIT_TIME_ENV}"),
            }
        }
    }

    /// Replace a zero wait time with the default.
    pub const fn normalize(&mut self) {
        if self.wait_time_ms == 0 {
            self.wait_time_ms = default_wait_time_ms();
        }
    }

    /// [`Self::wait_time_ms`] as a duration.
    pub const fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_time_ms)
    }

    /// [`Self::teleport_poll_interval_ms`] as a duration.
    pub const fn teleport_poll_interval(&self) -> Duration {
        Duration::from_millis(self.teleport_poll_interval_ms)
    }

    /// [`Self::interaction_wait_ms`] as a duration.
    pub const fn interaction_wait(&self) -> Duration {
        Duration::from_millis(self.interaction_wait_ms)
    }

    /// [`Self::progress_poll_interval_ms`] as a duration.
    pub const fn progress_poll_interval(&self) -> Duration {
        Duration::from_millis(self.progress_poll_interval_ms)
    }

    /// [`Self::settle_delay_ms`] as a duration.
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wait_time_ms: default_wait_time_ms(),
            teleport_poll_interval_ms: default_teleport_poll_interval_ms(),
            max_teleport_polls: default_max_teleport_polls(),
            interaction_wait_ms: default_interaction_wait_ms(),
            max_interaction_attempts: default_max_interaction_attempts(),
            progress_poll_interval_ms: default_progress_poll_interval_ms(),
            stagnation_limit: default_stagnation_limit(),
            max_move_steps: default_max_move_steps(),
            settle_delay_ms: default_settle_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

/// Per-category skip flags. A skipped category is handed in without
/// running any activity.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SkipConfig {
    /// Skip resource gathering quests.
    #[serde(default)]
    pub resource: bool,
    /// Skip monster quests.
    #[serde(default)]
    pub mob: bool,
    /// Skip player combat quests.
    #[serde(default)]
    pub pvp: bool,
    /// Skip wanted-list quests.
    #[serde(default)]
    pub lpvm: bool,
    /// Skip expedition quests.
    #[serde(default)]
    pub expedition: bool,
    /// Skip instance quests.
    #[serde(default)]
    pub instance: bool,
    /// Skip donation quests.
    #[serde(default)]
    pub donation: bool,
}

impl SkipConfig {
    /// Whether `goal_type` is skipped.
    pub const fn is_skipped(&self, goal_type: GoalType) -> bool {
        match goal_type {
            GoalType::Resource => self.resource,
            GoalType::Mob => self.mob,
            GoalType::Pvp => self.pvp,
            GoalType::Lpvm => self.lpvm,
            GoalType::Expedition => self.expedition,
            GoalType::Instance => self.instance,
            GoalType::Donation => self.donation,
        }
    }

    /// Flip the flag for `goal_type`. Returns the new value.
    pub const fn toggle(&mut self, goal_type: GoalType) -> bool {
        let flag = match goal_type {
            GoalType::Resource => &mut self.resource,
            GoalType::Mob => &mut self.mob,
            GoalType::Pvp => &mut self.pvp,
            GoalType::Lpvm => &mut self.lpvm,
            GoalType::Expedition => &mut self.expedition,
            GoalType::Instance => &mut self.instance,
            GoalType::Donation => &mut self.donation,
        };
        *flag = !*flag;
        *flag
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_wait_time_ms() -> u64 {
    40
}

const fn default_teleport_poll_interval_ms() -> u64 {
    3_000
}

const fn default_max_teleport_polls() -> u32 {
    5
}

const fn default_interaction_wait_ms() -> u64 {
    1_000
}

const fn default_max_interaction_attempts() -> u32 {
    5
}

const fn default_progress_poll_interval_ms() -> u64 {
    10_000
}

const fn default_stagnation_limit() -> u32 {
    2
}

const fn default_max_move_steps() -> u32 {
    400
}

const fn default_settle_delay_ms() -> u64 {
    2_000
}

const fn default_max_retries() -> u32 {
    3
}

fn default_log_level() -> String {
    String::from("info")
}
