//! Quest flow, classification and orchestration for the Questbot engine.
//!
//! This crate owns the loop that walks the location registry: teleport,
//! walk to the quest giver, open the quest, classify it, run the matching
//! activity until the goals are met, and hand it in.
//!
//! # Modules
//!
//! - [`classifier`] -- Dialogue text to quest category and measurable goals.
//! - [`config`] -- Configuration loading from `questbot-config.yaml` into
//!   strongly-typed structs.
//! - [`dispatcher`] -- [`ActionDispatcher`], the only caller of the game
//!   session.
//! - [`flow`] -- [`QuestFlow`], the event-driven state machine.
//! - [`operator`] -- Shared start/stop flags, queued commands and status.
//! - [`progress`] -- Goal reconciliation and stagnation tracking.
//! - [`runner`] -- [`run_quests`], the async driver with all the waits.
//! - [`session`] -- The [`GameSession`] boundary trait.
//! - [`sim`] -- [`SimulatedSession`], an in-memory game session.
//!
//! [`ActionDispatcher`]: dispatcher::ActionDispatcher
//! [`QuestFlow`]: flow::QuestFlow
//! [`run_quests`]: runner::run_quests
//! [`GameSession`]: session::GameSession
//! [`SimulatedSession`]: sim::SimulatedSession

pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod flow;
pub mod operator;
pub mod progress;
pub mod runner;
pub mod session;
pub mod sim;
