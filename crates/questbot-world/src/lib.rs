//! Spatial side of the Questbot engine: where the quest givers are and how
//! to walk to them.
//!
//! # Modules
//!
//! - [`error`] -- Error types for registry and grid operations.
//! - [`grid`] -- [`Matrix`], the per-map walkability grid rebuilt for every
//!   navigation request.
//! - [`pathfinder`] -- Breadth-first 8-connected pathfinding with a fixed
//!   neighbor order.
//! - [`registry`] -- [`LocationRegistry`], the ordered location list with
//!   disabled/completed flags and the resume cursor.

pub mod error;
pub mod grid;
pub mod pathfinder;
pub mod registry;

// Re-export primary types at crate root.
pub use error::WorldError;
pub use grid::{Cell, MAX_DIMENSION, Matrix};
pub use pathfinder::{NEIGHBOR_ORDER, find_path};
pub use registry::LocationRegistry;
