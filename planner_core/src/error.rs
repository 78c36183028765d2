//! # Planner Errors
//!
//! Every error the facade can surface. Internally `f64::INFINITY` is a first-class sentinel for
//! "not yet reached", not an error; only terminal emptiness or divergence raises one of these.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::types::{Trajectory, Waypoint};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("Goal cell or one of its neighbours is forbidden terrain")]
    GoalForbidden,

    #[error("Global field finished but the start cell is unreachable from the goal")]
    Unreachable,

    #[error("Gradient descent diverged after {steps} steps")]
    PathDiverged { steps: usize, partial: Trajectory },

    #[error("Waypoint {0:?} lies adjacent to an unobserved (hidden) cell")]
    NearHidden(Waypoint),

    #[error("Local repair FM solver could not find a valid exit in the materialised patch set")]
    LocalRepairFailed,

    #[error("Position ({x_m}, {y_m}) lies outside the global map")]
    OutsideMap { x_m: f64, y_m: f64 },

    #[error("Planner configuration is invalid: {0}")]
    InvalidConfig(&'static str),

    #[error("No goal has been set")]
    NoGoal,
}

/// Outcome of ingesting a new traversability frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// No new obstacle intersected the current path within the risk distance.
    Clean,
    /// The path was blocked and has been repaired in place.
    Repaired,
}
