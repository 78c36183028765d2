//! # planner_core
//!
//! Two-scale path planning engine for mobile robots: a coarse global Fast Marching cost field
//! (C1/C2) covers the whole map, a lazily-materialised local lattice (C3) refines it near the
//! robot and repairs the active trajectory around newly-sensed obstacles (C4/C5/C7), and
//! [`planner::Planner`] (C8) is the single facade a host dispatch loop drives once per tick.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod config;
pub mod cost;
pub mod error;
pub mod global;
pub mod grid;
pub mod local;
pub mod path_extract;
pub mod planner;
pub mod repair;
pub mod risk;
pub mod types;

// ------------------------------------------------------------------------------------------------
// RE-EXPORTS
// ------------------------------------------------------------------------------------------------

pub use config::{MapConfig, PlannerConfig};
pub use error::{IngestOutcome, PlannerError};
pub use planner::Planner;
pub use types::{GridImage, Trajectory, TraversabilityFrame, Waypoint};
