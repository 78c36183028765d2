//! # Construction Configuration
//!
//! Configuration consumed once at planner construction: the cost lookup table, slope sampling,
//! locomotion modes, and the risk inflation radius. Loaded the same way as other rover
//! parameter files, see [`util::params::load`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::types::TerrainDescriptor;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlannerConfig {
    /// Terrain descriptors, indexed by terrain class. `terrain_table[0]` is the hard obstacle
    /// class and is never actually consulted for its descriptor, only its presence.
    pub terrain_table: Vec<TerrainDescriptor>,

    /// Flat, row-major `(terrain, mode, slopeBucket)` cost lookup.
    pub cost_data: Vec<f64>,

    /// Ordered slope samples in degrees. A single entry means slope is ignored.
    pub slope_range_deg: Vec<f64>,

    /// Ordered locomotion mode names.
    pub locomotion_modes: Vec<String>,

    /// Metres within which an obstacle inflates risk above zero.
    #[serde(default = "default_risk_distance")]
    pub risk_distance_m: f64,
}

fn default_risk_distance() -> f64 {
    0.5
}

impl PlannerConfig {
    pub fn num_terrains(&self) -> usize {
        self.terrain_table.len()
    }

    pub fn num_modes(&self) -> usize {
        self.locomotion_modes.len()
    }

    pub fn num_slope_buckets(&self) -> usize {
        self.slope_range_deg.len()
    }

    /// Flat index into `cost_data` for `(terrain, mode, slope_bucket)`.
    pub fn cost_index(&self, terrain: usize, mode: usize, slope_bucket: usize) -> usize {
        (terrain * self.num_modes() + mode) * self.num_slope_buckets() + slope_bucket
    }

    pub fn cost_at(&self, terrain: usize, mode: usize, slope_bucket: usize) -> f64 {
        self.cost_data[self.cost_index(terrain, mode, slope_bucket)]
    }

    /// Cost of the hard-obstacle class, used as the effective cost ceiling.
    pub fn obstacle_cost(&self) -> f64 {
        self.cost_data[0]
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.terrain_table.is_empty() {
            return Err("terrain_table must not be empty");
        }
        if self.locomotion_modes.is_empty() {
            return Err("locomotion_modes must not be empty");
        }
        if self.slope_range_deg.is_empty() {
            return Err("slope_range_deg must not be empty");
        }
        let expected =
            self.num_terrains() * self.num_modes() * self.num_slope_buckets();
        if self.cost_data.len() != expected {
            return Err("cost_data length does not match terrain*mode*slopeBucket dimensions");
        }
        if self.risk_distance_m <= 0.0 {
            return Err("risk_distance_m must be positive");
        }
        Ok(())
    }
}

/// Per-map configuration, consumed by [`crate::planner::Planner::init_global_map`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MapConfig {
    pub global_cell_size_m: f64,
    pub local_cell_size_m: f64,
    pub origin_x_m: f64,
    pub origin_y_m: f64,
}

impl MapConfig {
    /// `R`, the integer number of local cells per side of a global cell.
    pub fn local_ratio(&self) -> Result<usize, &'static str> {
        let ratio = self.global_cell_size_m / self.local_cell_size_m;
        let rounded = ratio.round();
        if (ratio - rounded).abs() > 1e-6 || rounded < 1.0 {
            return Err("globalCellSize / localCellSize must be a positive integer");
        }
        Ok(rounded as usize)
    }
}
