//! # Cost Model (C2)
//!
//! Pure functions mapping `(terrain class, slope, heading)` to a scalar cost per unit length.
//! Grid-shaped concerns (slope/aspect from neighbour elevations, cost smoothing across
//! neighbours) live in [`crate::global`], which owns the neighbour tables these functions need.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::config::PlannerConfig;

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Cost of `(terrain, mode)` at `slope_deg`, bilinearly blended between the two adjacent slope
/// buckets. `None` means the slope exceeds the configured range and the cell should be treated
/// as an obstacle.
fn cost_at_slope(config: &PlannerConfig, terrain: usize, mode: usize, slope_deg: f64) -> Option<f64> {
    let n = config.num_slope_buckets();
    if n == 1 {
        return Some(config.cost_at(terrain, mode, 0));
    }

    let min = config.slope_range_deg[0];
    let max = *config.slope_range_deg.last().unwrap();
    let u = slope_deg / (max - min) * ((n - 1) as f64);

    if u > (n - 1) as f64 {
        return None;
    }

    let lo = u.floor().max(0.0) as usize;
    let hi = u.ceil().max(0.0) as usize;
    let c1 = config.cost_at(terrain, mode, lo);
    let c2 = config.cost_at(terrain, mode, hi);
    Some(c1 + (c2 - c1) * (u - lo as f64))
}

/// Nominal per-cell cost and terrain-obstacle contribution to `obstacleRatio`, per §4.1.
///
/// Returns `(cost, is_terrain_obstacle)`. `is_terrain_obstacle` is only true for `terrain == 0`;
/// a slope-range overflow on non-obstacle terrain still reports `costTable[0]` as its cost but
/// does not by itself force `obstacleRatio` to 1 (only the terrain-0 case does, per §4.1).
pub fn nominal_cost(config: &PlannerConfig, terrain: usize, slope_rad: f64) -> (f64, bool) {
    if terrain == 0 {
        return (config.obstacle_cost(), true);
    }

    let slope_deg = slope_rad.to_degrees();
    let mut best: Option<f64> = None;
    for mode in 0..config.num_modes() {
        if let Some(c) = cost_at_slope(config, terrain, mode, slope_deg) {
            best = Some(best.map_or(c, |b: f64| b.min(c)));
        }
    }

    match best {
        Some(c) => (c, false),
        None => (config.obstacle_cost(), false),
    }
}

/// Raises `own_cost` to the mean of itself and its present neighbours, per §4.1's smoothing
/// pass: `smoothedCost(c) = max(nominalCost(c), mean(c, neighbours))`.
pub fn smoothed_cost(own_cost: f64, neighbour_costs: &[f64]) -> f64 {
    let sum: f64 = own_cost + neighbour_costs.iter().sum::<f64>();
    let n = 1.0 + neighbour_costs.len() as f64;
    own_cost.max(sum / n)
}

/// The effective edge cost `C` consumed by the Fast Marching solver, per §4.1.
pub fn effective_edge_cost(
    global_cell_size_m: f64,
    nominal_cost: f64,
    slope_rad: f64,
    obstacle_ratio: f64,
    obstacle_cost: f64,
) -> f64 {
    if obstacle_ratio > 0.99 {
        return global_cell_size_m * obstacle_cost;
    }

    let raw = global_cell_size_m * nominal_cost / slope_rad.cos() / (1.0 - obstacle_ratio);
    raw.min(global_cell_size_m * obstacle_cost)
}

/// Equivalent slope along a given heading, per §4.1:
/// `s_eq = acos(sqrt(cos^2(w)*cos^2(slope) + sin^2(w)))` where `w` is the angle between the
/// path heading and the cell's aspect.
pub fn equivalent_slope(heading_rad: f64, aspect_rad: f64, slope_rad: f64) -> f64 {
    let w = heading_rad - aspect_rad;
    let inner = w.cos().powi(2) * slope_rad.cos().powi(2) + w.sin().powi(2);
    inner.clamp(-1.0, 1.0).sqrt().acos()
}

/// Picks the locomotion mode minimising slope-interpolated cost for a waypoint with the given
/// heading, terrain, slope and aspect. Returns `(mode_index, cost)`.
pub fn select_mode(
    config: &PlannerConfig,
    terrain: usize,
    slope_rad: f64,
    aspect_rad: f64,
    heading_rad: f64,
) -> (usize, f64) {
    if terrain == 0 {
        return (0, config.obstacle_cost());
    }

    let s_eq_deg = equivalent_slope(heading_rad, aspect_rad, slope_rad).to_degrees();

    let mut best_mode = 0;
    let mut best_cost = f64::INFINITY;
    for mode in 0..config.num_modes() {
        let c = cost_at_slope(config, terrain, mode, s_eq_deg).unwrap_or_else(|| config.obstacle_cost());
        if c < best_cost {
            best_cost = c;
            best_mode = mode;
        }
    }
    (best_mode, best_cost)
}

#[cfg(test)]
mod test {
    use super::*;

    fn two_mode_config() -> PlannerConfig {
        PlannerConfig {
            terrain_table: vec![
                crate::types::TerrainDescriptor { optimal_locomotion_mode: "drive".into() },
                crate::types::TerrainDescriptor { optimal_locomotion_mode: "drive".into() },
            ],
            // terrain 0: [100, 100] (2 modes x 2 slopes, obstacle)
            // terrain 1, mode 0 (drive): rises steeply with slope: [10, 50]
            // terrain 1, mode 1 (wheel-walk): cheap at high slope: [40, 15]
            cost_data: vec![100.0, 100.0, 100.0, 100.0, 10.0, 50.0, 40.0, 15.0],
            slope_range_deg: vec![0.0, 20.0],
            locomotion_modes: vec!["drive".into(), "wheel_walk".into()],
            risk_distance_m: 0.5,
        }
    }

    #[test]
    fn test_terrain_zero_is_obstacle() {
        let cfg = two_mode_config();
        let (cost, is_obs) = nominal_cost(&cfg, 0, 0.0);
        assert!(is_obs);
        assert_eq!(cost, 100.0);
    }

    #[test]
    fn test_nominal_cost_picks_min_mode() {
        let cfg = two_mode_config();
        // At slope 0 deg, drive (10.0) beats wheel_walk (40.0)
        let (cost, is_obs) = nominal_cost(&cfg, 1, 0.0);
        assert!(!is_obs);
        assert!((cost - 10.0).abs() < 1e-9);

        // At slope 20 deg, wheel_walk (15.0) beats drive (50.0)
        let (cost, _) = nominal_cost(&cfg, 1, 20f64.to_radians());
        assert!((cost - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_smoothed_cost_dilates() {
        assert!((smoothed_cost(1.0, &[1.0, 1.0, 1.0, 1.0]) - 1.0).abs() < 1e-9);
        assert!(smoothed_cost(1.0, &[10.0]) > 1.0);
    }

    #[test]
    fn test_select_mode_crossover() {
        let cfg = two_mode_config();
        let (mode_low, _) = select_mode(&cfg, 1, 5f64.to_radians(), 0.0, 0.0);
        let (mode_high, _) = select_mode(&cfg, 1, 18f64.to_radians(), 0.0, 0.0);
        assert_eq!(mode_low, 0);
        assert_eq!(mode_high, 1);
    }
}
