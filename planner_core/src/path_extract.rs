//! # Path Extractor (C6)
//!
//! Fixed-step gradient descent over a `totalCost` field, turning it into a sequence of waypoints.
//! [`extract_global_path`] walks the coarse global field (§4.5); [`extract_local_path`] runs the
//! same method over a local lattice to produce the short splice segment used by a repair (§4.7
//! step 5).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Point2;

use crate::config::PlannerConfig;
use crate::error::PlannerError;
use crate::global::GlobalGrid;
use crate::grid::{self, Dir, NONE};
use crate::local::LocalLatticeManager;
use crate::types::{Trajectory, Waypoint};

/// Implementation-defined cap on gradient-descent steps before a path is declared diverged.
const STEP_BUDGET: usize = 1_000_000;

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Central-difference gradient of `totalCost` at global cell `idx`, using whichever of its
/// present neighbours are finite; `(0,0)` on an axis with none.
fn global_corner_gradient(global: &GlobalGrid, idx: usize) -> (f64, f64) {
    let cell = global.cell(idx);
    let n = cell.neighbors;
    let h = global.cell_size_m;

    let finite_cost = |i: usize| -> Option<f64> {
        if i == NONE {
            None
        } else {
            let t = global.cell(i).total_cost;
            if t.is_finite() { Some(t) } else { None }
        }
    };

    let gx = match (finite_cost(n[Dir::East as usize]), finite_cost(n[Dir::West as usize])) {
        (Some(e), Some(w)) => (e - w) / (2.0 * h),
        (Some(e), None) => (e - cell.total_cost) / h,
        (None, Some(w)) => (cell.total_cost - w) / h,
        (None, None) => 0.0,
    };
    let gy = match (finite_cost(n[Dir::North as usize]), finite_cost(n[Dir::South as usize])) {
        (Some(nn), Some(s)) => (nn - s) / (2.0 * h),
        (Some(nn), None) => (nn - cell.total_cost) / h,
        (None, Some(s)) => (cell.total_cost - s) / h,
        (None, None) => 0.0,
    };
    (gx, gy)
}

/// Bilinearly interpolated `(dCx, dCy, elevation)` at `pos`, or `None` if `pos` is outside the
/// grid.
pub(crate) fn interpolate_descent(global: &GlobalGrid, pos: Point2<f64>) -> Option<(f64, f64, f64)> {
    let (bi, bj, a, b) = global.bilinear_cell(pos)?;
    let w = global.width;
    let corners = [
        grid::flat_index(bi, bj, w),
        grid::flat_index(bi + 1, bj, w),
        grid::flat_index(bi, bj + 1, w),
        grid::flat_index(bi + 1, bj + 1, w),
    ];
    let grads: Vec<(f64, f64)> = corners.iter().map(|&i| global_corner_gradient(global, i)).collect();
    let dcx = grid::bilinear(a, b, grads[0].0, grads[1].0, grads[2].0, grads[3].0);
    let dcy = grid::bilinear(a, b, grads[0].1, grads[1].1, grads[2].1, grads[3].1);
    let elevations: Vec<f64> = corners.iter().map(|&i| global.cell(i).elevation_m).collect();
    let z = grid::bilinear(a, b, elevations[0], elevations[1], elevations[2], elevations[3]);
    Some((dcx, dcy, z))
}

/// Extracts a trajectory from `start` to the current goal by fixed-step descent of the global
/// `totalCost` gradient, per §4.5.
pub fn extract_global_path(
    global: &GlobalGrid,
    cost_config: &PlannerConfig,
    start: Waypoint,
) -> Result<Trajectory, PlannerError> {
    let goal_idx = global.goal_index().ok_or(PlannerError::NoGoal)?;
    let goal_cell = global.cell(goal_idx);
    let goal_pos = global.node_position(goal_cell.i, goal_cell.j);

    if !global.cell(global.nearest_index(start.position())).total_cost.is_finite() {
        return Err(PlannerError::Unreachable);
    }

    let tau = 0.5f64.min(cost_config.risk_distance_m) * global.cell_size_m;
    let mut path = vec![start];
    let mut pos = start.position();
    let mut reached = (pos - goal_pos).norm() <= global.cell_size_m;

    for step in 0..STEP_BUDGET {
        if reached {
            break;
        }

        let (dcx, dcy, z) = match interpolate_descent(global, pos) {
            Some(v) => v,
            None => return Err(PlannerError::PathDiverged { steps: step, partial: path }),
        };
        if dcx.is_nan() || dcy.is_nan() {
            return Err(PlannerError::PathDiverged { steps: step, partial: path });
        }

        let next = Point2::new(pos.x - tau * dcx, pos.y - tau * dcy);
        let heading = (-dcy).atan2(-dcx);
        path.push(Waypoint::new(next.x, next.y, z, heading, start.locomotion_mode));
        pos = next;
        reached = (pos - goal_pos).norm() <= global.cell_size_m;
    }

    if !reached {
        return Err(PlannerError::PathDiverged { steps: STEP_BUDGET, partial: path });
    }

    let final_heading = path.last().map(|w| w.heading_rad).unwrap_or(start.heading_rad);
    path.push(Waypoint::new(
        goal_pos.x,
        goal_pos.y,
        goal_cell.elevation_m,
        final_heading,
        start.locomotion_mode,
    ));
    Ok(path)
}

/// Central-difference gradient of `totalCost` at local cell `(patch_id, local_idx)`.
fn local_corner_gradient(local: &LocalLatticeManager, patch_id: usize, local_idx: usize) -> (f64, f64) {
    let cell = local.cell_at(patch_id, local_idx);
    let n = cell.neighbors;
    let h = local.local_cell_size_m;

    let finite_cost = |r: (usize, usize)| -> Option<f64> {
        if r.0 == NONE {
            None
        } else {
            let t = local.cell_at(r.0, r.1).total_cost;
            if t.is_finite() { Some(t) } else { None }
        }
    };

    let gx = match (finite_cost(n[Dir::East as usize]), finite_cost(n[Dir::West as usize])) {
        (Some(e), Some(w)) => (e - w) / (2.0 * h),
        (Some(e), None) => (e - cell.total_cost) / h,
        (None, Some(w)) => (cell.total_cost - w) / h,
        (None, None) => 0.0,
    };
    let gy = match (finite_cost(n[Dir::North as usize]), finite_cost(n[Dir::South as usize])) {
        (Some(nn), Some(s)) => (nn - s) / (2.0 * h),
        (Some(nn), None) => (nn - cell.total_cost) / h,
        (None, Some(s)) => (cell.total_cost - s) / h,
        (None, None) => 0.0,
    };
    (gx, gy)
}

/// Extracts the short local splice segment from the repair's exit cell back to `w_init_pos`,
/// per §4.7 step 5. Walks the local `totalCost` field downhill (exit has the highest value on the
/// path, `wInit` has zero) and returns the segment in `wInit -> exit` order, ready for splicing.
pub fn extract_local_path(
    global: &GlobalGrid,
    local: &mut LocalLatticeManager,
    exit_patch: usize,
    exit_idx: usize,
    w_init_pos: Point2<f64>,
    template: Waypoint,
) -> Result<Trajectory, PlannerError> {
    let tau = 0.5 * local.local_cell_size_m;

    let (sub_i, sub_j) = grid::unflatten(exit_idx, local.r);
    let mut pos = local.local_cell_position(global, exit_patch, sub_i, sub_j);
    let mut current = (exit_patch, exit_idx);

    let z0 = interpolate_descent(global, pos).map(|(_, _, z)| z).unwrap_or(template.z_m);
    let mut path = vec![Waypoint::new(pos.x, pos.y, z0, template.heading_rad, template.locomotion_mode)];
    let mut reached = (pos - w_init_pos).norm() <= local.local_cell_size_m;

    for step in 0..STEP_BUDGET {
        if reached {
            break;
        }

        let (gx, gy) = local_corner_gradient(local, current.0, current.1);
        if gx.is_nan() || gy.is_nan() {
            return Err(PlannerError::PathDiverged { steps: step, partial: path });
        }

        let next = Point2::new(pos.x - tau * gx, pos.y - tau * gy);
        let heading = (-gy).atan2(-gx);
        let z = interpolate_descent(global, next).map(|(_, _, z)| z).unwrap_or(template.z_m);
        path.push(Waypoint::new(next.x, next.y, z, heading, template.locomotion_mode));

        pos = next;
        current = local.get_local_cell(global, pos);
        reached = (pos - w_init_pos).norm() <= local.local_cell_size_m;
    }

    if !reached {
        return Err(PlannerError::PathDiverged { steps: STEP_BUDGET, partial: path });
    }

    path.reverse();
    Ok(path)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::MapConfig;
    use crate::types::TerrainDescriptor;

    fn flat_config() -> (MapConfig, PlannerConfig) {
        (
            MapConfig {
                global_cell_size_m: 1.0,
                local_cell_size_m: 0.1,
                origin_x_m: 0.0,
                origin_y_m: 0.0,
            },
            PlannerConfig {
                terrain_table: vec![
                    TerrainDescriptor { optimal_locomotion_mode: "drive".into() },
                    TerrainDescriptor { optimal_locomotion_mode: "drive".into() },
                ],
                cost_data: vec![100.0, 10.0],
                slope_range_deg: vec![0.0],
                locomotion_modes: vec!["drive".into()],
                risk_distance_m: 0.5,
            },
        )
    }

    #[test]
    fn test_extract_global_path_reaches_goal_region() {
        let (map_cfg, cost_cfg) = flat_config();
        let elevation = vec![vec![0.0; 10]; 10];
        let terrain = vec![vec![1usize; 10]; 10];
        let mut grid = GlobalGrid::new(&map_cfg, &cost_cfg, &elevation, &terrain).unwrap();

        grid.set_goal(Waypoint::new(9.0, 9.0, 0.0, 0.0, 0)).unwrap();
        let start = Waypoint::new(0.0, 0.0, 0.0, 0.0, 0);
        grid.compute_global_field(start, &cost_cfg).unwrap();

        let path = extract_global_path(&grid, &cost_cfg, start).unwrap();
        assert!(path.len() >= 10);
        let last = path.last().unwrap();
        assert!((last.x_m - 9.0).abs() < 1e-6);
        assert!((last.y_m - 9.0).abs() < 1e-6);
        for wp in &path {
            assert!(wp.heading_rad >= -std::f64::consts::PI - 1e-6 && wp.heading_rad <= std::f64::consts::PI + 1e-6);
        }
    }

    #[test]
    fn test_extract_global_path_errs_without_goal() {
        let (map_cfg, cost_cfg) = flat_config();
        let elevation = vec![vec![0.0; 5]; 5];
        let terrain = vec![vec![1usize; 5]; 5];
        let grid = GlobalGrid::new(&map_cfg, &cost_cfg, &elevation, &terrain).unwrap();
        let result = extract_global_path(&grid, &cost_cfg, Waypoint::new(0.0, 0.0, 0.0, 0.0, 0));
        assert!(matches!(result, Err(PlannerError::NoGoal)));
    }
}
