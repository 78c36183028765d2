//! # Path Repair (C7)
//!
//! `evaluate` finds the contiguous run of risky waypoints on the current trajectory; `repair`
//! truncates the trajectory before it, runs a bounded local Fast Marching re-solve to find a
//! risk-free exit back onto the global field, and splices a new segment in, per §4.6 and §4.7.
//!
//! Open question resolution: the spec's `globalPath` and `trajectory` are treated as the same
//! sequence here — every waypoint the facade holds is queryable against the global field via
//! [`GlobalGrid::interpolate_total_cost`] regardless of whether it came from a global extraction
//! or an earlier local splice, so a second parallel array would only duplicate state.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::Point2;
use ordered_float::OrderedFloat;

use crate::config::PlannerConfig;
use crate::error::PlannerError;
use crate::global::{GlobalGrid, PropState};
use crate::grid::{self, Dir, NONE};
use crate::local::LocalLatticeManager;
use crate::path_extract::{self, interpolate_descent};
use crate::types::{Trajectory, Waypoint};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A lazily-deleted local-lattice heap entry, min-ordered on `total_cost` the same way
/// [`crate::global::GlobalGrid`]'s solver orders its heap.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LocalHeapEntry {
    key: OrderedFloat<f64>,
    patch_id: usize,
    local_idx: usize,
}

impl Eq for LocalHeapEntry {}

impl Ord for LocalHeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key)
    }
}

impl PartialOrd for LocalHeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ------------------------------------------------------------------------------------------------
// LOCAL FM CORE (§4.6)
// ------------------------------------------------------------------------------------------------

fn local_cell_world_pos(global: &GlobalGrid, local: &LocalLatticeManager, patch_id: usize, local_idx: usize) -> Point2<f64> {
    let (sub_i, sub_j) = grid::unflatten(local_idx, local.r);
    local.local_cell_position(global, patch_id, sub_i, sub_j)
}

fn local_axis_min(local: &LocalLatticeManager, a: (usize, usize), b: (usize, usize)) -> f64 {
    let av = if a.0 == NONE { None } else { Some(local.cell_at(a.0, a.1).total_cost) };
    let bv = if b.0 == NONE { None } else { Some(local.cell_at(b.0, b.1).total_cost) };
    match (av, bv) {
        (None, None) => f64::INFINITY,
        (Some(x), None) => x,
        (None, Some(y)) => y,
        (Some(x), Some(y)) => x.min(y),
    }
}

fn local_eikonal_update(local: &LocalLatticeManager, target: (usize, usize), c: f64) -> f64 {
    let n = local.cell_at(target.0, target.1).neighbors;
    let ty = local_axis_min(local, n[Dir::South as usize], n[Dir::North as usize]);
    let tx = local_axis_min(local, n[Dir::West as usize], n[Dir::East as usize]);
    if (tx - ty).abs() < c && tx.is_finite() && ty.is_finite() {
        (tx + ty + (2.0 * c * c - (tx - ty).powi(2)).sqrt()) / 2.0
    } else {
        tx.min(ty) + c
    }
}

fn all_neighbors_closed(local: &LocalLatticeManager, cell: (usize, usize)) -> bool {
    local
        .cell_at(cell.0, cell.1)
        .neighbors
        .iter()
        .all(|&r| r.0 == NONE || matches!(local.cell_at(r.0, r.1).state, PropState::Closed))
}

/// Walks `risk_distance_m` from `from_pos` along the global field's local descent direction,
/// materialising local cells as needed, and reports whether every sampled cell has zero risk.
fn straight_line_is_risk_free(global: &GlobalGrid, local: &mut LocalLatticeManager, from_pos: Point2<f64>, risk_distance_m: f64) -> bool {
    let (dcx, dcy, _) = match interpolate_descent(global, from_pos) {
        Some(v) => v,
        None => return true,
    };
    let mag = (dcx * dcx + dcy * dcy).sqrt();
    if mag < 1e-12 {
        return true;
    }
    let dir = Point2::new(-dcx / mag, -dcy / mag);
    let step = local.local_cell_size_m.min(risk_distance_m).max(1e-6);

    let mut traveled = 0.0;
    while traveled < risk_distance_m {
        traveled += step;
        let sample = Point2::new(from_pos.x + dir.x * traveled, from_pos.y + dir.y * traveled);
        let (patch, idx) = local.get_local_cell(global, sample);
        if local.cell_at(patch, idx).risk > 0.0 {
            return false;
        }
    }
    true
}

/// Runs the bounded local FM re-solve from `w_init` looking for a cell that rejoins the global
/// field below `t_reach` with zero risk and a risk-free exit corridor, per §4.6. Returns the
/// `(patch_id, local_idx)` of the exit cell once it and all four of its neighbours are CLOSED.
pub fn local_fm_repair(
    global: &GlobalGrid,
    local: &mut LocalLatticeManager,
    w_init: Waypoint,
    t_reach: f64,
    risk_distance_m: f64,
) -> Result<(usize, usize), PlannerError> {
    local.reset_closed();

    let seed = local.get_local_cell(global, w_init.position());
    {
        let cell = local.cell_at_mut(seed.0, seed.1);
        cell.total_cost = 0.0;
        cell.state = PropState::Closed;
    }

    let mut heap: BinaryHeap<LocalHeapEntry> = BinaryHeap::new();
    let relax = |local: &mut LocalLatticeManager, heap: &mut BinaryHeap<LocalHeapEntry>, nb: (usize, usize)| {
        if nb.0 == NONE || matches!(local.cell_at(nb.0, nb.1).state, PropState::Closed) {
            return;
        }
        let c = local.cell_at(nb.0, nb.1).risk + 0.1;
        let t = local_eikonal_update(local, nb, c);
        if t < local.cell_at(nb.0, nb.1).total_cost {
            local.cell_at_mut(nb.0, nb.1).total_cost = t;
            heap.push(LocalHeapEntry { key: OrderedFloat(t), patch_id: nb.0, local_idx: nb.1 });
        }
    };

    let seed_neighbors = local.cell_at(seed.0, seed.1).neighbors;
    for nb in seed_neighbors {
        relax(local, &mut heap, nb);
    }

    let mut exit: Option<(usize, usize)> = None;

    while let Some(LocalHeapEntry { key, patch_id, local_idx }) = heap.pop() {
        let current = (patch_id, local_idx);
        if matches!(local.cell_at(current.0, current.1).state, PropState::Closed) {
            continue;
        }
        if key.0 != local.cell_at(current.0, current.1).total_cost {
            continue;
        }

        local.cell_at_mut(current.0, current.1).state = PropState::Closed;

        if exit.is_none() {
            let pos = local_cell_world_pos(global, local, current.0, current.1);
            let risk = local.cell_at(current.0, current.1).risk;
            if risk == 0.0 && global.interpolate_total_cost(pos) < t_reach && straight_line_is_risk_free(global, local, pos, risk_distance_m) {
                exit = Some(current);
            }
        }

        if let Some(e) = exit {
            if all_neighbors_closed(local, e) {
                return Ok(e);
            }
        }

        let current_neighbors = local.cell_at(current.0, current.1).neighbors;
        for nb in current_neighbors {
            relax(local, &mut heap, nb);
        }
    }

    Err(PlannerError::LocalRepairFailed)
}

// ------------------------------------------------------------------------------------------------
// EVALUATE & SPLICE (§4.7)
// ------------------------------------------------------------------------------------------------

/// Finds the maximal contiguous run of risky waypoints on `trajectory`, materialising local
/// cells as needed. Returns `(minIndex, maxIndex)`, or `None` if nothing is blocked.
pub fn evaluate(global: &GlobalGrid, local: &mut LocalLatticeManager, trajectory: &Trajectory) -> Option<(usize, usize)> {
    let mut min_index = None;
    for (idx, wp) in trajectory.iter().enumerate() {
        let (patch, local_idx) = local.get_local_cell(global, wp.position());
        if local.cell_at(patch, local_idx).risk > 0.0 {
            min_index = Some(idx);
            break;
        }
    }
    let min_index = min_index?;

    let mut max_index = min_index;
    for idx in (min_index + 1)..trajectory.len() {
        let (patch, local_idx) = local.get_local_cell(global, trajectory[idx].position());
        if local.cell_at(patch, local_idx).risk > 0.0 {
            max_index = idx;
        } else {
            break;
        }
    }

    Some((min_index, max_index))
}

/// Truncates and splices `trajectory` around the blocked run `[min_index, max_index]`, per §4.7.
pub fn repair(
    global: &GlobalGrid,
    local: &mut LocalLatticeManager,
    cost_config: &PlannerConfig,
    trajectory: &mut Trajectory,
    min_index: usize,
    max_index: usize,
) -> Result<(), PlannerError> {
    let risk_distance_m = cost_config.risk_distance_m;
    let anchor = trajectory[min_index].position();

    let mut index_lim = min_index;
    while index_lim > 0 {
        index_lim -= 1;
        if (trajectory[index_lim].position() - anchor).norm() > 2.0 * risk_distance_m {
            break;
        }
    }

    if max_index + 1 >= trajectory.len() {
        trajectory.truncate(index_lim);
        return Ok(());
    }

    let t_reach = global.interpolate_total_cost(trajectory[max_index].position());
    trajectory.truncate(index_lim);

    let w_init = *trajectory.last().ok_or(PlannerError::LocalRepairFailed)?;

    let exit = local_fm_repair(global, local, w_init, t_reach, risk_distance_m)?;
    let local_sub_path = path_extract::extract_local_path(global, local, exit.0, exit.1, w_init.position(), w_init)?;

    let tail_start = *local_sub_path.last().unwrap_or(&w_init);
    let global_tail = path_extract::extract_global_path(global, cost_config, tail_start)?;

    trajectory.extend(local_sub_path.into_iter().skip(1));
    trajectory.extend(global_tail.into_iter().skip(1));

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::MapConfig;
    use crate::types::{TerrainDescriptor, TraversabilityFrame};

    fn scenario() -> (GlobalGrid, LocalLatticeManager, PlannerConfig) {
        let map_cfg = MapConfig {
            global_cell_size_m: 1.0,
            local_cell_size_m: 0.1,
            origin_x_m: 0.0,
            origin_y_m: 0.0,
        };
        let cost_cfg = PlannerConfig {
            terrain_table: vec![
                TerrainDescriptor { optimal_locomotion_mode: "drive".into() },
                TerrainDescriptor { optimal_locomotion_mode: "drive".into() },
            ],
            cost_data: vec![100.0, 10.0],
            slope_range_deg: vec![0.0],
            locomotion_modes: vec!["drive".into()],
            risk_distance_m: 0.5,
        };
        let elevation = vec![vec![0.0; 10]; 10];
        let terrain = vec![vec![1usize; 10]; 10];
        let mut global = GlobalGrid::new(&map_cfg, &cost_cfg, &elevation, &terrain).unwrap();
        global.set_goal(Waypoint::new(9.0, 9.0, 0.0, 0.0, 0)).unwrap();
        global.compute_global_field(Waypoint::new(0.0, 0.0, 0.0, 0.0, 0), &cost_cfg).unwrap();
        let local = LocalLatticeManager::new(global.len(), 10, 0.1);
        (global, local, cost_cfg)
    }

    #[test]
    fn test_evaluate_finds_blocked_run() {
        let (mut global, mut local, cost_cfg) = scenario();
        let trajectory = path_extract::extract_global_path(&global, &cost_cfg, Waypoint::new(0.0, 0.0, 0.0, 0.0, 0)).unwrap();

        // Inject an obstacle straddling the middle of the trajectory.
        let mid = trajectory[trajectory.len() / 2];
        local.update_neighbourhood(&global, mid.position(), 2.0);
        let frame = TraversabilityFrame {
            width: 3,
            height: 3,
            stride: 3,
            pixels: vec![0u8; 9],
            origin: mid.position(),
            resolution_m: 0.1,
        };
        crate::risk::ingest_frame(&mut global, &mut local, &frame, &trajectory, cost_cfg.risk_distance_m);

        let blocked = evaluate(&global, &mut local, &trajectory);
        assert!(blocked.is_some());
    }

    #[test]
    fn test_repair_truncates_when_goal_blocked() {
        let (global, mut local, cost_cfg) = scenario();
        let mut trajectory = path_extract::extract_global_path(&global, &cost_cfg, Waypoint::new(0.0, 0.0, 0.0, 0.0, 0)).unwrap();
        let last = trajectory.len() - 1;
        let result = repair(&global, &mut local, &cost_cfg, &mut trajectory, last, last);
        assert!(result.is_ok());
        assert!(trajectory.len() <= last);
    }
}
