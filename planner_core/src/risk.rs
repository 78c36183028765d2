//! # Obstacle & Risk Engine (C5)
//!
//! Ingests traversability sensor frames, marks newly discovered obstacle [`LocalCell`]s, and
//! propagates a smooth risk halo of radius `riskDistance` around them via an Eikonal solve on
//! `S = 1 - risk`, per §4.4.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::global::GlobalGrid;
use crate::grid::{Dir, NONE};
use crate::local::LocalLatticeManager;
use crate::types::{Trajectory, TraversabilityFrame};

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Ingests one traversability frame: marks newly discovered obstacle local cells, leaks their
/// presence into the global `obstacleRatio` field, propagates the risk halo, and reports whether
/// any newly marked obstacle intersects `trajectory` within `risk_distance_m`.
pub fn ingest_frame(
    global: &mut GlobalGrid,
    local: &mut LocalLatticeManager,
    frame: &TraversabilityFrame,
    trajectory: &Trajectory,
    risk_distance_m: f64,
) -> bool {
    let mut expandables: Vec<(usize, usize)> = Vec::new();
    let mut path_blocked = false;
    let r2 = (local.r * local.r) as f64;

    for row in 0..frame.height {
        for col in 0..frame.width {
            if !frame.is_obstacle(row, col) {
                continue;
            }

            let world_pos = frame.pixel_position(row, col);
            let (patch_id, local_idx) = local.get_local_cell(global, world_pos);

            if local.cell_at(patch_id, local_idx).is_obstacle {
                continue;
            }

            {
                let cell = local.cell_at_mut(patch_id, local_idx);
                cell.is_obstacle = true;
                cell.risk = 1.0;
            }
            expandables.push((patch_id, local_idx));

            let own_inc = 1.0 / r2;
            let leak_inc = 0.2 / r2;
            let owner_neighbors = global.cell(patch_id).neighbors;
            global.cells[patch_id].obstacle_ratio = (global.cells[patch_id].obstacle_ratio + own_inc).min(1.0);
            for &n in &owner_neighbors {
                if n != NONE {
                    global.cells[n].obstacle_ratio = (global.cells[n].obstacle_ratio + leak_inc).min(1.0);
                }
            }

            if !path_blocked {
                path_blocked = trajectory
                    .iter()
                    .any(|wp| (world_pos - wp.position()).norm() < risk_distance_m);
            }
        }
    }

    propagate_risk(local, risk_distance_m, expandables);
    path_blocked
}

/// Risk value of the local cell at `(patch_id, local_idx)`, or `0.0` if absent.
fn risk_of(local: &LocalLatticeManager, reference: (usize, usize)) -> f64 {
    if reference.0 == NONE {
        0.0
    } else {
        local.cell_at(reference.0, reference.1).risk
    }
}

/// Propagates risk outward from every entry in `expandables` until the queue is dry, per §4.4.
fn propagate_risk(local: &mut LocalLatticeManager, risk_distance_m: f64, mut expandables: Vec<(usize, usize)>) {
    let c = local.local_cell_size_m / risk_distance_m;

    while !expandables.is_empty() {
        let mut max_at = 0;
        let mut max_risk = risk_of(local, expandables[0]);
        for (k, &reference) in expandables.iter().enumerate() {
            if max_risk >= 1.0 {
                break;
            }
            let r = risk_of(local, reference);
            if r > max_risk {
                max_risk = r;
                max_at = k;
            }
        }
        let popped = expandables.remove(max_at);
        let neighbors = local.cell_at(popped.0, popped.1).neighbors;

        for &reference in &neighbors {
            if reference.0 == NONE {
                continue;
            }

            let n_neighbors = local.cell_at(reference.0, reference.1).neighbors;
            let ry = risk_of(local, n_neighbors[Dir::South as usize]).max(risk_of(local, n_neighbors[Dir::North as usize]));
            let rx = risk_of(local, n_neighbors[Dir::West as usize]).max(risk_of(local, n_neighbors[Dir::East as usize]));
            let sx = 1.0 - rx;
            let sy = 1.0 - ry;

            let s = if (sx - sy).abs() < c {
                (sx + sy + (2.0 * c * c - (sx - sy).powi(2)).sqrt()) / 2.0
            } else {
                sx.min(sy) + c
            };
            let new_risk = (1.0 - s).max(0.0);

            let current = local.cell_at(reference.0, reference.1).risk;
            if new_risk > current {
                local.cell_at_mut(reference.0, reference.1).risk = new_risk;
                expandables.push(reference);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{MapConfig, PlannerConfig};
    use crate::types::TerrainDescriptor;
    use nalgebra::Point2;

    fn setup() -> (GlobalGrid, LocalLatticeManager) {
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
        let global = GlobalGrid::new(&map_cfg, &cost_cfg, &elevation, &terrain).unwrap();
        let local = LocalLatticeManager::new(global.len(), 10, 0.1);
        (global, local)
    }

    #[test]
    fn test_ingest_marks_obstacle_and_propagates_halo() {
        let (mut global, mut local) = setup();
        local.update_neighbourhood(&global, Point2::new(4.5, 4.5), 3.0);

        let frame = TraversabilityFrame {
            width: 3,
            height: 3,
            stride: 3,
            pixels: vec![0u8; 9],
            origin: Point2::new(4.5, 4.5),
            resolution_m: 0.1,
        };

        let blocked = ingest_frame(&mut global, &mut local, &frame, &vec![], 0.5);
        assert!(!blocked); // empty trajectory can't be blocked

        let (patch_id, idx) = local.get_local_cell(&global, Point2::new(4.5, 4.5));
        assert!(local.cell_at(patch_id, idx).is_obstacle);
        assert_eq!(local.cell_at(patch_id, idx).risk, 1.0);

        // A cell a few sub-cells away should have a positive, smaller risk.
        let (patch_far, idx_far) = local.get_local_cell(&global, Point2::new(4.8, 4.5));
        let far_risk = local.cell_at(patch_far, idx_far).risk;
        assert!(far_risk > 0.0 && far_risk < 1.0);
    }

    #[test]
    fn test_ingest_leaks_into_global_obstacle_ratio() {
        let (mut global, mut local) = setup();
        local.update_neighbourhood(&global, Point2::new(4.5, 4.5), 2.0);

        let frame = TraversabilityFrame {
            width: 1,
            height: 1,
            stride: 1,
            pixels: vec![0u8],
            origin: Point2::new(4.5, 4.5),
            resolution_m: 0.1,
        };
        ingest_frame(&mut global, &mut local, &frame, &vec![], 0.5);

        let owner = global.nearest_index(Point2::new(4.5, 4.5));
        assert!(global.cell(owner).obstacle_ratio > 0.0);
    }
}
