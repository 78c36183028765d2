//! # Global Cost Field (C3)
//!
//! Owns the coarse grid of [`GlobalCell`]s and the single-pass Fast Marching solver that turns a
//! goal into a scalar total-cost field, per §4.2 of the design.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::Point2;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::config::{MapConfig, PlannerConfig};
use crate::cost;
use crate::error::PlannerError;
use crate::grid::{self, Dir, NONE};
use crate::types::Waypoint;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropState {
    Open,
    Closed,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One entry of the coarse global grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalCell {
    pub i: usize,
    pub j: usize,

    pub elevation_m: f64,
    pub terrain: usize,
    pub slope_rad: f64,
    pub aspect_rad: f64,

    /// Smoothed nominal cost per unit length.
    pub cost: f64,

    pub obstacle_ratio: f64,

    pub total_cost: f64,
    pub state: PropState,

    /// Flat neighbour indices in `[South, West, East, North]` order, [`crate::grid::NONE`] if
    /// absent.
    pub neighbors: [usize; 4],
}

impl GlobalCell {
    pub fn is_hard_obstacle(&self) -> bool {
        self.terrain == 0
    }
}

/// The global grid and its Fast Marching state.
#[derive(Debug, Clone)]
pub struct GlobalGrid {
    pub width: usize,
    pub height: usize,
    pub cell_size_m: f64,
    pub origin: Point2<f64>,
    pub cells: Vec<GlobalCell>,
    goal_index: Option<usize>,
}

/// A lazily-deleted heap entry: `(key, cell index)`. Ordered so `BinaryHeap` (a max-heap)
/// produces the cell with minimum `total_cost` first.
#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapEntry {
    key: OrderedFloat<f64>,
    idx: usize,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key)
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GlobalGrid {
    /// Builds the global grid from elevation and terrain matrices, computing slope/aspect and
    /// the nominal + smoothed cost fields. `elevation` and `terrain` are row-major `[row][col]`
    /// with `row` = `j`, `col` = `i`.
    pub fn new(
        map_config: &MapConfig,
        cost_config: &PlannerConfig,
        elevation: &[Vec<f64>],
        terrain: &[Vec<usize>],
    ) -> Result<Self, PlannerError> {
        let height = elevation.len();
        if height == 0 || elevation[0].is_empty() {
            return Err(PlannerError::InvalidConfig("elevation matrix must not be empty"));
        }
        let width = elevation[0].len();
        if terrain.len() != height || terrain.iter().any(|row| row.len() != width) {
            return Err(PlannerError::InvalidConfig(
                "terrain matrix shape must match elevation matrix shape",
            ));
        }

        let origin = Point2::new(map_config.origin_x_m, map_config.origin_y_m);
        let mut cells = Vec::with_capacity(width * height);

        for j in 0..height {
            for i in 0..width {
                cells.push(GlobalCell {
                    i,
                    j,
                    elevation_m: elevation[j][i],
                    terrain: terrain[j][i],
                    slope_rad: 0.0,
                    aspect_rad: 0.0,
                    cost: 0.0,
                    obstacle_ratio: 0.0,
                    total_cost: f64::INFINITY,
                    state: PropState::Open,
                    neighbors: grid::neighbor_table(i, j, width, height),
                });
            }
        }

        let mut grid = Self {
            width,
            height,
            cell_size_m: map_config.global_cell_size_m,
            origin,
            cells,
            goal_index: None,
        };

        grid.compute_slope_aspect();
        grid.compute_costs(cost_config);
        Ok(grid)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// World position of node `(i, j)`.
    pub fn node_position(&self, i: usize, j: usize) -> Point2<f64> {
        Point2::new(
            self.origin.x + i as f64 * self.cell_size_m,
            self.origin.y + j as f64 * self.cell_size_m,
        )
    }

    /// Continuous grid coordinates (fractional node index) of a world position.
    fn continuous_coords(&self, pos: Point2<f64>) -> (f64, f64) {
        (
            (pos.x - self.origin.x) / self.cell_size_m,
            (pos.y - self.origin.y) / self.cell_size_m,
        )
    }

    /// Index of the nearest grid node to `pos`, clamped to map bounds.
    pub fn nearest_index(&self, pos: Point2<f64>) -> usize {
        let (cx, cy) = self.continuous_coords(pos);
        let i = (cx + 0.5).floor().clamp(0.0, (self.width - 1) as f64) as usize;
        let j = (cy + 0.5).floor().clamp(0.0, (self.height - 1) as f64) as usize;
        grid::flat_index(i, j, self.width)
    }

    /// `Some((base_i, base_j, a, b))` describing the 2x2 bilinear cell containing `pos`, with
    /// `(a, b)` the fractional residual in `[0,1)`, or `None` if entirely outside the grid.
    pub fn bilinear_cell(&self, pos: Point2<f64>) -> Option<(usize, usize, f64, f64)> {
        let (cx, cy) = self.continuous_coords(pos);
        if cx < 0.0 || cy < 0.0 || cx > (self.width - 1) as f64 || cy > (self.height - 1) as f64 {
            return None;
        }
        let max_i = self.width.saturating_sub(2);
        let max_j = self.height.saturating_sub(2);
        let base_i = (cx.floor().max(0.0) as usize).min(max_i);
        let base_j = (cy.floor().max(0.0) as usize).min(max_j);
        let a = (cx - base_i as f64).clamp(0.0, 1.0);
        let b = (cy - base_j as f64).clamp(0.0, 1.0);
        Some((base_i, base_j, a, b))
    }

    pub fn cell(&self, idx: usize) -> &GlobalCell {
        &self.cells[idx]
    }

    fn elevation_of(&self, idx: usize) -> Option<f64> {
        if idx == NONE {
            None
        } else {
            Some(self.cells[idx].elevation_m)
        }
    }

    fn compute_slope_aspect(&mut self) {
        for idx in 0..self.cells.len() {
            let neighbors = self.cells[idx].neighbors;
            let e_self = self.cells[idx].elevation_m;

            let e_w = self.elevation_of(neighbors[Dir::West as usize]);
            let e_e = self.elevation_of(neighbors[Dir::East as usize]);
            let dx = match (e_e, e_w) {
                (Some(e), Some(w)) => (e - w) * 0.5,
                (Some(e), None) => e - e_self,
                (None, Some(w)) => e_self - w,
                (None, None) => 0.0,
            };

            let e_s = self.elevation_of(neighbors[Dir::South as usize]);
            let e_n = self.elevation_of(neighbors[Dir::North as usize]);
            let dy = match (e_n, e_s) {
                (Some(n), Some(s)) => (n - s) * 0.5,
                (Some(n), None) => n - e_self,
                (None, Some(s)) => e_self - s,
                (None, None) => 0.0,
            };

            let dx_scaled = dx / self.cell_size_m;
            let dy_scaled = dy / self.cell_size_m;

            self.cells[idx].slope_rad = (dx_scaled.powi(2) + dy_scaled.powi(2)).sqrt();
            self.cells[idx].aspect_rad = if dx == 0.0 && dy == 0.0 {
                0.0
            } else {
                dy.atan2(dx)
            };
        }
    }

    fn compute_costs(&mut self, cost_config: &PlannerConfig) {
        let mut nominal = vec![0.0_f64; self.cells.len()];
        for idx in 0..self.cells.len() {
            let terrain = self.cells[idx].terrain;
            let slope = self.cells[idx].slope_rad;
            let (c, is_obstacle) = cost::nominal_cost(cost_config, terrain, slope);
            nominal[idx] = c;
            self.cells[idx].obstacle_ratio = if is_obstacle { 1.0 } else { 0.0 };
        }

        for idx in 0..self.cells.len() {
            let neighbor_costs: Vec<f64> = self.cells[idx]
                .neighbors
                .iter()
                .filter(|&&n| n != NONE)
                .map(|&n| nominal[n])
                .collect();
            self.cells[idx].cost = cost::smoothed_cost(nominal[idx], &neighbor_costs);
        }
    }

    /// Effective FM edge cost `C` for cell `idx`, per §4.1.
    fn effective_cost(&self, idx: usize, obstacle_cost: f64) -> f64 {
        let cell = &self.cells[idx];
        cost::effective_edge_cost(
            self.cell_size_m,
            cell.cost,
            cell.slope_rad,
            cell.obstacle_ratio,
            obstacle_cost,
        )
    }

    /// Rounds `waypoint` to its nearest global cell and sets it as the goal, rejecting it if the
    /// cell or any of its 4-neighbours is a hard obstacle.
    pub fn set_goal(&mut self, waypoint: Waypoint) -> Result<(), PlannerError> {
        let idx = self.nearest_index(waypoint.position());
        if self.cells[idx].is_hard_obstacle() {
            return Err(PlannerError::GoalForbidden);
        }
        for &n in &self.cells[idx].neighbors {
            if n != NONE && self.cells[n].is_hard_obstacle() {
                return Err(PlannerError::GoalForbidden);
            }
        }
        self.goal_index = Some(idx);
        Ok(())
    }

    pub fn goal_index(&self) -> Option<usize> {
        self.goal_index
    }

    /// Runs the Fast Marching solver for the current goal (§4.2) and returns the bilinearly
    /// interpolated expected cost at `start`.
    pub fn compute_global_field(&mut self, start: Waypoint, cost_config: &PlannerConfig) -> Result<f64, PlannerError> {
        let goal_idx = self.goal_index.ok_or(PlannerError::NoGoal)?;
        let obstacle_cost = cost_config.obstacle_cost();

        for cell in self.cells.iter_mut() {
            if matches!(cell.state, PropState::Closed) {
                cell.total_cost = f64::INFINITY;
                cell.state = PropState::Open;
            }
        }

        let mut heap = BinaryHeap::new();
        self.cells[goal_idx].total_cost = 0.0;
        heap.push(HeapEntry { key: OrderedFloat(0.0), idx: goal_idx });

        while let Some(HeapEntry { key, idx }) = heap.pop() {
            if matches!(self.cells[idx].state, PropState::Closed) {
                continue;
            }
            if key.0 != self.cells[idx].total_cost {
                // Stale entry from a since-superseded decrease-key push.
                continue;
            }

            self.cells[idx].state = PropState::Closed;

            let neighbors = self.cells[idx].neighbors;
            for &n in &neighbors {
                if n == NONE || matches!(self.cells[n].state, PropState::Closed) {
                    continue;
                }
                let c = self.effective_cost(n, obstacle_cost);
                let t = self.eikonal_update(n, c);
                if t < self.cells[n].total_cost {
                    self.cells[n].total_cost = t;
                    heap.push(HeapEntry { key: OrderedFloat(t), idx: n });
                }
            }
        }

        Ok(self.interpolate_total_cost(start.position()))
    }

    fn axis_min(&self, a: usize, b: usize) -> f64 {
        match (a == NONE, b == NONE) {
            (true, true) => f64::INFINITY,
            (true, false) => self.cells[b].total_cost,
            (false, true) => self.cells[a].total_cost,
            (false, false) => self.cells[a].total_cost.min(self.cells[b].total_cost),
        }
    }

    fn eikonal_update(&self, idx: usize, c: f64) -> f64 {
        let neighbors = self.cells[idx].neighbors;
        let ty = self.axis_min(neighbors[Dir::South as usize], neighbors[Dir::North as usize]);
        let tx = self.axis_min(neighbors[Dir::West as usize], neighbors[Dir::East as usize]);

        if (tx - ty).abs() < c && tx.is_finite() && ty.is_finite() {
            (tx + ty + (2.0 * c * c - (tx - ty).powi(2)).sqrt()) / 2.0
        } else {
            tx.min(ty) + c
        }
    }

    /// Bilinearly interpolates `total_cost` at a world position. Cells with `total_cost ==
    /// infinity` are treated as infinite in the interpolation (an unreached corner dominates).
    pub fn interpolate_total_cost(&self, pos: Point2<f64>) -> f64 {
        match self.bilinear_cell(pos) {
            Some((bi, bj, a, b)) => {
                let w = self.width;
                let v00 = self.cells[grid::flat_index(bi, bj, w)].total_cost;
                let v10 = self.cells[grid::flat_index(bi + 1, bj, w)].total_cost;
                let v01 = self.cells[grid::flat_index(bi, bj + 1, w)].total_cost;
                let v11 = self.cells[grid::flat_index(bi + 1, bj + 1, w)].total_cost;
                grid::bilinear(a, b, v00, v10, v01, v11)
            }
            None => f64::INFINITY,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
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
    fn test_flat_10x10_field() {
        let (map_cfg, cost_cfg) = flat_config();
        let elevation = vec![vec![0.0; 10]; 10];
        let terrain = vec![vec![1usize; 10]; 10];
        let mut grid = GlobalGrid::new(&map_cfg, &cost_cfg, &elevation, &terrain).unwrap();

        grid.set_goal(Waypoint::new(9.0, 9.0, 0.0, 0.0, 0)).unwrap();
        let expected = grid
            .compute_global_field(Waypoint::new(0.0, 0.0, 0.0, 0.0, 0), &cost_cfg)
            .unwrap();

        // Straight-line distance is sqrt(162) * unit cost (10), FM's 4-connected propagation
        // overestimates it somewhat; the spec tolerates 5%.
        let expected_lower_bound = 10.0 * (162f64).sqrt() * 0.95;
        assert!(expected >= expected_lower_bound, "{} too low", expected);

        let goal_idx = grid.goal_index().unwrap();
        assert_eq!(grid.cells[goal_idx].total_cost, 0.0);
    }

    #[test]
    fn test_goal_forbidden_on_obstacle() {
        let (map_cfg, cost_cfg) = flat_config();
        let mut terrain = vec![vec![1usize; 3]; 3];
        terrain[1][1] = 0;
        let elevation = vec![vec![0.0; 3]; 3];
        let mut grid = GlobalGrid::new(&map_cfg, &cost_cfg, &elevation, &terrain).unwrap();

        let result = grid.set_goal(Waypoint::new(1.0, 1.0, 0.0, 0.0, 0));
        assert!(matches!(result, Err(PlannerError::GoalForbidden)));
    }

    #[test]
    fn test_goal_reset_is_idempotent() {
        let (map_cfg, cost_cfg) = flat_config();
        let elevation = vec![vec![0.0; 5]; 5];
        let terrain = vec![vec![1usize; 5]; 5];
        let mut grid = GlobalGrid::new(&map_cfg, &cost_cfg, &elevation, &terrain).unwrap();

        grid.set_goal(Waypoint::new(4.0, 4.0, 0.0, 0.0, 0)).unwrap();
        grid.compute_global_field(Waypoint::new(0.0, 0.0, 0.0, 0.0, 0), &cost_cfg).unwrap();
        let first: Vec<f64> = grid.cells.iter().map(|c| c.total_cost).collect();

        grid.set_goal(Waypoint::new(4.0, 4.0, 0.0, 0.0, 0)).unwrap();
        grid.compute_global_field(Waypoint::new(0.0, 0.0, 0.0, 0.0, 0), &cost_cfg).unwrap();
        let second: Vec<f64> = grid.cells.iter().map(|c| c.total_cost).collect();

        assert_eq!(first, second);
    }
}
