//! # Local Refinement Lattice (C4)
//!
//! Fine `R x R` lattices lazily materialised inside the global cells the robot actually visits.
//! Patches are addressed by the flat index of the global cell that owns them (a "stable patch
//! id" per the design notes), so cross-patch neighbour links are `(patch_id, local_flat_idx)`
//! pairs rather than raw pointers — the same cyclic-graph-as-arithmetic trick used by
//! [`crate::global::GlobalGrid`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::global::{GlobalGrid, PropState};
use crate::grid::{self, Dir, NONE};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Sentinel cross-patch reference meaning "no neighbour materialised on this side".
pub const NONE_REF: (usize, usize) = (NONE, NONE);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One entry of a [`LocalPatch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalCell {
    pub sub_i: usize,
    pub sub_j: usize,

    pub risk: f64,
    pub is_obstacle: bool,

    pub total_cost: f64,
    pub state: PropState,

    /// Cross-patch-capable neighbours in `[South, West, East, North]` order: `(patch_id,
    /// local_flat_idx)`, or [`NONE_REF`] if that side is unmaterialised.
    pub neighbors: [(usize, usize); 4],
}

/// An `R x R` fine lattice owned by one global cell.
#[derive(Debug, Clone)]
pub struct LocalPatch {
    pub global_idx: usize,
    pub r: usize,
    pub cells: Vec<LocalCell>,
}

impl LocalPatch {
    pub fn local_flat(&self, sub_i: usize, sub_j: usize) -> usize {
        grid::flat_index(sub_i, sub_j, self.r)
    }
}

/// Owns every materialised [`LocalPatch`], keyed by the global cell's flat index.
#[derive(Debug, Clone)]
pub struct LocalLatticeManager {
    patches: Vec<Option<LocalPatch>>,
    pub r: usize,
    pub local_cell_size_m: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LocalLatticeManager {
    pub fn new(global_len: usize, r: usize, local_cell_size_m: f64) -> Self {
        Self {
            patches: vec![None; global_len],
            r,
            local_cell_size_m,
        }
    }

    pub fn is_materialized(&self, global_idx: usize) -> bool {
        self.patches[global_idx].is_some()
    }

    pub fn patch(&self, global_idx: usize) -> Option<&LocalPatch> {
        self.patches[global_idx].as_ref()
    }

    pub fn patch_mut(&mut self, global_idx: usize) -> Option<&mut LocalPatch> {
        self.patches[global_idx].as_mut()
    }

    /// Materialises the patch owned by `global_idx` if it does not already exist, wiring
    /// interior links and bidirectionally stitching to any already-materialised neighbour
    /// patches, per §4.3.
    pub fn expand(&mut self, global: &GlobalGrid, global_idx: usize) {
        if self.is_materialized(global_idx) {
            return;
        }

        let r = self.r;
        let mut cells = Vec::with_capacity(r * r);
        for sub_j in 0..r {
            for sub_i in 0..r {
                let mut neighbors = [NONE_REF; 4];
                if let Some((ni, nj)) = grid::neighbor_cell(sub_i, sub_j, r, r, Dir::South) {
                    neighbors[Dir::South as usize] = (global_idx, grid::flat_index(ni, nj, r));
                }
                if let Some((ni, nj)) = grid::neighbor_cell(sub_i, sub_j, r, r, Dir::West) {
                    neighbors[Dir::West as usize] = (global_idx, grid::flat_index(ni, nj, r));
                }
                if let Some((ni, nj)) = grid::neighbor_cell(sub_i, sub_j, r, r, Dir::East) {
                    neighbors[Dir::East as usize] = (global_idx, grid::flat_index(ni, nj, r));
                }
                if let Some((ni, nj)) = grid::neighbor_cell(sub_i, sub_j, r, r, Dir::North) {
                    neighbors[Dir::North as usize] = (global_idx, grid::flat_index(ni, nj, r));
                }
                cells.push(LocalCell {
                    sub_i,
                    sub_j,
                    risk: 0.0,
                    is_obstacle: false,
                    total_cost: f64::INFINITY,
                    state: PropState::Open,
                    neighbors,
                });
            }
        }

        self.patches[global_idx] = Some(LocalPatch { global_idx, r, cells });

        let global_neighbors = global.cell(global_idx).neighbors;
        for (k, dir) in grid::DIRS.iter().enumerate() {
            let other_global = global_neighbors[k];
            if other_global == NONE || !self.is_materialized(other_global) {
                continue;
            }
            self.wire_boundary(global_idx, other_global, *dir);
        }
    }

    /// Bidirectionally wires the shared boundary between `a` (already materialised) and `b`
    /// (already materialised), where `a_to_b_dir` is the direction from `a` towards `b`.
    fn wire_boundary(&mut self, a: usize, b: usize, a_to_b_dir: Dir) {
        let r = self.r;
        let (b_to_a_dir, a_edge_fixed, b_edge_fixed) = match a_to_b_dir {
            Dir::East => (Dir::West, r - 1, 0),
            Dir::West => (Dir::East, 0, r - 1),
            Dir::North => (Dir::South, r - 1, 0),
            Dir::South => (Dir::North, 0, r - 1),
        };

        for k in 0..r {
            let (a_sub_i, a_sub_j, b_sub_i, b_sub_j) = match a_to_b_dir {
                Dir::East | Dir::West => (a_edge_fixed, k, b_edge_fixed, k),
                Dir::North | Dir::South => (k, a_edge_fixed, k, b_edge_fixed),
            };
            let a_idx = grid::flat_index(a_sub_i, a_sub_j, r);
            let b_idx = grid::flat_index(b_sub_i, b_sub_j, r);

            self.patches[a].as_mut().unwrap().cells[a_idx].neighbors[a_to_b_dir as usize] = (b, b_idx);
            self.patches[b].as_mut().unwrap().cells[b_idx].neighbors[b_to_a_dir as usize] = (a, a_idx);
        }
    }

    /// World position of the lower-left corner of the footprint owned by global cell
    /// `global_idx`.
    fn patch_origin(&self, global: &GlobalGrid, global_idx: usize) -> Point2<f64> {
        let cell = global.cell(global_idx);
        let center = global.node_position(cell.i, cell.j);
        let half = global.cell_size_m * 0.5;
        Point2::new(center.x - half, center.y - half)
    }

    /// World position of the centre of local cell `(sub_i, sub_j)` owned by `global_idx`.
    pub fn local_cell_position(&self, global: &GlobalGrid, global_idx: usize, sub_i: usize, sub_j: usize) -> Point2<f64> {
        let origin = self.patch_origin(global, global_idx);
        Point2::new(
            origin.x + (sub_i as f64 + 0.5) * self.local_cell_size_m,
            origin.y + (sub_j as f64 + 0.5) * self.local_cell_size_m,
        )
    }

    /// Finds the nearest global cell to `world_pos`, materialises it if necessary, and returns
    /// `(patch_id, local_flat_idx)` of the local cell containing `world_pos`, per §4.3.
    pub fn get_local_cell(&mut self, global: &GlobalGrid, world_pos: Point2<f64>) -> (usize, usize) {
        let global_idx = global.nearest_index(world_pos);
        self.expand(global, global_idx);

        let origin = self.patch_origin(global, global_idx);
        let r = self.r as f64;
        let frac_x = ((world_pos.x - origin.x) / self.local_cell_size_m / r).clamp(0.0, 0.999_999);
        let frac_y = ((world_pos.y - origin.y) / self.local_cell_size_m / r).clamp(0.0, 0.999_999);

        let sub_i = (frac_x * r) as usize;
        let sub_j = (frac_y * r) as usize;
        let sub_i = sub_i.min(self.r - 1);
        let sub_j = sub_j.min(self.r - 1);

        (global_idx, grid::flat_index(sub_i, sub_j, self.r))
    }

    /// Materialises every global cell whose footprint falls within `radius_m` of `pose`, per
    /// the neighbourhood-update behaviour in §4.3.
    pub fn update_neighbourhood(&mut self, global: &GlobalGrid, pose: Point2<f64>, radius_m: f64) {
        let cell_span = (radius_m / global.cell_size_m).ceil() as isize + 1;
        let center_i = ((pose.x - global.origin.x) / global.cell_size_m).round() as isize;
        let center_j = ((pose.y - global.origin.y) / global.cell_size_m).round() as isize;

        for dj in -cell_span..=cell_span {
            for di in -cell_span..=cell_span {
                let i = center_i + di;
                let j = center_j + dj;
                if i < 0 || j < 0 || i as usize >= global.width || j as usize >= global.height {
                    continue;
                }
                let (i, j) = (i as usize, j as usize);
                let pos = global.node_position(i, j);
                if (pos - pose).norm() <= radius_m {
                    self.expand(global, grid::flat_index(i, j, global.width));
                }
            }
        }
    }

    pub fn cell_at(&self, patch_id: usize, local_idx: usize) -> &LocalCell {
        &self.patches[patch_id].as_ref().unwrap().cells[local_idx]
    }

    pub fn cell_at_mut(&mut self, patch_id: usize, local_idx: usize) -> &mut LocalCell {
        &mut self.patches[patch_id].as_mut().unwrap().cells[local_idx]
    }

    /// Resets every `CLOSED` local cell across all materialised patches back to `OPEN` with
    /// infinite `total_cost`, in preparation for a new local FM repair (§4.6).
    pub fn reset_closed(&mut self) {
        for patch in self.patches.iter_mut().flatten() {
            for cell in patch.cells.iter_mut() {
                if matches!(cell.state, PropState::Closed) {
                    cell.state = PropState::Open;
                    cell.total_cost = f64::INFINITY;
                }
            }
        }
    }

    pub fn materialized_patch_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.patches
            .iter()
            .enumerate()
            .filter_map(|(idx, p)| p.as_ref().map(|_| idx))
    }
}
