//! # Planner Facade (C8)
//!
//! Owns every piece of mutable planner state in one value and exposes the synchronous operations
//! a host dispatch loop calls once per tick, per §4.8 and §5 ("the planner holds all mutable data
//! in a single value; there is no module-level state").

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info};

use crate::config::{MapConfig, PlannerConfig};
use crate::error::{IngestOutcome, PlannerError};
use crate::global::GlobalGrid;
use crate::local::LocalLatticeManager;
use crate::path_extract;
use crate::repair;
use crate::risk;
use crate::types::{GridImage, Trajectory, TraversabilityFrame, Waypoint};

/// Radius, in metres, materialised around the robot's pose by [`Planner::update_local_map`].
/// Implementation-defined per §4.3; large enough to cover one sensor frame's footprint ahead of
/// the robot at typical traverse speeds.
pub const DEFAULT_NEIGHBOURHOOD_RADIUS_M: f64 = 6.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The two-scale path planner. Not re-entrant: callers must serialise access externally.
pub struct Planner {
    cost_config: PlannerConfig,
    map_config: Option<MapConfig>,
    global: Option<GlobalGrid>,
    local: Option<LocalLatticeManager>,
    trajectory: Trajectory,
    neighbourhood_radius_m: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Planner {
    /// Builds a planner from its construction config (§6). The global map must still be
    /// initialised with [`Planner::init_global_map`] before any other operation runs.
    pub fn new(cost_config: PlannerConfig) -> Result<Self, PlannerError> {
        cost_config.validate().map_err(PlannerError::InvalidConfig)?;
        Ok(Self {
            cost_config,
            map_config: None,
            global: None,
            local: None,
            trajectory: Vec::new(),
            neighbourhood_radius_m: DEFAULT_NEIGHBOURHOOD_RADIUS_M,
        })
    }

    /// Overrides the local-lattice materialisation radius used by [`Planner::update_local_map`].
    pub fn set_neighbourhood_radius_m(&mut self, radius_m: f64) {
        self.neighbourhood_radius_m = radius_m;
    }

    fn global(&self) -> Result<&GlobalGrid, PlannerError> {
        self.global.as_ref().ok_or(PlannerError::InvalidConfig("global map has not been initialised"))
    }

    fn global_mut(&mut self) -> Result<&mut GlobalGrid, PlannerError> {
        self.global.as_mut().ok_or(PlannerError::InvalidConfig("global map has not been initialised"))
    }

    fn local_mut(&mut self) -> Result<&mut LocalLatticeManager, PlannerError> {
        self.local.as_mut().ok_or(PlannerError::InvalidConfig("global map has not been initialised"))
    }

    /// `initGlobalMap`: builds C1, computes slope/aspect, nominal and smoothed costs, and resets
    /// the local lattice manager. Also resets the current trajectory, per the goal-reset lifecycle
    /// in §3.
    pub fn init_global_map(
        &mut self,
        map_config: MapConfig,
        elevation: &[Vec<f64>],
        terrain: &[Vec<usize>],
    ) -> Result<(), PlannerError> {
        let r = map_config.local_ratio().map_err(PlannerError::InvalidConfig)?;
        let global = GlobalGrid::new(&map_config, &self.cost_config, elevation, terrain)?;
        let local = LocalLatticeManager::new(global.len(), r, map_config.local_cell_size_m);

        info!("Global map initialised: {}x{} cells, local ratio {}", global.width, global.height, r);

        self.global = Some(global);
        self.local = Some(local);
        self.map_config = Some(map_config);
        self.trajectory.clear();
        Ok(())
    }

    /// `setGoal`.
    pub fn set_goal(&mut self, waypoint: Waypoint) -> Result<(), PlannerError> {
        self.global_mut()?.set_goal(waypoint)
    }

    /// `computeGlobalField`: runs §4.2 and returns the interpolated expected cost at `start`.
    pub fn compute_global_field(&mut self, start: Waypoint) -> Result<f64, PlannerError> {
        let cost_config = self.cost_config.clone();
        let cost = self.global_mut()?.compute_global_field(start, &cost_config)?;
        debug!("Global field computed, expected cost from start: {:.3}", cost);
        Ok(cost)
    }

    /// `updateLocalMap`: materialises patches within [`Planner::set_neighbourhood_radius_m`] of
    /// `pose`.
    pub fn update_local_map(&mut self, pose: Waypoint) -> Result<(), PlannerError> {
        let radius = self.neighbourhood_radius_m;
        let not_init = || PlannerError::InvalidConfig("global map has not been initialised");
        let global = self.global.as_ref().ok_or_else(not_init)?;
        let local = self.local.as_mut().ok_or_else(not_init)?;
        local.update_neighbourhood(global, pose.position(), radius);
        Ok(())
    }

    /// `ingestTraversabilityFrame`: §4.4 then §4.7 if the frame newly blocks the current path.
    pub fn ingest_traversability_frame(&mut self, frame: TraversabilityFrame) -> Result<IngestOutcome, PlannerError> {
        let risk_distance_m = self.cost_config.risk_distance_m;
        let not_init = || PlannerError::InvalidConfig("global map has not been initialised");
        let global = self.global.as_mut().ok_or_else(not_init)?;
        let local = self.local.as_mut().ok_or_else(not_init)?;
        let blocked = risk::ingest_frame(global, local, &frame, &self.trajectory, risk_distance_m);

        if !blocked {
            return Ok(IngestOutcome::Clean);
        }

        self.re_evaluate_path()
    }

    /// `extractPath`: §4.5 from `start` to the current goal.
    pub fn extract_path(&mut self, start: Waypoint) -> Result<Trajectory, PlannerError> {
        let cost_config = self.cost_config.clone();
        let trajectory = path_extract::extract_global_path(self.global()?, &cost_config, start)?;
        self.trajectory = trajectory.clone();
        Ok(trajectory)
    }

    /// `reEvaluatePath`: §4.7 over the planner's current full trajectory.
    pub fn re_evaluate_path(&mut self) -> Result<IngestOutcome, PlannerError> {
        let not_init = || PlannerError::InvalidConfig("global map has not been initialised");
        let global = self.global.as_ref().ok_or_else(not_init)?;
        let local = self.local.as_mut().ok_or_else(not_init)?;

        let (min_index, max_index) = match repair::evaluate(global, local, &self.trajectory) {
            Some(run) => run,
            None => return Ok(IngestOutcome::Clean),
        };

        let cost_config = self.cost_config.clone();
        repair::repair(global, local, &cost_config, &mut self.trajectory, min_index, max_index)?;
        info!("Path repaired around blocked segment [{}, {}]", min_index, max_index);
        Ok(IngestOutcome::Repaired)
    }

    /// The planner's current trajectory, as last produced by [`Planner::extract_path`] or
    /// updated by a repair.
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// A snapshot of the global `totalCost` field for visualisation.
    pub fn cost_map_image(&self) -> Result<GridImage, PlannerError> {
        let global = self.global()?;
        let data: Vec<f64> = (0..global.len()).map(|idx| global.cell(idx).total_cost).collect();
        Ok(GridImage {
            width: global.width,
            height: global.height,
            data,
            scale_x: global.cell_size_m,
            scale_y: global.cell_size_m,
            center_x: global.origin.x + (global.width as f64 - 1.0) * 0.5 * global.cell_size_m,
            center_y: global.origin.y + (global.height as f64 - 1.0) * 0.5 * global.cell_size_m,
        })
    }

    /// A snapshot of per-global-cell maximum risk across its materialised local patch, for
    /// visualisation. Unmaterialised cells report `0.0`.
    pub fn risk_map_image(&self) -> Result<GridImage, PlannerError> {
        let global = self.global()?;
        let local = self.local.as_ref().ok_or(PlannerError::InvalidConfig("global map has not been initialised"))?;
        let mut data = vec![0.0_f64; global.len()];
        for idx in local.materialized_patch_ids() {
            if let Some(patch) = local.patch(idx) {
                data[idx] = patch.cells.iter().map(|c| c.risk).fold(0.0_f64, f64::max);
            }
        }
        Ok(GridImage {
            width: global.width,
            height: global.height,
            data,
            scale_x: global.cell_size_m,
            scale_y: global.cell_size_m,
            center_x: global.origin.x + (global.width as f64 - 1.0) * 0.5 * global.cell_size_m,
            center_y: global.origin.y + (global.height as f64 - 1.0) * 0.5 * global.cell_size_m,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::TerrainDescriptor;

    fn cost_config() -> PlannerConfig {
        PlannerConfig {
            terrain_table: vec![
                TerrainDescriptor { optimal_locomotion_mode: "drive".into() },
                TerrainDescriptor { optimal_locomotion_mode: "drive".into() },
            ],
            cost_data: vec![100.0, 10.0],
            slope_range_deg: vec![0.0],
            locomotion_modes: vec!["drive".into()],
            risk_distance_m: 0.5,
        }
    }

    fn map_config() -> MapConfig {
        MapConfig {
            global_cell_size_m: 1.0,
            local_cell_size_m: 0.1,
            origin_x_m: 0.0,
            origin_y_m: 0.0,
        }
    }

    #[test]
    fn test_full_tick_happy_path() {
        let mut planner = Planner::new(cost_config()).unwrap();
        let elevation = vec![vec![0.0; 10]; 10];
        let terrain = vec![vec![1usize; 10]; 10];
        planner.init_global_map(map_config(), &elevation, &terrain).unwrap();

        planner.set_goal(Waypoint::new(9.0, 9.0, 0.0, 0.0, 0)).unwrap();
        let start = Waypoint::new(0.0, 0.0, 0.0, 0.0, 0);
        let cost = planner.compute_global_field(start).unwrap();
        assert!(cost > 0.0);

        planner.update_local_map(start).unwrap();
        let path = planner.extract_path(start).unwrap();
        assert!(path.len() > 1);
        assert_eq!(planner.trajectory().len(), path.len());

        let cost_map = planner.cost_map_image().unwrap();
        assert_eq!(cost_map.width, 10);
        assert_eq!(cost_map.height, 10);
    }

    #[test]
    fn test_goal_forbidden_propagates_from_facade() {
        let mut planner = Planner::new(cost_config()).unwrap();
        let elevation = vec![vec![0.0; 3]; 3];
        let mut terrain = vec![vec![1usize; 3]; 3];
        terrain[1][1] = 0;
        planner.init_global_map(map_config(), &elevation, &terrain).unwrap();

        let result = planner.set_goal(Waypoint::new(1.0, 1.0, 0.0, 0.0, 0));
        assert!(matches!(result, Err(PlannerError::GoalForbidden)));
    }

    /// Local obstacle discovery: after a clean extraction, a 3x3 obstacle block injected mid-path
    /// must trigger a repair whose new trajectory clears every obstacle local cell by at least
    /// `riskDistance - 0.5*localCellSize`.
    #[test]
    fn test_ingest_frame_repairs_blocked_path() {
        let mut planner = Planner::new(cost_config()).unwrap();
        let elevation = vec![vec![0.0; 10]; 10];
        let terrain = vec![vec![1usize; 10]; 10];
        planner.init_global_map(map_config(), &elevation, &terrain).unwrap();
        planner.set_goal(Waypoint::new(9.0, 9.0, 0.0, 0.0, 0)).unwrap();
        let start = Waypoint::new(0.0, 0.0, 0.0, 0.0, 0);
        planner.compute_global_field(start).unwrap();
        let path = planner.extract_path(start).unwrap();

        let mid = path[path.len() / 2];
        planner.update_local_map(mid).unwrap();

        let frame = TraversabilityFrame {
            width: 3,
            height: 3,
            stride: 3,
            pixels: vec![0u8; 9],
            origin: mid.position(),
            resolution_m: 0.1,
        };
        let outcome = planner.ingest_traversability_frame(frame).unwrap();
        assert_eq!(outcome, IngestOutcome::Repaired);

        let risk_distance_m = cost_config().risk_distance_m;
        let min_clearance = risk_distance_m - 0.5 * map_config().local_cell_size_m;
        let obstacle_centre = mid.position();
        for wp in planner.trajectory() {
            assert!(
                (wp.position() - obstacle_centre).norm() >= min_clearance - 1e-6,
                "waypoint {:?} too close to obstacle centre",
                wp
            );
        }
    }

    /// Choke point: a wall of obstacles with a single one-cell gap forces the extracted path
    /// through that gap.
    #[test]
    fn test_choke_point_routes_through_gap() {
        let mut planner = Planner::new(cost_config()).unwrap();
        let elevation = vec![vec![0.0; 5]; 5];
        let mut terrain = vec![vec![1usize; 5]; 5];
        // Row j=2 is a wall except at column i=2, which is the gap.
        for i in 0..5 {
            if i != 2 {
                terrain[2][i] = 0;
            }
        }
        planner.init_global_map(map_config(), &elevation, &terrain).unwrap();
        planner.set_goal(Waypoint::new(4.0, 2.0, 0.0, 0.0, 0)).unwrap();
        let start = Waypoint::new(0.0, 2.0, 0.0, 0.0, 0);
        planner.compute_global_field(start).unwrap();
        let path = planner.extract_path(start).unwrap();

        let passes_through_gap = path.iter().any(|wp| (wp.position() - nalgebra::Point2::new(2.0, 2.0)).norm() < 1.0);
        assert!(passes_through_gap, "path did not route through the choke point");
    }

    /// Goal surrounded: flooding the goal's halo with obstacles after a clean extraction must
    /// truncate the repaired trajectory short of the original, unreachable goal.
    #[test]
    fn test_goal_surrounded_truncates_trajectory() {
        let mut planner = Planner::new(cost_config()).unwrap();
        let elevation = vec![vec![0.0; 10]; 10];
        let terrain = vec![vec![1usize; 10]; 10];
        planner.init_global_map(map_config(), &elevation, &terrain).unwrap();
        let goal = Waypoint::new(9.0, 9.0, 0.0, 0.0, 0);
        planner.set_goal(goal).unwrap();
        let start = Waypoint::new(0.0, 0.0, 0.0, 0.0, 0);
        planner.compute_global_field(start).unwrap();
        let original_path = planner.extract_path(start).unwrap();
        let original_len = original_path.len();

        planner.update_local_map(goal).unwrap();
        // A block wide enough to cover the goal's full risk halo.
        let frame = TraversabilityFrame {
            width: 20,
            height: 20,
            stride: 20,
            pixels: vec![0u8; 400],
            origin: goal.position(),
            resolution_m: 0.1,
        };
        let outcome = planner.ingest_traversability_frame(frame).unwrap();
        assert_eq!(outcome, IngestOutcome::Repaired);
        assert!(planner.trajectory().len() < original_len);
    }
}
