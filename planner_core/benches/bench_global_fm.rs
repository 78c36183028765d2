//! # Global Fast Marching Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use planner_core::{MapConfig, Planner, PlannerConfig, Waypoint};

fn cost_config() -> PlannerConfig {
    PlannerConfig {
        terrain_table: vec![
            planner_core::types::TerrainDescriptor { optimal_locomotion_mode: "drive".into() },
            planner_core::types::TerrainDescriptor { optimal_locomotion_mode: "drive".into() },
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

fn global_fm_benchmark(c: &mut Criterion) {
    let side = 100usize;
    let elevation = vec![vec![0.0; side]; side];
    let terrain = vec![vec![1usize; side]; side];

    c.bench_function("GlobalGrid::compute_global_field::100x100", |b| {
        b.iter(|| {
            let mut planner = Planner::new(cost_config()).unwrap();
            planner.init_global_map(map_config(), &elevation, &terrain).unwrap();
            planner.set_goal(Waypoint::new(99.0, 99.0, 0.0, 0.0, 0)).unwrap();
            planner.compute_global_field(Waypoint::new(0.0, 0.0, 0.0, 0.0, 0)).unwrap()
        })
    });
}

criterion_group!(benches, global_fm_benchmark);
criterion_main!(benches);
