//! # Planner CLI
//!
//! Manual-run smoke-test harness for `planner_core`: loads a construction config, a per-map
//! config, and a JSON-encoded elevation/terrain map, then drives one planning tick from a start
//! pose to a goal pose and prints the resulting trajectory. Not a long-running service - there is
//! no network listener or daemon loop here, those belong to the host rover's executables.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::PathBuf;

use clap::Parser;
use color_eyre::{eyre::Context, Result};
use log::{info, LevelFilter};
use serde::Deserialize;

use planner_core::{MapConfig, Planner, PlannerConfig, Waypoint};
use util::logger::logger_init;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Command-line options for a single planning run.
#[derive(Parser, Debug)]
#[clap(name = "planner_cli", version, about = "Run the two-scale path planner over a map and print the resulting trajectory")]
struct Cli {
    /// Path to the construction config TOML (terrain table, cost table, slope range, locomotion
    /// modes, risk distance).
    #[clap(long)]
    planner_config: PathBuf,

    /// Path to the per-map config TOML (cell sizes, origin).
    #[clap(long)]
    map_config: PathBuf,

    /// Path to a JSON file holding the `elevation` and `terrain` matrices.
    #[clap(long)]
    map_data: PathBuf,

    #[clap(long, allow_hyphen_values = true)]
    start_x: f64,
    #[clap(long, allow_hyphen_values = true)]
    start_y: f64,
    #[clap(long, allow_hyphen_values = true, default_value = "0.0")]
    start_heading_rad: f64,

    #[clap(long, allow_hyphen_values = true)]
    goal_x: f64,
    #[clap(long, allow_hyphen_values = true)]
    goal_y: f64,

    /// Minimum log level.
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,

    /// Log file path.
    #[clap(long, default_value = "planner_cli.log")]
    log_file: PathBuf,
}

/// JSON-encoded map data: row-major `[row][col]` elevation and terrain-class matrices.
#[derive(Debug, Deserialize)]
struct MapData {
    elevation: Vec<Vec<f64>>,
    terrain: Vec<Vec<usize>>,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    logger_init(cli.log_level, &cli.log_file).wrap_err("Failed to initialise logging")?;

    info!("Planner CLI starting");

    let planner_config: PlannerConfig =
        util::params::load(cli.planner_config.to_str().ok_or_else(|| color_eyre::eyre::eyre!("planner_config path is not valid UTF-8"))?)
            .wrap_err("Failed to load planner config")?;
    let map_config: MapConfig =
        util::params::load(cli.map_config.to_str().ok_or_else(|| color_eyre::eyre::eyre!("map_config path is not valid UTF-8"))?)
            .wrap_err("Failed to load map config")?;

    info!("Configuration loaded");

    let map_data_str = std::fs::read_to_string(&cli.map_data).wrap_err("Failed to read map data file")?;
    let map_data: MapData = serde_json::from_str(&map_data_str).wrap_err("Failed to parse map data file")?;

    let mut planner = Planner::new(planner_config).wrap_err("Failed to construct planner")?;
    planner
        .init_global_map(map_config, &map_data.elevation, &map_data.terrain)
        .wrap_err("Failed to initialise global map")?;

    info!("Global map initialised");

    let start = Waypoint::new(cli.start_x, cli.start_y, 0.0, cli.start_heading_rad, 0);
    let goal = Waypoint::new(cli.goal_x, cli.goal_y, 0.0, 0.0, 0);

    planner.set_goal(goal).wrap_err("Goal rejected")?;
    let expected_cost = planner.compute_global_field(start).wrap_err("Global field computation failed")?;
    info!("Global field computed, expected cost from start: {:.3}", expected_cost);

    planner.update_local_map(start).wrap_err("Failed to materialise local lattice around start")?;

    let trajectory = planner.extract_path(start).wrap_err("Path extraction failed")?;

    info!("Extracted trajectory with {} waypoints", trajectory.len());

    for wp in &trajectory {
        println!(
            "{:.4} {:.4} {:.4} {:.4} {}",
            wp.x_m, wp.y_m, wp.z_m, wp.heading_rad, wp.locomotion_mode
        );
    }

    Ok(())
}
