//! # Core Types
//!
//! Plain data types shared across the planner: waypoints, terrain descriptors, and the
//! traversability sensor frame ingested by the [`crate::risk`] engine.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single point on a planned trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x_m: f64,
    pub y_m: f64,
    pub z_m: f64,

    /// Heading in the world frame, radians, `atan2` convention.
    pub heading_rad: f64,

    /// Index into the configured `locomotionModes` table.
    pub locomotion_mode: usize,
}

impl Waypoint {
    pub fn new(x_m: f64, y_m: f64, z_m: f64, heading_rad: f64, locomotion_mode: usize) -> Self {
        Self {
            x_m,
            y_m,
            z_m,
            heading_rad,
            locomotion_mode,
        }
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x_m, self.y_m)
    }

    pub fn to_vector2(&self) -> Vector2<f64> {
        Vector2::new(self.x_m, self.y_m)
    }
}

/// A planned trajectory: an ordered sequence of waypoints from start to goal.
pub type Trajectory = Vec<Waypoint>;

/// Static description of one terrain class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainDescriptor {
    /// Name of the locomotion mode that is nominally optimal on this terrain, used purely for
    /// reporting; the cost model still searches all modes when selecting the minimum.
    pub optimal_locomotion_mode: String,
}

/// A decoded traversability sensor frame, provided by an external perception collaborator.
///
/// Pixel `(row, col)` is obstacle iff `pixels[row * stride + col] == 0`; any non-zero value is
/// free. The frame is centred at `origin` in world coordinates, with `resolution_m` metres per
/// pixel.
#[derive(Debug, Clone)]
pub struct TraversabilityFrame {
    pub width: usize,
    pub height: usize,

    /// Row length in elements, may exceed `width` if the buffer is padded.
    pub stride: usize,

    pub pixels: Vec<u8>,

    /// World-frame pose at which the frame is centred.
    pub origin: Point2<f64>,

    /// Metres per pixel.
    pub resolution_m: f64,
}

impl TraversabilityFrame {
    /// Returns `true` if the pixel at `(row, col)` is obstacle.
    pub fn is_obstacle(&self, row: usize, col: usize) -> bool {
        self.pixels[row * self.stride + col] == 0
    }

    /// World-frame position of the centre of pixel `(row, col)`.
    pub fn pixel_position(&self, row: usize, col: usize) -> Point2<f64> {
        let half_w = self.width as f64 * 0.5;
        let half_h = self.height as f64 * 0.5;
        Point2::new(
            self.origin.x + (col as f64 - half_w + 0.5) * self.resolution_m,
            self.origin.y + (row as f64 - half_h + 0.5) * self.resolution_m,
        )
    }
}

/// A 2D float image with the metadata needed by external visualisation collaborators to place
/// it in world coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
    pub scale_x: f64,
    pub scale_y: f64,
    pub center_x: f64,
    pub center_y: f64,
}

impl GridImage {
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.width + col]
    }
}
