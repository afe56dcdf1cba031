//! World-space pose types

use serde::{Deserialize, Serialize};

/// Point in track world coordinates (millimetres)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Position and heading of a vehicle on the track
///
/// Heading is in degrees, counter-clockwise from the +x axis, normalized
/// to `[0, 360)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldPose {
    pub position: Position,
    pub heading_deg: f64,
}
