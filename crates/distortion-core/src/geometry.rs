//! Track geometry - read-only mapping from telemetry to world coordinates
//!
//! The vehicle reports where it is in track terms (road piece, location id,
//! lateral offset). A [`TrackGeometry`] turns that into a [`WorldPose`].
//! Building the geometry is the caller's business; [`TrackLayout`] is a
//! table-driven implementation that can be loaded from configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{Position, WorldPose};

/// Telemetry coordinates of a vehicle on the track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackQuery {
    pub piece: u8,
    pub location: u8,
    /// Lateral offset from the road center in millimetres (positive = right)
    pub offset_from_center: f32,
    /// Vehicle travels against the piece's placement direction
    pub reversed: bool,
}

/// Read-only track geometry
pub trait TrackGeometry: Send + Sync {
    /// Resolve a telemetry position, `None` if the piece is unknown
    fn resolve(&self, query: &TrackQuery) -> Option<WorldPose>;
}

/// Placement of one road piece in world coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiecePlacement {
    /// Road piece id as reported by the vehicle
    pub piece: u8,
    /// Center-line start point
    pub x: f64,
    pub y: f64,
    /// Heading at the start point (degrees, counter-clockwise from +x)
    #[serde(default)]
    pub heading_deg: f64,
    /// Center-line length in millimetres
    pub length_mm: f64,
    /// Total heading change over the piece: 0 straight, positive left
    #[serde(default)]
    pub turn_deg: f64,
    /// Number of location ids spread along the piece
    #[serde(default = "default_locations")]
    pub locations: u8,
}

fn default_locations() -> u8 {
    16
}

impl PiecePlacement {
    /// Pose on the center line after `distance` millimetres, then shifted
    /// `lateral` millimetres to the right of the placement direction
    fn pose_at(&self, distance: f64, lateral: f64) -> WorldPose {
        let h0 = self.heading_deg.to_radians();
        let curvature = if self.length_mm > 0.0 {
            self.turn_deg.to_radians() / self.length_mm
        } else {
            0.0
        };

        let (cx, cy, heading) = if curvature.abs() < f64::EPSILON {
            (
                self.x + distance * h0.cos(),
                self.y + distance * h0.sin(),
                h0,
            )
        } else {
            let h = h0 + curvature * distance;
            (
                self.x + (h.sin() - h0.sin()) / curvature,
                self.y - (h.cos() - h0.cos()) / curvature,
                h,
            )
        };

        WorldPose {
            position: Position::new(cx + lateral * heading.sin(), cy - lateral * heading.cos()),
            heading_deg: normalize_deg(heading.to_degrees()),
        }
    }
}

/// Table of placed road pieces
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackLayout {
    #[serde(default)]
    pub pieces: Vec<PiecePlacement>,
    #[serde(skip)]
    index: HashMap<u8, usize>,
}

impl TrackLayout {
    pub fn new(pieces: Vec<PiecePlacement>) -> Self {
        let mut layout = Self {
            pieces,
            index: HashMap::new(),
        };
        layout.reindex();
        layout
    }

    /// Rebuild the piece lookup after deserialization
    pub fn reindex(&mut self) {
        self.index = self
            .pieces
            .iter()
            .enumerate()
            .map(|(i, p)| (p.piece, i))
            .collect();
    }

    pub fn get(&self, piece: u8) -> Option<&PiecePlacement> {
        match self.index.get(&piece) {
            Some(&i) => self.pieces.get(i),
            None => self.pieces.iter().find(|p| p.piece == piece),
        }
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

impl TrackGeometry for TrackLayout {
    fn resolve(&self, query: &TrackQuery) -> Option<WorldPose> {
        let placement = self.get(query.piece)?;
        let locations = placement.locations.max(1);
        let fraction = (f64::from(query.location.min(locations)) / f64::from(locations)).min(1.0);

        let mut pose = placement.pose_at(
            fraction * placement.length_mm,
            f64::from(query.offset_from_center),
        );
        if query.reversed {
            pose.heading_deg = normalize_deg(pose.heading_deg + 180.0);
        }
        Some(pose)
    }
}

fn normalize_deg(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}
