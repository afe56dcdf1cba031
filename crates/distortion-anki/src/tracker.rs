//! Position tracking
//!
//! Turns location and transition notifications into world poses using a
//! read-only [`TrackGeometry`]. Each location update produces at most one
//! pose, emitted straight to the sink.

use std::sync::Arc;

use distortion_core::{EventSink, TrackGeometry, TrackQuery, VehicleIdentity, WorldPose};
use tracing::debug;

use crate::protocol::{LocationUpdate, TransitionUpdate};

/// Last known track position of a vehicle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackedPosition {
    pub piece: Option<u8>,
    pub prev_piece: Option<u8>,
    pub location: u8,
    pub offset_from_center: f32,
    pub direction: u8,
}

impl TrackedPosition {
    /// Any non-zero direction flag means travel against the piece direction
    pub fn is_reversed(&self) -> bool {
        self.direction != 0
    }
}

pub struct PositionTracker {
    vehicle: VehicleIdentity,
    geometry: Arc<dyn TrackGeometry>,
    sink: Arc<dyn EventSink>,
    last: TrackedPosition,
}

impl PositionTracker {
    pub fn new(
        vehicle: VehicleIdentity,
        geometry: Arc<dyn TrackGeometry>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            vehicle,
            geometry,
            sink,
            last: TrackedPosition::default(),
        }
    }

    pub fn last_known(&self) -> TrackedPosition {
        self.last
    }

    /// Record a location update and emit its world pose
    ///
    /// Returns `None` (and emits nothing) when the geometry does not know
    /// the reported piece.
    pub fn on_location(&mut self, update: &LocationUpdate) -> Option<WorldPose> {
        if self.last.piece != Some(update.piece) {
            self.last.prev_piece = self.last.piece;
        }
        self.last.piece = Some(update.piece);
        self.last.location = update.location;
        self.last.offset_from_center = update.offset;
        self.last.direction = update.direction;

        let query = TrackQuery {
            piece: update.piece,
            location: update.location,
            offset_from_center: update.offset,
            reversed: self.last.is_reversed(),
        };
        let Some(pose) = self.geometry.resolve(&query) else {
            debug!(vehicle = %self.vehicle, piece = update.piece, "Piece not in track geometry");
            return None;
        };

        self.sink
            .emit_position(&self.vehicle, pose.position, pose.heading_deg);
        Some(pose)
    }

    /// Record a road piece transition
    pub fn on_transition(&mut self, update: &TransitionUpdate) {
        self.last.piece = Some(update.piece);
        self.last.prev_piece = Some(update.prev_piece);
        self.last.offset_from_center = update.offset;
        self.last.direction = update.direction;
    }
}

#[cfg(test)]
mod tests {
    use distortion_core::{BroadcastSink, PiecePlacement, SinkEvent, TrackLayout};

    use super::*;

    fn tracker() -> (PositionTracker, BroadcastSink) {
        let layout = TrackLayout::new(vec![PiecePlacement {
            piece: 17,
            x: 0.0,
            y: 0.0,
            heading_deg: 0.0,
            length_mm: 400.0,
            turn_deg: 0.0,
            locations: 8,
        }]);
        let sink = BroadcastSink::new(16);
        let tracker = PositionTracker::new(
            VehicleIdentity::new("car-1"),
            Arc::new(layout),
            Arc::new(sink.clone()),
        );
        (tracker, sink)
    }

    fn location(piece: u8, location: u8, direction: u8) -> LocationUpdate {
        LocationUpdate {
            location,
            piece,
            offset: 0.0,
            speed: 300,
            direction,
        }
    }

    #[test]
    fn test_location_emits_one_pose() {
        let (mut tracker, sink) = tracker();
        let mut rx = sink.subscribe();

        let pose = tracker.on_location(&location(17, 4, 0)).unwrap();
        assert!((pose.position.x - 200.0).abs() < 1e-6);

        match rx.try_recv().unwrap() {
            SinkEvent::Position {
                vehicle_id,
                heading_deg,
                ..
            } => {
                assert_eq!(vehicle_id.as_str(), "car-1");
                assert_eq!(heading_deg, 0.0);
            }
            other => panic!("Expected Position, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_piece_emits_nothing() {
        let (mut tracker, sink) = tracker();
        let mut rx = sink.subscribe();

        assert!(tracker.on_location(&location(99, 0, 0)).is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(tracker.last_known().piece, Some(99));
    }

    #[test]
    fn test_reversed_direction_flips_heading() {
        let (mut tracker, _sink) = tracker();
        let pose = tracker.on_location(&location(17, 0, 1)).unwrap();
        assert!((pose.heading_deg - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_transition_updates_pieces() {
        let (mut tracker, _sink) = tracker();
        tracker.on_transition(&TransitionUpdate {
            piece: 18,
            prev_piece: 17,
            offset: 22.25,
            direction: 0,
        });

        let last = tracker.last_known();
        assert_eq!(last.piece, Some(18));
        assert_eq!(last.prev_piece, Some(17));
        assert_eq!(last.offset_from_center, 22.25);
    }
}
