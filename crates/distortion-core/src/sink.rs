//! Event sinks for positions, driving data and reachability
//!
//! The core only emits; it never waits for a sink. Sinks are shared between
//! all vehicles and may be called concurrently from several connection
//! contexts.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::models::{DrivingData, Position, VehicleIdentity};

/// Receiver of everything the vehicle core publishes
pub trait EventSink: Send + Sync {
    /// A new world pose was computed from a location update
    fn emit_position(&self, vehicle_id: &VehicleIdentity, position: Position, heading_deg: f64);

    /// The driving-data snapshot of a vehicle changed
    fn emit_driving_data(&self, data: &DrivingData);

    /// The link to a vehicle failed mid-session
    fn emit_unreachable(&self, vehicle_id: &VehicleIdentity, player: Option<&str>, message: &str);
}

/// Serializable form of a sink emission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SinkEvent {
    Position {
        vehicle_id: VehicleIdentity,
        position: Position,
        heading_deg: f64,
    },
    DrivingData(DrivingData),
    Unreachable {
        vehicle_id: VehicleIdentity,
        #[serde(skip_serializing_if = "Option::is_none")]
        player: Option<String>,
        message: String,
    },
}

/// Sink that publishes every emission on a broadcast channel
///
/// Outer push layers subscribe and forward events (e.g. as JSON). Emissions
/// without subscribers are discarded.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<SinkEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: SinkEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for BroadcastSink {
    fn emit_position(&self, vehicle_id: &VehicleIdentity, position: Position, heading_deg: f64) {
        self.publish(SinkEvent::Position {
            vehicle_id: vehicle_id.clone(),
            position,
            heading_deg,
        });
    }

    fn emit_driving_data(&self, data: &DrivingData) {
        self.publish(SinkEvent::DrivingData(data.clone()));
    }

    fn emit_unreachable(&self, vehicle_id: &VehicleIdentity, player: Option<&str>, message: &str) {
        self.publish(SinkEvent::Unreachable {
            vehicle_id: vehicle_id.clone(),
            player: player.map(str::to_string),
            message: message.to_string(),
        });
    }
}

/// Sink that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit_position(&self, vehicle_id: &VehicleIdentity, position: Position, heading_deg: f64) {
        debug!(vehicle = %vehicle_id, x = position.x, y = position.y, heading_deg, "Position");
    }

    fn emit_driving_data(&self, data: &DrivingData) {
        info!(
            vehicle = %data.vehicle_id,
            piece = data.telemetry.road_piece,
            speed = data.telemetry.speed_actual,
            offset = data.telemetry.offset_from_center,
            battery = %data.telemetry.battery,
            "Driving data"
        );
    }

    fn emit_unreachable(&self, vehicle_id: &VehicleIdentity, player: Option<&str>, message: &str) {
        warn!(vehicle = %vehicle_id, player = ?player, %message, "Vehicle unreachable");
    }
}
