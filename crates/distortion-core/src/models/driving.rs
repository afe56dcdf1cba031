//! Driving data published for each vehicle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VehicleIdentity;

/// Latest telemetry reported by a vehicle
///
/// Only decoded notifications write these fields, with one exception: a
/// commanded speed of zero forces `speed_actual` to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Track segment the vehicle is currently on
    pub road_piece: u8,
    /// Track segment the vehicle left at the last transition
    pub prev_road_piece: u8,
    /// Location id within the current road piece
    pub road_location: u8,
    /// Lateral offset from the road center in millimetres
    pub offset_from_center: f32,
    /// Reported speed in mm/s
    pub speed_actual: u16,
    /// Raw driving direction flag as reported by the vehicle
    pub direction: u8,
    /// Battery level as reported (millivolts)
    pub battery: String,
    /// Firmware version as `major.minor`
    pub firmware_version: String,
}

/// Full driving-data snapshot pushed to the outer layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivingData {
    pub vehicle_id: VehicleIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    pub speed_request: f32,
    pub lane_change_blocked: bool,
    pub turn_blocked: bool,
    pub is_light_on: bool,
    pub is_safemode_on: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_hacking_scenario: Option<String>,
    #[serde(flatten)]
    pub telemetry: TelemetrySnapshot,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driving_data_flattens_telemetry() {
        let data = DrivingData {
            vehicle_id: VehicleIdentity::new("car-1"),
            player: Some("1".to_string()),
            speed_request: 50.0,
            lane_change_blocked: false,
            turn_blocked: true,
            is_light_on: false,
            is_safemode_on: true,
            active_hacking_scenario: None,
            telemetry: TelemetrySnapshot {
                road_piece: 17,
                speed_actual: 600,
                ..Default::default()
            },
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["vehicle_id"], "car-1");
        assert_eq!(json["player"], "1");
        assert_eq!(json["road_piece"], 17);
        assert_eq!(json["speed_actual"], 600);
        assert!(json.get("active_hacking_scenario").is_none());
        assert!(json.get("telemetry").is_none());
    }
}
