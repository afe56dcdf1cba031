//! Mock demo: one simulated vehicle lapping an oval track

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use distortion_anki::config::{DistortionConfig, VehicleConfig};
use distortion_anki::protocol::{LocationUpdate, Notification, TransitionUpdate};
use distortion_anki::Fleet;
use distortion_core::{PiecePlacement, TrackLayout};

const VEHICLE: &str = "mock-vehicle-1";
const LOCATIONS_PER_PIECE: u8 = 16;
const CURVE_RADIUS_MM: f64 = 280.0;
const STRAIGHT_MM: f64 = 560.0;

/// Oval of two straights and two half-circle curves
fn oval() -> TrackLayout {
    let curve = CURVE_RADIUS_MM * PI;
    let place = |piece, x, y, heading_deg, length_mm, turn_deg| PiecePlacement {
        piece,
        x,
        y,
        heading_deg,
        length_mm,
        turn_deg,
        locations: LOCATIONS_PER_PIECE,
    };

    TrackLayout::new(vec![
        place(33, 0.0, 0.0, 0.0, STRAIGHT_MM, 0.0),
        place(17, STRAIGHT_MM, 0.0, 0.0, curve, 180.0),
        place(36, STRAIGHT_MM, 2.0 * CURVE_RADIUS_MM, 180.0, STRAIGHT_MM, 0.0),
        place(18, 0.0, 2.0 * CURVE_RADIUS_MM, 180.0, curve, 180.0),
    ])
}

pub fn config() -> DistortionConfig {
    DistortionConfig {
        vehicles: vec![VehicleConfig {
            player: Some("1".to_string()),
            ..VehicleConfig::mock(VEHICLE)
        }],
        track: oval(),
        ..Default::default()
    }
}

/// Set a speed, then feed location updates as if the vehicle were driving
pub async fn drive(fleet: Arc<Fleet>) {
    let Some(vehicle) = fleet.get(&VEHICLE.into()) else {
        return;
    };
    let Some(mock) = vehicle.mock().cloned() else {
        return;
    };
    let car = vehicle.car().clone();
    let pieces: Vec<u8> = oval().pieces.iter().map(|p| p.piece).collect();

    car.set_speed_request(60.0);
    tokio::time::sleep(Duration::from_millis(200)).await;
    car.set_lane_change_request(1);

    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let mut prev_piece = pieces[pieces.len() - 1];
    loop {
        for &piece in &pieces {
            mock.inject_notification(&Notification::Transition(TransitionUpdate {
                piece,
                prev_piece,
                offset: car.driving_data().telemetry.offset_from_center,
                direction: 0,
            }));
            prev_piece = piece;

            for location in (0..LOCATIONS_PER_PIECE).step_by(4) {
                ticker.tick().await;
                let speed_mm_s = (car.speed() * 12.0).round() as u16;
                mock.inject_notification(&Notification::Location(LocationUpdate {
                    location,
                    piece,
                    offset: 22.25 * f32::from(car.lane()),
                    speed: speed_mm_s,
                    direction: 0,
                }));
            }
        }
    }
}
