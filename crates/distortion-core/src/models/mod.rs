//! Data models shared by controllers, trackers and sinks

mod driving;
mod identity;
mod pose;

pub use driving::{DrivingData, TelemetrySnapshot};
pub use identity::VehicleIdentity;
pub use pose::{Position, WorldPose};
