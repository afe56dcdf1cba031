//! distortion-anki - Wireless vehicle core for Anki Overdrive cars
//!
//! This crate talks to the vehicles over BLE GATT and keeps the per-vehicle
//! state model that outer layers drive.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Fleet                               │
//! │  Active vehicles, shared EventSink + TrackGeometry          │
//! │                                                             │
//! │  ┌─────────────┐  VehicleEvent  ┌─────────────────────────┐ │
//! │  │AnkiControl- │ ─────────────> │ ModelCar                │ │
//! │  │ler          │                │ (speed/lane/turn state, │ │
//! │  │             │ <───────────── │  PositionTracker)       │ │
//! │  └──────┬──────┘  commands      └───────────┬─────────────┘ │
//! │         │                                   │               │
//! │   ┌─────┴─────┐                       ┌─────┴─────┐         │
//! │   │ protocol  │                       │ EventSink │         │
//! │   │ (codec)   │                       └───────────┘         │
//! │   └─────┬─────┘                                             │
//! │  ┌──────┴────────┐                                          │
//! │  │ LinkTransport │  one I/O worker per connection           │
//! │  └──────┬────────┘                                          │
//! │  ┌──────┴────────┐                                          │
//! │  │ GattAdapter   │  BLE (btleplug) / mock                   │
//! │  └───────────────┘                                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod controller;
pub mod fleet;
pub mod protocol;
pub mod tracker;
pub mod transport;
pub mod vehicle;

pub use config::{
    ConfigError, ControllerConfig, DistortionConfig, LinkConfig, ModelConfig, VehicleConfig,
};
pub use controller::{AnkiController, VehicleEvent};
pub use fleet::{ActiveVehicle, Fleet, FleetError};
pub use protocol::{Command, DecodeError, Frame, Notification};
pub use tracker::{PositionTracker, TrackedPosition};
pub use transport::{create_adapter, GattAdapter, LinkTransport, MockGattAdapter, TransportError};
pub use vehicle::{LaneState, ModelCar, ModelSettings, SpeedState, TurnState};

// Re-export for convenience
pub use distortion_core::{
    BroadcastSink, ConnectionError, DrivingData, EventSink, SinkEvent, TrackGeometry, TrackLayout,
    TracingSink, TurnKind, TurnTrigger, VehicleController, VehicleIdentity,
};
