//! distortion-core - Core traits and types for the vehicle core
//!
//! This crate provides the abstractions shared between the wireless vehicle
//! implementation and the outer layers (fleet management, UI push):
//!
//! - [`VehicleController`]: transport-independent command capability
//! - [`EventSink`]: where positions, driving data and reachability go
//! - [`TrackGeometry`]: read-only mapping from telemetry to world coordinates

pub mod controller;
pub mod error;
pub mod geometry;
pub mod models;
pub mod sink;

pub use controller::{TurnKind, TurnTrigger, VehicleController};
pub use error::ConnectionError;
pub use geometry::{PiecePlacement, TrackGeometry, TrackLayout, TrackQuery};
pub use models::*;
pub use sink::{BroadcastSink, EventSink, SinkEvent, TracingSink};
