//! VehicleController trait - transport-independent command capability
//!
//! Every method issues one command and reports whether it was handed to the
//! link. `false` means the command was dropped (link busy, closed or
//! failing); callers must not treat it as fatal.

use serde::{Deserialize, Serialize};

/// Turn maneuvers understood by the vehicle firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum TurnKind {
    None = 0,
    Left = 1,
    Right = 2,
    UTurn = 3,
    UTurnJump = 4,
}

impl TurnKind {
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// When a turn is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum TurnTrigger {
    /// Turn right away
    #[default]
    Immediate = 0,
    /// Turn at the next intersection piece
    Intersection = 1,
}

impl TurnTrigger {
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Physically meaningful commands for one vehicle
pub trait VehicleController: Send + Sync {
    /// Drive at `percent` of the maximum speed
    fn change_speed(&self, percent: f32, acceleration: u16, respect_limit: bool) -> bool;

    /// Move to lane band `lane` (relative to the road center) at `percent` speed
    fn change_lane(&self, lane: i8, percent: f32, acceleration: u16) -> bool;

    fn turn(&self, kind: TurnKind, trigger: TurnTrigger) -> bool;

    fn request_version(&self) -> bool;

    fn request_battery(&self) -> bool;

    /// Enable or disable the SDK protocol mode required for movement commands
    fn set_protocol_mode(&self, enabled: bool) -> bool;

    /// Tell the vehicle its absolute offset from the road center
    fn set_road_offset(&self, offset: f32) -> bool;

    /// Ask the vehicle to report its current road offset
    fn request_offset_update(&self) -> bool;

    /// Release the connection. Calling this more than once is a no-op.
    fn disconnect(&self);
}
