//! Vehicle wire protocol
//!
//! Every message on the link is a frame `length | opcode | payload` where
//! `length = 1 + payload.len()`. Multi-byte fields are little-endian.
//!
//! - [`Command`]: outbound messages (host -> vehicle)
//! - [`Notification`]: inbound messages (vehicle -> host)

mod command;
mod error;
mod frame;
mod notification;

pub use command::Command;
pub use error::DecodeError;
pub use frame::{CommandFrame, Frame, NotificationFrame};
pub use notification::{
    BatteryLevel, LocationUpdate, Notification, OffsetUpdate, TransitionUpdate, VersionInfo,
};

/// Outbound opcodes (host -> vehicle)
pub mod opcode {
    pub const DISCONNECT: u8 = 0x0D;
    pub const VERSION_REQUEST: u8 = 0x18;
    pub const BATTERY_REQUEST: u8 = 0x1A;
    pub const SET_SPEED: u8 = 0x24;
    pub const CHANGE_LANE: u8 = 0x25;
    pub const SET_ROAD_OFFSET: u8 = 0x2C;
    pub const OFFSET_UPDATE_REQUEST: u8 = 0x2D;
    pub const TURN: u8 = 0x32;
    pub const SDK_MODE: u8 = 0x90;
}

/// Inbound opcodes (vehicle -> host)
pub mod notification_opcode {
    pub const VERSION_RESPONSE: u8 = 0x19;
    pub const BATTERY_RESPONSE: u8 = 0x1B;
    pub const LOCATION_UPDATE: u8 = 0x27;
    pub const TRANSITION_UPDATE: u8 = 0x29;
    pub const OFFSET_UPDATE: u8 = 0x2D;
}

/// SDK mode sub-command carried in the first payload byte of 0x90
pub const SDK_MODE_SUBCOMMAND: u8 = 0x01;
