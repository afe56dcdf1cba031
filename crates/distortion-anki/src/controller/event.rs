//! Typed vehicle events
//!
//! Everything the wireless side reports about a vehicle arrives at the state
//! model as one [`VehicleEvent`] stream.

use crate::protocol::{
    BatteryLevel, LocationUpdate, Notification, OffsetUpdate, TransitionUpdate, VersionInfo,
};

#[derive(Debug, Clone, PartialEq)]
pub enum VehicleEvent {
    Version(VersionInfo),
    Battery(BatteryLevel),
    Location(LocationUpdate),
    Transition(TransitionUpdate),
    OffsetUpdate(OffsetUpdate),
    /// The link failed mid-session
    Unreachable(String),
}

impl VehicleEvent {
    /// Event for a decoded notification, `None` for unmodeled opcodes
    pub fn from_notification(notification: Notification) -> Option<Self> {
        match notification {
            Notification::Version(v) => Some(Self::Version(v)),
            Notification::Battery(b) => Some(Self::Battery(b)),
            Notification::Location(l) => Some(Self::Location(l)),
            Notification::Transition(t) => Some(Self::Transition(t)),
            Notification::OffsetUpdate(o) => Some(Self::OffsetUpdate(o)),
            Notification::Unmodeled { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_unmodeled_notification_has_no_event() {
        let n = Notification::Unmodeled {
            opcode: 0x3F,
            payload: Bytes::from_static(&[1, 2]),
        };
        assert_eq!(VehicleEvent::from_notification(n), None);
    }

    #[test]
    fn test_battery_notification_maps_to_event() {
        let n = Notification::Battery(BatteryLevel { millivolts: 3800 });
        assert_eq!(
            VehicleEvent::from_notification(n),
            Some(VehicleEvent::Battery(BatteryLevel { millivolts: 3800 }))
        );
    }
}
