//! Inbound notifications

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::{notification_opcode as op, DecodeError, Frame};

/// Firmware version response (0x19)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub major: u8,
    pub minor: u8,
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Battery response (0x1B)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryLevel {
    pub millivolts: u16,
}

/// Position update (0x27)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub location: u8,
    pub piece: u8,
    pub offset: f32,
    pub speed: u16,
    pub direction: u8,
}

/// Road piece transition (0x29)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionUpdate {
    pub piece: u8,
    pub prev_piece: u8,
    pub offset: f32,
    pub direction: u8,
}

/// Road offset response (0x2D)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetUpdate {
    pub offset: f32,
}

/// Decoded notification from a vehicle
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Version(VersionInfo),
    Battery(BatteryLevel),
    Location(LocationUpdate),
    Transition(TransitionUpdate),
    OffsetUpdate(OffsetUpdate),
    /// Valid frame with an opcode this crate does not model
    Unmodeled { opcode: u8, payload: Bytes },
}

impl Notification {
    /// Decode a received buffer
    ///
    /// Unknown opcodes are not an error. A payload shorter than the layout of
    /// a known opcode is [`DecodeError::PayloadMismatch`]; longer payloads
    /// are accepted and the extra bytes ignored.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        Self::from_frame(Frame::parse(data)?)
    }

    pub fn from_frame(frame: Frame) -> Result<Self, DecodeError> {
        let notification = match frame.opcode {
            op::VERSION_RESPONSE => {
                let mut buf = frame.payload_of(2)?;
                Notification::Version(VersionInfo {
                    major: buf.get_u8(),
                    minor: buf.get_u8(),
                })
            }
            op::BATTERY_RESPONSE => {
                let mut buf = frame.payload_of(2)?;
                Notification::Battery(BatteryLevel {
                    millivolts: buf.get_u16_le(),
                })
            }
            op::LOCATION_UPDATE => {
                let mut buf = frame.payload_of(9)?;
                Notification::Location(LocationUpdate {
                    location: buf.get_u8(),
                    piece: buf.get_u8(),
                    offset: buf.get_f32_le(),
                    speed: buf.get_u16_le(),
                    direction: buf.get_u8(),
                })
            }
            op::TRANSITION_UPDATE => {
                let mut buf = frame.payload_of(7)?;
                Notification::Transition(TransitionUpdate {
                    piece: buf.get_u8(),
                    prev_piece: buf.get_u8(),
                    offset: buf.get_f32_le(),
                    direction: buf.get_u8(),
                })
            }
            op::OFFSET_UPDATE => {
                let mut buf = frame.payload_of(4)?;
                Notification::OffsetUpdate(OffsetUpdate {
                    offset: buf.get_f32_le(),
                })
            }
            opcode => Notification::Unmodeled {
                opcode,
                payload: frame.payload,
            },
        };
        Ok(notification)
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Notification::Version(_) => op::VERSION_RESPONSE,
            Notification::Battery(_) => op::BATTERY_RESPONSE,
            Notification::Location(_) => op::LOCATION_UPDATE,
            Notification::Transition(_) => op::TRANSITION_UPDATE,
            Notification::OffsetUpdate(_) => op::OFFSET_UPDATE,
            Notification::Unmodeled { opcode, .. } => *opcode,
        }
    }

    /// Wire bytes as the vehicle would send them
    pub fn encode(&self) -> Bytes {
        let mut payload = BytesMut::with_capacity(9);
        match self {
            Notification::Version(v) => {
                payload.put_u8(v.major);
                payload.put_u8(v.minor);
            }
            Notification::Battery(b) => payload.put_u16_le(b.millivolts),
            Notification::Location(l) => {
                payload.put_u8(l.location);
                payload.put_u8(l.piece);
                payload.put_f32_le(l.offset);
                payload.put_u16_le(l.speed);
                payload.put_u8(l.direction);
            }
            Notification::Transition(t) => {
                payload.put_u8(t.piece);
                payload.put_u8(t.prev_piece);
                payload.put_f32_le(t.offset);
                payload.put_u8(t.direction);
            }
            Notification::OffsetUpdate(o) => payload.put_f32_le(o.offset),
            Notification::Unmodeled { payload: raw, .. } => payload.put_slice(raw),
        }
        Frame::new(self.opcode(), payload.freeze()).encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_location_update_from_injected_bytes() {
        let mut data = vec![0x0A, 0x27, 0x05, 0x11];
        data.extend_from_slice(&(-22.25f32).to_le_bytes());
        data.extend_from_slice(&600u16.to_le_bytes());
        data.push(0x01);

        assert_eq!(data.len() - 2, 9);
        assert_eq!(
            Notification::decode(&data).unwrap(),
            Notification::Location(LocationUpdate {
                location: 0x05,
                piece: 0x11,
                offset: -22.25,
                speed: 600,
                direction: 0x01,
            })
        );
    }

    #[test]
    fn test_battery_response() {
        // 3900 mV = 0x0F3C
        assert_eq!(
            Notification::decode(&[0x03, 0x1B, 0x3C, 0x0F]).unwrap(),
            Notification::Battery(BatteryLevel { millivolts: 3900 })
        );
    }

    #[test]
    fn test_version_display() {
        let v = match Notification::decode(&[0x03, 0x19, 0x2E, 0x26]).unwrap() {
            Notification::Version(v) => v,
            other => panic!("Expected Version, got {:?}", other),
        };
        assert_eq!(v.to_string(), "46.38");
    }

    #[test]
    fn test_unknown_opcode_is_unmodeled() {
        let decoded = Notification::decode(&[0x03, 0x3F, 0xAA, 0xBB]).unwrap();
        assert_eq!(
            decoded,
            Notification::Unmodeled {
                opcode: 0x3F,
                payload: Bytes::from_static(&[0xAA, 0xBB]),
            }
        );
    }

    #[test]
    fn test_short_transition_is_mismatch() {
        assert_eq!(
            Notification::decode(&[0x04, 0x29, 0x01, 0x02, 0x00]),
            Err(DecodeError::PayloadMismatch {
                opcode: 0x29,
                expected: 7,
                actual: 3
            })
        );
    }

    #[test]
    fn test_extended_location_payload_is_accepted() {
        let base = Notification::Location(LocationUpdate {
            location: 1,
            piece: 2,
            offset: 0.0,
            speed: 300,
            direction: 0,
        });
        let mut data = base.encode().to_vec();
        data.extend_from_slice(&[0x00, 0x00, 0x00]);
        data[0] += 3;
        assert_eq!(Notification::decode(&data).unwrap(), base);
    }

    #[rstest]
    #[case(Notification::Version(VersionInfo { major: 0x2E, minor: 0x26 }))]
    #[case(Notification::Battery(BatteryLevel { millivolts: 4120 }))]
    #[case(Notification::Location(LocationUpdate { location: 34, piece: 17, offset: 44.5, speed: 812, direction: 71 }))]
    #[case(Notification::Transition(TransitionUpdate { piece: 36, prev_piece: 17, offset: -66.75, direction: 0 }))]
    #[case(Notification::OffsetUpdate(OffsetUpdate { offset: 11.125 }))]
    fn test_every_notification_survives_the_wire(#[case] notification: Notification) {
        let wire = notification.encode();
        let decoded = Notification::decode(&wire).unwrap();
        assert_eq!(decoded, notification);
        assert_eq!(decoded.encode(), wire);
    }
}
