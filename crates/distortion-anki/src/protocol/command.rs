//! Outbound commands

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{opcode, DecodeError, Frame, SDK_MODE_SUBCOMMAND};

/// Command sent to a vehicle
///
/// Values are in physical units (mm/s, mm/s², mm). Encoding does not check
/// plausibility; that is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Disconnect,
    RequestVersion,
    RequestBattery,
    SetSpeed {
        speed_mm_s: u16,
        acceleration: u16,
        respect_limit: bool,
    },
    /// Drive towards `offset_mm` from the road center
    ChangeLane {
        speed_mm_s: u16,
        acceleration: u16,
        offset_mm: f32,
    },
    /// Tell the vehicle its current absolute offset
    SetRoadOffset { offset_mm: f32 },
    RequestOffsetUpdate,
    Turn { kind: u16, trigger: u16 },
    SdkMode { enabled: bool },
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Disconnect => opcode::DISCONNECT,
            Command::RequestVersion => opcode::VERSION_REQUEST,
            Command::RequestBattery => opcode::BATTERY_REQUEST,
            Command::SetSpeed { .. } => opcode::SET_SPEED,
            Command::ChangeLane { .. } => opcode::CHANGE_LANE,
            Command::SetRoadOffset { .. } => opcode::SET_ROAD_OFFSET,
            Command::RequestOffsetUpdate => opcode::OFFSET_UPDATE_REQUEST,
            Command::Turn { .. } => opcode::TURN,
            Command::SdkMode { .. } => opcode::SDK_MODE,
        }
    }

    pub fn to_frame(&self) -> Frame {
        let mut payload = BytesMut::with_capacity(8);
        match *self {
            Command::Disconnect
            | Command::RequestVersion
            | Command::RequestBattery
            | Command::RequestOffsetUpdate => {}
            Command::SetSpeed {
                speed_mm_s,
                acceleration,
                respect_limit,
            } => {
                payload.put_u16_le(speed_mm_s);
                payload.put_u16_le(acceleration);
                payload.put_u16_le(u16::from(respect_limit));
            }
            Command::ChangeLane {
                speed_mm_s,
                acceleration,
                offset_mm,
            } => {
                payload.put_u16_le(speed_mm_s);
                payload.put_u16_le(acceleration);
                payload.put_f32_le(offset_mm);
            }
            Command::SetRoadOffset { offset_mm } => payload.put_f32_le(offset_mm),
            Command::Turn { kind, trigger } => {
                payload.put_u16_le(kind);
                payload.put_u16_le(trigger);
            }
            Command::SdkMode { enabled } => {
                payload.put_u8(SDK_MODE_SUBCOMMAND);
                payload.put_u8(u8::from(enabled));
            }
        }
        Frame::new(self.opcode(), payload.freeze())
    }

    /// Wire bytes, length prefix included
    pub fn encode(&self) -> Bytes {
        self.to_frame().encode()
    }

    /// Parse wire bytes back into a command
    ///
    /// Used by vehicle simulators and tests; the host itself only encodes.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        Self::from_frame(&Frame::parse(data)?)
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, DecodeError> {
        let command = match frame.opcode {
            opcode::DISCONNECT => Command::Disconnect,
            opcode::VERSION_REQUEST => Command::RequestVersion,
            opcode::BATTERY_REQUEST => Command::RequestBattery,
            opcode::OFFSET_UPDATE_REQUEST => Command::RequestOffsetUpdate,
            opcode::SET_SPEED => {
                let mut buf = frame.payload_of(6)?;
                Command::SetSpeed {
                    speed_mm_s: buf.get_u16_le(),
                    acceleration: buf.get_u16_le(),
                    respect_limit: buf.get_u16_le() != 0,
                }
            }
            opcode::CHANGE_LANE => {
                let mut buf = frame.payload_of(8)?;
                Command::ChangeLane {
                    speed_mm_s: buf.get_u16_le(),
                    acceleration: buf.get_u16_le(),
                    offset_mm: buf.get_f32_le(),
                }
            }
            opcode::SET_ROAD_OFFSET => {
                let mut buf = frame.payload_of(4)?;
                Command::SetRoadOffset {
                    offset_mm: buf.get_f32_le(),
                }
            }
            opcode::TURN => {
                let mut buf = frame.payload_of(4)?;
                Command::Turn {
                    kind: buf.get_u16_le(),
                    trigger: buf.get_u16_le(),
                }
            }
            opcode::SDK_MODE => {
                let mut buf = frame.payload_of(2)?;
                let _subcommand = buf.get_u8();
                Command::SdkMode {
                    enabled: buf.get_u8() != 0,
                }
            }
            other => return Err(DecodeError::UnknownOpcode(other)),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_set_speed_layout() {
        let bytes = Command::SetSpeed {
            speed_mm_s: 480,
            acceleration: 1000,
            respect_limit: true,
        }
        .encode();
        // 480 = 0x01E0, 1000 = 0x03E8
        assert_eq!(
            &bytes[..],
            &[0x07, 0x24, 0xE0, 0x01, 0xE8, 0x03, 0x01, 0x00]
        );
    }

    #[test]
    fn test_change_lane_layout() {
        let bytes = Command::ChangeLane {
            speed_mm_s: 600,
            acceleration: 1000,
            offset_mm: -44.5,
        }
        .encode();
        assert_eq!(bytes[0], 0x09);
        assert_eq!(bytes[1], 0x25);
        assert_eq!(&bytes[6..10], &(-44.5f32).to_le_bytes());
    }

    #[test]
    fn test_sdk_mode_layout() {
        assert_eq!(
            &Command::SdkMode { enabled: true }.encode()[..],
            &[0x03, 0x90, 0x01, 0x01]
        );
        assert_eq!(
            &Command::SdkMode { enabled: false }.encode()[..],
            &[0x03, 0x90, 0x01, 0x00]
        );
    }

    #[rstest]
    #[case(Command::Disconnect, &[0x01, 0x0D])]
    #[case(Command::RequestVersion, &[0x01, 0x18])]
    #[case(Command::RequestBattery, &[0x01, 0x1A])]
    #[case(Command::RequestOffsetUpdate, &[0x01, 0x2D])]
    fn test_bare_commands(#[case] command: Command, #[case] expected: &[u8]) {
        assert_eq!(&command.encode()[..], expected);
    }

    #[rstest]
    #[case(Command::Disconnect)]
    #[case(Command::RequestVersion)]
    #[case(Command::RequestBattery)]
    #[case(Command::SetSpeed { speed_mm_s: 1200, acceleration: 2500, respect_limit: false })]
    #[case(Command::ChangeLane { speed_mm_s: 300, acceleration: 1000, offset_mm: 66.75 })]
    #[case(Command::SetRoadOffset { offset_mm: 0.0 })]
    #[case(Command::RequestOffsetUpdate)]
    #[case(Command::Turn { kind: 3, trigger: 0 })]
    #[case(Command::SdkMode { enabled: true })]
    fn test_every_command_survives_the_wire(#[case] command: Command) {
        let wire = command.encode();
        let decoded = Command::decode(&wire).unwrap();
        assert_eq!(decoded, command);
        assert_eq!(decoded.encode(), wire);
    }

    #[test]
    fn test_decode_short_payload_is_mismatch() {
        assert_eq!(
            Command::decode(&[0x03, 0x24, 0x10, 0x00]),
            Err(DecodeError::PayloadMismatch {
                opcode: 0x24,
                expected: 6,
                actual: 2
            })
        );
    }

    #[test]
    fn test_decode_unknown_opcode() {
        assert_eq!(
            Command::decode(&[0x01, 0x77]),
            Err(DecodeError::UnknownOpcode(0x77))
        );
    }
}
