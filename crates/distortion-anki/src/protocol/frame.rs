//! Length-prefixed framing

use bytes::{BufMut, Bytes, BytesMut};

use super::DecodeError;

/// One protocol message: opcode plus opcode-specific payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub payload: Bytes,
}

/// Frame written to the vehicle
pub type CommandFrame = Frame;

/// Frame received from the vehicle
pub type NotificationFrame = Frame;

impl Frame {
    pub fn new(opcode: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Frame without payload
    pub fn bare(opcode: u8) -> Self {
        Self::new(opcode, Bytes::new())
    }

    /// Wire form: `length | opcode | payload`
    pub fn encode(&self) -> Bytes {
        debug_assert!(self.payload.len() < u8::MAX as usize);
        let mut buf = BytesMut::with_capacity(2 + self.payload.len());
        buf.put_u8((1 + self.payload.len()) as u8);
        buf.put_u8(self.opcode);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Split a received buffer into opcode and payload
    ///
    /// Bytes beyond the declared length are ignored.
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < 2 || data[0] == 0 {
            return Err(DecodeError::Truncated(data.len()));
        }

        let declared = data[0] as usize;
        let available = data.len() - 1;
        if declared > available {
            return Err(DecodeError::LengthMismatch {
                declared,
                available,
            });
        }

        Ok(Self {
            opcode: data[1],
            payload: Bytes::copy_from_slice(&data[2..=declared]),
        })
    }

    /// Payload, checked to hold at least `expected` bytes
    pub(crate) fn payload_of(&self, expected: usize) -> Result<&[u8], DecodeError> {
        if self.payload.len() < expected {
            return Err(DecodeError::PayloadMismatch {
                opcode: self.opcode,
                expected,
                actual: self.payload.len(),
            });
        }
        Ok(&self.payload[..])
    }
}
