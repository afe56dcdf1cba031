//! Protocol decode errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Frame too short: {0} bytes")]
    Truncated(usize),

    #[error("Frame declares {declared} bytes after the length byte, only {available} available")]
    LengthMismatch { declared: usize, available: usize },

    #[error("Payload for opcode 0x{opcode:02X} has {actual} bytes, expected {expected}")]
    PayloadMismatch {
        opcode: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),
}
