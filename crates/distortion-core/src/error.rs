//! Common error types

use thiserror::Error;

use crate::models::VehicleIdentity;

/// A connection to a vehicle could not be established
///
/// Raised synchronously by connect operations; mid-session faults are
/// reported through [`crate::EventSink::emit_unreachable`] instead.
#[derive(Debug, Clone, Error)]
#[error("Failed to connect to vehicle {vehicle}: {message}")]
pub struct ConnectionError {
    /// Vehicle that caused the error
    pub vehicle: VehicleIdentity,
    /// Explanation of the failure
    pub message: String,
}

impl ConnectionError {
    pub fn new(vehicle: VehicleIdentity, message: impl Into<String>) -> Self {
        Self {
            vehicle,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_names_vehicle() {
        let err = ConnectionError::new(VehicleIdentity::new("AA:BB"), "not connected");
        assert_eq!(
            err.to_string(),
            "Failed to connect to vehicle AA:BB: not connected"
        );
    }
}
