//! Vehicle identity

use serde::{Deserialize, Serialize};

/// Opaque link address of a vehicle
///
/// For BLE vehicles this is the peripheral address (e.g. `"E8:1F:4A:2C:90:11"`).
/// It never changes for the lifetime of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleIdentity(String);

impl VehicleIdentity {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VehicleIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VehicleIdentity {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for VehicleIdentity {
    fn from(address: String) -> Self {
        Self(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_serializes_as_plain_string() {
        let id = VehicleIdentity::new("E8:1F:4A:2C:90:11");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"E8:1F:4A:2C:90:11\"");
        assert_eq!(id.to_string(), "E8:1F:4A:2C:90:11");
    }
}
