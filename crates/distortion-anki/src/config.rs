//! Vehicle and link configuration
//!
//! Loaded from TOML. Every section has defaults, so an empty file is a valid
//! configuration with no vehicles.

use std::path::Path;

use distortion_core::TrackLayout;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistortionConfig {
    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub model: ModelConfig,

    /// Vehicles to connect at startup
    #[serde(default, rename = "vehicle")]
    pub vehicles: Vec<VehicleConfig>,

    #[serde(default)]
    pub track: TrackLayout,
}

impl DistortionConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.track.reindex();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.controller.max_speed_mm_s == 0 {
            return Err(ConfigError::Invalid(
                "controller.max_speed_mm_s must be positive".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for vehicle in &self.vehicles {
            if vehicle.address.trim().is_empty() {
                return Err(ConfigError::Invalid("vehicle.address is empty".to_string()));
            }
            if !seen.insert(vehicle.address.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "vehicle {} listed twice",
                    vehicle.address
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Controller / Model
// =============================================================================

/// Unit conversion constants for the command layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Speed sent for 100 percent
    #[serde(default = "default_max_speed")]
    pub max_speed_mm_s: u16,
    /// Lateral distance between adjacent lanes
    #[serde(default = "default_lane_offset")]
    pub lane_offset_mm: f32,
    #[serde(default = "default_acceleration")]
    pub default_acceleration: u16,
    /// Whether speed commands ask the vehicle to honour track speed limits
    #[serde(default = "default_true")]
    pub respect_speed_limit: bool,
}

fn default_max_speed() -> u16 {
    1200
}

fn default_lane_offset() -> f32 {
    22.25
}

fn default_acceleration() -> u16 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_speed_mm_s: default_max_speed(),
            lane_offset_mm: default_lane_offset(),
            default_acceleration: default_acceleration(),
            respect_speed_limit: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Effective speeds at or below this percentage stop the vehicle
    #[serde(default = "default_min_speed_threshold")]
    pub min_speed_threshold: f32,
}

fn default_min_speed_threshold() -> f32 {
    20.0
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            min_speed_threshold: default_min_speed_threshold(),
        }
    }
}

// =============================================================================
// Vehicles
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleConfig {
    /// Radio address, also used as the vehicle identity
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    /// Enable notifications as part of connecting
    #[serde(default = "default_true")]
    pub start_notifications: bool,
    #[serde(default)]
    pub link: LinkConfig,
}

impl VehicleConfig {
    /// Mock vehicle with default link settings
    pub fn mock(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            player: None,
            start_notifications: true,
            link: LinkConfig::default(),
        }
    }
}

// =============================================================================
// Link Configuration
// =============================================================================

/// Radio link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LinkConfig {
    /// Bluetooth LE via the host stack (needs the `ble` feature)
    Ble(BleConfig),
    /// Simulated vehicle for tests and demos
    Mock(MockConfig),
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BleConfig {
    /// Substring of the host adapter name to use; first adapter if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated write latency
    #[serde(default)]
    pub latency_ms: u64,
    /// Answer version/battery/offset requests like a vehicle would
    #[serde(default = "default_true")]
    pub auto_respond: bool,
    #[serde(default = "default_battery_mv")]
    pub battery_mv: u16,
    /// Reported firmware version as [major, minor]
    #[serde(default = "default_version")]
    pub version: [u8; 2],
}

fn default_battery_mv() -> u16 {
    3900
}

fn default_version() -> [u8; 2] {
    [0x2E, 0x26]
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            auto_respond: true,
            battery_mv: default_battery_mv(),
            version: default_version(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = DistortionConfig::from_toml_str("").unwrap();
        assert_eq!(config.controller.max_speed_mm_s, 1200);
        assert_eq!(config.controller.lane_offset_mm, 22.25);
        assert_eq!(config.controller.default_acceleration, 1000);
        assert!(config.controller.respect_speed_limit);
        assert_eq!(config.model.min_speed_threshold, 20.0);
        assert!(config.vehicles.is_empty());
        assert!(config.track.is_empty());
    }

    #[test]
    fn test_vehicle_link_tags() {
        let config = DistortionConfig::from_toml_str(
            r#"
            [[vehicle]]
            address = "E8:1F:4A:2C:90:11"
            player = "p1"
            link = { type = "ble", adapter = "hci0" }

            [[vehicle]]
            address = "mock-2"
            start_notifications = false
            link = { type = "mock", latency_ms = 5 }
            "#,
        )
        .unwrap();

        assert_eq!(config.vehicles.len(), 2);
        assert_eq!(config.vehicles[0].player.as_deref(), Some("p1"));
        match &config.vehicles[0].link {
            LinkConfig::Ble(ble) => {
                assert_eq!(ble.adapter.as_deref(), Some("hci0"));
            }
            other => panic!("unexpected link {:?}", other),
        }
        assert!(!config.vehicles[1].start_notifications);
        match &config.vehicles[1].link {
            LinkConfig::Mock(mock) => {
                assert_eq!(mock.latency_ms, 5);
                assert!(mock.auto_respond);
            }
            other => panic!("unexpected link {:?}", other),
        }
    }

    #[test]
    fn test_missing_link_defaults_to_mock() {
        let config = DistortionConfig::from_toml_str(
            r#"
            [[vehicle]]
            address = "mock-1"
            "#,
        )
        .unwrap();
        assert!(matches!(config.vehicles[0].link, LinkConfig::Mock(_)));
        assert!(config.vehicles[0].start_notifications);
    }

    #[test]
    fn test_duplicate_vehicle_rejected() {
        let err = DistortionConfig::from_toml_str(
            r#"
            [[vehicle]]
            address = "a"
            [[vehicle]]
            address = "a"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [controller]
            max_speed_mm_s = 1000

            [model]
            min_speed_threshold = 10.0

            [[track.pieces]]
            piece = 33
            x = 0.0
            y = 0.0
            heading_deg = 0.0
            length_mm = 560.0
            "#
        )
        .unwrap();

        let config = DistortionConfig::load(file.path()).unwrap();
        assert_eq!(config.controller.max_speed_mm_s, 1000);
        assert_eq!(config.model.min_speed_threshold, 10.0);
        assert_eq!(config.track.len(), 1);
        assert!(config.track.get(33).is_some());
    }

    #[test]
    fn test_load_missing_file() {
        let err = DistortionConfig::load("/nonexistent/distortion.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
