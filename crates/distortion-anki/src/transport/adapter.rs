//! GATT adapter trait and types

use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::TransportError;

/// Notification received on a GATT characteristic
#[derive(Debug, Clone)]
pub struct IncomingNotification {
    /// Timestamp when the notification was received
    pub timestamp: Instant,
    /// Characteristic that notified
    pub characteristic: Uuid,
    /// Raw frame bytes
    pub data: Vec<u8>,
}

/// Radio-level access to one peripheral
///
/// Implementations wrap a platform BLE stack (or a mock). They are driven
/// exclusively by the connection's link worker, never by callers directly.
#[async_trait]
pub trait GattAdapter: Send + Sync {
    /// Establish the connection to the peripheral
    async fn connect(&self) -> Result<(), TransportError>;

    /// Check if the peripheral is connected
    async fn is_connected(&self) -> bool;

    /// Write a value to a characteristic (with response)
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<(), TransportError>;

    /// Enable notifications on a characteristic
    async fn start_notify(&self, characteristic: Uuid) -> Result<(), TransportError>;

    /// Disable notifications on a characteristic
    async fn stop_notify(&self, characteristic: Uuid) -> Result<(), TransportError>;

    /// Subscribe to incoming notifications
    ///
    /// Returns a broadcast receiver that gets every notification from
    /// every characteristic with notifications enabled.
    fn subscribe(&self) -> broadcast::Receiver<IncomingNotification>;

    /// Release the connection
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Link address of the peripheral
    fn address(&self) -> String;
}
