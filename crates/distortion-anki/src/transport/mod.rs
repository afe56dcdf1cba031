//! Transport layer for vehicle communication
//!
//! This module provides the radio side of a vehicle connection:
//! - [`GattAdapter`]: raw GATT access to one peripheral (BLE or mock)
//! - [`LinkTransport`]: one connection with its own I/O worker and the
//!   one-command-in-flight guard
//!
//! # Example
//!
//! ```ignore
//! use distortion_anki::transport::{create_adapter, LinkTransport};
//! use distortion_anki::config::LinkConfig;
//!
//! let adapter = create_adapter(&LinkConfig::default(), "E8:1F:4A:2C:90:11").await?;
//! let link = LinkTransport::spawn(adapter);
//! link.connect().join().await?;
//! ```

mod adapter;
pub mod error;
mod link;
pub mod mock;

#[cfg(feature = "ble")]
pub mod ble;

pub use adapter::{GattAdapter, IncomingNotification};
pub use error::TransportError;
pub use link::{Completion, LinkTransport};
pub use mock::MockGattAdapter;

use std::sync::Arc;

use crate::config::LinkConfig;

/// GATT characteristics of the vehicle service
pub mod characteristic {
    use uuid::Uuid;

    /// Host -> vehicle commands
    pub const WRITE: Uuid = Uuid::from_u128(0xBE15BEE1_6186_407E_8381_0BD89C4D8DF4);
    /// Vehicle -> host notifications
    pub const NOTIFY: Uuid = Uuid::from_u128(0xBE15BEE0_6186_407E_8381_0BD89C4D8DF4);
}

/// Create a GATT adapter for `address` based on configuration
pub async fn create_adapter(
    config: &LinkConfig,
    address: &str,
) -> Result<Arc<dyn GattAdapter>, TransportError> {
    match config {
        #[cfg(feature = "ble")]
        LinkConfig::Ble(cfg) => {
            let adapter = ble::BleGattAdapter::new(cfg, address).await?;
            Ok(Arc::new(adapter))
        }
        #[cfg(not(feature = "ble"))]
        LinkConfig::Ble(_) => Err(TransportError::Unsupported(
            "BLE requires the 'ble' feature".to_string(),
        )),
        LinkConfig::Mock(cfg) => {
            let adapter = mock::MockGattAdapter::new(cfg, address);
            Ok(Arc::new(adapter))
        }
    }
}
