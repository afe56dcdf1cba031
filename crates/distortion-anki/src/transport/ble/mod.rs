//! BLE GATT adapter backed by the platform Bluetooth stack
//!
//! The peripheral must already be known to the host stack (paired or seen by
//! a previous scan). This adapter only looks it up by address and never
//! scans; an unknown address fails with `ConnectionFailed`.

mod adapter;

pub use adapter::BleGattAdapter;
