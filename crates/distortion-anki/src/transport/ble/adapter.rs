//! btleplug-based GATT adapter

use std::time::Instant;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::BleConfig;
use crate::transport::{GattAdapter, IncomingNotification, TransportError};

/// GATT adapter for one BLE peripheral
pub struct BleGattAdapter {
    address: String,
    peripheral: Peripheral,
    incoming_tx: broadcast::Sender<IncomingNotification>,
    listener_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BleGattAdapter {
    pub async fn new(config: &BleConfig, address: &str) -> Result<Self, TransportError> {
        let central = Self::select_adapter(config).await?;
        let peripheral = Self::find_peripheral(&central, address).await?;
        let (incoming_tx, _) = broadcast::channel(1024);

        Ok(Self {
            address: address.to_string(),
            peripheral,
            incoming_tx,
            listener_handle: Mutex::new(None),
        })
    }

    async fn select_adapter(config: &BleConfig) -> Result<Adapter, TransportError> {
        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("BLE manager: {}", e)))?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("BLE adapters: {}", e)))?;

        let Some(wanted) = config.adapter.as_deref() else {
            return adapters.into_iter().next().ok_or_else(|| {
                TransportError::ConnectionFailed("No BLE adapter available".to_string())
            });
        };

        for adapter in adapters {
            let info = adapter.adapter_info().await.unwrap_or_default();
            if info.contains(wanted) {
                return Ok(adapter);
            }
        }
        Err(TransportError::InvalidConfig(format!(
            "BLE adapter '{}' not found",
            wanted
        )))
    }

    /// Look the address up among the peripherals the host already knows
    async fn find_peripheral(
        central: &Adapter,
        address: &str,
    ) -> Result<Peripheral, TransportError> {
        let peripherals = central
            .peripherals()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("List peripherals: {}", e)))?;

        peripherals
            .into_iter()
            .find(|p| matches_address(&p.address().to_string(), &p.id().to_string(), address))
            .ok_or_else(|| not_known(address))
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| {
                TransportError::InvalidConfig(format!("Characteristic {} not found", uuid))
            })
    }

    async fn start_listener(&self) -> Result<(), TransportError> {
        let running = self
            .listener_handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished());
        if running {
            return Ok(());
        }

        let mut stream = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;
        let incoming_tx = self.incoming_tx.clone();

        let handle = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                tracing::trace!(data = %hex::encode(&notification.value), "BLE notification");
                let msg = IncomingNotification {
                    timestamp: Instant::now(),
                    characteristic: notification.uuid,
                    data: notification.value,
                };
                let _ = incoming_tx.send(msg);
            }
            tracing::debug!("BLE notification stream ended");
        });

        *self.listener_handle.lock() = Some(handle);
        Ok(())
    }
}

#[async_trait]
impl GattAdapter for BleGattAdapter {
    async fn connect(&self) -> Result<(), TransportError> {
        self.peripheral
            .connect()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        self.peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("Service discovery: {}", e)))?;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<(), TransportError> {
        let ch = self.characteristic(characteristic)?;
        self.peripheral
            .write(&ch, data, WriteType::WithResponse)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn start_notify(&self, characteristic: Uuid) -> Result<(), TransportError> {
        let ch = self.characteristic(characteristic)?;
        self.start_listener().await?;
        self.peripheral
            .subscribe(&ch)
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))
    }

    async fn stop_notify(&self, characteristic: Uuid) -> Result<(), TransportError> {
        let ch = self.characteristic(characteristic)?;
        self.peripheral
            .unsubscribe(&ch)
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<IncomingNotification> {
        self.incoming_tx.subscribe()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(handle) = self.listener_handle.lock().take() {
            handle.abort();
        }
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| TransportError::SendFailed(format!("Disconnect: {}", e)))
    }

    fn address(&self) -> String {
        self.address.clone()
    }
}

/// Match on the MAC address, or on the platform id where the stack hides it
fn matches_address(mac: &str, id: &str, wanted: &str) -> bool {
    mac.eq_ignore_ascii_case(wanted) || id.eq_ignore_ascii_case(wanted)
}

fn not_known(address: &str) -> TransportError {
    TransportError::ConnectionFailed(format!("Peripheral {} not known to host stack", address))
}

impl Drop for BleGattAdapter {
    fn drop(&mut self) {
        if let Some(handle) = self.listener_handle.get_mut().take() {
            handle.abort();
        }
    }
}
