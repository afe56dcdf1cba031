//! Mock GATT adapter for testing and demos
//!
//! Records every write, lets tests inject notifications, and can stand in
//! for a vehicle by answering version/battery/offset requests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch, Notify};
use uuid::Uuid;

use super::{characteristic, GattAdapter, IncomingNotification, TransportError};
use crate::config::MockConfig;
use crate::protocol::{BatteryLevel, Command, Notification, OffsetUpdate, VersionInfo};

/// Mock GATT adapter
pub struct MockGattAdapter {
    config: MockConfig,
    address: String,
    connected: AtomicBool,
    /// Whether connect attempts succeed
    reachable: AtomicBool,
    fail_writes: AtomicBool,
    incoming_tx: broadcast::Sender<IncomingNotification>,
    notifying: Mutex<HashSet<Uuid>>,
    writes: Mutex<Vec<Vec<u8>>>,
    write_signal: Notify,
    /// Writes block while the gate is closed
    gate: watch::Sender<bool>,
    /// Offset last set by the host, echoed on offset-update requests
    road_offset: Mutex<f32>,
    disconnects: AtomicUsize,
}

impl MockGattAdapter {
    pub fn new(config: &MockConfig, address: impl Into<String>) -> Self {
        let (incoming_tx, _) = broadcast::channel(256);
        let (gate, _) = watch::channel(true);
        Self {
            config: config.clone(),
            address: address.into(),
            connected: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            incoming_tx,
            notifying: Mutex::new(HashSet::new()),
            writes: Mutex::new(Vec::new()),
            write_signal: Notify::new(),
            gate,
            road_offset: Mutex::new(0.0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Inject raw bytes as if the vehicle notified them
    ///
    /// Dropped unless notifications are enabled on the notify characteristic.
    pub fn inject(&self, data: &[u8]) -> bool {
        if !self.notifying.lock().contains(&characteristic::NOTIFY) {
            return false;
        }
        let msg = IncomingNotification {
            timestamp: Instant::now(),
            characteristic: characteristic::NOTIFY,
            data: data.to_vec(),
        };
        self.incoming_tx.send(msg).is_ok()
    }

    pub fn inject_notification(&self, notification: &Notification) -> bool {
        self.inject(&notification.encode())
    }

    /// Set connection state (simulates the vehicle dropping off)
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make subsequent connect attempts fail
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make subsequent writes fail with [`TransportError::SendFailed`]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Block writes until [`Self::release_writes`]
    pub fn hold_writes(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_writes(&self) {
        self.gate.send_replace(true);
    }

    /// Raw frames written so far
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    /// Written frames decoded as commands (undecodable frames skipped)
    pub fn commands(&self) -> Vec<Command> {
        self.writes
            .lock()
            .iter()
            .filter_map(|w| Command::decode(w).ok())
            .collect()
    }

    /// Wait until at least `count` frames have been written
    pub async fn wait_for_writes(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.write_signal.notified();
                if self.writes.lock().len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    pub fn is_notifying(&self, characteristic: Uuid) -> bool {
        self.notifying.lock().contains(&characteristic)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn respond_to(&self, data: &[u8]) {
        let reply = match Command::decode(data) {
            Ok(Command::RequestVersion) => Notification::Version(VersionInfo {
                major: self.config.version[0],
                minor: self.config.version[1],
            }),
            Ok(Command::RequestBattery) => Notification::Battery(BatteryLevel {
                millivolts: self.config.battery_mv,
            }),
            Ok(Command::SetRoadOffset { offset_mm }) => {
                *self.road_offset.lock() = offset_mm;
                return;
            }
            Ok(Command::RequestOffsetUpdate) => Notification::OffsetUpdate(OffsetUpdate {
                offset: *self.road_offset.lock(),
            }),
            _ => return,
        };
        self.inject_notification(&reply);
    }
}

#[async_trait]
impl GattAdapter for MockGattAdapter {
    async fn connect(&self) -> Result<(), TransportError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(format!(
                "Mock peripheral {} unreachable",
                self.address
            )));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        // Simulate latency
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("Mock write failure".to_string()));
        }

        tracing::debug!(%characteristic, data = %hex::encode(data), "Mock adapter: write");
        self.writes.lock().push(data.to_vec());
        self.write_signal.notify_waiters();

        if self.config.auto_respond {
            self.respond_to(data);
        }
        Ok(())
    }

    async fn start_notify(&self, characteristic: Uuid) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.notifying.lock().insert(characteristic);
        Ok(())
    }

    async fn stop_notify(&self, characteristic: Uuid) -> Result<(), TransportError> {
        self.notifying.lock().remove(&characteristic);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<IncomingNotification> {
        self.incoming_tx.subscribe()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn address(&self) -> String {
        self.address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inject_requires_notifications() {
        let mock = MockGattAdapter::new(&MockConfig::default(), "mock-1");
        let mut rx = mock.subscribe();
        assert!(!mock.inject(&[0x01, 0x19]));

        mock.connect().await.unwrap();
        mock.start_notify(characteristic::NOTIFY).await.unwrap();
        assert!(mock.inject(&[0x01, 0x19]));
        assert_eq!(rx.recv().await.unwrap().data, vec![0x01, 0x19]);
    }

    #[tokio::test]
    async fn test_auto_respond_answers_battery_request() {
        let mock = MockGattAdapter::new(&MockConfig::default(), "mock-1");
        let mut rx = mock.subscribe();
        mock.connect().await.unwrap();
        mock.start_notify(characteristic::NOTIFY).await.unwrap();

        mock.write(characteristic::WRITE, &Command::RequestBattery.encode())
            .await
            .unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(
            Notification::decode(&msg.data).unwrap(),
            Notification::Battery(BatteryLevel {
                millivolts: MockConfig::default().battery_mv
            })
        );
    }

    #[tokio::test]
    async fn test_write_requires_connection() {
        let mock = MockGattAdapter::new(&MockConfig::default(), "mock-1");
        assert_eq!(
            mock.write(characteristic::WRITE, &[0x01, 0x18]).await,
            Err(TransportError::NotConnected)
        );
        assert!(mock.writes().is_empty());
    }
}
