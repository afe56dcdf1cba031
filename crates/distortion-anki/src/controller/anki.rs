//! Wireless vehicle controller
//!
//! Converts physical requests into protocol commands on a [`LinkTransport`]
//! and turns the vehicle's notifications into [`VehicleEvent`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use distortion_core::{ConnectionError, TurnKind, TurnTrigger, VehicleController, VehicleIdentity};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::VehicleEvent;
use crate::config::ControllerConfig;
use crate::protocol::{Command, Notification};
use crate::transport::{characteristic, IncomingNotification, LinkTransport, TransportError};

/// [`VehicleController`] for one Anki vehicle
pub struct AnkiController {
    vehicle: VehicleIdentity,
    link: LinkTransport,
    config: ControllerConfig,
    /// Set once the connect sequence succeeded; faults before that are
    /// reported to the connecting caller instead
    session_active: Arc<AtomicBool>,
    disconnected: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl AnkiController {
    /// Wrap a link and start forwarding its notifications and faults to
    /// `events`
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        vehicle: VehicleIdentity,
        link: LinkTransport,
        config: ControllerConfig,
        events: mpsc::UnboundedSender<VehicleEvent>,
    ) -> Self {
        let session_active = Arc::new(AtomicBool::new(false));
        let listener = tokio::spawn(listen(
            vehicle.clone(),
            link.notifications(),
            link.faults(),
            events,
            session_active.clone(),
        ));

        Self {
            vehicle,
            link,
            config,
            session_active,
            disconnected: AtomicBool::new(false),
            listener: Mutex::new(Some(listener)),
        }
    }

    pub fn vehicle(&self) -> &VehicleIdentity {
        &self.vehicle
    }

    pub fn link(&self) -> &LinkTransport {
        &self.link
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Connect and prepare the vehicle for driving commands
    ///
    /// Runs, in order: link connect, notification subscription (if
    /// `start_notifications`), SDK mode on, road offset zeroed. The first
    /// failing step aborts the sequence.
    pub async fn connect(&self, start_notifications: bool) -> Result<(), ConnectionError> {
        let fail = |step: &str, e: TransportError| {
            warn!(vehicle = %self.vehicle, step, error = %e, "Connect sequence failed");
            ConnectionError::new(self.vehicle.clone(), format!("{}: {}", step, e))
        };

        self.link.connect().join().await.map_err(|e| fail("connect", e))?;

        if start_notifications {
            self.link
                .subscribe(characteristic::NOTIFY)
                .join()
                .await
                .map_err(|e| fail("start notifications", e))?;
        }

        self.send_and_wait(Command::SdkMode { enabled: true })
            .await
            .map_err(|e| fail("protocol mode", e))?;
        self.send_and_wait(Command::SetRoadOffset { offset_mm: 0.0 })
            .await
            .map_err(|e| fail("road offset", e))?;

        self.session_active.store(true, Ordering::Release);
        info!(vehicle = %self.vehicle, "Vehicle ready");
        Ok(())
    }

    /// Disconnect and wait until the link is released
    pub async fn close(&self) -> Result<(), TransportError> {
        self.begin_disconnect().join().await
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Convert a speed percentage to mm/s
    pub fn speed_mm_s(&self, percent: f32) -> u16 {
        let mm_s = f32::from(self.config.max_speed_mm_s) * percent / 100.0;
        mm_s.round().clamp(0.0, f32::from(u16::MAX)) as u16
    }

    /// Lateral offset from the road center for a lane band
    pub fn lane_offset_mm(&self, lane: i8) -> f32 {
        self.config.lane_offset_mm * f32::from(lane)
    }

    async fn send_and_wait(&self, command: Command) -> Result<(), TransportError> {
        self.link.send(&command.to_frame())?.join().await
    }

    /// Hand a command to the link without waiting for the write
    fn issue(&self, command: Command) -> bool {
        match self.link.send(&command.to_frame()) {
            Ok(_completion) => {
                debug!(vehicle = %self.vehicle, ?command, "Command issued");
                true
            }
            Err(TransportError::Busy) => {
                debug!(vehicle = %self.vehicle, ?command, "Link busy, command dropped");
                false
            }
            Err(e) => {
                debug!(vehicle = %self.vehicle, ?command, error = %e, "Command not sent");
                false
            }
        }
    }

    fn begin_disconnect(&self) -> crate::transport::Completion {
        if !self.disconnected.swap(true, Ordering::AcqRel) {
            self.session_active.store(false, Ordering::Release);
            if let Some(listener) = self.listener.lock().take() {
                listener.abort();
            }
            info!(vehicle = %self.vehicle, "Disconnecting");
        }
        self.link.disconnect(Some(Command::Disconnect.encode()))
    }
}

impl VehicleController for AnkiController {
    fn change_speed(&self, percent: f32, acceleration: u16, respect_limit: bool) -> bool {
        self.issue(Command::SetSpeed {
            speed_mm_s: self.speed_mm_s(percent),
            acceleration,
            respect_limit,
        })
    }

    fn change_lane(&self, lane: i8, percent: f32, acceleration: u16) -> bool {
        self.issue(Command::ChangeLane {
            speed_mm_s: self.speed_mm_s(percent),
            acceleration,
            offset_mm: self.lane_offset_mm(lane),
        })
    }

    fn turn(&self, kind: TurnKind, trigger: TurnTrigger) -> bool {
        self.issue(Command::Turn {
            kind: kind.code(),
            trigger: trigger.code(),
        })
    }

    fn request_version(&self) -> bool {
        self.issue(Command::RequestVersion)
    }

    fn request_battery(&self) -> bool {
        self.issue(Command::RequestBattery)
    }

    fn set_protocol_mode(&self, enabled: bool) -> bool {
        self.issue(Command::SdkMode { enabled })
    }

    fn set_road_offset(&self, offset: f32) -> bool {
        self.issue(Command::SetRoadOffset { offset_mm: offset })
    }

    fn request_offset_update(&self) -> bool {
        self.issue(Command::RequestOffsetUpdate)
    }

    fn disconnect(&self) {
        let _ = self.begin_disconnect();
    }
}

impl Drop for AnkiController {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

/// Decode notifications and forward faults until either source closes or
/// nobody listens for events any more
async fn listen(
    vehicle: VehicleIdentity,
    mut notifications: broadcast::Receiver<IncomingNotification>,
    mut faults: broadcast::Receiver<TransportError>,
    events: mpsc::UnboundedSender<VehicleEvent>,
    session_active: Arc<AtomicBool>,
) {
    loop {
        let event = tokio::select! {
            msg = notifications.recv() => match msg {
                Ok(msg) => {
                    if msg.characteristic != characteristic::NOTIFY {
                        continue;
                    }
                    match decode(&vehicle, &msg.data) {
                        Some(event) => event,
                        None => continue,
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(vehicle = %vehicle, skipped = n, "Notification receiver lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            fault = faults.recv() => match fault {
                Ok(e) if session_active.load(Ordering::Acquire) && !e.is_busy() => {
                    warn!(vehicle = %vehicle, error = %e, "Vehicle unreachable");
                    VehicleEvent::Unreachable(e.to_string())
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
        };

        if events.send(event).is_err() {
            break;
        }
    }
    debug!(vehicle = %vehicle, "Notification listener stopped");
}

fn decode(vehicle: &VehicleIdentity, data: &[u8]) -> Option<VehicleEvent> {
    match Notification::decode(data) {
        Ok(Notification::Unmodeled { opcode, payload }) => {
            debug!(
                vehicle = %vehicle,
                opcode = %format!("0x{:02X}", opcode),
                payload = %hex::encode(&payload),
                "Ignoring unmodeled notification"
            );
            None
        }
        Ok(notification) => VehicleEvent::from_notification(notification),
        Err(e) => {
            warn!(vehicle = %vehicle, error = %e, data = %hex::encode(data), "Dropping undecodable notification");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::MockConfig;
    use crate::protocol::{LocationUpdate, VersionInfo};
    use crate::transport::MockGattAdapter;

    const WAIT: Duration = Duration::from_secs(1);

    fn controller(
        mock: &Arc<MockGattAdapter>,
    ) -> (AnkiController, mpsc::UnboundedReceiver<VehicleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = LinkTransport::spawn(mock.clone());
        let ctrl = AnkiController::new(
            VehicleIdentity::new("mock-1"),
            link,
            ControllerConfig::default(),
            tx,
        );
        (ctrl, rx)
    }

    async fn connected() -> (
        Arc<MockGattAdapter>,
        AnkiController,
        mpsc::UnboundedReceiver<VehicleEvent>,
    ) {
        let mock = Arc::new(MockGattAdapter::new(&MockConfig::default(), "mock-1"));
        let (ctrl, rx) = controller(&mock);
        ctrl.connect(true).await.unwrap();
        (mock, ctrl, rx)
    }

    #[tokio::test]
    async fn test_connect_sequence() {
        let (mock, _ctrl, _rx) = connected().await;

        assert!(mock.is_notifying(characteristic::NOTIFY));
        assert_eq!(
            mock.commands(),
            vec![
                Command::SdkMode { enabled: true },
                Command::SetRoadOffset { offset_mm: 0.0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_without_notifications() {
        let mock = Arc::new(MockGattAdapter::new(&MockConfig::default(), "mock-1"));
        let (ctrl, _rx) = controller(&mock);
        ctrl.connect(false).await.unwrap();
        assert!(!mock.is_notifying(characteristic::NOTIFY));
        assert_eq!(mock.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_connect_failure_carries_identity() {
        let mock = Arc::new(MockGattAdapter::new(&MockConfig::default(), "mock-1"));
        mock.set_reachable(false);
        let (ctrl, _rx) = controller(&mock);

        let err = ctrl.connect(true).await.unwrap_err();
        assert_eq!(err.vehicle, VehicleIdentity::new("mock-1"));
        assert!(err.message.starts_with("connect"));
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn test_speed_percent_to_mm_s() {
        let (mock, ctrl, _rx) = connected().await;

        assert!(ctrl.change_speed(40.0, 1000, true));
        assert!(mock.wait_for_writes(3, WAIT).await);
        assert_eq!(
            mock.commands()[2],
            Command::SetSpeed {
                speed_mm_s: 480,
                acceleration: 1000,
                respect_limit: true,
            }
        );
    }

    #[tokio::test]
    async fn test_lane_band_to_offset() {
        let (mock, ctrl, _rx) = connected().await;

        assert!(ctrl.change_lane(-3, 50.0, 1000));
        assert!(mock.wait_for_writes(3, WAIT).await);
        assert_eq!(
            mock.commands()[2],
            Command::ChangeLane {
                speed_mm_s: 600,
                acceleration: 1000,
                offset_mm: -66.75,
            }
        );
    }

    #[tokio::test]
    async fn test_busy_command_is_dropped() {
        let (mock, ctrl, _rx) = connected().await;
        mock.hold_writes();

        assert!(ctrl.request_version());
        assert!(!ctrl.request_battery());

        mock.release_writes();
        assert!(mock.wait_for_writes(3, WAIT).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mock.commands()[2..], [Command::RequestVersion]);
    }

    #[tokio::test]
    async fn test_notifications_become_events() {
        let (mock, ctrl, mut rx) = connected().await;

        assert!(ctrl.request_version());
        let event = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(
            event,
            VehicleEvent::Version(VersionInfo {
                major: 0x2E,
                minor: 0x26
            })
        );

        let location = LocationUpdate {
            location: 3,
            piece: 17,
            offset: -22.25,
            speed: 500,
            direction: 0,
        };
        assert!(mock.inject_notification(&Notification::Location(location)));
        let event = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(event, VehicleEvent::Location(location));
    }

    #[tokio::test]
    async fn test_unknown_and_short_notifications_are_skipped() {
        let (mock, _ctrl, mut rx) = connected().await;

        mock.inject(&[0x03, 0x3F, 0xAA, 0xBB]);
        // location with a truncated payload
        mock.inject(&[0x03, 0x27, 0x01, 0x02]);
        mock.inject(&[0x03, 0x1B, 0x10, 0x0F]);

        let event = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(
            event,
            VehicleEvent::Battery(crate::protocol::BatteryLevel { millivolts: 0x0F10 })
        );
    }

    #[tokio::test]
    async fn test_write_failure_reports_unreachable() {
        let (mock, ctrl, mut rx) = connected().await;
        mock.set_fail_writes(true);

        assert!(ctrl.request_battery());
        let event = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert!(matches!(event, VehicleEvent::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_disconnect_sends_farewell_once() {
        let (mock, ctrl, _rx) = connected().await;

        ctrl.close().await.unwrap();
        ctrl.disconnect();
        ctrl.close().await.unwrap();

        assert!(ctrl.is_disconnected());
        assert!(!mock.is_notifying(characteristic::NOTIFY));
        assert_eq!(mock.commands().last(), Some(&Command::Disconnect));
        assert_eq!(mock.disconnect_count(), 1);
        assert!(!ctrl.request_version());
    }

    #[tokio::test]
    async fn test_close_does_not_wait_for_stalled_write() {
        let (mock, ctrl, _rx) = connected().await;
        mock.hold_writes();
        assert!(ctrl.request_version());

        let closed = tokio::time::timeout(WAIT, ctrl.close()).await;
        assert_eq!(closed, Ok(Ok(())));
        assert_eq!(mock.disconnect_count(), 1);
        assert!(!mock.is_notifying(characteristic::NOTIFY));
    }

    #[tokio::test]
    async fn test_dropped_connection_reports_unreachable() {
        let (mock, ctrl, mut rx) = connected().await;
        mock.set_connected(false);

        assert!(ctrl.request_battery());
        let event = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(
            event,
            VehicleEvent::Unreachable(TransportError::NotConnected.to_string())
        );
    }
}
