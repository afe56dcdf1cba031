//! Per-connection link with a dedicated I/O worker
//!
//! All radio operations for one vehicle run on a single worker task, so
//! callers never block on the radio. Each operation hands back a
//! [`Completion`] that the call site joins only if it needs the result.
//!
//! At most one write is in flight per connection. A write issued while
//! another is pending fails fast with [`TransportError::Busy`] and is not
//! queued.
//!
//! Disconnect does not wait behind a stalled operation: the operation in
//! flight is abandoned with [`TransportError::ConnectionClosed`] and the
//! close steps run right after.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{characteristic, GattAdapter, IncomingNotification, TransportError};
use crate::protocol::Frame;

type Reply = oneshot::Sender<Result<(), TransportError>>;

/// Upper bound for each best-effort close step (stop notify, farewell)
const CLOSE_STEP_TIMEOUT: Duration = Duration::from_millis(500);

enum LinkOp {
    Connect,
    Write(Bytes),
    Subscribe(Uuid),
    Unsubscribe(Uuid),
    Close { farewell: Option<Bytes> },
}

struct Request {
    op: LinkOp,
    reply: Reply,
}

/// Result of a link operation, resolved by the worker
#[must_use = "a completion does nothing unless joined or dropped on purpose"]
pub struct Completion {
    rx: oneshot::Receiver<Result<(), TransportError>>,
}

impl Completion {
    fn ready(result: Result<(), TransportError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// Wait for the operation from async code
    pub async fn join(self) -> Result<(), TransportError> {
        self.rx
            .await
            .unwrap_or(Err(TransportError::ConnectionClosed))
    }

    /// Wait for the operation from a thread outside the runtime
    ///
    /// Panics if called from within an async execution context.
    pub fn wait(self) -> Result<(), TransportError> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(TransportError::ConnectionClosed))
    }
}

/// One vehicle connection
pub struct LinkTransport {
    address: String,
    adapter: Arc<dyn GattAdapter>,
    requests: mpsc::UnboundedSender<Request>,
    in_flight: Arc<AtomicBool>,
    closed: AtomicBool,
    /// Set once on disconnect; aborts whatever the worker is awaiting
    cancel: watch::Sender<bool>,
    faults: broadcast::Sender<TransportError>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LinkTransport {
    /// Start the link worker for an adapter
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn(adapter: Arc<dyn GattAdapter>) -> Self {
        Self::with_write_characteristic(adapter, characteristic::WRITE)
    }

    pub fn with_write_characteristic(adapter: Arc<dyn GattAdapter>, write_char: Uuid) -> Self {
        let (requests, rx) = mpsc::unbounded_channel();
        let (faults, _) = broadcast::channel(64);
        let (cancel, cancelled) = watch::channel(false);
        let in_flight = Arc::new(AtomicBool::new(false));
        let address = adapter.address();

        let worker = LinkWorker {
            address: address.clone(),
            adapter: adapter.clone(),
            write_char,
            in_flight: in_flight.clone(),
            faults: faults.clone(),
            subscriptions: HashSet::new(),
        };
        let handle = tokio::spawn(worker.run(rx, cancelled));

        Self {
            address,
            adapter,
            requests,
            in_flight,
            closed: AtomicBool::new(false),
            cancel,
            faults,
            worker: Mutex::new(Some(handle)),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connect the peripheral
    pub fn connect(&self) -> Completion {
        self.submit(LinkOp::Connect)
    }

    /// Write one frame, failing fast if another write is in flight
    pub fn send(&self, frame: &Frame) -> Result<Completion, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TransportError::Busy);
        }

        let (reply, rx) = oneshot::channel();
        let request = Request {
            op: LinkOp::Write(frame.encode()),
            reply,
        };
        if self.requests.send(request).is_err() {
            self.in_flight.store(false, Ordering::Release);
            return Err(TransportError::ConnectionClosed);
        }
        Ok(Completion { rx })
    }

    /// Enable notifications on a characteristic
    pub fn subscribe(&self, characteristic: Uuid) -> Completion {
        self.submit(LinkOp::Subscribe(characteristic))
    }

    pub fn unsubscribe(&self, characteristic: Uuid) -> Completion {
        self.submit(LinkOp::Unsubscribe(characteristic))
    }

    /// Notifications from the peripheral, in receive order
    pub fn notifications(&self) -> broadcast::Receiver<IncomingNotification> {
        self.adapter.subscribe()
    }

    /// Failures of writes and subscriptions, as they happen
    pub fn faults(&self) -> broadcast::Receiver<TransportError> {
        self.faults.subscribe()
    }

    /// Stop notifications, write `farewell` if given, then release the
    /// connection. The operation in flight and everything queued behind it
    /// resolve to [`TransportError::ConnectionClosed`]. Only the first call
    /// does anything.
    pub fn disconnect(&self, farewell: Option<Bytes>) -> Completion {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Completion::ready(Ok(()));
        }
        self.cancel.send_replace(true);

        let (reply, rx) = oneshot::channel();
        if self
            .requests
            .send(Request {
                op: LinkOp::Close { farewell },
                reply,
            })
            .is_err()
        {
            return Completion::ready(Ok(()));
        }
        Completion { rx }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the worker task has exited
    pub fn is_stopped(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }

    fn submit(&self, op: LinkOp) -> Completion {
        if self.closed.load(Ordering::Acquire) {
            return Completion::ready(Err(TransportError::ConnectionClosed));
        }
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request { op, reply }).is_err() {
            return Completion::ready(Err(TransportError::ConnectionClosed));
        }
        Completion { rx }
    }
}

impl Drop for LinkTransport {
    fn drop(&mut self) {
        if !self.is_closed() {
            let _ = self.disconnect(None);
        }
    }
}

struct LinkWorker {
    address: String,
    adapter: Arc<dyn GattAdapter>,
    write_char: Uuid,
    in_flight: Arc<AtomicBool>,
    faults: broadcast::Sender<TransportError>,
    subscriptions: HashSet<Uuid>,
}

impl LinkWorker {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Request>,
        mut cancel: watch::Receiver<bool>,
    ) {
        debug!(address = %self.address, "Link worker started");

        while let Some(Request { op, reply }) = rx.recv().await {
            if let LinkOp::Close { farewell } = op {
                let _ = reply.send(self.close(farewell).await);
                break;
            }

            let write = matches!(op, LinkOp::Write(_));
            let result = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => Err(TransportError::ConnectionClosed),
                result = self.execute(op) => result,
            };
            if write {
                self.in_flight.store(false, Ordering::Release);
            }
            let _ = reply.send(result);
        }

        // Anything still queued is dropped here; its completion resolves
        // to ConnectionClosed.
        self.in_flight.store(false, Ordering::Release);
        debug!(address = %self.address, "Link worker stopped");
    }

    async fn execute(&mut self, op: LinkOp) -> Result<(), TransportError> {
        match op {
            LinkOp::Connect => {
                self.adapter.connect().await?;
                if !self.adapter.is_connected().await {
                    return Err(TransportError::NotConnected);
                }
                info!(address = %self.address, "Link connected");
                Ok(())
            }
            LinkOp::Write(bytes) => {
                let result = self.adapter.write(self.write_char, &bytes).await;
                if let Err(e) = &result {
                    warn!(address = %self.address, error = %e, "Write failed");
                    let _ = self.faults.send(e.clone());
                }
                result
            }
            LinkOp::Subscribe(characteristic) => {
                let result = self.adapter.start_notify(characteristic).await;
                match &result {
                    Ok(()) => {
                        self.subscriptions.insert(characteristic);
                        debug!(address = %self.address, %characteristic, "Notifications started");
                    }
                    Err(e) => {
                        warn!(address = %self.address, error = %e, "Subscribe failed");
                        let _ = self.faults.send(e.clone());
                    }
                }
                result
            }
            LinkOp::Unsubscribe(characteristic) => {
                self.subscriptions.remove(&characteristic);
                self.adapter.stop_notify(characteristic).await
            }
            LinkOp::Close { farewell } => self.close(farewell).await,
        }
    }

    /// Stop notifications, say goodbye, release the peripheral
    async fn close(&mut self, farewell: Option<Bytes>) -> Result<(), TransportError> {
        for characteristic in self.subscriptions.drain() {
            let stopped = self.adapter.stop_notify(characteristic);
            match tokio::time::timeout(CLOSE_STEP_TIMEOUT, stopped).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(address = %self.address, error = %e, "Stop notify failed"),
                Err(_) => debug!(address = %self.address, "Stop notify timed out"),
            }
        }
        if let Some(bytes) = farewell {
            let written = self.adapter.write(self.write_char, &bytes);
            match tokio::time::timeout(CLOSE_STEP_TIMEOUT, written).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(address = %self.address, error = %e, "Farewell write failed"),
                Err(_) => debug!(address = %self.address, "Farewell write timed out"),
            }
        }
        let result = self.adapter.disconnect().await;
        info!(address = %self.address, "Link released");
        result
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|c| *c).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfig;
    use crate::protocol::Command;
    use crate::transport::MockGattAdapter;

    const WAIT: Duration = Duration::from_secs(1);

    async fn connected_link() -> (Arc<MockGattAdapter>, LinkTransport) {
        let mock = Arc::new(MockGattAdapter::new(&MockConfig::default(), "mock-1"));
        let link = LinkTransport::spawn(mock.clone());
        link.connect().join().await.unwrap();
        (mock, link)
    }

    #[tokio::test]
    async fn test_send_writes_length_prefixed_frame() {
        let (mock, link) = connected_link().await;

        link.send(&Command::RequestBattery.to_frame())
            .unwrap()
            .join()
            .await
            .unwrap();

        assert_eq!(mock.writes(), vec![vec![0x01, 0x1A]]);
        assert!(!link.is_busy());
    }

    #[tokio::test]
    async fn test_second_send_while_in_flight_is_busy() {
        let (mock, link) = connected_link().await;
        mock.hold_writes();

        let first = link.send(&Command::RequestVersion.to_frame()).unwrap();
        let second = link.send(&Command::RequestBattery.to_frame());
        assert!(matches!(second, Err(TransportError::Busy)));

        mock.release_writes();
        first.join().await.unwrap();

        assert_eq!(mock.writes(), vec![vec![0x01, 0x18]]);
        // guard released, next send goes through
        link.send(&Command::RequestBattery.to_frame())
            .unwrap()
            .join()
            .await
            .unwrap();
        assert_eq!(mock.writes().len(), 2);
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let mock = Arc::new(MockGattAdapter::new(&MockConfig::default(), "mock-1"));
        mock.set_reachable(false);
        let link = LinkTransport::spawn(mock.clone());

        let err = link.connect().join().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn test_write_failure_is_published_as_fault() {
        let (mock, link) = connected_link().await;
        let mut faults = link.faults();
        mock.set_fail_writes(true);

        let result = link
            .send(&Command::RequestVersion.to_frame())
            .unwrap()
            .join()
            .await;
        assert!(matches!(result, Err(TransportError::SendFailed(_))));
        assert!(matches!(
            faults.recv().await.unwrap(),
            TransportError::SendFailed(_)
        ));
        assert!(!link.is_busy());
    }

    #[tokio::test]
    async fn test_disconnect_stops_notifications_then_releases() {
        let (mock, link) = connected_link().await;
        link.subscribe(characteristic::NOTIFY).join().await.unwrap();
        assert!(mock.is_notifying(characteristic::NOTIFY));

        link.disconnect(Some(Command::Disconnect.encode()))
            .join()
            .await
            .unwrap();

        assert!(!mock.is_notifying(characteristic::NOTIFY));
        assert_eq!(mock.writes(), vec![vec![0x01, 0x0D]]);
        assert_eq!(mock.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_stalled_write() {
        let (mock, link) = connected_link().await;
        link.subscribe(characteristic::NOTIFY).join().await.unwrap();
        mock.hold_writes();
        let pending = link.send(&Command::RequestVersion.to_frame()).unwrap();

        let closed = tokio::time::timeout(
            WAIT,
            link.disconnect(Some(Command::Disconnect.encode())).join(),
        )
        .await;
        assert_eq!(closed, Ok(Ok(())));

        assert_eq!(pending.join().await, Err(TransportError::ConnectionClosed));
        assert!(!mock.is_notifying(characteristic::NOTIFY));
        assert_eq!(mock.disconnect_count(), 1);
        assert!(!link.is_busy());
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_cancels_queued_operations() {
        let (mock, link) = connected_link().await;
        mock.hold_writes();
        let write = link.send(&Command::RequestBattery.to_frame()).unwrap();
        let subscribe = link.subscribe(characteristic::NOTIFY);

        link.disconnect(None).join().await.unwrap();

        assert_eq!(write.join().await, Err(TransportError::ConnectionClosed));
        assert_eq!(subscribe.join().await, Err(TransportError::ConnectionClosed));
        assert!(!mock.is_notifying(characteristic::NOTIFY));
        assert_eq!(mock.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_noop() {
        let (mock, link) = connected_link().await;

        link.disconnect(None).join().await.unwrap();
        link.disconnect(None).join().await.unwrap();

        assert_eq!(mock.disconnect_count(), 1);
        assert!(link.is_closed());
        assert!(matches!(
            link.send(&Command::RequestVersion.to_frame()),
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_worker_stops_after_disconnect() {
        let (_mock, link) = connected_link().await;
        link.disconnect(None).join().await.unwrap();

        let stopped = async {
            while !link.is_stopped() {
                tokio::task::yield_now().await;
            }
        };
        assert!(tokio::time::timeout(WAIT, stopped).await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_releases_connection() {
        let (mock, link) = connected_link().await;
        drop(link);

        let released = async {
            while mock.disconnect_count() == 0 {
                tokio::task::yield_now().await;
            }
        };
        assert!(tokio::time::timeout(WAIT, released).await.is_ok());
    }
}
