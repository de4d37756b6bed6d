//! In-process transport backed by tokio channels.
//!
//! [`LoopbackTransport`] is the sender half handed to the scheduler;
//! [`LoopbackPeer`] plays the central device. Notifications arrive on an
//! unbounded channel, and the characteristic value is kept in a watch slot so
//! read-mode peers can poll it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::{UnboundedReceiverStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Connection, DeliveryMode, Endpoint, Transport};
use crate::{ReplayError, Result};

struct LinkRequest {
    notifications: mpsc::UnboundedSender<Vec<u8>>,
    value: watch::Sender<Vec<u8>>,
    closed: CancellationToken,
}

struct ActiveLink {
    connection: Connection,
    notifications: mpsc::UnboundedSender<Vec<u8>>,
    value: watch::Sender<Vec<u8>>,
}

#[derive(Default)]
struct Shared {
    unavailable: AtomicBool,
    stalled_sends: AtomicUsize,
    advertised: Mutex<Option<Endpoint>>,
}

/// Sender-side loopback transport
pub struct LoopbackTransport {
    delivery: DeliveryMode,
    requests: mpsc::UnboundedReceiver<LinkRequest>,
    shared: Arc<Shared>,
    advertising: bool,
    active: Option<ActiveLink>,
    next_id: u64,
}

impl LoopbackTransport {
    /// Create a transport and the peer handle that connects to it
    pub fn new(delivery: DeliveryMode) -> (Self, LoopbackPeer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let transport = Self {
            delivery,
            requests: rx,
            shared: Arc::clone(&shared),
            advertising: false,
            active: None,
            next_id: 1,
        };
        (transport, LoopbackPeer { requests: tx, shared })
    }

    /// Notify-mode transport
    pub fn pair() -> (Self, LoopbackPeer) {
        Self::new(DeliveryMode::Notify)
    }

    fn active_for(&self, connection: &Connection) -> Result<&ActiveLink> {
        self.active
            .as_ref()
            .filter(|link| link.connection.id() == connection.id() && connection.is_connected())
            .ok_or(ReplayError::Disconnected { connection_id: connection.id() })
    }

    fn take_stall(&self) -> bool {
        self.shared
            .stalled_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl Transport for LoopbackTransport {
    async fn start_advertising(&mut self, endpoint: &Endpoint) -> Result<()> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(ReplayError::transport_unavailable("loopback radio is switched off"));
        }
        if let Ok(mut advertised) = self.shared.advertised.lock() {
            *advertised = Some(endpoint.clone());
        }
        self.advertising = true;
        info!(service = %endpoint.service_id, characteristic = %endpoint.characteristic_id, "Loopback advertising");
        Ok(())
    }

    async fn await_connection(&mut self) -> Result<Connection> {
        if !self.advertising {
            return Err(ReplayError::transport_unavailable("loopback transport is not advertising"));
        }

        let request = self
            .requests
            .recv()
            .await
            .ok_or_else(|| ReplayError::transport_unavailable("loopback peer handle dropped"))?;

        let id = self.next_id;
        self.next_id += 1;
        let connection = Connection::with_signal(id, format!("loopback-{id}"), request.closed);
        if let Some(previous) = self.active.replace(ActiveLink {
            connection: connection.clone(),
            notifications: request.notifications,
            value: request.value,
        }) {
            previous.connection.mark_disconnected();
        }

        debug!(connection_id = id, "Loopback peer connected");
        Ok(connection)
    }

    async fn send(&mut self, connection: &Connection, fragment: &[u8]) -> Result<()> {
        let link = self.active_for(connection)?;

        if self.take_stall() {
            std::future::pending::<()>().await;
        }

        let disconnected = || {
            link.connection.mark_disconnected();
            ReplayError::Disconnected { connection_id: connection.id() }
        };

        if link.value.is_closed() {
            return Err(disconnected());
        }
        link.value.send_replace(fragment.to_vec());

        if self.delivery == DeliveryMode::Notify {
            link.notifications.send(fragment.to_vec()).map_err(|_| disconnected())?;
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(link) = self.active.take() {
            link.connection.mark_disconnected();
        }
        if let Ok(mut advertised) = self.shared.advertised.lock() {
            *advertised = None;
        }
        self.advertising = false;
        debug!("Loopback transport stopped");
        Ok(())
    }

    fn delivery_mode(&self) -> DeliveryMode {
        self.delivery
    }
}

/// Central-side handle for a [`LoopbackTransport`]
#[derive(Clone)]
pub struct LoopbackPeer {
    requests: mpsc::UnboundedSender<LinkRequest>,
    shared: Arc<Shared>,
}

impl LoopbackPeer {
    /// Queue a connection; the transport accepts it on its next `await_connection`
    pub fn connect(&self) -> Result<LoopbackLink> {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (value_tx, value_rx) = watch::channel(Vec::new());
        let closed = CancellationToken::new();

        self.requests
            .send(LinkRequest { notifications: notify_tx, value: value_tx, closed: closed.clone() })
            .map_err(|_| ReplayError::transport_unavailable("loopback transport dropped"))?;

        Ok(LoopbackLink { notifications: notify_rx, value: value_rx, closed })
    }

    /// Endpoint currently advertised, if any
    pub fn advertised(&self) -> Option<Endpoint> {
        self.shared.advertised.lock().ok().and_then(|advertised| advertised.clone())
    }

    /// Make the next `start_advertising` fail as if the radio were off
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the next `count` sends hang forever
    pub fn stall_sends(&self, count: usize) {
        self.shared.stalled_sends.store(count, Ordering::SeqCst);
    }
}

/// One connected loopback central
pub struct LoopbackLink {
    notifications: mpsc::UnboundedReceiver<Vec<u8>>,
    value: watch::Receiver<Vec<u8>>,
    closed: CancellationToken,
}

impl LoopbackLink {
    /// Next notified fragment; `None` once the sender side is gone
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.notifications.recv().await
    }

    /// Next notified fragment if one is already queued
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.notifications.try_recv().ok()
    }

    /// Current characteristic value
    pub fn read_value(&self) -> Vec<u8> {
        self.value.borrow().clone()
    }

    /// Stream of characteristic value updates
    pub fn value_changes(&self) -> WatchStream<Vec<u8>> {
        WatchStream::from_changes(self.value.clone())
    }

    /// Drop the link from the central side
    pub fn disconnect(&self) {
        self.closed.cancel();
    }

    /// Whether this side still considers the link up
    pub fn is_connected(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Convert into a stream of notified fragments
    pub fn into_stream(self) -> UnboundedReceiverStream<Vec<u8>> {
        UnboundedReceiverStream::new(self.notifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::StreamExt;

    async fn connected(delivery: DeliveryMode) -> (LoopbackTransport, LoopbackPeer, LoopbackLink, Connection) {
        let (mut transport, peer) = LoopbackTransport::new(delivery);
        transport.start_advertising(&Endpoint::default()).await.unwrap();
        let link = peer.connect().unwrap();
        let connection = transport.await_connection().await.unwrap();
        (transport, peer, link, connection)
    }

    #[tokio::test]
    async fn notify_mode_delivers_in_order() {
        let (mut transport, peer, link, connection) = connected(DeliveryMode::Notify).await;
        assert_eq!(peer.advertised(), Some(Endpoint::default()));

        transport.send(&connection, &[1, 2]).await.unwrap();
        transport.send(&connection, &[3]).await.unwrap();
        assert_eq!(link.read_value(), vec![3]);

        transport.stop().await.unwrap();
        drop(transport);
        let received: Vec<Vec<u8>> = link.into_stream().collect().await;
        assert_eq!(received, vec![vec![1, 2], vec![3]]);
        assert_eq!(peer.advertised(), None);
    }

    #[tokio::test]
    async fn read_mode_only_updates_value() {
        let (mut transport, _peer, mut link, connection) = connected(DeliveryMode::Read).await;
        assert_eq!(transport.delivery_mode(), DeliveryMode::Read);

        transport.send(&connection, &[9, 9]).await.unwrap();
        assert_eq!(link.read_value(), vec![9, 9]);
        assert!(link.try_recv().is_none());
    }

    #[tokio::test]
    async fn central_disconnect_fails_sends() {
        let (mut transport, _peer, link, connection) = connected(DeliveryMode::Notify).await;
        assert!(link.is_connected());
        link.disconnect();
        assert!(!link.is_connected());
        connection.on_disconnect().await;

        let err = transport.send(&connection, &[1]).await.unwrap_err();
        assert!(matches!(err, ReplayError::Disconnected { connection_id: 1 }));
    }

    #[tokio::test]
    async fn dropped_link_is_detected_on_send() {
        let (mut transport, _peer, link, connection) = connected(DeliveryMode::Notify).await;
        drop(link);

        let err = transport.send(&connection, &[1]).await.unwrap_err();
        assert!(matches!(err, ReplayError::Disconnected { .. }));
        assert!(!connection.is_connected());
    }

    #[tokio::test]
    async fn unavailable_radio_fails_advertising() {
        let (mut transport, peer) = LoopbackTransport::pair();
        peer.set_unavailable(true);
        let err = transport.start_advertising(&Endpoint::default()).await.unwrap_err();
        assert!(matches!(err, ReplayError::TransportUnavailable { .. }));
    }

    #[tokio::test]
    async fn await_connection_requires_advertising() {
        let (mut transport, _peer) = LoopbackTransport::pair();
        assert!(transport.await_connection().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_send_never_completes() {
        let (mut transport, peer, mut link, connection) = connected(DeliveryMode::Notify).await;
        peer.stall_sends(1);

        let stalled = tokio::time::timeout(Duration::from_millis(100), transport.send(&connection, &[1])).await;
        assert!(stalled.is_err());

        transport.send(&connection, &[2]).await.unwrap();
        assert_eq!(link.recv().await, Some(vec![2]));
    }

    #[tokio::test]
    async fn value_changes_stream_sees_updates() {
        let (mut transport, _peer, link, connection) = connected(DeliveryMode::Read).await;
        let mut changes = link.value_changes();
        transport.send(&connection, &[4]).await.unwrap();
        assert_eq!(changes.next().await, Some(vec![4]));
    }
}
