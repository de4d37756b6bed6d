//! Transport adapters.
//!
//! The scheduler talks to the outside world only through [`Transport`]: advertise
//! an endpoint, wait for a peer, push fragment bytes, stop. Backends decide how
//! those map onto a real link:
//!
//! - [`LoopbackTransport`]: in-process channels, used by tests and demos
//! - [`TcpTransport`]: one TCP peer on a local socket, length-prefixed frames
//!
//! Each [`Connection`] carries a disconnect signal that the backend fires from
//! whatever task observes the link going away.

mod loopback;
mod tcp;

pub use loopback::{LoopbackLink, LoopbackPeer, LoopbackTransport};
pub use tcp::{TcpReceiver, TcpTransport};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::Result;

/// Default advertised service identifier
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_567812345678);

/// Default characteristic identifier used for fragment delivery
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x12345678_1234_5678_1234_567812345679);

/// Identity a transport advertises
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    /// Service identifier
    pub service_id: Uuid,

    /// Characteristic carrying fragments
    pub characteristic_id: Uuid,

    /// Advertised device name; backends pick a default when unset
    pub device_name: Option<String>,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            service_id: DEFAULT_SERVICE_UUID,
            characteristic_id: DEFAULT_CHARACTERISTIC_UUID,
            device_name: None,
        }
    }
}

/// How fragment bytes reach the peer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Push each fragment as a notification
    #[default]
    Notify,

    /// Update the characteristic value; the peer polls it
    Read,
}

/// One active peer link
///
/// Cloning shares the disconnect signal.
#[derive(Debug, Clone)]
pub struct Connection {
    id: u64,
    peer: String,
    closed: CancellationToken,
}

impl Connection {
    /// Create a connection with a fresh disconnect signal
    pub fn new(id: u64, peer: impl Into<String>) -> Self {
        Self::with_signal(id, peer, CancellationToken::new())
    }

    /// Create a connection around an existing disconnect signal
    pub fn with_signal(id: u64, peer: impl Into<String>, closed: CancellationToken) -> Self {
        Self { id, peer: peer.into(), closed }
    }

    /// Backend-assigned connection id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Human-readable peer description
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Whether the link is still up
    pub fn is_connected(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Resolves once the link goes down
    pub async fn on_disconnect(&self) {
        self.closed.cancelled().await
    }

    /// Fire the disconnect signal
    pub fn mark_disconnected(&self) {
        self.closed.cancel();
    }
}

/// Delivery surface used by the scheduler
///
/// All calls come from the scheduler's control task, one at a time. Backends may
/// run background tasks, but only to observe the link (accepts, disconnects).
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    /// Begin announcing `endpoint`
    ///
    /// Fails with [`ReplayError::TransportUnavailable`](crate::ReplayError::TransportUnavailable)
    /// when the underlying stack cannot be opened.
    async fn start_advertising(&mut self, endpoint: &Endpoint) -> Result<()>;

    /// Wait until a peer attaches
    ///
    /// A peer that drops during attachment yields
    /// [`ReplayError::Disconnected`](crate::ReplayError::Disconnected); the caller
    /// may keep waiting.
    async fn await_connection(&mut self) -> Result<Connection>;

    /// Deliver one fragment to the peer
    ///
    /// Returns [`ReplayError::Disconnected`](crate::ReplayError::Disconnected) when
    /// the link is gone. Callers bound the call with their own timeout, so the
    /// future may be dropped before it completes. A backend that cannot resume
    /// after a cancelled send must close the link on the next call.
    async fn send(&mut self, connection: &Connection, fragment: &[u8]) -> Result<()>;

    /// Stop advertising and drop any active link
    async fn stop(&mut self) -> Result<()>;

    /// Delivery mode used by [`send`](Self::send)
    fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::Notify
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_uses_documented_uuids() {
        let endpoint = Endpoint::default();
        assert_eq!(endpoint.service_id.to_string(), "12345678-1234-5678-1234-567812345678");
        assert_eq!(endpoint.characteristic_id.to_string(), "12345678-1234-5678-1234-567812345679");
    }

    #[tokio::test]
    async fn disconnect_signal_is_shared_between_clones() {
        let connection = Connection::new(1, "test");
        let observer = connection.clone();
        assert!(observer.is_connected());

        connection.mark_disconnected();
        observer.on_disconnect().await;
        assert!(!observer.is_connected());
        assert_eq!(observer.id(), 1);
        assert_eq!(observer.peer(), "test");
    }
}
