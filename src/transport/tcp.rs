//! Single-peer TCP transport.
//!
//! Advertising binds a listener; the first accepted socket becomes the
//! connection. On accept the sender writes a hello frame carrying the advertised
//! identifiers, then every fragment follows as `[len: u16 LE][bytes]`. A watcher
//! task reads the socket's inbound half and fires the disconnect signal on EOF.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Connection, Endpoint, Transport};
use crate::{ReplayError, Result};

const HELLO_MAGIC: &[u8; 4] = b"IMUR";
const HELLO_LEN: usize = HELLO_MAGIC.len() + 32;

/// Consecutive accept failures before the listener is considered broken
const MAX_ACCEPT_ERRORS: u32 = 10;

fn hello_frame(endpoint: &Endpoint) -> Vec<u8> {
    let mut frame = Vec::with_capacity(2 + HELLO_LEN);
    frame.extend_from_slice(&(HELLO_LEN as u16).to_le_bytes());
    frame.extend_from_slice(HELLO_MAGIC);
    frame.extend_from_slice(endpoint.service_id.as_bytes());
    frame.extend_from_slice(endpoint.characteristic_id.as_bytes());
    frame
}

fn parse_hello(frame: &[u8]) -> Result<Endpoint> {
    if frame.len() != HELLO_LEN || &frame[..4] != HELLO_MAGIC {
        return Err(ReplayError::decode_failed("tcp hello", "unexpected handshake frame"));
    }
    let uuid_at = |offset: usize| {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&frame[offset..offset + 16]);
        Uuid::from_bytes(bytes)
    };
    Ok(Endpoint { service_id: uuid_at(4), characteristic_id: uuid_at(20), device_name: None })
}

struct Peer {
    connection: Connection,
    writer: OwnedWriteHalf,
    watcher: JoinHandle<()>,
    /// Set while a frame is being written
    mid_frame: bool,
}

/// Sender side of the TCP transport
pub struct TcpTransport {
    addr: String,
    listener: Option<TcpListener>,
    endpoint: Endpoint,
    peer: Option<Peer>,
    next_id: u64,
}

impl TcpTransport {
    /// Transport that listens on `addr` once advertising starts
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into(), listener: None, endpoint: Endpoint::default(), peer: None, next_id: 1 }
    }

    /// Bound address while advertising
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|listener| listener.local_addr().ok())
    }

    fn drop_peer(&mut self) {
        if let Some(peer) = self.peer.take() {
            peer.watcher.abort();
            peer.connection.mark_disconnected();
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.drop_peer();
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn start_advertising(&mut self, endpoint: &Endpoint) -> Result<()> {
        if self.listener.is_none() {
            let listener = TcpListener::bind(&self.addr).await.map_err(|e| {
                ReplayError::transport_unavailable_with_source(
                    format!("cannot listen on {}", self.addr),
                    Box::new(e),
                )
            })?;
            self.listener = Some(listener);
        }
        self.endpoint = endpoint.clone();

        info!(
            addr = ?self.local_addr(),
            service = %endpoint.service_id,
            characteristic = %endpoint.characteristic_id,
            "TCP transport listening"
        );
        Ok(())
    }

    async fn await_connection(&mut self) -> Result<Connection> {
        let mut accept_errors = 0u32;

        loop {
            let listener = self.listener.as_ref().ok_or_else(|| {
                ReplayError::transport_unavailable("tcp transport is not advertising")
            })?;

            // Only a listener that keeps failing ends the session.
            let (stream, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    accept_errors += 1;
                    warn!(error = %e, attempt = accept_errors, max = MAX_ACCEPT_ERRORS, "Accept failed");
                    if accept_errors >= MAX_ACCEPT_ERRORS {
                        return Err(ReplayError::transport_unavailable_with_source(
                            "accept keeps failing",
                            Box::new(e),
                        ));
                    }
                    let backoff = Duration::from_millis(50 * (1 << accept_errors.min(5)));
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };
            accept_errors = 0;

            if let Err(e) = stream.set_nodelay(true) {
                debug!(peer = %remote, error = %e, "Could not disable Nagle");
            }
            let (mut reader, mut writer) = stream.into_split();

            let id = self.next_id;
            self.next_id += 1;

            if let Err(e) = writer.write_all(&hello_frame(&self.endpoint)).await {
                warn!(connection_id = id, peer = %remote, error = %e, "Handshake write failed, waiting for another peer");
                continue;
            }

            let connection = Connection::new(id, remote.to_string());
            let signal = connection.clone();
            let watcher = tokio::spawn(async move {
                let mut scratch = [0u8; 64];
                loop {
                    match reader.read(&mut scratch).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => continue,
                    }
                }
                debug!(connection_id = signal.id(), "TCP peer closed");
                signal.mark_disconnected();
            });

            self.drop_peer();
            self.peer = Some(Peer { connection: connection.clone(), writer, watcher, mid_frame: false });
            info!(connection_id = id, peer = %remote, "TCP peer connected");
            return Ok(connection);
        }
    }

    async fn send(&mut self, connection: &Connection, fragment: &[u8]) -> Result<()> {
        let disconnected = ReplayError::Disconnected { connection_id: connection.id() };
        let len = u16::try_from(fragment.len()).map_err(|_| {
            ReplayError::config(format!("fragment of {} bytes exceeds TCP framing", fragment.len()))
        })?;

        let peer = match self.peer.as_mut() {
            Some(peer) if peer.connection.id() == connection.id() && connection.is_connected() => peer,
            _ => return Err(disconnected),
        };

        // A send dropped by the caller's timeout may have left part of a frame on
        // the socket. Nothing written after it could be framed correctly.
        if peer.mid_frame {
            warn!(connection_id = connection.id(), "Previous frame was cut short, closing link");
            self.drop_peer();
            return Err(disconnected);
        }

        let mut frame = Vec::with_capacity(2 + fragment.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(fragment);

        peer.mid_frame = true;
        if let Err(e) = peer.writer.write_all(&frame).await {
            debug!(connection_id = connection.id(), error = %e, "TCP write failed");
            self.drop_peer();
            return Err(disconnected);
        }
        peer.mid_frame = false;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(mut peer) = self.peer.take() {
            if !peer.mid_frame {
                if let Err(e) = peer.writer.shutdown().await {
                    debug!(connection_id = peer.connection.id(), error = %e, "TCP shutdown failed");
                }
            }
            peer.watcher.abort();
            peer.connection.mark_disconnected();
        }
        self.listener = None;
        debug!("TCP transport stopped");
        Ok(())
    }
}

/// Client side of [`TcpTransport`]
pub struct TcpReceiver {
    stream: TcpStream,
    endpoint: Endpoint,
}

impl TcpReceiver {
    /// Connect and read the sender's hello frame
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            ReplayError::transport_unavailable_with_source(format!("cannot connect to {addr}"), Box::new(e))
        })?;
        let mut receiver = Self { stream, endpoint: Endpoint::default() };

        let hello = receiver
            .next_frame()
            .await?
            .ok_or_else(|| ReplayError::decode_failed("tcp hello", "connection closed before handshake"))?;
        receiver.endpoint = parse_hello(&hello)?;
        Ok(receiver)
    }

    /// Identifiers announced by the sender
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Next fragment; `None` once the sender closes the connection
    pub async fn next_fragment(&mut self) -> Result<Option<Vec<u8>>> {
        self.next_frame().await
    }

    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let len = match self.stream.read_u16_le().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => return Ok(None),
            Err(e) => return Err(ReplayError::decode_failed("tcp frame length", e.to_string())),
        };

        let mut frame = vec![0u8; len];
        self.stream
            .read_exact(&mut frame)
            .await
            .map_err(|e| ReplayError::decode_failed("tcp frame body", e.to_string()))?;
        Ok(Some(frame))
    }
}
