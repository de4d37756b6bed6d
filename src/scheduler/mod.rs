//! Replay scheduler.
//!
//! The scheduler owns the session and drives the whole pipeline from a single
//! control task:
//!
//! ```text
//! Idle → Advertising → Connected → Streaming → (Looping | Draining) → Stopped
//! ```
//!
//! Each step pulls one batch from the [`ReadingSource`], encodes it, splits it
//! into fragments and sends them in order through the [`Transport`]. A packet is
//! always flushed before the next one is encoded. Waiting for a peer and the
//! pacing delay between packets are the only places a stop request interrupts;
//! an in-flight packet always finishes.
//!
//! Failures follow a fixed policy: encode failures skip the packet, send
//! timeouts are retried once and then the fragment is dropped, a disconnect
//! abandons the in-flight packet, and transport or pipeline failures stop the
//! session. [`Scheduler::run`] never returns an error; the outcome is reported
//! in a [`ReplayReport`].

mod session;


pub use session::{ReplayReport, SchedulerState, SessionStats};

use session::Session;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::codec::PacketEncoder;
use crate::config::ReplayConfig;
use crate::fragment::split;
use crate::source::ReadingSource;
use crate::transport::{Connection, Transport};
use crate::types::{Fragment, Reading};
use crate::{ReplayError, Result};

/// Send attempts per fragment before it is dropped
const SEND_ATTEMPTS: u32 = 2;

/// Control handle for a running scheduler
#[derive(Debug, Clone)]
pub struct ReplayHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SchedulerState>,
}

impl ReplayHandle {
    /// Request a graceful stop
    ///
    /// The packet in flight is finished, then the transport is stopped.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Current scheduler state
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Wait until the scheduler reaches `target`
    ///
    /// Returns `false` if the scheduler went away without reaching it.
    pub async fn wait_for(&self, target: SchedulerState) -> bool {
        let mut state = self.state.clone();
        state.wait_for(|current| *current == target).await.is_ok()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.clone()
    }
}

/// How a streaming phase ended
enum StreamEnd {
    /// Source exhausted or stop requested
    Finished,
    /// Peer went away
    Disconnected,
}

/// How a single packet ended
enum PacketOutcome {
    Sent,
    Skipped,
    /// Link dropped part way through the packet
    Abandoned,
    /// Link dropped before the first fragment went out
    NotSent,
}

/// Fatal failure with the packet it interrupted
struct Failure {
    error: ReplayError,
    packet_id: Option<u32>,
}

impl Failure {
    fn new(error: ReplayError, packet_id: Option<u32>) -> Self {
        Self { error, packet_id }
    }
}

/// Drives a replay session
pub struct Scheduler<S, T> {
    config: ReplayConfig,
    source: S,
    transport: T,
    encoder: Box<dyn PacketEncoder>,
    session: Session,
    state: watch::Sender<SchedulerState>,
    cancel: CancellationToken,
}

impl<S, T> Scheduler<S, T>
where
    S: ReadingSource,
    T: Transport,
{
    /// Build a scheduler
    ///
    /// The configuration is validated here, so an invalid MTU or batch size never
    /// reaches the pipeline.
    pub fn new(config: ReplayConfig, source: S, transport: T) -> Result<Self> {
        config.validate()?;
        let encoder = config.encoding.encoder();
        let (state, _) = watch::channel(SchedulerState::Idle);

        Ok(Self {
            config,
            source,
            transport,
            encoder,
            session: Session::default(),
            state,
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the encoder chosen by the configuration
    pub fn with_encoder(mut self, encoder: Box<dyn PacketEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Handle for stopping and observing the session
    pub fn handle(&self) -> ReplayHandle {
        ReplayHandle { cancel: self.cancel.clone(), state: self.state.subscribe() }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Run on a new tokio task
    pub fn spawn(self) -> (ReplayHandle, JoinHandle<ReplayReport>) {
        let handle = self.handle();
        (handle, tokio::spawn(self.run()))
    }

    /// Run the session to completion
    pub async fn run(mut self) -> ReplayReport {
        info!(
            mtu = self.config.mtu,
            batch_size = self.config.batch_size,
            looping = self.config.loop_playback,
            encoding = %self.config.encoding,
            "Replay session starting"
        );

        let (last_error, failed_packet_id) = match self.drive().await {
            Ok(()) => {
                self.set_state(SchedulerState::Draining);
                (None, None)
            }
            Err(Failure { error, packet_id }) => {
                error!(packet_id = ?packet_id, error = %error, "Replay session failed");
                (Some(error), packet_id)
            }
        };

        if let Err(e) = self.transport.stop().await {
            warn!(error = %e, "Transport did not stop cleanly");
        }
        self.set_state(SchedulerState::Stopped);

        let mut stats = self.session.stats.clone();
        stats.rows_skipped += self.source.skipped_rows() as u64;

        info!(
            packets = stats.packets_sent,
            fragments = stats.fragments_sent,
            dropped = stats.fragments_dropped,
            cycles = stats.completed_cycles,
            "Replay session stopped"
        );

        ReplayReport { state: SchedulerState::Stopped, last_error, failed_packet_id, stats }
    }

    fn set_state(&self, state: SchedulerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Scheduler state changed");
        }
    }

    async fn drive(&mut self) -> std::result::Result<(), Failure> {
        self.set_state(SchedulerState::Advertising);
        self.transport
            .start_advertising(&self.config.endpoint)
            .await
            .map_err(|e| Failure::new(e, None))?;

        loop {
            let connection = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Stop requested while advertising");
                    return Ok(());
                }
                result = self.transport.await_connection() => match result {
                    Ok(connection) => connection,
                    Err(ReplayError::Disconnected { connection_id }) => {
                        warn!(connection_id, "Peer dropped while attaching");
                        continue;
                    }
                    Err(e) => return Err(Failure::new(e, None)),
                },
            };

            self.session.stats.connections += 1;
            self.set_state(SchedulerState::Connected);
            info!(connection_id = connection.id(), peer = connection.peer(), "Peer connected");

            match self.stream(&connection).await? {
                StreamEnd::Finished => return Ok(()),
                StreamEnd::Disconnected if self.config.stop_on_disconnect => {
                    info!(connection_id = connection.id(), "Peer disconnected, ending session");
                    return Ok(());
                }
                StreamEnd::Disconnected => {
                    info!(connection_id = connection.id(), "Peer disconnected, advertising again");
                    self.set_state(SchedulerState::Advertising);
                }
            }
        }
    }

    async fn stream(&mut self, connection: &Connection) -> std::result::Result<StreamEnd, Failure> {
        self.set_state(SchedulerState::Streaming);

        loop {
            if self.cancel.is_cancelled() {
                info!("Stop requested");
                return Ok(StreamEnd::Finished);
            }
            if !connection.is_connected() {
                return Ok(StreamEnd::Disconnected);
            }

            // A batch held from a dropped link goes out first, without a pacing delay.
            let (batch, held) = match self.session.take_held_batch() {
                Some(batch) => (batch, true),
                None => match self.next_batch() {
                    Some(batch) => (batch, false),
                    None => return Ok(StreamEnd::Finished),
                },
            };

            let Some(last) = batch.last().map(|reading| reading.timestamp_count) else {
                return Ok(StreamEnd::Finished);
            };
            if let (false, Some(previous)) = (held, self.session.last_timestamp()) {
                let delay = self.config.pacing.delay_between(Some(previous), last);
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        info!("Stop requested during pacing delay");
                        return Ok(StreamEnd::Finished);
                    }
                    _ = connection.on_disconnect() => {
                        debug!(readings = batch.len(), "Peer left during pacing delay, holding batch");
                        self.session.hold_batch(batch);
                        return Ok(StreamEnd::Disconnected);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let packet_id = self.session.take_packet_id();
            match self.send_packet(connection, packet_id, &batch).await {
                Ok(PacketOutcome::Sent) => self.session.stats.packets_sent += 1,
                Ok(PacketOutcome::Skipped) => self.session.stats.packets_skipped += 1,
                Ok(PacketOutcome::Abandoned) => {
                    self.session.advance_timestamp(last);
                    self.session.stats.packets_abandoned += 1;
                    warn!(packet_id, "Packet abandoned after disconnect");
                    return Ok(StreamEnd::Disconnected);
                }
                Ok(PacketOutcome::NotSent) => {
                    debug!(packet_id, "Peer left before packet started, holding batch");
                    self.session.release_packet_id(packet_id);
                    self.session.hold_batch(batch);
                    return Ok(StreamEnd::Disconnected);
                }
                Err(e) => return Err(Failure::new(e, Some(packet_id))),
            }
            self.session.advance_timestamp(last);
        }
    }

    /// Next batch, rewinding at end of input when looping
    ///
    /// `None` ends the session.
    fn next_batch(&mut self) -> Option<Vec<Reading>> {
        let batch = self.source.next_batch(self.config.batch_size);
        if !batch.is_empty() {
            return Some(batch);
        }

        if !self.config.loop_playback {
            info!("End of input reached");
            self.session.stats.completed_cycles += 1;
            return None;
        }

        self.set_state(SchedulerState::Looping);
        self.session.close_pass(self.source.skipped_rows());
        self.source.rewind();
        debug!(cycle = self.session.stats.completed_cycles, "Rewinding input");

        let batch = self.source.next_batch(self.config.batch_size);
        if batch.is_empty() {
            warn!("Input has no readings after rewind, stopping");
            return None;
        }
        self.set_state(SchedulerState::Streaming);
        Some(batch)
    }

    async fn send_packet(
        &mut self,
        connection: &Connection,
        packet_id: u32,
        batch: &[Reading],
    ) -> Result<PacketOutcome> {
        let buffer = match self.encoder.encode(batch, packet_id) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(packet_id, error = %e, "Skipping packet that failed to encode");
                return Ok(PacketOutcome::Skipped);
            }
        };

        let fragments = match split(&buffer, packet_id, self.config.mtu) {
            Ok(fragments) => fragments,
            Err(e @ ReplayError::InvalidMtu { .. }) => return Err(e),
            Err(e) => {
                warn!(packet_id, error = %e, "Skipping packet that cannot be fragmented");
                return Ok(PacketOutcome::Skipped);
            }
        };

        debug!(
            packet_id,
            readings = batch.len(),
            bytes = buffer.len(),
            fragments = fragments.len(),
            "Sending packet"
        );

        let gap = self.config.fragment_gap();
        for fragment in &fragments {
            if fragment.sequence_index > 0 && !gap.is_zero() {
                tokio::time::sleep(gap).await;
            }
            let lost = if fragment.sequence_index == 0 {
                PacketOutcome::NotSent
            } else {
                PacketOutcome::Abandoned
            };
            if !connection.is_connected() {
                return Ok(lost);
            }

            match self.deliver(connection, fragment).await {
                Ok(true) => self.session.stats.fragments_sent += 1,
                Ok(false) => self.session.stats.fragments_dropped += 1,
                Err(ReplayError::Disconnected { .. }) => return Ok(lost),
                Err(e) => return Err(e),
            }
        }

        Ok(PacketOutcome::Sent)
    }

    /// Send one fragment with a bounded retry; `Ok(false)` means it was dropped.
    async fn deliver(&mut self, connection: &Connection, fragment: &Fragment) -> Result<bool> {
        let bytes = fragment.to_bytes();
        let timeout = self.config.send_timeout();

        for attempt in 1..=SEND_ATTEMPTS {
            match tokio::time::timeout(timeout, self.transport.send(connection, &bytes)).await {
                Ok(Ok(())) => {
                    trace!(
                        packet_id = fragment.packet_id,
                        index = fragment.sequence_index,
                        total = fragment.total_fragments,
                        "Fragment sent"
                    );
                    return Ok(true);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    self.session.stats.send_timeouts += 1;
                    let timeout_error = ReplayError::SendTimeout {
                        packet_id: fragment.packet_id,
                        sequence_index: fragment.sequence_index,
                        duration: timeout,
                    };
                    warn!(attempt, error = %timeout_error, "Fragment send timed out");
                }
            }
        }

        warn!(
            packet_id = fragment.packet_id,
            index = fragment.sequence_index,
            "Dropping fragment after retry"
        );
        Ok(false)
    }
}
