//! UDP connection engine.
//!
//! A started connection runs two tasks:
//!
//! - **receive** reads datagrams from the socket into a bounded queue. When
//!   the queue is full it waits, so raw datagrams are never discarded.
//! - **parse** drains that queue: decodes each packet, records a peer id
//!   assignment, acknowledges every reliable packet, reassembles split
//!   messages and broadcasts decoded commands to subscribers.
//!
//! A malformed datagram, an unknown command or an undecodable payload is
//! logged and skipped. A socket error on receive or send ends the session:
//! the error is stored, the connection's cancellation token fires, and
//! [`Connection::wait`] / [`Connection::stop`] report it.

use crate::config::TransportConfig;
use crate::core::packet::{Body, Control, Packet, Payload, Reliable, PEER_ID_UNASSIGNED};
use crate::core::sequence::Sequencer;
use crate::core::split::{split_payload, SplitAssembler};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::command::Command;
use crate::protocol::commands::{client::PeerInit, ClientCommand, ServerCommand};
use crate::protocol::registry;
use crate::transport::fanout::{Event, Subscribers};
use crate::utils::metrics::Metrics;
use bytes::Bytes;
use std::io;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

/// Client side of one Minetest session.
///
/// The background tasks hold a reference to the connection, so it lives
/// until [`stop`](Self::stop) is called or the session fails.
#[derive(Debug)]
pub struct Connection {
    address: String,
    transport: TransportConfig,
    socket: OnceLock<Arc<UdpSocket>>,
    peer_id: AtomicU16,
    sequencer: Sequencer,
    split_sequencer: AtomicU16,
    subscribers: Subscribers,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    failure: Mutex<Option<ProtocolError>>,
}

impl Connection {
    /// Create an unstarted connection to `address` (`host:port`).
    pub fn new(address: impl Into<String>, transport: TransportConfig) -> Arc<Self> {
        let metrics = Arc::new(Metrics::new());
        Arc::new(Self {
            address: address.into(),
            sequencer: Sequencer::new(transport.sequence_baseline),
            transport,
            socket: OnceLock::new(),
            peer_id: AtomicU16::new(PEER_ID_UNASSIGNED),
            split_sequencer: AtomicU16::new(0),
            subscribers: Subscribers::new(metrics.clone()),
            metrics,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        })
    }

    /// Open the socket and spawn the receive and parse tasks.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.socket.get().is_some() {
            return Err(ProtocolError::Connect(constants::ERR_ALREADY_STARTED.into()));
        }

        let remote = lookup_host(self.address.as_str())
            .await
            .map_err(|e| ProtocolError::Connect(format!("resolve {}: {e}", self.address)))?
            .next()
            .ok_or_else(|| {
                ProtocolError::Connect(format!("no address found for {}", self.address))
            })?;
        let local: SocketAddr = if remote.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| ProtocolError::Connect(format!("bind {local}: {e}")))?;
        socket
            .connect(remote)
            .await
            .map_err(|e| ProtocolError::Connect(format!("connect {remote}: {e}")))?;
        let socket = Arc::new(socket);

        self.socket
            .set(socket.clone())
            .map_err(|_| ProtocolError::Connect(constants::ERR_ALREADY_STARTED.into()))?;

        let (raw_tx, raw_rx) = mpsc::channel(self.transport.receive_queue_capacity.max(1));
        let receiver = tokio::spawn(self.clone().receive_loop(socket, raw_tx));
        let parser = tokio::spawn(self.clone().parse_loop(raw_rx));
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([receiver, parser]);

        info!(%remote, "Connection started");
        Ok(())
    }

    /// Send the reliable peer-init packet that asks the server for a peer id.
    pub async fn init(&self) -> Result<()> {
        let payload = PeerInit.to_payload()?;
        let packet = Packet::reliable(PEER_ID_UNASSIGNED, 0, self.sequencer.next(), payload);
        debug!(seq = packet.sequence_number(), "Sending peer init");
        self.send(&packet).await
    }

    /// Encode and write one packet.
    pub async fn send(&self, packet: &Packet) -> Result<()> {
        let socket = self.socket.get().ok_or(ProtocolError::NotConnected)?;
        if self.cancel.is_cancelled() {
            return Err(ProtocolError::ConnectionClosed);
        }

        let bytes = packet.to_bytes();
        if let Err(e) = socket.send(&bytes).await {
            // A failed write leaves the transport unusable for the whole session.
            self.fail(ProtocolError::Io(io::Error::new(e.kind(), e.to_string())));
            return Err(ProtocolError::Io(e));
        }
        self.metrics.packet_sent(bytes.len() as u64);
        trace!(
            peer_id = packet.peer_id,
            channel = packet.channel,
            packet_type = ?packet.packet_type(),
            seq = packet.sequence_number(),
            len = bytes.len(),
            "Sent packet"
        );
        Ok(())
    }

    /// Send a command unreliably on channel 1.
    pub async fn send_original(&self, command: &ClientCommand) -> Result<()> {
        let payload = command.to_payload()?;
        debug!(command = command.name(), "Sending original command");
        self.send(&Packet::original(self.peer_id(), payload)).await
    }

    /// Send a command reliably on channel 1, splitting it when it does not
    /// fit one packet.
    pub async fn send_reliable(&self, command: &ClientCommand) -> Result<()> {
        let payload = command.to_payload()?;
        debug!(command = command.name(), "Sending reliable command");
        self.send_reliable_payload(payload).await
    }

    /// Reliable send of an already encoded payload.
    pub async fn send_reliable_payload(&self, payload: Payload) -> Result<()> {
        let peer_id = self.peer_id();

        if payload.wire_len() < self.transport.max_packet_length {
            let packet = Packet::reliable(peer_id, 1, self.sequencer.next(), payload);
            return self.send(&packet).await;
        }

        let split_seq = self.split_sequencer.fetch_add(1, Ordering::AcqRel);
        let fragments = split_payload(
            &payload.to_bytes(),
            self.transport.split_chunk_size(),
            split_seq,
        )?;
        debug!(
            command_id = payload.command_id,
            split_seq,
            fragments = fragments.len(),
            "Splitting oversized payload"
        );
        for fragment in fragments {
            let packet = Packet::reliable_split(peer_id, 1, self.sequencer.next(), fragment);
            self.send(&packet).await?;
        }
        Ok(())
    }

    /// Send a best-effort disconnect, cancel both tasks and wait for them.
    ///
    /// Returns the error that ended the session early, if any.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn stop(&self) -> Result<()> {
        if self.socket.get().is_none() {
            return Err(ProtocolError::NotConnected);
        }

        if !self.cancel.is_cancelled() {
            let disconnect = Packet::control(self.peer_id(), 0, Control::Disconnect);
            if let Err(e) = self.send(&disconnect).await {
                warn!(error = %e, "Failed to send disconnect");
            }
            self.cancel.cancel();
        }

        self.join_tasks().await;
        self.metrics.log_metrics();
        info!("Connection stopped");

        match self.take_failure() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Wait until the session ends, by `stop` or by a fatal error.
    pub async fn wait(&self) -> Result<()> {
        self.cancel.cancelled().await;
        self.join_tasks().await;
        match self.take_failure() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Resolves once the session has ended.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled when the session ends. Child tokens tie scheduled
    /// work to the connection's lifetime.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Register a subscriber queue of `capacity` events.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<Event> {
        self.subscribers.subscribe(capacity)
    }

    pub fn add_subscriber(&self, sender: mpsc::Sender<Event>) {
        self.subscribers.add(sender)
    }

    /// Assigned peer id, or 0 before assignment.
    pub fn peer_id(&self) -> u16 {
        self.peer_id.load(Ordering::Acquire)
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Local socket address once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.get().and_then(|socket| socket.local_addr().ok())
    }

    async fn receive_loop(self: Arc<Self>, socket: Arc<UdpSocket>, raw_tx: mpsc::Sender<Bytes>) {
        let mut buf = vec![0u8; self.transport.recv_buffer_size.max(1)];

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = socket.recv(&mut buf) => match received {
                    Ok(len) => {
                        self.metrics.packet_received(len as u64);
                        if raw_tx.send(Bytes::copy_from_slice(&buf[..len])).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        self.fail(ProtocolError::Io(e));
                        break;
                    }
                },
            }
        }

        debug!("Receive task finished");
    }

    async fn parse_loop(self: Arc<Self>, mut raw_rx: mpsc::Receiver<Bytes>) {
        // Servers number split messages per channel, so each channel
        // reassembles on its own.
        let mut assemblers: HashMap<u8, SplitAssembler> = HashMap::new();

        // Runs until the receive task drops its sender, then drains what is left.
        while let Some(datagram) = raw_rx.recv().await {
            match self.on_datagram(datagram, &mut assemblers).await {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    self.metrics.malformed_packet();
                    debug!(error = %e, "Dropping malformed datagram");
                }
                Err(e) => {
                    self.fail(e);
                    break;
                }
            }
        }

        let pending_splits: usize = assemblers.values().map(SplitAssembler::pending).sum();
        debug!(pending_splits, "Parse task finished");
    }

    async fn on_datagram(
        &self,
        datagram: Bytes,
        assemblers: &mut HashMap<u8, SplitAssembler>,
    ) -> Result<()> {
        let packet = Packet::decode(datagram)?;
        self.on_receive(packet, assemblers).await
    }

    /// Inbound handling of one decoded packet.
    async fn on_receive(
        &self,
        packet: Packet,
        assemblers: &mut HashMap<u8, SplitAssembler>,
    ) -> Result<()> {
        trace!(
            peer_id = packet.peer_id,
            channel = packet.channel,
            packet_type = ?packet.packet_type(),
            sub_type = ?packet.sub_type(),
            seq = packet.sequence_number(),
            "Received packet"
        );

        if let Some(assigned) = packet.assigned_peer_id() {
            self.assign_peer_id(assigned);
        }

        if let Body::Reliable {
            sequence_number, ..
        } = packet.body
        {
            // Nothing can be acknowledged once the session is torn down.
            if !self.cancel.is_cancelled() {
                self.send(&Packet::ack(self.peer_id(), packet.channel, sequence_number))
                    .await?;
                self.metrics.ack_sent();
            }
        }

        match packet.body {
            Body::Original(payload)
            | Body::Reliable {
                inner: Reliable::Original(payload),
                ..
            } => self.dispatch(payload),
            Body::Reliable {
                inner: Reliable::Split(fragment),
                ..
            } => {
                self.metrics.fragment_received();
                let assembler = assemblers.entry(packet.channel).or_insert_with(|| {
                    SplitAssembler::with_settings(
                        self.transport.split_max_pending,
                        self.transport.split_timeout,
                    )
                });
                let evicted_before = assembler.stats().evicted;
                let message = assembler.add_fragment(fragment);
                let evicted = assembler.stats().evicted - evicted_before;
                if evicted > 0 {
                    self.metrics.assemblies_evicted(evicted);
                }
                if let Some(message) = message {
                    self.metrics.message_reassembled();
                    self.dispatch(Payload::from_bytes(message)?);
                }
            }
            Body::Control {
                control: Control::Disconnect,
                ..
            }
            | Body::Reliable {
                inner: Reliable::Control(Control::Disconnect),
                ..
            } => {
                info!("Server closed the session");
                self.fail(ProtocolError::ConnectionClosed);
            }
            Body::Control { .. } | Body::Reliable { .. } => {}
        }

        Ok(())
    }

    /// Store the first assigned peer id; later assignments are ignored.
    fn assign_peer_id(&self, assigned: u16) {
        match self.peer_id.compare_exchange(
            PEER_ID_UNASSIGNED,
            assigned,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                info!(peer_id = assigned, "Peer id assigned");
                self.subscribers.broadcast(Event::PeerAssigned(assigned));
            }
            Err(current) => {
                debug!(current, assigned, "Ignoring repeated peer id assignment");
            }
        }
    }

    fn dispatch(&self, payload: Payload) {
        match registry::decode_server(payload) {
            Ok(command) => {
                if let ServerCommand::Hello(_) = command {
                    self.sequencer.reset();
                }
                debug!(command = command.name(), "Dispatching command");
                self.subscribers.broadcast(Event::Command(command));
            }
            Err(ProtocolError::UnknownCommand { id, payload }) => {
                self.metrics.unknown_command();
                debug!(command_id = id, len = payload.len(), "Skipping unknown command");
            }
            Err(e) => {
                self.metrics.decode_error();
                warn!(error = %e, "Skipping undecodable command");
            }
        }
    }

    /// Record a session-ending error and cancel the connection.
    fn fail(&self, error: ProtocolError) {
        if self.cancel.is_cancelled() {
            debug!(error = %error, "Error after shutdown ignored");
            return;
        }
        if matches!(error, ProtocolError::ConnectionClosed) {
            info!("Session ended by server");
        } else {
            error!(error = %error, "Session failed");
        }
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(error);
        self.cancel.cancel();
    }

    fn take_failure(&self) -> Option<ProtocolError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn join_tasks(&self) {
        let tasks: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Connection task ended abnormally");
            }
        }
    }
}
