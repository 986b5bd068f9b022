//! ## An engine.io connection to a server.
//!
//! An [`EngineSocket`] is a handle to a task owning the connection state:
//! the active [`Transport`], the upgrade probes, the heartbeat timers and the write buffer.
//! Everything happening on the connection is reported as an [`EngineEvent`].
//!
//! #### Upgrade
//! Once the handshake is received on the polling transport, every upgrade offered by the
//! server is probed on a fresh transport:
//! ```text
//! CLIENT                                                 SERVER
//!│                                                      │
//!│   GET /engine.io/?EIO=4&transport=websocket&sid=...  │
//!│ ───────────────────────────────────────────────────► │
//!│            HTTP 101 (WebSocket handshake)            │
//!│  ─────────────────────────────────────────────────►  │
//!│                         2probe                       │ (ping packet)
//!│  ◄─────────────────────────────────────────────────  │
//!│                         3probe                       │ (pong packet)
//!│        (the polling transport is paused here)        │
//!│  ─────────────────────────────────────────────────►  │
//!│                         5                            │ (upgrade packet)
//! ```
//! Packets sent while the polling transport is pausing are kept in the write buffer
//! and flushed to the new transport right after the upgrade packet.
//!
//! #### Heartbeat
//! * v3: the client sends a ping every `pingInterval` and expects a pong within `pingTimeout`.
//! * v4: the server pings, the client answers. No ping within `pingInterval + pingTimeout`
//!   closes the connection.
use std::{collections::VecDeque, fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use engineio_core::{OpenPacket, Packet, PacketBuf, ProtocolVersion, Str, TransportType};
use smallvec::smallvec;
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};

use crate::{
    config::EngineConfig,
    errors::Error,
    transport::{
        DefaultTransports, Transport, TransportEvent, TransportFactory, TransportId,
        TransportOptions, TransportSink,
    },
};

/// The reason for closing an engine.io connection
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The connection was closed by the client
    ForcedClose,
    /// The transport was closed by the server
    TransportClose,
    /// The transport failed
    TransportError,
    /// The server did not answer to a ping (v3) or did not send a ping (v4) in time
    PingTimeout,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let str = match self {
            CloseReason::ForcedClose => "forced close",
            CloseReason::TransportClose => "transport close",
            CloseReason::TransportError => "transport error",
            CloseReason::PingTimeout => "ping timeout",
        };
        f.write_str(str)
    }
}

/// Events emitted by an [`EngineSocket`].
#[derive(Debug)]
pub enum EngineEvent {
    /// The handshake was received, the connection is open.
    Open(OpenPacket),
    /// A packet was received, before any other processing.
    Packet(Packet),
    /// A message packet was received.
    Message(Str),
    /// A binary packet was received.
    Binary(Bytes),
    /// The probe succeeded, the current transport is pausing.
    Upgrading(TransportType),
    /// The connection now runs over this transport.
    Upgrade(TransportType),
    /// A probe failed, the current transport is kept.
    UpgradeError(Error),
    /// The write buffer is empty.
    Drain,
    /// An error occurred.
    Error(Error),
    /// The connection is closed. This is always the last event.
    Close(CloseReason),
}

/// A receiver for the [`EngineEvent`]s of an [`EngineSocket`].
pub type EngineEvents = mpsc::UnboundedReceiver<EngineEvent>;

#[derive(Debug)]
enum Command {
    Send {
        packets: PacketBuf,
        done: Option<oneshot::Sender<()>>,
    },
    Close,
}

/// A handle to an engine.io connection.
///
/// Dropping every handle closes the connection.
#[derive(Debug, Clone)]
pub struct EngineSocket {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineSocket {
    /// Open a new connection with the bundled transports.
    ///
    /// This never blocks: the connection is opened in the background and
    /// [`EngineEvent::Open`] is emitted once the handshake is received.
    pub fn open(config: EngineConfig) -> (Self, EngineEvents) {
        Self::open_with(config, Arc::new(DefaultTransports))
    }

    /// Open a new connection with custom transports.
    pub fn open_with(
        config: EngineConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> (Self, EngineEvents) {
        let (tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        let actor = EngineActor {
            config,
            factory,
            state: ReadyState::Opening,
            handshake: None,
            active: None,
            writable: false,
            upgrading: false,
            probes: Vec::new(),
            write_buffer: VecDeque::new(),
            in_flight: Vec::new(),
            ping_deadline: None,
            pong_deadline: None,
            errors: 0,
            next_id: 0,
            events: events_tx,
            sink_tx,
        };
        tokio::spawn(actor.run(cmd_rx, sink_rx));
        (Self { tx }, events_rx)
    }

    /// Send a message packet.
    pub fn emit(&self, msg: impl Into<Str>) -> Result<(), Error> {
        self.send(Packet::Message(msg.into()))
    }

    /// Send a binary packet.
    pub fn emit_binary(&self, data: impl Into<Bytes>) -> Result<(), Error> {
        self.send(Packet::Binary(data.into()))
    }

    /// Send a raw packet.
    pub fn send(&self, packet: Packet) -> Result<(), Error> {
        self.send_many(smallvec![packet])
    }

    /// Send packets that must be flushed together and in order.
    pub fn send_many(&self, packets: PacketBuf) -> Result<(), Error> {
        self.tx
            .send(Command::Send {
                packets,
                done: None,
            })
            .map_err(|_| Error::Closed)
    }

    /// Send packets and get notified once they are written to the transport.
    ///
    /// The receiver fails if the connection closes before.
    pub fn send_with_callback(&self, packets: PacketBuf) -> Result<oneshot::Receiver<()>, Error> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Command::Send {
                packets,
                done: Some(done),
            })
            .map_err(|_| Error::Closed)?;
        Ok(rx)
    }

    /// Close the connection.
    ///
    /// Pending writes and an upgrade in progress complete first,
    /// then a close packet is sent to the server.
    pub fn close(&self) {
        self.tx.send(Command::Close).ok();
    }

    /// Check if the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ReadyState {
    Opening,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ProbeStage {
    /// Waiting for the candidate transport to open
    Opening,
    /// The probe ping was sent
    Probing,
    /// The probe pong was received, the active transport is pausing
    Pausing,
}

struct Probe {
    id: TransportId,
    transport: Box<dyn Transport>,
    stage: ProbeStage,
}

struct Active {
    id: TransportId,
    transport: Box<dyn Transport>,
}

struct EngineActor {
    config: EngineConfig,
    factory: Arc<dyn TransportFactory>,
    state: ReadyState,
    handshake: Option<OpenPacket>,
    active: Option<Active>,
    writable: bool,
    upgrading: bool,
    probes: Vec<Probe>,
    write_buffer: VecDeque<(Packet, Option<oneshot::Sender<()>>)>,
    /// Completion callbacks of the batch being written
    in_flight: Vec<oneshot::Sender<()>>,
    ping_deadline: Option<Instant>,
    pong_deadline: Option<Instant>,
    errors: usize,
    next_id: TransportId,
    events: mpsc::UnboundedSender<EngineEvent>,
    sink_tx: mpsc::UnboundedSender<(TransportId, TransportEvent)>,
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn recv_opt(rx: &mut Option<mpsc::UnboundedReceiver<Command>>) -> Option<Command> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl EngineActor {
    async fn run(
        mut self,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut transport_rx: mpsc::UnboundedReceiver<(TransportId, TransportEvent)>,
    ) {
        let kind = self.config.initial_transport();
        let (id, mut transport) = self.create_transport(kind);
        transport.open();
        self.active = Some(Active { id, transport });

        let mut cmd_rx = Some(cmd_rx);
        while self.state != ReadyState::Closed {
            tokio::select! {
                cmd = recv_opt(&mut cmd_rx) => match cmd {
                    Some(Command::Send { packets, done }) => self.send(packets, done),
                    Some(Command::Close) => self.close(),
                    // Every handle dropped: stop polling the closed channel
                    None => {
                        cmd_rx = None;
                        self.close();
                    }
                },
                Some((id, event)) = transport_rx.recv() => self.on_transport_event(id, event),
                _ = sleep_opt(self.ping_deadline) => self.on_ping_deadline(),
                _ = sleep_opt(self.pong_deadline) => self.on_ping_timeout(),
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("engine socket task stopped");
    }

    fn emit(&self, event: EngineEvent) {
        self.events.send(event).ok();
    }

    fn create_transport(&mut self, kind: TransportType) -> (TransportId, Box<dyn Transport>) {
        let id = self.next_id;
        self.next_id += 1;
        let sid = self.handshake.as_ref().map(|h| h.sid.clone());
        let opts = TransportOptions::new(&self.config, sid);
        let sink = TransportSink::new(id, self.sink_tx.clone());
        #[cfg(feature = "tracing")]
        tracing::debug!(id, %kind, "creating transport");
        (id, self.factory.create(kind, opts, sink))
    }

    fn active_name(&self) -> Option<TransportType> {
        self.active.as_ref().map(|a| a.transport.name())
    }

    fn on_transport_event(&mut self, id: TransportId, event: TransportEvent) {
        if self.active.as_ref().is_some_and(|a| a.id == id) {
            self.on_active_event(event);
        } else if let Some(i) = self.probes.iter().position(|p| p.id == id) {
            self.on_probe_event(i, event);
        } else {
            #[cfg(feature = "tracing")]
            tracing::trace!(id, ?event, "ignoring event from detached transport");
        }
    }

    fn on_active_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                self.writable = true;
                self.flush();
            }
            TransportEvent::Packet(packet) => self.on_packet(packet),
            TransportEvent::Error(Error::Parse(e)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("dropping malformed payload: {e}");
                self.emit(EngineEvent::Error(Error::Parse(e)));
            }
            TransportEvent::Error(e) => self.on_error(e),
            TransportEvent::Close => self.on_close(CloseReason::TransportClose),
            TransportEvent::Drain => self.on_drain(),
            TransportEvent::Paused => {
                if let Some(i) = self
                    .probes
                    .iter()
                    .position(|p| p.stage == ProbeStage::Pausing)
                {
                    self.finish_upgrade(i);
                }
            }
        }
    }

    fn on_packet(&mut self, packet: Packet) {
        if self.state == ReadyState::Closed {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(?packet, "received packet");
        self.emit(EngineEvent::Packet(packet.clone()));

        match (packet, self.config.protocol) {
            (Packet::Open(open), _) => self.on_handshake(open),
            (Packet::Pong, ProtocolVersion::V3) => self.set_ping(),
            (Packet::Ping, ProtocolVersion::V4) => {
                self.send(smallvec![Packet::Pong], None);
                self.reset_ping_timeout();
            }
            (Packet::Message(msg), _) => self.emit(EngineEvent::Message(msg)),
            (Packet::Binary(data), _) => self.emit(EngineEvent::Binary(data)),
            _ => (),
        }
    }

    fn on_handshake(&mut self, open: OpenPacket) {
        if self.state != ReadyState::Opening {
            #[cfg(feature = "tracing")]
            tracing::debug!("ignoring duplicate handshake");
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = %open.sid, "handshake received");

        let upgrades: Vec<TransportType> = open
            .upgrades
            .iter()
            .filter_map(|u| u.parse().ok())
            .filter(|t| self.config.allowed_transport(*t))
            .collect();
        let active = self.active_name();

        self.state = ReadyState::Open;
        self.config
            .upgrade_memory
            .set(active == Some(TransportType::Websocket));
        self.handshake = Some(open.clone());
        self.emit(EngineEvent::Open(open));
        self.flush();

        if self.config.upgrade && active == Some(TransportType::Polling) {
            for kind in upgrades.into_iter().filter(|t| *t != TransportType::Polling) {
                self.probe(kind);
            }
        }

        match self.config.protocol {
            ProtocolVersion::V3 => self.set_ping(),
            ProtocolVersion::V4 => self.reset_ping_timeout(),
        }
    }

    fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.handshake.as_ref().map_or(0, |h| h.ping_interval))
    }
    fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake.as_ref().map_or(0, |h| h.ping_timeout))
    }

    /// v3: schedule the next ping, clearing the pong deadline
    fn set_ping(&mut self) {
        self.pong_deadline = None;
        self.ping_deadline = Some(Instant::now() + self.ping_interval());
    }

    /// v3: send a ping and wait for the pong
    fn on_ping_deadline(&mut self) {
        self.ping_deadline = None;
        #[cfg(feature = "tracing")]
        tracing::trace!("sending ping");
        self.send(smallvec![Packet::Ping], None);
        self.pong_deadline = Some(Instant::now() + self.ping_timeout());
    }

    fn on_ping_timeout(&mut self) {
        self.pong_deadline = None;
        #[cfg(feature = "tracing")]
        tracing::debug!("ping timeout");
        self.emit(EngineEvent::Error(Error::PingTimeout));
        self.on_close(CloseReason::PingTimeout);
    }

    /// v4: the server must ping again before this deadline
    fn reset_ping_timeout(&mut self) {
        self.pong_deadline = Some(Instant::now() + self.ping_interval() + self.ping_timeout());
    }

    fn probe(&mut self, kind: TransportType) {
        #[cfg(feature = "tracing")]
        tracing::debug!(%kind, "probing transport");
        let (id, mut transport) = self.create_transport(kind);
        transport.open();
        self.probes.push(Probe {
            id,
            transport,
            stage: ProbeStage::Opening,
        });
    }

    fn on_probe_event(&mut self, i: usize, event: TransportEvent) {
        let stage = self.probes[i].stage;
        match (event, stage) {
            (TransportEvent::Open, ProbeStage::Opening) => {
                let probe = &mut self.probes[i];
                probe.transport.send(vec![Packet::PingUpgrade]);
                probe.stage = ProbeStage::Probing;
            }
            (TransportEvent::Packet(Packet::PongUpgrade), ProbeStage::Probing)
                if self.state == ReadyState::Open && !self.upgrading =>
            {
                let kind = self.probes[i].transport.name();
                #[cfg(feature = "tracing")]
                tracing::debug!(%kind, "probe succeeded, pausing current transport");
                self.probes[i].stage = ProbeStage::Pausing;
                self.upgrading = true;
                self.emit(EngineEvent::Upgrading(kind));

                let paused = self
                    .active
                    .as_mut()
                    .is_some_and(|a| a.transport.pause());
                if paused {
                    self.finish_upgrade(i);
                }
            }
            (TransportEvent::Drain | TransportEvent::Paused | TransportEvent::Open, _) => (),
            (TransportEvent::Packet(_), _) => {
                self.fail_probe(i, Error::ProbeFailed("unexpected probe response"))
            }
            (TransportEvent::Error(e), _) => self.fail_probe(i, e),
            (TransportEvent::Close, _) => {
                self.fail_probe(i, Error::ProbeFailed("transport closed"))
            }
        }
    }

    /// The probe is removed so any later event of this transport is ignored.
    fn fail_probe(&mut self, i: usize, err: Error) {
        let mut probe = self.probes.remove(i);
        #[cfg(feature = "tracing")]
        tracing::debug!(kind = %probe.transport.name(), "probe failed: {err}");
        probe.transport.close();

        if probe.stage == ProbeStage::Pausing {
            self.upgrading = false;
            if let Some(active) = self.active.as_mut() {
                active.transport.resume();
            }
        }
        self.emit(EngineEvent::UpgradeError(err));
        self.flush();
        self.maybe_finish_closing();
    }

    fn finish_upgrade(&mut self, i: usize) {
        let probe = self.probes.remove(i);
        let kind = probe.transport.name();
        let mut new = Active {
            id: probe.id,
            transport: probe.transport,
        };
        new.transport.send(vec![Packet::Upgrade]);
        self.writable = false;
        if let Some(mut old) = self.active.replace(new) {
            old.transport.close();
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(%kind, "transport upgraded");

        self.config
            .upgrade_memory
            .set(kind == TransportType::Websocket);
        self.emit(EngineEvent::Upgrade(kind));
        self.upgrading = false;

        for mut probe in self.probes.drain(..) {
            probe.transport.close();
        }
        self.flush();
        self.maybe_finish_closing();
    }

    fn send(&mut self, packets: PacketBuf, mut done: Option<oneshot::Sender<()>>) {
        if !matches!(self.state, ReadyState::Opening | ReadyState::Open) {
            #[cfg(feature = "tracing")]
            tracing::debug!("dropping packets sent on a closing socket");
            return;
        }
        let last = packets.len().saturating_sub(1);
        for (i, packet) in packets.into_iter().enumerate() {
            let done = if i == last { done.take() } else { None };
            self.write_buffer.push_back((packet, done));
        }
        self.flush();
    }

    fn flush(&mut self) {
        if self.state == ReadyState::Closed
            || !self.writable
            || self.upgrading
            || self.write_buffer.is_empty()
        {
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let mut packets = Vec::with_capacity(self.write_buffer.len());
        for (packet, done) in self.write_buffer.drain(..) {
            packets.push(packet);
            self.in_flight.extend(done);
        }
        #[cfg(feature = "tracing")]
        tracing::trace!("flushing {} packets", packets.len());
        self.writable = false;
        active.transport.send(packets);
    }

    fn on_drain(&mut self) {
        for done in self.in_flight.drain(..) {
            done.send(()).ok();
        }
        self.writable = true;
        if self.write_buffer.is_empty() {
            self.emit(EngineEvent::Drain);
        } else {
            self.flush();
        }
        self.maybe_finish_closing();
    }

    /// Client close: wait for pending writes and any upgrade to complete,
    /// then send a close packet.
    fn close(&mut self) {
        match self.state {
            ReadyState::Opening => self.on_close(CloseReason::ForcedClose),
            ReadyState::Open => {
                self.state = ReadyState::Closing;
                self.maybe_finish_closing();
            }
            ReadyState::Closing | ReadyState::Closed => (),
        }
    }

    fn maybe_finish_closing(&mut self) {
        if self.state != ReadyState::Closing
            || self.upgrading
            || !self.writable
            || !self.write_buffer.is_empty()
        {
            return;
        }
        if let Some(active) = self.active.as_mut() {
            active.transport.send(vec![Packet::Close]);
        }
        self.on_close(CloseReason::ForcedClose);
    }

    /// Only the first error closes the socket.
    fn on_error(&mut self, err: Error) {
        if self.errors > 0 {
            return;
        }
        self.errors += 1;
        #[cfg(feature = "tracing")]
        tracing::debug!("transport error: {err}");
        self.config.upgrade_memory.set(false);
        self.emit(EngineEvent::Error(err));
        self.on_close(CloseReason::TransportError);
    }

    fn on_close(&mut self, reason: CloseReason) {
        if self.state == ReadyState::Closed {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(%reason, "closing engine socket");
        self.ping_deadline = None;
        self.pong_deadline = None;
        if let Some(mut active) = self.active.take() {
            active.transport.close();
        }
        for mut probe in self.probes.drain(..) {
            probe.transport.close();
        }
        // Pending callbacks are dropped without being called
        self.write_buffer.clear();
        self.in_flight.clear();
        self.state = ReadyState::Closed;
        self.emit(EngineEvent::Close(reason));
    }
}
