//! ## The [`Manager`] of a socket.io connection.
//!
//! A [`Manager`] is a handle to a task owning the engine.io connection and the state of every
//! namespace [`Socket`] multiplexed over it: pending acks, receive and send buffers.
//! Everything mutable lives in this task, handles only send it commands.
//!
//! #### States
//! ```text
//!            open()                handshake
//!  CLOSED ──────────────► OPENING ──────────────► OPEN
//!    ▲                       │                     │
//!    │     error / timeout   │        close        │
//!    └───────────────────────┴─────────────────────┘
//! ```
//! When the connection is lost, or when an automatic open fails, the manager reconnects:
//! attempt `k` starts after `min(k * reconnection_delay, reconnection_delay_max)`. After
//! `reconnection_attempts` failed attempts, [`Event::ReconnectFailed`] is emitted and the
//! manager stays closed. A manual [`Manager::close`] stops every timer and prevents any
//! reconnection until the next [`Manager::open`].
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{Arc, PoisonError, RwLock, Weak},
};

use engineio_client::{
    CloseReason, EngineEvent, EngineEvents, EngineSocket, Packet as EnginePacket, PacketBuf,
    ProtocolVersion,
    transport::{DefaultTransports, TransportFactory},
};
use socketio_core::{
    PayloadValue, Str,
    packet::{Packet, PacketData},
    parser::{self, Decoder, ParseError},
};
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};

use crate::{
    ack::{AckCallback, AckSender},
    config::ClientConfig,
    emitter::{Emitter, Event, ListenerId},
    errors::{Error, SendError},
    socket::{DisconnectReason, Socket, SocketInner, SocketState},
};

type OpenCallback = oneshot::Sender<Result<(), Arc<Error>>>;

pub(crate) enum Command {
    Open(Option<OpenCallback>),
    Close,
    Register {
        ns: Str,
        emitter: Emitter,
        state: Arc<SocketState>,
    },
    Connect(Str),
    Disconnect(Str),
    /// Every handle of a socket was dropped.
    Dropped {
        ns: Str,
        state: Arc<SocketState>,
    },
    Emit {
        ns: Str,
        packet: Packet,
        ack: Option<AckCallback>,
    },
    Ack(Packet),
    Shutdown,
}

struct ManagerInner {
    tx: mpsc::UnboundedSender<Command>,
    emitter: Emitter,
    config: Arc<ClientConfig>,
    sockets: RwLock<HashMap<Str, Weak<SocketInner>>>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.tx.send(Command::Shutdown).ok();
    }
}

/// A handle to a socket.io connection, shared by the namespace [`Socket`]s.
///
/// The connection is owned by a background task: creating a manager requires a tokio runtime.
/// Dropping every handle of the manager and of its sockets stops the task and closes
/// the connection.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    /// Create a manager connecting with the bundled transports.
    ///
    /// The connection is opened right away if [`ClientConfig::auto_connect`] is set.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_factory(config, Arc::new(DefaultTransports))
    }

    /// Create a manager connecting with custom transports.
    pub fn with_factory(config: ClientConfig, factory: Arc<dyn TransportFactory>) -> Self {
        let config = Arc::new(config);
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Emitter::default();
        let actor = ManagerActor::new(config.clone(), factory, emitter.clone(), tx.downgrade());
        tokio::spawn(actor.run(rx));

        if config.auto_connect {
            tx.send(Command::Open(None)).ok();
        }
        Self {
            inner: Arc::new(ManagerInner {
                tx,
                emitter,
                config,
                sockets: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The config of this manager.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Get the socket of a namespace, creating it if needed.
    ///
    /// A namespace has a single socket per manager: while a handle is alive,
    /// calling this again returns the same socket. A new socket connects right away
    /// if [`ClientConfig::auto_connect`] is set.
    pub fn socket(&self, ns: impl Into<String>) -> Socket {
        let ns = normalize_ns(ns.into());
        let mut sockets = self
            .inner
            .sockets
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(inner) = sockets.get(&ns).and_then(Weak::upgrade) {
            return Socket { inner };
        }
        sockets.retain(|_, s| s.strong_count() > 0);

        // Registered while holding the lock so that no command for this socket
        // can reach the task before the registration.
        let socket = Socket::new(ns.clone(), self.clone());
        sockets.insert(ns, Arc::downgrade(&socket.inner));
        if self.inner.config.auto_connect {
            socket.connect();
        }
        socket
    }

    /// Open the connection and wait for the handshake.
    ///
    /// Resolves right away if the connection is already open. A failure is not retried,
    /// but it is also reported with [`Event::ConnectError`].
    pub async fn open(&self) -> Result<(), Arc<Error>> {
        let (tx, rx) = oneshot::channel();
        self.try_send(Command::Open(Some(tx)))
            .map_err(|_| Arc::new(Error::Closed))?;
        rx.await.unwrap_or_else(|_| Err(Arc::new(Error::Closed)))
    }

    /// Close the connection.
    ///
    /// Pending timers are cancelled and no reconnection happens until the next
    /// [`Manager::open`] or [`Socket::connect`].
    pub fn close(&self) {
        self.send(Command::Close);
    }

    /// Register a listener for a manager event.
    ///
    /// The manager emits [`Event::Open`], [`Event::Close`], [`Event::Error`],
    /// [`Event::Ping`], [`Event::Pong`] and the connection and reconnection events.
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.emitter.on(event, handler)
    }

    /// Register a listener called at most once.
    pub fn once<F>(&self, event: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.emitter.once(event, handler)
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.inner.emitter.off(event, id)
    }

    pub(crate) fn send(&self, cmd: Command) {
        self.inner.tx.send(cmd).ok();
    }

    pub(crate) fn try_send(&self, cmd: Command) -> Result<(), SendError> {
        self.inner.tx.send(cmd).map_err(|_| SendError::Closed)
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("url", &self.inner.config.engine.url)
            .field("emitter", &self.inner.emitter)
            .finish()
    }
}

fn normalize_ns(ns: String) -> Str {
    if ns.starts_with('/') {
        ns.into()
    } else {
        format!("/{ns}").into()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ReadyState {
    Closed,
    Opening,
    Open,
}

/// The state of a namespace, owned by the manager task.
struct Namespace {
    emitter: Emitter,
    state: Arc<SocketState>,
    /// The socket wants to be connected.
    active: bool,
    next_ack_id: i64,
    acks: HashMap<i64, AckCallback>,
    recv_buffer: VecDeque<Event>,
    send_buffer: VecDeque<Packet>,
}

impl Namespace {
    fn new(emitter: Emitter, state: Arc<SocketState>) -> Self {
        Self {
            emitter,
            state,
            active: false,
            next_ack_id: 0,
            acks: HashMap::new(),
            recv_buffer: VecDeque::new(),
            send_buffer: VecDeque::new(),
        }
    }

    /// The connection is lost: pending acks can't be answered anymore.
    fn set_disconnected(&mut self) {
        self.state.set_disconnected();
        self.acks.clear();
        self.recv_buffer.clear();
    }
}

struct ManagerActor {
    config: Arc<ClientConfig>,
    factory: Arc<dyn TransportFactory>,
    emitter: Emitter,
    tx: mpsc::WeakUnboundedSender<Command>,

    state: ReadyState,
    engine: Option<EngineSocket>,
    engine_rx: Option<EngineEvents>,
    sid: Option<String>,
    decoder: Decoder,
    namespaces: HashMap<Str, Namespace>,
    /// engine.io v3: the server connected the default namespace by itself
    root_connected: bool,

    open_callbacks: Vec<OpenCallback>,
    connect_deadline: Option<Instant>,

    backoff_deadline: Option<Instant>,
    attempts: u32,
    reconnecting: bool,
    /// The pending open is a reconnection attempt
    reconnect_attempt: bool,
    skip_reconnect: bool,
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn recv_opt(rx: &mut Option<EngineEvents>) -> Option<EngineEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl ManagerActor {
    fn new(
        config: Arc<ClientConfig>,
        factory: Arc<dyn TransportFactory>,
        emitter: Emitter,
        tx: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            config,
            factory,
            emitter,
            tx,
            state: ReadyState::Closed,
            engine: None,
            engine_rx: None,
            sid: None,
            decoder: Decoder::new(),
            namespaces: HashMap::new(),
            root_connected: false,
            open_callbacks: Vec::new(),
            connect_deadline: None,
            backoff_deadline: None,
            attempts: 0,
            reconnecting: false,
            reconnect_attempt: false,
            skip_reconnect: false,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.on_command(cmd),
                },
                event = recv_opt(&mut self.engine_rx) => match event {
                    Some(event) => self.on_engine_event(event),
                    None => self.on_engine_gone(),
                },
                _ = sleep_opt(self.connect_deadline) => self.on_connect_timeout(),
                _ = sleep_opt(self.backoff_deadline) => self.on_backoff(),
            }
        }
        self.close();
        #[cfg(feature = "tracing")]
        tracing::debug!("manager task stopped");
    }

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Open(cb) => self.open(cb),
            Command::Close => self.close(),
            Command::Register { ns, emitter, state } => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%ns, "registering socket");
                self.namespaces.insert(ns, Namespace::new(emitter, state));
            }
            Command::Connect(ns) => self.connect_ns(ns),
            Command::Disconnect(ns) => self.disconnect_ns(ns),
            Command::Dropped { ns, state } => {
                let current = self
                    .namespaces
                    .get(&ns)
                    .is_some_and(|nsp| Arc::ptr_eq(&nsp.state, &state));
                if current {
                    self.disconnect_ns(ns.clone());
                    self.namespaces.remove(&ns);
                }
            }
            Command::Emit { ns, packet, ack } => self.emit_packet(ns, packet, ack),
            Command::Ack(packet) => {
                let connected = self
                    .namespaces
                    .get(&packet.ns)
                    .is_some_and(|nsp| nsp.state.connected());
                if connected {
                    self.transmit(packet);
                } else {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(ns = %packet.ns, "dropping ack of a disconnected socket");
                }
            }
            Command::Shutdown => (),
        }
    }

    /// Emit an event to the manager and to every socket.
    fn emit_all(&self, event: Event) {
        self.emitter.emit(&event);
        for nsp in self.namespaces.values() {
            nsp.emitter.emit(&event);
        }
    }

    fn is_v3(&self) -> bool {
        self.config.engine.protocol == ProtocolVersion::V3
    }

    // Connection

    /// Explicit open, from [`Manager::open`] or a socket.
    fn open(&mut self, cb: Option<OpenCallback>) {
        match self.state {
            ReadyState::Open => {
                if let Some(cb) = cb {
                    cb.send(Ok(())).ok();
                }
                return;
            }
            ReadyState::Opening => {
                self.open_callbacks.extend(cb);
                return;
            }
            ReadyState::Closed => (),
        }
        // An explicit open replaces a pending reconnection
        self.backoff_deadline = None;
        self.reconnecting = false;
        self.reconnect_attempt = false;
        self.attempts = 0;
        self.skip_reconnect = false;
        self.open_callbacks.extend(cb);
        self.open_engine();
    }

    fn open_engine(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(url = %self.config.engine.url, "opening connection");
        let (engine, rx) = EngineSocket::open_with(self.config.engine.clone(), self.factory.clone());
        self.engine = Some(engine);
        self.engine_rx = Some(rx);
        self.state = ReadyState::Opening;
        self.decoder.reset();
        self.root_connected = false;
        self.connect_deadline = self.config.timeout.map(|t| Instant::now() + t);
    }

    fn drop_engine(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.close();
        }
        self.engine_rx = None;
        self.sid = None;
        self.decoder.reset();
        self.root_connected = false;
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        match (self.state, event) {
            (_, EngineEvent::Error(engineio_client::Error::Parse(e))) => {
                let err = Error::Engine(engineio_client::Error::Parse(e));
                self.emit_all(Event::Error(Arc::new(err)));
            }
            (ReadyState::Opening, EngineEvent::Open(open)) => self.on_open(open.sid),
            (ReadyState::Opening, EngineEvent::Error(err)) => self.on_open_error(err.into()),
            (ReadyState::Opening, EngineEvent::Close(_)) => {
                self.on_open_error(engineio_client::Error::Closed.into())
            }
            (ReadyState::Open, EngineEvent::Message(msg)) => {
                let res = self.decoder.decode_str(msg);
                self.on_decoded(res);
            }
            (ReadyState::Open, EngineEvent::Binary(bin)) => {
                let res = self.decoder.decode_bin(bin);
                self.on_decoded(res);
            }
            (ReadyState::Open, EngineEvent::Packet(EnginePacket::Ping)) => {
                self.emit_all(Event::Ping)
            }
            (ReadyState::Open, EngineEvent::Packet(EnginePacket::Pong)) => {
                self.emit_all(Event::Pong)
            }
            (ReadyState::Open, EngineEvent::Error(err)) => {
                self.emit_all(Event::Error(Arc::new(err.into())))
            }
            (ReadyState::Open, EngineEvent::Close(reason)) => self.on_close(reason),
            (_, _event) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(?_event, "engine event");
            }
        }
    }

    /// The engine task stopped without a close event.
    fn on_engine_gone(&mut self) {
        self.engine_rx = None;
        match self.state {
            ReadyState::Opening => self.on_open_error(engineio_client::Error::Closed.into()),
            ReadyState::Open => self.on_close(CloseReason::TransportError),
            ReadyState::Closed => (),
        }
    }

    fn on_open(&mut self, sid: String) {
        #[cfg(feature = "tracing")]
        tracing::debug!(%sid, "connection open");
        self.connect_deadline = None;
        self.state = ReadyState::Open;
        self.sid = Some(sid);
        self.emitter.emit(&Event::Open);
        for cb in self.open_callbacks.drain(..) {
            cb.send(Ok(())).ok();
        }
        if self.reconnect_attempt {
            let attempts = self.attempts;
            self.reconnect_attempt = false;
            self.reconnecting = false;
            self.attempts = 0;
            self.emit_all(Event::Reconnect(attempts));
        }

        let pending: Vec<Str> = self
            .namespaces
            .iter()
            .filter(|(_, nsp)| nsp.active && !nsp.state.connected())
            .map(|(ns, _)| ns.clone())
            .collect();
        for ns in pending {
            self.send_connect(ns, true);
        }
    }

    fn on_open_error(&mut self, err: Error) {
        #[cfg(feature = "tracing")]
        tracing::debug!("connection attempt failed: {err}");
        self.connect_deadline = None;
        self.state = ReadyState::Closed;
        self.drop_engine();

        let err = Arc::new(err);
        self.emit_all(Event::ConnectError(err.clone()));
        let explicit = !self.open_callbacks.is_empty();
        for cb in self.open_callbacks.drain(..) {
            cb.send(Err(err.clone())).ok();
        }

        if self.reconnect_attempt {
            self.reconnect_attempt = false;
            self.reconnecting = false;
            self.emit_all(Event::ReconnectError(err));
            self.reconnect();
        } else if !explicit && !self.reconnecting && self.attempts == 0 {
            self.maybe_reconnect();
        }
    }

    fn on_connect_timeout(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!("connect timeout");
        self.connect_deadline = None;
        self.drop_engine();
        self.emit_all(Event::ConnectTimeout);
        self.on_open_error(Error::ConnectTimeout);
    }

    fn on_close(&mut self, reason: CloseReason) {
        #[cfg(feature = "tracing")]
        tracing::debug!(%reason, "connection closed");
        self.state = ReadyState::Closed;
        self.connect_deadline = None;
        self.attempts = 0;
        self.drop_engine();
        self.emitter.emit(&Event::Close(reason));

        for nsp in self.namespaces.values_mut() {
            if nsp.state.connected() {
                nsp.set_disconnected();
                nsp.emitter.emit(&Event::Disconnect(reason.into()));
            }
        }
        self.maybe_reconnect();
    }

    /// Manual close: stop every timer and disable reconnection.
    fn close(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!("closing manager");
        self.skip_reconnect = true;
        self.reconnecting = false;
        self.reconnect_attempt = false;
        self.backoff_deadline = None;
        self.connect_deadline = None;
        self.attempts = 0;
        match self.state {
            ReadyState::Open => self.on_close(CloseReason::ForcedClose),
            ReadyState::Opening => {
                self.state = ReadyState::Closed;
                self.drop_engine();
                let err = Arc::new(Error::Closed);
                for cb in self.open_callbacks.drain(..) {
                    cb.send(Err(err.clone())).ok();
                }
            }
            ReadyState::Closed => (),
        }
    }

    // Reconnection

    fn maybe_reconnect(&mut self) {
        if self.config.reconnection && !self.skip_reconnect {
            self.reconnect();
        }
    }

    fn reconnect(&mut self) {
        if self.reconnecting || self.skip_reconnect {
            return;
        }
        self.attempts = self.attempts.saturating_add(1);
        if self.config.attempts_exhausted(self.attempts) {
            #[cfg(feature = "tracing")]
            tracing::debug!(attempts = self.attempts - 1, "reconnection failed");
            self.attempts = 0;
            self.emit_all(Event::ReconnectFailed);
            return;
        }
        let delay = self.config.reconnection_delay_for(self.attempts);
        #[cfg(feature = "tracing")]
        tracing::debug!(attempt = self.attempts, ?delay, "reconnecting");
        self.reconnecting = true;
        self.backoff_deadline = Some(Instant::now() + delay);
    }

    fn on_backoff(&mut self) {
        self.backoff_deadline = None;
        if self.skip_reconnect || self.state != ReadyState::Closed {
            self.reconnecting = false;
            return;
        }
        let attempt = self.attempts;
        self.emit_all(Event::ReconnectAttempt(attempt));
        self.emit_all(Event::Reconnecting(attempt));
        self.reconnect_attempt = true;
        self.open_engine();
    }

    // Namespaces

    fn connect_ns(&mut self, ns: Str) {
        let Some(nsp) = self.namespaces.get_mut(&ns) else {
            return;
        };
        if nsp.active && nsp.state.connected() {
            return;
        }
        nsp.active = true;
        nsp.emitter.emit(&Event::Connecting);
        match self.state {
            ReadyState::Open => self.send_connect(ns, false),
            ReadyState::Opening => (),
            // A pending reconnection connects the namespace when it succeeds
            ReadyState::Closed if self.reconnecting => (),
            ReadyState::Closed => self.open(None),
        }
    }

    /// Send the CONNECT packet of a namespace.
    ///
    /// Under engine.io protocol v3 the server connects the default namespace by itself
    /// right after the handshake.
    fn send_connect(&mut self, ns: Str, on_open: bool) {
        if self.is_v3() && ns == "/" {
            if self.root_connected {
                self.on_ns_connect(ns, None);
            } else if !on_open {
                self.transmit(Packet::connect(ns, None));
            }
            return;
        }
        let auth = match self.is_v3() {
            true => None,
            false => self.config.auth.clone(),
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(%ns, "connecting namespace");
        self.transmit(Packet::connect(ns, auth));
    }

    fn disconnect_ns(&mut self, ns: Str) {
        let connected = self
            .namespaces
            .get(&ns)
            .is_some_and(|nsp| nsp.state.connected());
        if connected {
            self.transmit(Packet::disconnect(ns.clone()));
        }
        self.release(ns, DisconnectReason::IoClientDisconnect);
    }

    /// The namespace no longer wants to be connected.
    /// The connection is closed when no namespace remains.
    fn release(&mut self, ns: Str, reason: DisconnectReason) {
        let Some(nsp) = self.namespaces.get_mut(&ns) else {
            return;
        };
        let was_active = nsp.active;
        let was_connected = nsp.state.connected();
        nsp.active = false;
        nsp.set_disconnected();
        nsp.send_buffer.clear();
        if was_connected {
            nsp.emitter.emit(&Event::Disconnect(reason));
        }
        if ns == "/" {
            self.root_connected = false;
        }
        if was_active && !self.namespaces.values().any(|nsp| nsp.active) {
            #[cfg(feature = "tracing")]
            tracing::debug!("no namespace left");
            self.close();
        }
    }

    fn emit_packet(&mut self, ns: Str, mut packet: Packet, ack: Option<AckCallback>) {
        let Some(nsp) = self.namespaces.get_mut(&ns) else {
            return;
        };
        if let Some(ack) = ack {
            let id = nsp.next_ack_id;
            nsp.next_ack_id += 1;
            packet.inner.set_ack_id(id);
            nsp.acks.insert(id, ack);
        }
        if nsp.state.connected() {
            self.transmit(packet);
        } else {
            #[cfg(feature = "tracing")]
            tracing::trace!(%ns, "buffering packet");
            nsp.send_buffer.push_back(packet);
        }
    }

    /// Encode a packet and write its fragments to the engine, header first.
    fn transmit(&mut self, packet: Packet) {
        let Some(engine) = &self.engine else {
            return;
        };
        #[cfg(feature = "tracing")]
        tracing::trace!(?packet, "sending packet");
        let encoded = match parser::encode(packet) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.emit_all(Event::Error(Arc::new(e.into())));
                return;
            }
        };
        let res = if encoded.attachments.is_empty() {
            engine.emit(encoded.header)
        } else {
            let mut packets = PacketBuf::with_capacity(encoded.attachments.len() + 1);
            packets.push(EnginePacket::Message(encoded.header));
            packets.extend(encoded.attachments.into_iter().map(EnginePacket::Binary));
            engine.send_many(packets)
        };
        if let Err(_e) = res {
            #[cfg(feature = "tracing")]
            tracing::debug!("cannot send packet: {_e}");
        }
    }

    fn on_decoded(&mut self, res: Result<Packet, ParseError>) {
        match res {
            Ok(packet) => self.on_packet(packet),
            Err(ParseError::NeedsMoreBinaryData) => (),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("dropping malformed packet: {e}");
                self.emit_all(Event::Error(Arc::new(e.into())));
            }
        }
    }

    fn on_packet(&mut self, packet: Packet) {
        #[cfg(feature = "tracing")]
        tracing::trace!(?packet, "received packet");
        let Packet { inner, ns } = packet;
        if self.is_v3() && ns == "/" && matches!(inner, PacketData::Connect(_)) {
            self.root_connected = true;
        }
        if !self.namespaces.get(&ns).is_some_and(|nsp| nsp.active) {
            #[cfg(feature = "tracing")]
            tracing::debug!(%ns, "ignoring packet for an inactive namespace");
            return;
        }
        match inner {
            PacketData::Connect(data) => self.on_ns_connect(ns, data),
            PacketData::Disconnect => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%ns, "server disconnected namespace");
                self.release(ns, DisconnectReason::IoServerDisconnect);
            }
            PacketData::Event(data, id) | PacketData::BinaryEvent(data, id) => {
                self.on_event(ns, data, id)
            }
            PacketData::EventAck(data, id) | PacketData::BinaryAck(data, id) => {
                self.on_ack(ns, data, id)
            }
            PacketData::ConnectError(data) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%ns, ?data, "namespace connection refused");
                if let Some(nsp) = self.namespaces.get(&ns) {
                    let err = Arc::new(Error::ConnectError(data));
                    nsp.emitter.emit(&Event::ConnectError(err));
                }
                self.release(ns, DisconnectReason::IoServerDisconnect);
            }
        }
    }

    fn on_ns_connect(&mut self, ns: Str, data: Option<PayloadValue>) {
        let id = data
            .as_ref()
            .and_then(|d| d.get("sid"))
            .and_then(PayloadValue::as_str)
            .map(str::to_string)
            .or_else(|| match &self.sid {
                Some(sid) if ns == "/" => Some(sid.clone()),
                Some(sid) => Some(format!("{ns}#{sid}")),
                None => None,
            });
        let Some(nsp) = self.namespaces.get_mut(&ns) else {
            return;
        };
        if nsp.state.connected() {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(%ns, ?id, "namespace connected");
        nsp.state.set_connected(id);
        nsp.emitter.emit(&Event::Connect);

        let received: Vec<Event> = nsp.recv_buffer.drain(..).collect();
        for event in &received {
            nsp.emitter.emit(event);
        }
        let buffered: Vec<Packet> = nsp.send_buffer.drain(..).collect();
        for packet in buffered {
            self.transmit(packet);
        }
    }

    fn on_event(&mut self, ns: Str, data: PayloadValue, id: Option<i64>) {
        let PayloadValue::Array(mut args) = data else {
            return;
        };
        if args.is_empty() {
            return;
        }
        let PayloadValue::String(event) = args.remove(0) else {
            return;
        };
        let ack = id.and_then(|id| {
            let tx = self.tx.upgrade()?;
            Some(AckSender::new(ns.clone(), id, tx))
        });
        let Some(nsp) = self.namespaces.get_mut(&ns) else {
            return;
        };
        let event = Event::Message { event, args, ack };
        if nsp.state.connected() {
            nsp.emitter.emit(&event);
        } else {
            nsp.recv_buffer.push_back(event);
        }
    }

    fn on_ack(&mut self, ns: Str, data: PayloadValue, id: i64) {
        let Some(nsp) = self.namespaces.get_mut(&ns) else {
            return;
        };
        match nsp.acks.remove(&id) {
            Some(callback) => {
                let args = match data {
                    PayloadValue::Array(args) => args,
                    data => vec![data],
                };
                callback(args);
            }
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%ns, id, "ignoring ack with an unknown id");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_are_normalized() {
        assert_eq!(normalize_ns("/".into()), "/");
        assert_eq!(normalize_ns("chat".into()), "/chat");
        assert_eq!(normalize_ns("/admin".into()), "/admin");
    }
}
