//! A [`Socket`] is a connection to a namespace, multiplexed over the engine.io connection
//! of its [`Manager`].
//!
//! #### Buffering
//! Events emitted before the namespace CONNECT acknowledgement are buffered and sent right
//! after it, in order. Events received before it are buffered as well and dispatched once
//! the socket is connected.
//!
//! #### Acknowledgements
//! ```no_run
//! # use socketio_client::{Manager, config::ClientConfig};
//! # async fn doc() {
//! let manager = Manager::new(ClientConfig::builder("http://localhost:3000").build());
//! let socket = manager.socket("/chat");
//! socket.on("message", |event| {
//!     if let Some(ack) = event.ack() {
//!         ack.send("received").ok();
//!     }
//! });
//! let res: String = socket
//!     .emit_with_ack("join", &("room", 1))
//!     .unwrap()
//!     .await
//!     .unwrap();
//! # }
//! ```
use std::{
    fmt,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use engineio_client::CloseReason;
use serde::{Serialize, de::DeserializeOwned};
use socketio_core::{PayloadValue, Str, packet::Packet};
use tokio::sync::oneshot;

use crate::{
    ack::AckResponse,
    emitter::{Emitter, Event, ListenerId, is_reserved},
    errors::SendError,
    manager::{Command, Manager},
};

/// All the possible reasons for a [`Socket`] to be disconnected from its namespace.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DisconnectReason {
    /// The server disconnected the socket from the namespace
    IoServerDisconnect,

    /// The socket was disconnected with [`Socket::disconnect`]
    IoClientDisconnect,

    /// The manager was closed with [`Manager::close`]
    ForcedClose,

    /// The server closed the connection
    TransportClose,

    /// The connection was abruptly closed (example: the network was changed from WiFi to 4G)
    TransportError,

    /// The heartbeat failed
    PingTimeout,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DisconnectReason::*;
        let str: &'static str = match self {
            IoServerDisconnect => "io server disconnect",
            IoClientDisconnect => "io client disconnect",
            ForcedClose => "forced close",
            TransportClose => "transport close",
            TransportError => "transport error",
            PingTimeout => "ping timeout",
        };
        f.write_str(str)
    }
}

impl From<CloseReason> for DisconnectReason {
    fn from(reason: CloseReason) -> Self {
        use DisconnectReason::*;
        match reason {
            CloseReason::ForcedClose => ForcedClose,
            CloseReason::TransportClose => TransportClose,
            CloseReason::TransportError => TransportError,
            CloseReason::PingTimeout => PingTimeout,
        }
    }
}

/// The connection state of a socket, written by the manager task.
#[derive(Debug, Default)]
pub(crate) struct SocketState {
    connected: AtomicBool,
    id: RwLock<Option<String>>,
}

impl SocketState {
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn id(&self) -> Option<String> {
        self.id.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_connected(&self, id: Option<String>) {
        *self.id.write().unwrap_or_else(PoisonError::into_inner) = id;
        self.connected.store(true, Ordering::Release);
    }

    pub fn set_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        *self.id.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

pub(crate) struct SocketInner {
    ns: Str,
    manager: Manager,
    emitter: Emitter,
    state: Arc<SocketState>,
}

impl Drop for SocketInner {
    fn drop(&mut self) {
        self.manager.send(Command::Dropped {
            ns: self.ns.clone(),
            state: self.state.clone(),
        });
    }
}

/// A connection to a namespace.
///
/// It is created with [`Manager::socket`]. Cloning a socket gives another handle
/// to the same connection, dropping every handle disconnects it.
#[derive(Clone)]
pub struct Socket {
    pub(crate) inner: Arc<SocketInner>,
}

impl Socket {
    /// Create the socket and register it to the manager task.
    pub(crate) fn new(ns: Str, manager: Manager) -> Self {
        let emitter = Emitter::default();
        let state = Arc::new(SocketState::default());
        manager.send(Command::Register {
            ns: ns.clone(),
            emitter: emitter.clone(),
            state: state.clone(),
        });
        Self {
            inner: Arc::new(SocketInner {
                ns,
                manager,
                emitter,
                state,
            }),
        }
    }

    /// The namespace of this socket.
    pub fn ns(&self) -> &str {
        &self.inner.ns
    }

    /// The id of this socket, set once connected.
    ///
    /// It is the namespace session id under protocol v5,
    /// and derived from the engine.io session id under protocol v4.
    pub fn id(&self) -> Option<String> {
        self.inner.state.id()
    }

    /// Check if the socket is connected to its namespace.
    pub fn connected(&self) -> bool {
        self.inner.state.connected()
    }

    /// The manager of this socket.
    pub fn manager(&self) -> &Manager {
        &self.inner.manager
    }

    /// Connect to the namespace, opening the manager connection if needed.
    ///
    /// It is called when the socket is created if [`ClientConfig::auto_connect`] is set.
    ///
    /// [`ClientConfig::auto_connect`]: crate::config::ClientConfig::auto_connect
    pub fn connect(&self) {
        self.inner.manager.send(Command::Connect(self.inner.ns.clone()));
    }

    /// Disconnect from the namespace.
    ///
    /// A DISCONNECT packet is sent if the socket is connected, then a [`Event::Disconnect`]
    /// is emitted with [`DisconnectReason::IoClientDisconnect`]. The manager connection
    /// is closed if no other socket remains connected.
    pub fn disconnect(&self) {
        self.inner
            .manager
            .send(Command::Disconnect(self.inner.ns.clone()));
    }

    /// Register a listener for an event. Reserved events are described by [`Event`],
    /// any other name receives the [`Event::Message`] sent by the server with that name.
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

    /// Remove every listener of an event.
    pub fn off_all(&self, event: &str) {
        self.inner.emitter.off_all(event)
    }

    /// Emit an event to the server.
    ///
    /// The data is serialized as the event arguments: a tuple is sent as several arguments,
    /// `()` as no argument and any other value as a single one.
    /// Byte buffers such as `bytes::Bytes` are sent as binary attachments.
    ///
    /// Reserved event names (see [`RESERVED_EVENTS`](crate::RESERVED_EVENTS)) are not sent:
    /// they are dispatched to the local listeners of this socket.
    pub fn emit<T: Serialize + ?Sized>(&self, event: &str, data: &T) -> Result<(), SendError> {
        self.emit_inner(event, data, None)
    }

    /// Emit a `message` event.
    pub fn send<T: Serialize + ?Sized>(&self, data: &T) -> Result<(), SendError> {
        self.emit("message", data)
    }

    /// Emit an event and call `callback` with the arguments of the server acknowledgement.
    ///
    /// The callback is dropped without being called if the socket is disconnected first.
    pub fn emit_with_callback<T, F>(
        &self,
        event: &str,
        data: &T,
        callback: F,
    ) -> Result<(), SendError>
    where
        T: Serialize + ?Sized,
        F: FnOnce(Vec<PayloadValue>) + Send + 'static,
    {
        self.emit_inner(event, data, Some(Box::new(callback)))
    }

    /// Emit an event and wait for the server acknowledgement, deserialized as `V`,
    /// for at most [`ClientConfig::ack_timeout`](crate::config::ClientConfig::ack_timeout).
    pub fn emit_with_ack<T, V>(&self, event: &str, data: &T) -> Result<AckResponse<V>, SendError>
    where
        T: Serialize + ?Sized,
        V: DeserializeOwned,
    {
        let timeout = self.inner.manager.config().ack_timeout;
        self.emit_with_ack_timeout(event, data, timeout)
    }

    /// Same as [`Socket::emit_with_ack`] with a custom timeout.
    pub fn emit_with_ack_timeout<T, V>(
        &self,
        event: &str,
        data: &T,
        timeout: Duration,
    ) -> Result<AckResponse<V>, SendError>
    where
        T: Serialize + ?Sized,
        V: DeserializeOwned,
    {
        let (tx, rx) = oneshot::channel();
        self.emit_with_callback(event, data, move |args| {
            tx.send(args).ok();
        })?;
        Ok(AckResponse::new(tokio::time::timeout(timeout, rx)))
    }

    fn emit_inner<T: Serialize + ?Sized>(
        &self,
        event: &str,
        data: &T,
        ack: Option<crate::ack::AckCallback>,
    ) -> Result<(), SendError> {
        let args = PayloadValue::args_from_data(data)?;
        if is_reserved(event) {
            #[cfg(feature = "tracing")]
            tracing::debug!(ns = %self.inner.ns, event, "dispatching reserved event locally");
            self.inner.emitter.emit(&Event::Message {
                event: event.to_string(),
                args,
                ack: None,
            });
            return Ok(());
        }
        let packet = Packet::event(self.inner.ns.clone(), event, args);
        self.inner.manager.try_send(Command::Emit {
            ns: self.inner.ns.clone(),
            packet,
            ack,
        })
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("ns", &self.inner.ns)
            .field("id", &self.id())
            .field("connected", &self.connected())
            .finish()
    }
}
