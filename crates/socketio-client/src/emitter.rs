//! Events and listener registry.
//!
//! Every [`Manager`](crate::Manager) and [`Socket`](crate::Socket) owns an [`Emitter`] mapping
//! event names to an ordered list of listeners. Listeners registered with `once` are detached
//! before their first invocation, so they run at most once even with concurrent emissions.
use std::{
    collections::HashMap,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::de::DeserializeOwned;
use socketio_core::PayloadValue;

use crate::{
    ack::{AckSender, decode_args},
    errors::Error,
    socket::DisconnectReason,
};
use engineio_client::CloseReason;

/// The event names dispatched locally, they are never sent to the server.
pub const RESERVED_EVENTS: [&str; 13] = [
    "connect",
    "connect_error",
    "connect_timeout",
    "connecting",
    "disconnect",
    "error",
    "reconnect",
    "reconnect_attempt",
    "reconnect_failed",
    "reconnect_error",
    "reconnecting",
    "ping",
    "pong",
];

/// Check if `event` is a reserved event name.
pub fn is_reserved(event: &str) -> bool {
    RESERVED_EVENTS.contains(&event)
}

/// An event emitted by a [`Manager`](crate::Manager) or a [`Socket`](crate::Socket).
#[derive(Debug, Clone)]
pub enum Event {
    /// The engine.io connection is open.
    Open,
    /// The engine.io connection is closed.
    Close(CloseReason),
    /// A non fatal error occurred, e.g. a packet could not be parsed.
    Error(Arc<Error>),
    /// The socket is connected to its namespace.
    Connect,
    /// The connection attempt or the namespace connection failed.
    ConnectError(Arc<Error>),
    /// The handshake was not received in time.
    ConnectTimeout,
    /// The socket is connecting to its namespace.
    Connecting,
    /// The socket is disconnected from its namespace.
    Disconnect(DisconnectReason),
    /// The connection is open again after the given number of attempts.
    Reconnect(u32),
    /// A reconnection attempt starts, with its 1-indexed number.
    ReconnectAttempt(u32),
    /// Same as [`Event::ReconnectAttempt`].
    Reconnecting(u32),
    /// A reconnection attempt failed.
    ReconnectError(Arc<Error>),
    /// Every reconnection attempt failed, the manager stays closed.
    ReconnectFailed,
    /// A ping packet was received.
    Ping,
    /// A pong packet was received.
    Pong,
    /// A user event.
    Message {
        /// The event name.
        event: String,
        /// The event arguments.
        args: Vec<PayloadValue>,
        /// Set if the server requested an acknowledgement.
        ack: Option<AckSender>,
    },
}

impl Event {
    /// The name listeners are registered with for this event.
    pub fn name(&self) -> &str {
        match self {
            Event::Open => "open",
            Event::Close(_) => "close",
            Event::Error(_) => "error",
            Event::Connect => "connect",
            Event::ConnectError(_) => "connect_error",
            Event::ConnectTimeout => "connect_timeout",
            Event::Connecting => "connecting",
            Event::Disconnect(_) => "disconnect",
            Event::Reconnect(_) => "reconnect",
            Event::ReconnectAttempt(_) => "reconnect_attempt",
            Event::Reconnecting(_) => "reconnecting",
            Event::ReconnectError(_) => "reconnect_error",
            Event::ReconnectFailed => "reconnect_failed",
            Event::Ping => "ping",
            Event::Pong => "pong",
            Event::Message { event, .. } => event,
        }
    }

    /// The arguments of a [`Event::Message`], empty for other events.
    pub fn args(&self) -> &[PayloadValue] {
        match self {
            Event::Message { args, .. } => args,
            _ => &[],
        }
    }

    /// Deserialize the arguments of a [`Event::Message`].
    ///
    /// A single argument is deserialized as is, several arguments are deserialized
    /// as a sequence, e.g. a tuple.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        decode_args(self.args().to_vec())
    }

    /// The acknowledgement requested by the server with a [`Event::Message`].
    pub fn ack(&self) -> Option<&AckSender> {
        match self {
            Event::Message { ack, .. } => ack.as_ref(),
            _ => None,
        }
    }
}

/// The id of a registered listener, used to remove it with `off`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

struct Listener {
    id: ListenerId,
    once: bool,
    handler: Handler,
}

/// A registry of listeners by event name.
#[derive(Clone, Default)]
pub(crate) struct Emitter {
    listeners: Arc<RwLock<HashMap<String, Vec<Listener>>>>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<_, _> = listeners.iter().map(|(k, v)| (k, v.len())).collect();
        f.debug_struct("Emitter").field("listeners", &counts).finish()
    }
}

impl Emitter {
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add(event.into(), false, Arc::new(handler))
    }

    pub fn once<F>(&self, event: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add(event.into(), true, Arc::new(handler))
    }

    fn add(&self, event: String, once: bool, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners.entry(event).or_default().push(Listener { id, once, handler });
        id
    }

    /// Remove a listener, returns false if it was not registered.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = listeners.get_mut(event) else {
            return false;
        };
        let len = list.len();
        list.retain(|l| l.id != id);
        let removed = list.len() != len;
        if list.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    pub fn off_all(&self, event: &str) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners.remove(event);
    }

    #[cfg(test)]
    pub fn has_listeners(&self, event: &str) -> bool {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        listeners.get(event).is_some_and(|l| !l.is_empty())
    }

    /// Call every listener of the event, in registration order.
    ///
    /// Handlers run outside of the lock: they may register or remove listeners.
    pub fn emit(&self, event: &Event) {
        let handlers: Vec<Handler> = {
            let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
            let Some(list) = listeners.get_mut(event.name()) else {
                return;
            };
            let handlers = list.iter().map(|l| l.handler.clone()).collect();
            list.retain(|l| !l.once);
            if list.is_empty() {
                listeners.remove(event.name());
            }
            handlers
        };
        #[cfg(feature = "tracing")]
        tracing::trace!(event = event.name(), count = handlers.len(), "emitting event");
        for handler in handlers {
            handler(event);
        }
    }
}
