//! Transports carry engine.io packets between the client and the server.
//!
//! A transport is owned by the [`EngineSocket`](crate::socket::EngineSocket) task.
//! Its methods never block: the work is done by a task spawned by the transport,
//! which reports back through the [`TransportSink`] it was created with.
//!
//! Two transports are bundled:
//! * [`polling::PollingTransport`]: http long-polling over a hyper client.
//! * [`ws::WebSocketTransport`]: websocket over tokio-tungstenite.
//!
//! Custom transports can be plugged with a [`TransportFactory`].

use engineio_core::{Packet, ProtocolVersion, TransportType};
use tokio::sync::mpsc;

use crate::{config::EngineConfig, errors::Error};

pub mod polling;
pub mod ws;

/// Identifies one transport instance inside an engine socket.
pub type TransportId = usize;

/// Events reported by a transport to its engine socket.
#[derive(Debug)]
pub enum TransportEvent {
    /// The transport is open and can be written to.
    Open,
    /// A packet was received.
    Packet(Packet),
    /// The transport failed.
    Error(Error),
    /// The transport was closed by the remote end.
    Close,
    /// The last batch passed to [`Transport::send`] was fully written.
    Drain,
    /// The transport finished pausing, see [`Transport::pause`].
    Paused,
}

/// The channel a transport reports its [`TransportEvent`]s to.
///
/// Every event is tagged with the id of the transport so that the engine socket
/// can ignore events of a transport it detached from.
#[derive(Debug, Clone)]
pub struct TransportSink {
    id: TransportId,
    tx: mpsc::UnboundedSender<(TransportId, TransportEvent)>,
}

impl TransportSink {
    pub(crate) fn new(
        id: TransportId,
        tx: mpsc::UnboundedSender<(TransportId, TransportEvent)>,
    ) -> Self {
        Self { id, tx }
    }

    /// Report an event. Returns false if the engine socket is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.id, event)).is_ok()
    }

    /// Check if the engine socket is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The transport contract.
pub trait Transport: Send + 'static {
    /// The type of this transport.
    fn name(&self) -> TransportType;

    /// Start opening the transport. [`TransportEvent::Open`] is emitted once done.
    fn open(&mut self);

    /// Write a batch of packets.
    /// [`TransportEvent::Drain`] is emitted once the whole batch is written.
    fn send(&mut self, packets: Vec<Packet>);

    /// Stop reading and writing to prepare a transport swap.
    ///
    /// Returns true if the transport is paused right away, otherwise
    /// [`TransportEvent::Paused`] is emitted once there is no request in flight anymore.
    fn pause(&mut self) -> bool;

    /// Resume a transport after a pause that was not followed by a swap.
    fn resume(&mut self) {}

    /// Close the transport. No event is emitted after this call.
    fn close(&mut self);
}

/// Everything a transport needs to reach the server.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Base url of the server, e.g. `http://localhost:3000`.
    pub url: String,
    /// Path of the engine.io endpoint.
    pub path: String,
    /// User query parameters.
    pub query: Vec<(String, String)>,
    /// The protocol version.
    pub protocol: ProtocolVersion,
    /// The session id, once the handshake is done.
    pub sid: Option<String>,
    /// The maximum number of bytes accepted in a single polling response.
    pub max_payload: u64,
}

impl TransportOptions {
    pub(crate) fn new(config: &EngineConfig, sid: Option<String>) -> Self {
        Self {
            url: config.url.clone(),
            path: config.path.clone(),
            query: config.query.clone(),
            protocol: config.protocol,
            sid,
            max_payload: config.max_payload,
        }
    }

    /// Build the request uri for the given transport.
    ///
    /// Websocket uris use the `ws`/`wss` scheme.
    pub fn uri(&self, transport: TransportType) -> String {
        let base = match transport {
            TransportType::Polling => self.url.trim_end_matches('/').to_string(),
            TransportType::Websocket => {
                let url = self.url.trim_end_matches('/');
                if let Some(rest) = url.strip_prefix("https://") {
                    format!("wss://{rest}")
                } else if let Some(rest) = url.strip_prefix("http://") {
                    format!("ws://{rest}")
                } else {
                    url.to_string()
                }
            }
        };
        let mut uri = format!(
            "{base}{}?EIO={}&transport={}",
            self.path,
            self.protocol.as_query(),
            transport.name()
        );
        if transport == TransportType::Polling && self.protocol == ProtocolVersion::V3 {
            uri.push_str("&b64=1");
        }
        if let Some(sid) = &self.sid {
            uri.push_str("&sid=");
            uri.push_str(sid);
        }
        for (key, value) in &self.query {
            uri.push('&');
            uri.push_str(key);
            uri.push('=');
            uri.push_str(value);
        }
        uri
    }
}

/// Creates transports for an engine socket.
pub trait TransportFactory: Send + Sync + 'static {
    /// Create a new transport of the given type, reporting to `sink`.
    fn create(
        &self,
        transport: TransportType,
        opts: TransportOptions,
        sink: TransportSink,
    ) -> Box<dyn Transport>;
}

/// Await an optional future, never completing if there is none.
pub(crate) async fn maybe<F: Future + Unpin>(fut: &mut Option<F>) -> F::Output {
    match fut {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

/// The bundled transports: [`polling::PollingTransport`] and [`ws::WebSocketTransport`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransports;

impl TransportFactory for DefaultTransports {
    fn create(
        &self,
        transport: TransportType,
        opts: TransportOptions,
        sink: TransportSink,
    ) -> Box<dyn Transport> {
        match transport {
            TransportType::Polling => Box::new(polling::PollingTransport::new(opts, sink)),
            TransportType::Websocket => Box::new(ws::WebSocketTransport::new(opts, sink)),
        }
    }
}
