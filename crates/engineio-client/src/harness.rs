//! In-memory transports driven by tests.
//!
//! [`mock_transports`] returns a [`TransportFactory`] to open an
//! [`EngineSocket`](crate::socket::EngineSocket) with, and a [`MockServer`] receiving a
//! [`MockConn`] for every transport the socket creates. A test plays the server through
//! the [`MockConn`]: it emits transport events and observes the transport calls.
use std::sync::Arc;

use engineio_core::{OpenPacket, Packet, TransportType};
use tokio::sync::mpsc;

use crate::{
    errors::{Error, TransportError},
    transport::{Transport, TransportEvent, TransportFactory, TransportOptions, TransportSink},
};

/// A call made by the engine socket on a mock transport.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    /// [`Transport::open`]
    Open,
    /// [`Transport::send`]
    Send(Vec<Packet>),
    /// [`Transport::pause`]
    Pause,
    /// [`Transport::resume`]
    Resume,
    /// [`Transport::close`]
    Close,
}

/// The server side of a mock transport.
#[derive(Debug)]
pub struct MockConn {
    /// The transport type requested by the socket.
    pub kind: TransportType,
    /// The options the transport was created with.
    pub opts: TransportOptions,
    sink: TransportSink,
    calls: mpsc::UnboundedReceiver<MockCall>,
}

impl MockConn {
    /// Wait for the next call made on the transport.
    /// Returns `None` once the transport is dropped.
    pub async fn next_call(&mut self) -> Option<MockCall> {
        self.calls.recv().await
    }

    /// Get the next call if there is one already.
    pub fn try_call(&mut self) -> Option<MockCall> {
        self.calls.try_recv().ok()
    }

    /// The transport is open.
    pub fn open(&self) {
        self.sink.emit(TransportEvent::Open);
    }

    /// Receive a packet from the server.
    pub fn packet(&self, packet: Packet) {
        self.sink.emit(TransportEvent::Packet(packet));
    }

    /// Open the transport and receive the handshake.
    pub fn handshake(&self, open: OpenPacket) {
        self.open();
        self.packet(Packet::Open(open));
    }

    /// The last batch is written.
    pub fn drain(&self) {
        self.sink.emit(TransportEvent::Drain);
    }

    /// The transport finished pausing.
    pub fn paused(&self) {
        self.sink.emit(TransportEvent::Paused);
    }

    /// The transport fails.
    pub fn error(&self) {
        let err = TransportError::Status(http::StatusCode::INTERNAL_SERVER_ERROR);
        self.sink.emit(TransportEvent::Error(Error::Transport(err)));
    }

    /// The server closes the transport.
    pub fn close(&self) {
        self.sink.emit(TransportEvent::Close);
    }
}

/// Receives a [`MockConn`] for every transport created by the socket.
#[derive(Debug)]
pub struct MockServer {
    rx: mpsc::UnboundedReceiver<MockConn>,
}

impl MockServer {
    /// Wait for the socket to create a transport.
    pub async fn accept(&mut self) -> Option<MockConn> {
        self.rx.recv().await
    }

    /// Get the next created transport if there is one already.
    pub fn try_accept(&mut self) -> Option<MockConn> {
        self.rx.try_recv().ok()
    }
}

/// Creates [`MockTransport`]s.
#[derive(Debug)]
pub struct MockTransportFactory {
    tx: mpsc::UnboundedSender<MockConn>,
}

/// Create a mock transport factory and its server side.
pub fn mock_transports() -> (Arc<MockTransportFactory>, MockServer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(MockTransportFactory { tx }), MockServer { rx })
}

impl TransportFactory for MockTransportFactory {
    fn create(
        &self,
        kind: TransportType,
        opts: TransportOptions,
        sink: TransportSink,
    ) -> Box<dyn Transport> {
        let (calls_tx, calls) = mpsc::unbounded_channel();
        self.tx
            .send(MockConn {
                kind,
                opts,
                sink,
                calls,
            })
            .ok();
        Box::new(MockTransport {
            kind,
            calls: calls_tx,
        })
    }
}

/// A transport recording the calls made on it.
///
/// Like the bundled transports, a polling mock pauses asynchronously
/// (the test calls [`MockConn::paused`]) and a websocket mock pauses right away.
#[derive(Debug)]
pub struct MockTransport {
    kind: TransportType,
    calls: mpsc::UnboundedSender<MockCall>,
}

impl Transport for MockTransport {
    fn name(&self) -> TransportType {
        self.kind
    }
    fn open(&mut self) {
        self.calls.send(MockCall::Open).ok();
    }
    fn send(&mut self, packets: Vec<Packet>) {
        self.calls.send(MockCall::Send(packets)).ok();
    }
    fn pause(&mut self) -> bool {
        self.calls.send(MockCall::Pause).ok();
        self.kind == TransportType::Websocket
    }
    fn resume(&mut self) {
        self.calls.send(MockCall::Resume).ok();
    }
    fn close(&mut self) {
        self.calls.send(MockCall::Close).ok();
    }
}
