//! Websocket transport.
//!
//! String packets are sent as text frames and binary packets as binary frames.
//! Writes are flushed once the whole batch is fed to the websocket.
use bytes::Bytes;
use engineio_core::{Packet, PacketParseError, Str, TransportType};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_tungstenite::{
    WebSocketStream, connect_async,
    tungstenite::{Message, Utf8Bytes},
};

use super::{Transport, TransportEvent, TransportOptions, TransportSink};
use crate::errors::{Error, TransportError};

#[derive(Debug)]
enum Command {
    Send(Vec<Packet>),
    Close,
}

/// Websocket transport.
#[derive(Debug)]
pub struct WebSocketTransport {
    tx: mpsc::UnboundedSender<Command>,
    task: Option<WsTask>,
}

impl WebSocketTransport {
    /// Create a new websocket transport. Nothing is sent before [`Transport::open`].
    pub fn new(opts: TransportOptions, sink: TransportSink) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handshaken = opts.sid.is_some();
        Self {
            tx,
            task: Some(WsTask {
                opts,
                sink,
                rx,
                handshaken,
            }),
        }
    }
}

impl Transport for WebSocketTransport {
    fn name(&self) -> TransportType {
        TransportType::Websocket
    }

    fn open(&mut self) {
        if let Some(task) = self.task.take() {
            tokio::spawn(task.run());
        }
    }

    fn send(&mut self, packets: Vec<Packet>) {
        self.tx.send(Command::Send(packets)).ok();
    }

    /// Nothing is ever in flight between two writes
    fn pause(&mut self) -> bool {
        true
    }

    fn close(&mut self) {
        self.tx.send(Command::Close).ok();
    }
}

#[derive(Debug)]
struct WsTask {
    opts: TransportOptions,
    sink: TransportSink,
    rx: mpsc::UnboundedReceiver<Command>,
    handshaken: bool,
}

impl WsTask {
    async fn run(mut self) {
        let uri = self.opts.uri(TransportType::Websocket);
        #[cfg(feature = "tracing")]
        tracing::debug!(%uri, "opening websocket");

        let ws = tokio::select! {
            res = connect_async(uri) => res,
            // Closed before the websocket is open
            _ = self.closed() => return,
        };
        let ws = match ws {
            Ok((ws, _)) => ws,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("websocket connection error: {e}");
                self.sink
                    .emit(TransportEvent::Error(TransportError::from(e).into()));
                return;
            }
        };
        self.sink.emit(TransportEvent::Open);

        let (mut tx, mut rx) = ws.split();
        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Send(packets)) => {
                        if let Err(e) = self.write(&mut tx, packets).await {
                            self.sink.emit(TransportEvent::Error(e.into()));
                            break;
                        }
                        self.sink.emit(TransportEvent::Drain);
                    }
                    Some(Command::Close) | None => {
                        tx.send(Message::Close(None)).await.ok();
                        break;
                    }
                },
                msg = rx.next() => match msg {
                    Some(Ok(Message::Text(msg))) => {
                        let packet = Str::from_utf8(Bytes::from(msg))
                            .map_err(Into::into)
                            .and_then(|msg| Packet::decode(msg, self.opts.protocol));
                        if !self.on_packet(packet) {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let packet = Packet::decode_binary_frame(data, self.opts.protocol);
                        if !self.on_packet(packet) {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("websocket closed by remote");
                        self.sink.emit(TransportEvent::Close);
                        break;
                    }
                    // Ping and pong frames are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("websocket read error: {e}");
                        self.sink
                            .emit(TransportEvent::Error(TransportError::from(e).into()));
                        break;
                    }
                }
            }
        }
    }

    /// Wait for a close command, queued writes are dropped.
    async fn closed(&mut self) {
        while let Some(Command::Send(_)) = self.rx.recv().await {}
    }

    /// Handle a received packet, returns false if the transport is done.
    fn on_packet(&mut self, packet: Result<Packet, PacketParseError>) -> bool {
        match packet {
            Ok(Packet::Close) => {
                self.sink.emit(TransportEvent::Close);
                false
            }
            Ok(packet) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(?packet, "websocket packet received");
                if matches!(packet, Packet::Open(_)) {
                    self.handshaken = true;
                }
                self.sink.emit(TransportEvent::Packet(packet));
                true
            }
            Err(e) if !self.handshaken => {
                self.sink.emit(TransportEvent::Error(Error::Handshake(e)));
                false
            }
            Err(e) => {
                self.sink.emit(TransportEvent::Error(Error::Parse(e)));
                true
            }
        }
    }

    async fn write<S>(
        &self,
        tx: &mut SplitSink<WebSocketStream<S>, Message>,
        packets: Vec<Packet>,
    ) -> Result<(), TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        for packet in packets {
            let msg = match packet {
                Packet::Binary(data) => {
                    Message::Binary(Packet::encode_binary_frame(data, self.opts.protocol))
                }
                packet => Message::Text(Utf8Bytes::from(packet.encode(self.opts.protocol))),
            };
            tx.feed(msg).await?;
        }
        tx.flush().await?;
        Ok(())
    }
}
