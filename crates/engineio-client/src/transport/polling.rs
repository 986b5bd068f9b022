//! Http long-polling transport.
//!
//! One GET request is always in flight to receive packets, and at most one POST
//! request writes packets. Both requests carry a batch of packets encoded as a payload,
//! see [`engineio_core::payload`].
use std::mem;

use bytes::Bytes;
use engineio_core::{Packet, PacketParseError, Str, TransportType, payload};
use futures_util::{FutureExt, future::BoxFuture};
use http::{Request, header};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tokio::sync::mpsc;

use super::{Transport, TransportEvent, TransportOptions, TransportSink, maybe};
use crate::errors::{Error, TransportError};

type HttpClient = Client<HttpConnector, Full<Bytes>>;

#[derive(Debug)]
enum Command {
    Send(Vec<Packet>),
    Pause,
    Resume,
    Close,
}

/// Http long-polling transport.
#[derive(Debug)]
pub struct PollingTransport {
    tx: mpsc::UnboundedSender<Command>,
    task: Option<PollingTask>,
}

impl PollingTransport {
    /// Create a new polling transport. Nothing is sent before [`Transport::open`].
    pub fn new(opts: TransportOptions, sink: TransportSink) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Client::builder(TokioExecutor::new()).build_http();
        let task = PollingTask {
            client,
            opts,
            sink,
            rx,
            opened: false,
        };
        Self {
            tx,
            task: Some(task),
        }
    }
}

impl Transport for PollingTransport {
    fn name(&self) -> TransportType {
        TransportType::Polling
    }

    fn open(&mut self) {
        if let Some(task) = self.task.take() {
            tokio::spawn(task.run());
        }
    }

    fn send(&mut self, packets: Vec<Packet>) {
        self.tx.send(Command::Send(packets)).ok();
    }

    fn pause(&mut self) -> bool {
        self.tx.send(Command::Pause).ok();
        false
    }

    fn resume(&mut self) {
        self.tx.send(Command::Resume).ok();
    }

    fn close(&mut self) {
        self.tx.send(Command::Close).ok();
    }
}

#[derive(Debug)]
struct PollingTask {
    client: HttpClient,
    opts: TransportOptions,
    sink: TransportSink,
    rx: mpsc::UnboundedReceiver<Command>,
    opened: bool,
}

impl PollingTask {
    async fn run(mut self) {
        let mut poll = Some(self.get());
        let mut post: Option<BoxFuture<'static, Result<(), TransportError>>> = None;
        let mut pending: Vec<Packet> = Vec::new();
        let mut pausing = false;
        let mut paused = false;

        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Send(packets)) if post.is_some() => pending.extend(packets),
                    Some(Command::Send(packets)) => post = Some(self.post(packets)),
                    Some(Command::Pause) => pausing = true,
                    Some(Command::Resume) => {
                        pausing = false;
                        paused = false;
                        if poll.is_none() {
                            poll = Some(self.get());
                        }
                    }
                    Some(Command::Close) | None => {
                        // Let the last write complete, it may hold a close packet
                        if let Some(post) = post.take() {
                            tokio::spawn(post);
                        }
                        break;
                    }
                },
                res = maybe(&mut poll) => {
                    poll = None;
                    if !self.on_poll(res) {
                        break;
                    }
                    if !pausing && !paused {
                        poll = Some(self.get());
                    }
                }
                res = maybe(&mut post) => {
                    post = None;
                    if let Err(e) = res {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("polling write error: {e}");
                        self.sink.emit(TransportEvent::Error(e.into()));
                        break;
                    }
                    if pending.is_empty() {
                        self.sink.emit(TransportEvent::Drain);
                    } else {
                        post = Some(self.post(mem::take(&mut pending)));
                    }
                }
            }

            if pausing && poll.is_none() && post.is_none() {
                #[cfg(feature = "tracing")]
                tracing::debug!("polling transport paused");
                pausing = false;
                paused = true;
                self.sink.emit(TransportEvent::Paused);
            }
        }
    }

    /// Handle a polling response, returns false if the transport is done.
    fn on_poll(&mut self, res: Result<Bytes, TransportError>) -> bool {
        let body = match res {
            Ok(body) => body,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("polling read error: {e}");
                self.sink.emit(TransportEvent::Error(e.into()));
                return false;
            }
        };
        let packets = Str::from_utf8(body)
            .map_err(PacketParseError::from)
            .and_then(|data| payload::decode(data, self.opts.protocol));
        let packets = match packets {
            Ok(packets) => packets,
            Err(e) if self.opts.sid.is_none() => {
                self.sink.emit(TransportEvent::Error(Error::Handshake(e)));
                return false;
            }
            Err(e) => {
                self.sink.emit(TransportEvent::Error(Error::Parse(e)));
                return true;
            }
        };

        for packet in packets {
            #[cfg(feature = "tracing")]
            tracing::trace!(?packet, "polling packet received");
            match &packet {
                Packet::Open(open) if self.opts.sid.is_none() => {
                    self.opts.sid = Some(open.sid.clone());
                }
                _ => (),
            }
            if !self.opened {
                self.opened = true;
                self.sink.emit(TransportEvent::Open);
            }
            if packet == Packet::Close {
                self.sink.emit(TransportEvent::Close);
                return false;
            }
            self.sink.emit(TransportEvent::Packet(packet));
        }
        true
    }

    fn get(&self) -> BoxFuture<'static, Result<Bytes, TransportError>> {
        let client = self.client.clone();
        let uri = self.opts.uri(TransportType::Polling);
        let max_payload = usize::try_from(self.opts.max_payload).unwrap_or(usize::MAX);
        async move {
            let req = Request::get(uri).body(Full::default())?;
            let res = client.request(req).await?;
            if !res.status().is_success() {
                return Err(TransportError::Status(res.status()));
            }
            let body = Limited::new(res.into_body(), max_payload)
                .collect()
                .await
                .map_err(|e| {
                    if e.is::<LengthLimitError>() {
                        TransportError::PayloadTooLarge
                    } else {
                        TransportError::Http(e)
                    }
                })?;
            Ok(body.to_bytes())
        }
        .boxed()
    }

    fn post(&self, packets: Vec<Packet>) -> BoxFuture<'static, Result<(), TransportError>> {
        let client = self.client.clone();
        let uri = self.opts.uri(TransportType::Polling);
        let data = payload::encode(packets, self.opts.protocol);
        async move {
            let req = Request::post(uri)
                .header(header::CONTENT_TYPE, "text/plain;charset=UTF-8")
                .body(Full::new(Bytes::from(data)))?;
            let res = client.request(req).await?;
            if !res.status().is_success() {
                return Err(TransportError::Status(res.status()));
            }
            res.into_body().collect().await?;
            Ok(())
        }
        .boxed()
    }
}
