//! Acknowledgement related types and functions.
//!
//! - [`AckResponse`]: a [`Future`] of the ack sent back by the server for an emitted event.
//! - [`AckSender`]: answers an event for which the server requested an ack.
use std::{
    fmt,
    future::Future,
    marker::PhantomData,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};

use serde::{Serialize, de::DeserializeOwned};
use socketio_core::{PayloadValue, Str, packet::Packet};
use tokio::{
    sync::{mpsc, oneshot::Receiver},
    time::Timeout,
};

use crate::{
    errors::{AckError, SendError},
    manager::Command,
};

/// A callback run with the arguments of an ack packet.
pub(crate) type AckCallback = Box<dyn FnOnce(Vec<PayloadValue>) + Send + 'static>;

/// Deserialize event or ack arguments.
/// A single argument is deserialized as is, several arguments as a sequence.
pub(crate) fn decode_args<T: DeserializeOwned>(
    mut args: Vec<PayloadValue>,
) -> Result<T, serde_json::Error> {
    if args.len() == 1 {
        args.swap_remove(0).into_data()
    } else {
        PayloadValue::Array(args).into_data()
    }
}

pin_project_lite::pin_project! {
    /// A [`Future`] of the acknowledgement sent by the server.
    ///
    /// It resolves with:
    /// * the ack data deserialized as `T`,
    /// * [`AckError::Timeout`] if the server didn't answer in time,
    /// * [`AckError::Decode`] if the data is not deserializable as `T`,
    /// * [`AckError::Closed`] if the socket was disconnected before the ack was received.
    #[must_use = "futures do nothing unless polled"]
    pub struct AckResponse<T> {
        #[pin]
        inner: Timeout<Receiver<Vec<PayloadValue>>>,
        _marker: PhantomData<fn() -> T>,
    }
}

impl<T> AckResponse<T> {
    pub(crate) fn new(inner: Timeout<Receiver<Vec<PayloadValue>>>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Future for AckResponse<T> {
    type Output = Result<T, AckError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().inner.poll(cx) {
            Poll::Ready(Ok(Ok(args))) => Poll::Ready(decode_args(args).map_err(AckError::Decode)),
            Poll::Ready(Ok(Err(_))) => Poll::Ready(Err(AckError::Closed)),
            Poll::Ready(Err(elapsed)) => Poll::Ready(Err(elapsed.into())),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for AckResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckResponse").finish_non_exhaustive()
    }
}

/// Answers an event received with an ack id.
///
/// It can be cloned, but the ack is sent at most once: every call after the first is a no-op.
#[derive(Clone)]
pub struct AckSender {
    ns: Str,
    id: i64,
    tx: mpsc::UnboundedSender<Command>,
    sent: Arc<AtomicBool>,
}

impl AckSender {
    pub(crate) fn new(ns: Str, id: i64, tx: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            ns,
            id,
            tx,
            sent: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The ack id requested by the server.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Check if the ack was already sent.
    pub fn is_sent(&self) -> bool {
        self.sent.load(Ordering::Acquire)
    }

    /// Send the ack with the given data.
    ///
    /// Like for emitted events, a tuple is sent as several arguments.
    pub fn send<T: Serialize + ?Sized>(&self, data: &T) -> Result<(), SendError> {
        let args = PayloadValue::args_from_data(data)?;
        if self.sent.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let packet = Packet::ack(self.ns.clone(), args, self.id);
        self.tx
            .send(Command::Ack(packet))
            .map_err(|_| SendError::Closed)
    }
}

impl fmt::Debug for AckSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckSender")
            .field("ns", &self.ns)
            .field("id", &self.id)
            .field("sent", &self.is_sent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use socketio_core::packet::PacketData;
    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn ack_sender_sends_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ack = AckSender::new(Str::from("/chat"), 4, tx);
        let ack2 = ack.clone();
        ack.send(&("ok", 1)).unwrap();
        ack2.send("again").unwrap();
        assert!(ack2.is_sent());

        match rx.try_recv() {
            Ok(Command::Ack(packet)) => {
                assert_eq!(packet.ns, "/chat");
                assert_eq!(
                    packet.inner,
                    PacketData::EventAck(
                        PayloadValue::Array(vec!["ok".into(), 1.into()]),
                        4
                    )
                );
            }
            _ => panic!("expected an ack command"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn ack_response() {
        let (tx, rx) = oneshot::channel();
        let res = AckResponse::<(String, u8)>::new(tokio::time::timeout(Duration::from_secs(1), rx));
        tx.send(vec!["a".into(), 2.into()]).unwrap();
        assert_eq!(res.await.unwrap(), ("a".to_string(), 2));

        let (_tx, rx) = oneshot::channel();
        let res = AckResponse::<String>::new(tokio::time::timeout(Duration::from_secs(1), rx));
        assert!(matches!(res.await, Err(AckError::Timeout)));

        let (tx, rx) = oneshot::channel::<Vec<PayloadValue>>();
        drop(tx);
        let res = AckResponse::<String>::new(tokio::time::timeout(Duration::from_secs(1), rx));
        assert!(matches!(res.await, Err(AckError::Closed)));

        let (tx, rx) = oneshot::channel();
        let res = AckResponse::<u32>::new(tokio::time::timeout(Duration::from_secs(1), rx));
        tx.send(vec!["nan".into()]).unwrap();
        assert!(matches!(res.await, Err(AckError::Decode(_))));
    }
}
