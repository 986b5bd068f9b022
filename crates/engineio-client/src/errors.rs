use engineio_core::PacketParseError;

/// A boxed error coming from the underlying io stack.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An I/O or protocol failure reported by a transport.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The http request could not be built or sent.
    #[error("http error: {0}")]
    Http(#[source] BoxError),
    /// The server answered with a non-success status code.
    #[error("unexpected http status: {0}")]
    Status(http::StatusCode),
    /// The polling response exceeded the configured max payload.
    #[error("payload too large")]
    PayloadTooLarge,
    /// The websocket failed.
    #[error("ws transport error: {0}")]
    Ws(#[from] Box<tokio_tungstenite::tungstenite::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::Ws(Box::new(err))
    }
}
impl From<http::Error> for TransportError {
    fn from(err: http::Error) -> Self {
        TransportError::Http(Box::new(err))
    }
}
impl From<hyper::Error> for TransportError {
    fn from(err: hyper::Error) -> Self {
        TransportError::Http(Box::new(err))
    }
}
impl From<hyper_util::client::legacy::Error> for TransportError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        TransportError::Http(Box::new(err))
    }
}

/// Engine.IO client errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// No pong (v3) or no ping (v4) was received in time.
    /// It is followed by a close with [`CloseReason::PingTimeout`](crate::CloseReason::PingTimeout).
    #[error("ping timeout")]
    PingTimeout,
    /// The handshake document is malformed, fatal to the connection attempt.
    #[error("handshake error: {0}")]
    Handshake(#[source] PacketParseError),
    /// A received packet or payload is malformed, only this payload is dropped.
    #[error("error decoding packet: {0}")]
    Parse(#[source] PacketParseError),
    /// The upgrade probe failed, the current transport is kept.
    #[error("probe error: {0}")]
    ProbeFailed(&'static str),
    /// The socket is closed.
    #[error("socket closed")]
    Closed,
}
