use tokio::time::error::Elapsed;

pub use socketio_core::parser::ParseError;
use socketio_core::PayloadValue;

/// Error type for the socket.io client.
///
/// Errors are reported asynchronously through the [`Event::Error`](crate::Event::Error),
/// [`Event::ConnectError`](crate::Event::ConnectError) and
/// [`Event::ReconnectError`](crate::Event::ReconnectError) events.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The engine.io connection failed.
    #[error("engine.io error: {0}")]
    Engine(#[from] engineio_client::Error),

    /// The handshake was not received before the connect timeout.
    #[error("connect timeout")]
    ConnectTimeout,

    /// A received packet could not be parsed, only this packet is dropped.
    #[error("error parsing packet: {0}")]
    Parse(#[from] ParseError),

    /// The server refused the namespace connection.
    #[error("namespace connection refused: {0:?}")]
    ConnectError(PayloadValue),

    /// The manager was closed.
    #[error("manager closed")]
    Closed,
}

impl Error {
    /// The message sent by the server with a [`Error::ConnectError`].
    ///
    /// It is the `message` field under protocol v5 and the raw string under protocol v4.
    pub fn connect_error_message(&self) -> Option<&str> {
        match self {
            Error::ConnectError(data) => data
                .get("message")
                .and_then(PayloadValue::as_str)
                .or_else(|| data.as_str()),
            _ => None,
        }
    }
}

/// Error type for ack operations.
#[derive(thiserror::Error, Debug)]
pub enum AckError {
    /// The ack response cannot be deserialized
    #[error("cannot deserialize ack response: {0:?}")]
    Decode(#[from] serde_json::Error),

    /// The ack response timed out
    #[error("ack timeout error")]
    Timeout,

    /// The connection was closed before the ack was received
    #[error("connection closed before the ack was received")]
    Closed,
}

impl From<Elapsed> for AckError {
    fn from(_: Elapsed) -> Self {
        Self::Timeout
    }
}

/// Error type for sending operations.
#[derive(thiserror::Error, Debug)]
pub enum SendError {
    /// An error occurred while serializing the data.
    #[error("error serializing data: {0:?}")]
    Serialize(#[from] serde_json::Error),

    /// The manager task is gone.
    #[error("manager closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn connect_error_message() {
        let err = Error::ConnectError(json!({ "message": "not authorized" }).into());
        assert_eq!(err.connect_error_message(), Some("not authorized"));

        let err = Error::ConnectError(json!("invalid namespace").into());
        assert_eq!(err.connect_error_message(), Some("invalid namespace"));

        assert_eq!(Error::Closed.connect_error_message(), None);
    }
}
