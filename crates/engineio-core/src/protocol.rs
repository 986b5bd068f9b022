use std::{fmt, str::FromStr};

/// The type of `transport` used to talk to the server.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// HTTP long-polling transport
    Polling,
    /// Websocket transport
    Websocket,
}

impl TransportType {
    /// The name of the transport as it appears in the `transport` query
    /// parameter and in the handshake `upgrades` list.
    pub const fn name(self) -> &'static str {
        match self {
            TransportType::Polling => "polling",
            TransportType::Websocket => "websocket",
        }
    }
}

/// The transport name is not one of `polling` or `websocket`.
#[derive(Debug, Copy, Clone, thiserror::Error)]
#[error("unknown transport type")]
pub struct UnknownTransportError;

impl FromStr for TransportType {
    type Err = UnknownTransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "websocket" => Ok(TransportType::Websocket),
            "polling" => Ok(TransportType::Polling),
            _ => Err(UnknownTransportError),
        }
    }
}
impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The engine.io protocol version
///
/// * `V3`: the client drives the heartbeat (it sends pings, the server answers pongs),
///   polling payloads are length prefixed.
/// * `V4`: the server drives the heartbeat, polling payloads are separated with `\x1e`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// The protocol version 3
    #[default]
    V3 = 3,
    /// The protocol version 4
    V4 = 4,
}

impl ProtocolVersion {
    /// The value of the `EIO` query parameter.
    pub const fn as_query(self) -> &'static str {
        match self {
            ProtocolVersion::V3 => "3",
            ProtocolVersion::V4 => "4",
        }
    }
}
