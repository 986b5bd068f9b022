use base64::{Engine, engine::general_purpose};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{ProtocolVersion, Str};

/// An engine.io packet, exchanged with the server over any transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Open packet sent by the server once the session is created (the handshake)
    Open(OpenPacket),
    /// Close packet used to close a connection
    Close,
    /// Ping packet used to check if the connection is still alive
    Ping,
    /// Pong packet used to respond to a Ping packet
    Pong,

    /// Special Ping packet sent on a candidate transport to probe it
    PingUpgrade,
    /// Special Pong packet answering a probe, the candidate transport can take over
    PongUpgrade,

    /// Message packet carrying a text payload
    Message(Str),
    /// Upgrade packet, sent on the new transport once the old one is paused
    Upgrade,

    /// Noop packet, used by the server to release a pending polling request
    Noop,

    /// Binary message packet.
    ///
    /// It is base64 encoded inside polling payloads and sent
    /// as a binary frame over websocket.
    Binary(Bytes),
}

/// An error that occurs when parsing a packet or a payload.
#[derive(Debug, thiserror::Error)]
pub enum PacketParseError {
    /// The handshake document could not be parsed
    #[error("invalid handshake packet: {0}")]
    InvalidHandshake(#[from] serde_json::Error),
    /// The packet type is invalid.
    #[error("invalid packet type: {0:?}")]
    InvalidPacketType(Option<char>),
    /// The packet payload is invalid.
    #[error("invalid packet payload")]
    InvalidPacketPayload,
    /// The packet length prefix is invalid.
    #[error("invalid packet length")]
    InvalidPacketLen,
    /// The data is not valid utf8
    #[error("invalid utf8 data: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    /// The base64 decoding failed.
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}

impl Packet {
    /// Check if the packet is a binary packet
    pub fn is_binary(&self) -> bool {
        matches!(self, Packet::Binary(_))
    }

    /// Get the max size the packet could have when serialized as text.
    ///
    /// If b64 is true, binary packets are sized as base64 text.
    /// The base64 max size factor is `ceil(n / 3) * 4`.
    pub fn get_size_hint(&self, b64: bool) -> usize {
        match self {
            Packet::Open(_) => 156,
            Packet::Close | Packet::Ping | Packet::Pong | Packet::Upgrade | Packet::Noop => 1,
            Packet::PingUpgrade | Packet::PongUpgrade => 6,
            Packet::Message(msg) => 1 + msg.len(),
            Packet::Binary(data) if b64 => {
                2 + base64::encoded_len(data.len(), true).unwrap_or(usize::MAX - 2)
            }
            Packet::Binary(data) => 1 + data.len(),
        }
    }

    /// Serialize the packet to its text form.
    ///
    /// Binary packets are base64 encoded with the `b` prefix (v4)
    /// or the `b4` prefix (v3), as they appear in polling payloads.
    pub fn encode(self, protocol: ProtocolVersion) -> String {
        let mut buffer = String::with_capacity(self.get_size_hint(true));
        match self {
            Packet::Open(open) => {
                buffer.push('0');
                // OpenPacket only holds strings and integers
                buffer.push_str(&serde_json::to_string(&open).unwrap_or_default());
            }
            Packet::Close => buffer.push('1'),
            Packet::Ping => buffer.push('2'),
            Packet::Pong => buffer.push('3'),
            Packet::PingUpgrade => buffer.push_str("2probe"),
            Packet::PongUpgrade => buffer.push_str("3probe"),
            Packet::Message(msg) => {
                buffer.push('4');
                buffer.push_str(&msg);
            }
            Packet::Upgrade => buffer.push('5'),
            Packet::Noop => buffer.push('6'),
            Packet::Binary(data) => {
                match protocol {
                    ProtocolVersion::V3 => buffer.push_str("b4"),
                    ProtocolVersion::V4 => buffer.push('b'),
                }
                general_purpose::STANDARD.encode_string(data, &mut buffer);
            }
        };
        buffer
    }

    /// Serialize a binary packet to a websocket binary frame.
    ///
    /// The v3 protocol prefixes the raw data with the message packet type.
    pub fn encode_binary_frame(data: Bytes, protocol: ProtocolVersion) -> Bytes {
        match protocol {
            ProtocolVersion::V4 => data,
            ProtocolVersion::V3 => {
                let mut buf = BytesMut::with_capacity(data.len() + 1);
                buf.put_u8(4);
                buf.put_slice(&data);
                buf.freeze()
            }
        }
    }

    /// Deserialize a [`Packet`] from its text form.
    pub fn decode(value: Str, protocol: ProtocolVersion) -> Result<Self, PacketParseError> {
        let packet_type = value
            .as_bytes()
            .first()
            .ok_or(PacketParseError::InvalidPacketType(None))?;
        let is_probe = &value.as_bytes()[1..] == b"probe";
        let res = match packet_type {
            b'0' => Packet::Open(serde_json::from_str(&value[1..])?),
            b'1' => Packet::Close,
            b'2' if is_probe => Packet::PingUpgrade,
            b'2' => Packet::Ping,
            b'3' if is_probe => Packet::PongUpgrade,
            b'3' => Packet::Pong,
            b'4' => Packet::Message(value.slice(1..)),
            b'5' => Packet::Upgrade,
            b'6' => Packet::Noop,
            b'b' => {
                let start = match protocol {
                    ProtocolVersion::V3 if value.as_bytes().get(1) == Some(&b'4') => 2,
                    _ => 1,
                };
                Packet::Binary(general_purpose::STANDARD.decode(&value[start..])?.into())
            }
            c => Err(PacketParseError::InvalidPacketType(Some(*c as char)))?,
        };
        Ok(res)
    }

    /// Deserialize a [`Packet`] from a websocket binary frame.
    pub fn decode_binary_frame(
        data: Bytes,
        protocol: ProtocolVersion,
    ) -> Result<Self, PacketParseError> {
        match protocol {
            ProtocolVersion::V4 => Ok(Packet::Binary(data)),
            ProtocolVersion::V3 => match data.first() {
                Some(4) => Ok(Packet::Binary(data.slice(1..))),
                c => Err(PacketParseError::InvalidPacketType(c.map(|c| *c as char))),
            },
        }
    }
}

/// The handshake document carried by the open packet.
///
/// It is produced once per connection and never mutated.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenPacket {
    /// The session ID.
    pub sid: String,
    /// The list of transport upgrades offered by the server.
    pub upgrades: Vec<String>,
    /// The ping interval, used in the heartbeat mechanism (in milliseconds).
    pub ping_interval: u64,
    /// The ping timeout, used in the heartbeat mechanism (in milliseconds).
    pub ping_timeout: u64,
    /// The maximum number of bytes per polling payload (v4 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// Packets that must be written together, e.g. a socket.io header
/// and its binary attachments.
pub type PacketBuf = SmallVec<[Packet; 2]>;

#[cfg(test)]
mod tests {
    use super::*;

    fn open_packet() -> OpenPacket {
        OpenPacket {
            sid: "lv_VI97HAXpY6yYWAAAC".to_string(),
            upgrades: vec!["websocket".to_string()],
            ping_interval: 25000,
            ping_timeout: 5000,
            max_payload: None,
        }
    }

    #[test]
    fn open_packet_deserialize() {
        let packet_str = r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":5000}"#;
        let packet = Packet::decode(packet_str.into(), ProtocolVersion::V3).unwrap();
        assert_eq!(packet, Packet::Open(open_packet()));
    }

    #[test]
    fn open_packet_with_max_payload() {
        let packet_str = r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        let packet = Packet::decode(packet_str.into(), ProtocolVersion::V4).unwrap();
        let Packet::Open(open) = packet else {
            panic!("expected open packet");
        };
        assert_eq!(open.max_payload, Some(1000000));
        assert!(open.upgrades.is_empty());
    }

    #[test]
    fn open_packet_round_trip() {
        let packet = Packet::Open(open_packet());
        let encoded = packet.clone().encode(ProtocolVersion::V4);
        assert_eq!(
            Packet::decode(encoded.into(), ProtocolVersion::V4).unwrap(),
            packet
        );
    }

    #[test]
    fn malformed_handshake() {
        let err = Packet::decode(r#"0{"sid":12}"#.into(), ProtocolVersion::V3).unwrap_err();
        assert!(matches!(err, PacketParseError::InvalidHandshake(_)));
    }

    #[test]
    fn message_packet() {
        let packet_str: String = Packet::Message("hello".into()).encode(ProtocolVersion::V4);
        assert_eq!(packet_str, "4hello");
        let packet = Packet::decode("4hello".into(), ProtocolVersion::V4).unwrap();
        assert_eq!(packet, Packet::Message("hello".into()));
    }

    #[test]
    fn probe_packets() {
        assert_eq!(Packet::PingUpgrade.encode(ProtocolVersion::V3), "2probe");
        assert_eq!(
            Packet::decode("3probe".into(), ProtocolVersion::V3).unwrap(),
            Packet::PongUpgrade
        );
        assert_eq!(
            Packet::decode("3".into(), ProtocolVersion::V3).unwrap(),
            Packet::Pong
        );
    }

    #[test]
    fn binary_packet() {
        let packet = Packet::Binary(vec![1, 2, 3].into());
        assert_eq!(packet.clone().encode(ProtocolVersion::V4), "bAQID");
        assert_eq!(packet.encode(ProtocolVersion::V3), "b4AQID");

        let packet = Packet::decode("bAQID".into(), ProtocolVersion::V4).unwrap();
        assert_eq!(packet, Packet::Binary(vec![1, 2, 3].into()));
        let packet = Packet::decode("b4AQID".into(), ProtocolVersion::V3).unwrap();
        assert_eq!(packet, Packet::Binary(vec![1, 2, 3].into()));
    }

    #[test]
    fn binary_frames() {
        let data = Bytes::from_static(&[1, 2, 3]);
        let frame = Packet::encode_binary_frame(data.clone(), ProtocolVersion::V3);
        assert_eq!(&frame[..], &[4, 1, 2, 3]);
        assert_eq!(
            Packet::decode_binary_frame(frame, ProtocolVersion::V3).unwrap(),
            Packet::Binary(data.clone())
        );
        assert_eq!(
            Packet::encode_binary_frame(data.clone(), ProtocolVersion::V4),
            data
        );
    }

    #[test]
    fn invalid_packet_type() {
        let err = Packet::decode("9".into(), ProtocolVersion::V4).unwrap_err();
        assert!(matches!(err, PacketParseError::InvalidPacketType(Some('9'))));
        let err = Packet::decode("".into(), ProtocolVersion::V4).unwrap_err();
        assert!(matches!(err, PacketParseError::InvalidPacketType(None)));
    }

    #[test]
    fn packet_get_size_hint() {
        assert_eq!(Packet::Close.get_size_hint(false), 1);
        assert_eq!(Packet::PingUpgrade.get_size_hint(false), 6);
        assert_eq!(Packet::Message("hello".into()).get_size_hint(false), 6);
        let packet = Packet::Binary(vec![1, 2, 3].into());
        assert_eq!(packet.get_size_hint(false), 4);
        assert_eq!(packet.get_size_hint(true), 6);
    }
}
