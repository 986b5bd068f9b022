//! The common socket.io packet format:
//! ```text
//! <packet type>[<# of binary attachments>-][<namespace>,][<acknowledgment id>][JSON-stringified payload without binary]
//! + binary attachments extracted
//! ```
//!
//! Binary leaves of the payload are replaced by `{"_placeholder":true,"num":N}` objects,
//! numbered depth-first, and sent as separate binary engine.io packets right after the
//! header packet.
use bytes::{BufMut, Bytes, BytesMut};
use engineio_core::Str;

use crate::{
    PayloadValue,
    packet::{Packet, PacketData},
};

/// Errors when parsing/serializing socket.io packets
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    /// Invalid packet type
    #[error("invalid packet type")]
    InvalidPacketType,

    /// Invalid attachment count of a binary packet
    #[error("invalid attachments")]
    InvalidAttachments,

    /// Namespace not followed by a `,`
    #[error("invalid namespace")]
    InvalidNamespace,

    /// Ack id that doesn't fit an i64
    #[error("invalid ack id")]
    InvalidAckId,

    /// Event payload that is not an array starting with the event name
    #[error("invalid event name")]
    InvalidEventName,

    /// Payload that is not valid JSON or missing where one is required
    #[error("invalid data: {0}")]
    InvalidData(#[from] serde_json::Error),

    /// Missing payload for an event or ack packet
    #[error("missing data")]
    MissingData,

    /// A placeholder referencing an attachment that doesn't exist
    #[error("unknown placeholder index {0}")]
    UnknownPlaceholder(usize),

    /// Received binary data while no binary packet is being reconstructed
    #[error("received unexpected binary data")]
    UnexpectedBinaryPacket,

    /// Needs more binary data before deserialization. It is not exactly an error, it is used
    /// for control flow: a binary packet with n attachments returns [`NeedsMoreBinaryData`]
    /// until its n-th attachment is given to [`Decoder::decode_bin`].
    ///
    /// [`NeedsMoreBinaryData`]: ParseError::NeedsMoreBinaryData
    #[error("needs more binary data before deserialization")]
    NeedsMoreBinaryData,
}

/// An encoded packet: the header engine.io message followed by its binary attachments,
/// in the order they must be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    /// The header string packet
    pub header: Str,
    /// The extracted binary attachments
    pub attachments: Vec<Bytes>,
}

/// Encode a packet into its header string and its binary attachments.
///
/// Binary leaves are always extracted: an event or ack with binary data is sent
/// as a binary event/ack even if it was built as a plain one.
pub fn encode(packet: Packet) -> Result<Encoded, ParseError> {
    let Packet { inner, ns } = packet;
    let mut attachments = Vec::new();

    let (index, ack, data) = match inner {
        PacketData::Connect(auth) => (0, None, auth),
        PacketData::Disconnect => (1, None, None),
        PacketData::Event(data, ack) | PacketData::BinaryEvent(data, ack) => (2, ack, Some(data)),
        PacketData::EventAck(data, ack) | PacketData::BinaryAck(data, ack) => {
            (3, Some(ack), Some(data))
        }
        PacketData::ConnectError(data) => (4, None, Some(data)),
    };
    let data = data
        .map(|d| serde_json::to_string(&d.to_json_with_attachments(&mut attachments)))
        .transpose()?;

    let binary = !attachments.is_empty() && (index == 2 || index == 3);
    let index = if binary { index + 3 } else { index };

    let mut buffer = BytesMut::with_capacity(
        1 + ns.len() + 1 + 20 + data.as_ref().map(String::len).unwrap_or(0),
    );
    let mut itoa_buf = itoa::Buffer::new();
    buffer.put_u8(b'0' + index);
    if binary {
        buffer.put_slice(itoa_buf.format(attachments.len()).as_bytes());
        buffer.put_u8(b'-');
    }
    if !ns.is_empty() && ns != "/" {
        if !ns.starts_with('/') {
            buffer.put_u8(b'/');
        }
        buffer.put_slice(ns.as_bytes());
        buffer.put_u8(b',');
    }
    if let Some(ack) = ack {
        buffer.put_slice(itoa_buf.format(ack).as_bytes());
    }
    if let Some(data) = data {
        buffer.put_slice(data.as_bytes());
    }

    // The buffer only contains ascii and the utf8 of the namespace and the json
    let header = Str::from_utf8(buffer.freeze()).map_err(|_| ParseError::InvalidNamespace)?;
    Ok(Encoded {
        header,
        attachments,
    })
}

/// Stateful socket.io packet decoder.
///
/// String packets are decoded right away, except binary events and acks which are kept
/// pending until all of their attachments have been given to [`Decoder::decode_bin`].
#[derive(Debug, Default)]
pub struct Decoder {
    partial: Option<PartialPacket>,
}

#[derive(Debug)]
struct PartialPacket {
    packet: Packet,
    expected: usize,
    attachments: Vec<Bytes>,
}

impl Decoder {
    /// Create a new decoder with no pending reconstruction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a string packet.
    ///
    /// Returns [`ParseError::NeedsMoreBinaryData`] if the packet awaits binary attachments.
    /// A binary packet still waiting for its attachments is dropped.
    pub fn decode_str(&mut self, data: Str) -> Result<Packet, ParseError> {
        if self.partial.take().is_some() {
            #[cfg(feature = "tracing")]
            tracing::debug!("dropping incomplete binary packet");
        }
        let (packet, expected) = deserialize_packet(data)?;
        match expected {
            Some(expected) if expected > 0 => {
                self.partial = Some(PartialPacket {
                    packet,
                    expected,
                    attachments: Vec::new(),
                });
                Err(ParseError::NeedsMoreBinaryData)
            }
            _ => Ok(packet),
        }
    }

    /// Decode a binary attachment of the pending binary packet.
    ///
    /// Returns the reconstructed packet once the last attachment has been received.
    pub fn decode_bin(&mut self, data: Bytes) -> Result<Packet, ParseError> {
        let partial = self
            .partial
            .as_mut()
            .ok_or(ParseError::UnexpectedBinaryPacket)?;
        partial.attachments.push(data);
        if partial.attachments.len() < partial.expected {
            return Err(ParseError::NeedsMoreBinaryData);
        }

        let PartialPacket {
            mut packet,
            attachments,
            ..
        } = self
            .partial
            .take()
            .ok_or(ParseError::UnexpectedBinaryPacket)?;
        if let PacketData::BinaryEvent(data, _) | PacketData::BinaryAck(data, _) = &mut packet.inner
        {
            data.fill_placeholders(&attachments)
                .map_err(ParseError::UnknownPlaceholder)?;
        }
        Ok(packet)
    }

    /// Returns true if a binary packet is waiting for attachments.
    pub fn is_reconstructing(&self) -> bool {
        self.partial.is_some()
    }

    /// Drop any pending reconstruction, e.g. when the connection is closed.
    pub fn reset(&mut self) {
        self.partial = None;
    }
}

/// Upper bound of the attachment count announced by a binary packet header.
const MAX_ATTACHMENTS: usize = u16::MAX as usize;

/// Single left-to-right scan of the header. Returns the packet and the number of
/// attachments for binary packets.
fn deserialize_packet(data: Str) -> Result<(Packet, Option<usize>), ParseError> {
    // Separators are ascii so it is possible to scan the bytes and slice on them
    let bytes = data.as_bytes();
    let index = match bytes.first() {
        Some(c @ b'0'..=b'6') => c - b'0',
        _ => return Err(ParseError::InvalidPacketType),
    };
    let mut pos = 1;

    let attachments = if index == 5 || index == 6 {
        let start = pos;
        while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
            pos += 1;
        }
        if pos == start || bytes.get(pos) != Some(&b'-') {
            return Err(ParseError::InvalidAttachments);
        }
        let count = data[start..pos]
            .parse()
            .ok()
            .filter(|count| *count <= MAX_ATTACHMENTS)
            .ok_or(ParseError::InvalidAttachments)?;
        pos += 1;
        Some(count)
    } else {
        None
    };

    let ns = if bytes.get(pos) == Some(&b'/') {
        let start = pos;
        match bytes[pos..].iter().position(|c| *c == b',') {
            Some(len) => {
                pos += len + 1;
                data.slice(start..pos - 1)
            }
            // e.g `1/custom`, only valid when nothing follows
            None if index <= 1 => {
                pos = bytes.len();
                data.slice(start..)
            }
            None => return Err(ParseError::InvalidNamespace),
        }
    } else {
        Str::from("/")
    };

    let ack = if matches!(index, 2 | 3 | 5 | 6) {
        let start = pos;
        while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
            pos += 1;
        }
        if pos > start {
            Some(
                data[start..pos]
                    .parse::<i64>()
                    .map_err(|_| ParseError::InvalidAckId)?,
            )
        } else {
            None
        }
    } else {
        None
    };

    let payload = &data[pos..];
    let value = if payload.is_empty() {
        None
    } else {
        Some(PayloadValue::from(serde_json::from_str::<serde_json::Value>(
            payload,
        )?))
    };

    let event = |value: Option<PayloadValue>| match value {
        Some(PayloadValue::Array(a)) if matches!(a.first(), Some(PayloadValue::String(_))) => {
            Ok(PayloadValue::Array(a))
        }
        Some(_) => Err(ParseError::InvalidEventName),
        None => Err(ParseError::MissingData),
    };
    let ack_data = |value: Option<PayloadValue>| match value {
        Some(v @ PayloadValue::Array(_)) => Ok(v),
        _ => Err(ParseError::MissingData),
    };
    let ack_id = |ack: Option<i64>| ack.ok_or(ParseError::InvalidAckId);

    let inner = match index {
        0 => PacketData::Connect(value),
        1 => PacketData::Disconnect,
        2 => PacketData::Event(event(value)?, ack),
        3 => PacketData::EventAck(ack_data(value)?, ack_id(ack)?),
        4 => PacketData::ConnectError(value.unwrap_or_default()),
        5 => PacketData::BinaryEvent(event(value)?, ack),
        _ => PacketData::BinaryAck(ack_data(value)?, ack_id(ack)?),
    };
    Ok((Packet { inner, ns }, attachments))
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn encode_str(packet: Packet) -> String {
        let encoded = encode(packet).unwrap();
        assert!(encoded.attachments.is_empty());
        encoded.header.into()
    }

    fn decode(data: impl Into<String>) -> Packet {
        Decoder::new().decode_str(Str::from(data.into())).unwrap()
    }

    fn bin(data: &'static [u8]) -> PayloadValue {
        PayloadValue::Binary(Bytes::from_static(data))
    }

    #[test]
    fn packet_encode_connect() {
        assert_eq!(encode_str(Packet::connect("/", None)), "0");
        assert_eq!(encode_str(Packet::connect("/admin™", None)), "0/admin™,");
        let auth = PayloadValue::from(json!({ "token": "123" }));
        assert_eq!(
            encode_str(Packet::connect("/admin", Some(auth))),
            r#"0/admin,{"token":"123"}"#
        );
    }

    #[test]
    fn packet_decode_connect() {
        let packet = decode(r#"0{"sid":"abc"}"#);
        assert_eq!(
            packet,
            Packet::connect("/", Some(PayloadValue::from(json!({ "sid": "abc" }))))
        );
        assert_eq!(decode("0/admin™,"), Packet::connect("/admin™", None));
        assert_eq!(decode("0/admin"), Packet::connect("/admin", None));
    }

    #[test]
    fn packet_disconnect() {
        assert_eq!(encode_str(Packet::disconnect("/")), "1");
        assert_eq!(encode_str(Packet::disconnect("/admin")), "1/admin,");
        assert_eq!(decode("1/admin,"), Packet::disconnect("/admin"));
        assert_eq!(decode("1/admin"), Packet::disconnect("/admin"));
    }

    #[test]
    fn packet_encode_event() {
        let packet = Packet::event("/", "event", vec![json!({ "data": "value™" }).into()]);
        assert_eq!(encode_str(packet), r#"2["event",{"data":"value™"}]"#);

        let mut packet = Packet::event("/admin™", "event", vec!["a".into()]);
        packet.inner.set_ack_id(254);
        assert_eq!(encode_str(packet), r#"2/admin™,254["event","a"]"#);
    }

    #[test]
    fn object_keys_keep_their_order() {
        #[derive(serde::Serialize)]
        struct Message {
            to: &'static str,
            body: &'static str,
            at: u32,
        }
        let msg = Message { to: "room", body: "hi", at: 3 };
        let packet = Packet::event("/", "msg", vec![PayloadValue::from_data(&msg).unwrap()]);
        assert_eq!(
            encode_str(packet),
            r#"2["msg",{"to":"room","body":"hi","at":3}]"#
        );

        let data = r#"2["msg",{"z":1,"a":{"y":true,"b":null}}]"#;
        assert_eq!(encode_str(decode(data)), data);
    }

    #[test]
    fn packet_decode_event() {
        let packet = decode(r#"2/admin™,254["event",{"data":"value™"}]"#);
        let mut expected =
            Packet::event("/admin™", "event", vec![json!({ "data": "value™" }).into()]);
        expected.inner.set_ack_id(254);
        assert_eq!(packet, expected);
    }

    #[test]
    fn packet_event_ack() {
        let packet = Packet::ack("/", vec!["data".into()], 54);
        assert_eq!(encode_str(packet.clone()), r#"354["data"]"#);
        assert_eq!(decode(r#"354["data"]"#), packet);

        let packet = Packet::ack("/admin", vec![], 1);
        assert_eq!(encode_str(packet.clone()), "3/admin,1[]");
        assert_eq!(decode("3/admin,1[]"), packet);
    }

    #[test]
    fn packet_connect_error() {
        let packet = Packet::connect_error("/admin", "Invalid namespace");
        assert_eq!(
            encode_str(packet.clone()),
            r#"4/admin,{"message":"Invalid namespace"}"#
        );
        assert_eq!(decode(r#"4/admin,{"message":"Invalid namespace"}"#), packet);
        assert_eq!(
            decode(r#"4"Invalid namespace""#).inner,
            PacketData::ConnectError("Invalid namespace".into())
        );
    }

    #[test]
    fn packet_encode_binary_event() {
        let mut packet = Packet::event("/admin™", "event", vec![
            json!({ "data": "value™" }).into(),
            bin(&[1]),
        ]);
        packet.inner.set_ack_id(254);
        let encoded = encode(packet).unwrap();
        let json = json!(["event", { "data": "value™" }, { "_placeholder": true, "num": 0 }]);
        assert_eq!(encoded.header, format!("51-/admin™,254{json}").as_str());
        assert_eq!(encoded.attachments, vec![Bytes::from_static(&[1])]);
    }

    #[test]
    fn packet_encode_binary_ack() {
        let encoded = encode(Packet::ack("/", vec![bin(&[1]), bin(&[2])], 54)).unwrap();
        assert_eq!(
            encoded.header,
            r#"62-54[{"_placeholder":true,"num":0},{"_placeholder":true,"num":1}]"#
        );
        assert_eq!(encoded.attachments.len(), 2);
    }

    #[test]
    fn packet_decode_binary_event() {
        let mut decoder = Decoder::new();
        let json = json!(["event", { "data": "value™" }, { "_placeholder": true, "num": 0 }, {
            "_placeholder": true,
            "num": 1
        }]);
        assert!(matches!(
            decoder.decode_str(format!("52-/admin™,254{json}").into()),
            Err(ParseError::NeedsMoreBinaryData)
        ));
        assert!(decoder.is_reconstructing());
        assert!(matches!(
            decoder.decode_bin(Bytes::from_static(&[1])),
            Err(ParseError::NeedsMoreBinaryData)
        ));
        let packet = decoder.decode_bin(Bytes::from_static(&[2])).unwrap();
        assert!(!decoder.is_reconstructing());

        let mut expected = Packet::event("/admin™", "event", vec![
            json!({ "data": "value™" }).into(),
            bin(&[1]),
            bin(&[2]),
        ]);
        expected.inner.set_ack_id(254);
        assert_eq!(packet, expected);
    }

    #[test]
    fn binary_round_trip_at_depth() {
        let args = vec![
            PayloadValue::from(json!({ "name": "doc" })),
            PayloadValue::Array(vec![
                bin(&[1, 2]),
                PayloadValue::Object(
                    [
                        ("deep".to_string(), PayloadValue::Array(vec![bin(&[3])])),
                        ("other".to_string(), bin(&[])),
                    ]
                    .into(),
                ),
            ]),
            bin(&[4, 5, 6]),
        ];
        let packet = Packet::event("/files", "upload", args);

        let encoded = encode(packet.clone()).unwrap();
        assert_eq!(encoded.attachments, vec![
            Bytes::from_static(&[1, 2]),
            Bytes::from_static(&[3]),
            Bytes::new(),
            Bytes::from_static(&[4, 5, 6]),
        ]);

        let mut decoder = Decoder::new();
        assert!(matches!(
            decoder.decode_str(encoded.header),
            Err(ParseError::NeedsMoreBinaryData)
        ));
        let mut attachments = encoded.attachments.into_iter().peekable();
        let decoded = loop {
            let bin = attachments.next().unwrap();
            match decoder.decode_bin(bin) {
                Ok(packet) => break packet,
                Err(ParseError::NeedsMoreBinaryData) => assert!(attachments.peek().is_some()),
                Err(e) => panic!("unexpected error {e}"),
            }
        };
        assert_eq!(decoded, packet);
    }

    #[test]
    fn binary_while_idle_is_an_error() {
        let mut decoder = Decoder::new();
        assert!(matches!(
            decoder.decode_bin(Bytes::from_static(&[1])),
            Err(ParseError::UnexpectedBinaryPacket)
        ));
    }

    #[test]
    fn string_while_reconstructing_drops_partial_packet() {
        let mut decoder = Decoder::new();
        let header = r#"51-["event",{"_placeholder":true,"num":0}]"#;
        assert!(decoder.decode_str(header.into()).is_err());
        assert!(decoder.is_reconstructing());

        let packet = decoder.decode_str(r#"2["other"]"#.into()).unwrap();
        assert!(matches!(packet.inner, PacketData::Event(_, None)));
        assert!(!decoder.is_reconstructing());
        assert!(matches!(
            decoder.decode_bin(Bytes::from_static(&[1])),
            Err(ParseError::UnexpectedBinaryPacket)
        ));
    }

    #[test]
    fn huge_attachment_count() {
        let mut decoder = Decoder::new();
        assert!(matches!(
            decoder.decode_str(r#"5999999999999999-["a"]"#.into()),
            Err(ParseError::InvalidAttachments)
        ));
        assert!(matches!(
            decoder.decode_str(r#"699999999999999999999-0["a"]"#.into()),
            Err(ParseError::InvalidAttachments)
        ));
        assert!(!decoder.is_reconstructing());
    }

    #[test]
    fn unknown_placeholder() {
        let mut decoder = Decoder::new();
        let header = r#"51-["event",{"_placeholder":true,"num":3}]"#;
        assert!(decoder.decode_str(header.into()).is_err());
        assert!(matches!(
            decoder.decode_bin(Bytes::from_static(&[1])),
            Err(ParseError::UnknownPlaceholder(3))
        ));
    }

    #[test]
    fn reject_invalid_packets() {
        let mut decoder = Decoder::new();
        let mut decode_err = |data: &'static str| decoder.decode_str(data.into()).unwrap_err();
        assert!(matches!(decode_err(""), ParseError::InvalidPacketType));
        assert!(matches!(decode_err("7"), ParseError::InvalidPacketType));
        assert!(matches!(decode_err("5invalid"), ParseError::InvalidAttachments));
        assert!(matches!(decode_err("2/admin[\"a\"]"), ParseError::InvalidNamespace));
        assert!(matches!(decode_err("2[1]"), ParseError::InvalidEventName));
        assert!(matches!(decode_err("2"), ParseError::MissingData));
        assert!(matches!(decode_err("3[]"), ParseError::InvalidAckId));
        assert!(matches!(
            decode_err("299999999999999999999[\"a\"]"),
            ParseError::InvalidAckId
        ));
        assert!(matches!(decode_err("2[\"a\""), ParseError::InvalidData(_)));
    }
}
