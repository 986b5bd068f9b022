//! Socket.io packet implementation.
//! The [`Packet`] is the base unit of data that is sent over the engine.io socket.

use engineio_core::Str;

use crate::PayloadValue;

/// The socket.io packet type.
/// Each packet has a type and a namespace
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// The packet data
    pub inner: PacketData,
    /// The namespace the packet belongs to
    pub ns: Str,
}

impl Packet {
    /// Create a connect packet with an optional auth payload
    pub fn connect(ns: impl Into<Str>, auth: Option<PayloadValue>) -> Self {
        Self {
            inner: PacketData::Connect(auth),
            ns: ns.into(),
        }
    }

    /// Create a disconnect packet for the given namespace
    pub fn disconnect(ns: impl Into<Str>) -> Self {
        Self {
            inner: PacketData::Disconnect,
            ns: ns.into(),
        }
    }

    /// Create an event packet for the given namespace.
    /// The data is the `[event, ...args]` array. If it contains binary leaves
    /// it will be a binary packet.
    pub fn event(ns: impl Into<Str>, event: &str, args: Vec<PayloadValue>) -> Self {
        let mut data = Vec::with_capacity(args.len() + 1);
        data.push(PayloadValue::String(event.to_string()));
        data.extend(args);
        let data = PayloadValue::Array(data);
        Self {
            inner: if data.has_binary() {
                PacketData::BinaryEvent(data, None)
            } else {
                PacketData::Event(data, None)
            },
            ns: ns.into(),
        }
    }

    /// Create an ack packet for the given namespace.
    /// If the there is binary data, it will be a binary packet.
    pub fn ack(ns: impl Into<Str>, args: Vec<PayloadValue>, ack: i64) -> Self {
        let data = PayloadValue::Array(args);
        Self {
            inner: if data.has_binary() {
                PacketData::BinaryAck(data, ack)
            } else {
                PacketData::EventAck(data, ack)
            },
            ns: ns.into(),
        }
    }

    /// Create a connect error packet for the given namespace with a message
    pub fn connect_error(ns: impl Into<Str>, message: &str) -> Self {
        let mut obj = indexmap::IndexMap::new();
        obj.insert("message".to_string(), PayloadValue::from(message));
        Self {
            inner: PacketData::ConnectError(PayloadValue::Object(obj)),
            ns: ns.into(),
        }
    }
}

/// | Type          | ID  | Usage                                                        |
/// |---------------|-----|--------------------------------------------------------------|
/// | CONNECT       | 0   | Used during the connection to a namespace.                   |
/// | DISCONNECT    | 1   | Used when disconnecting from a namespace.                    |
/// | EVENT         | 2   | Used to send data to the other side.                         |
/// | ACK           | 3   | Used to acknowledge an event.                                |
/// | CONNECT_ERROR | 4   | Used during the connection to a namespace.                   |
/// | BINARY_EVENT  | 5   | Used to send binary data to the other side.                  |
/// | BINARY_ACK    | 6   | Used to acknowledge an event (the response includes binary). |
#[derive(Debug, Clone, PartialEq)]
pub enum PacketData {
    /// Connect packet with an optional payload.
    /// Sent with the auth payload, received with `{"sid": ...}` under protocol v5.
    Connect(Option<PayloadValue>),
    /// Disconnect packet, used to disconnect from a namespace
    Disconnect,
    /// Event packet with optional ack id, to request an ack from the other side.
    /// The payload is the `[event, ...args]` array.
    Event(PayloadValue, Option<i64>),
    /// Event ack packet, to acknowledge an event
    EventAck(PayloadValue, i64),
    /// Connect error packet, sent by the server when the namespace is refused.
    /// It is `{"message": ...}` under protocol v5 and a plain string under v4.
    ConnectError(PayloadValue),
    /// Binary event packet with optional ack id, to request an ack from the other side
    BinaryEvent(PayloadValue, Option<i64>),
    /// Binary ack packet, to acknowledge an event with binary data
    BinaryAck(PayloadValue, i64),
}

impl PacketData {
    /// Returns the index of the packet type
    pub fn index(&self) -> usize {
        match self {
            PacketData::Connect(_) => 0,
            PacketData::Disconnect => 1,
            PacketData::Event(_, _) => 2,
            PacketData::EventAck(_, _) => 3,
            PacketData::ConnectError(_) => 4,
            PacketData::BinaryEvent(_, _) => 5,
            PacketData::BinaryAck(_, _) => 6,
        }
    }

    /// Set the ack id for the packet
    /// It will only set the ack id for the packets that support it
    pub fn set_ack_id(&mut self, ack_id: i64) {
        if let PacketData::Event(_, ack) | PacketData::BinaryEvent(_, ack) = self {
            *ack = Some(ack_id);
        }
    }

    /// Check if the packet is a binary packet (either binary event or binary ack)
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            PacketData::BinaryEvent(_, _) | PacketData::BinaryAck(_, _)
        )
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn event_with_binary_is_binary() {
        let packet = Packet::event("/", "file", vec![Bytes::from_static(&[1]).into()]);
        assert!(packet.inner.is_binary());
        assert_eq!(packet.inner.index(), 5);

        let packet = Packet::event("/", "chat", vec!["hi".into()]);
        assert!(!packet.inner.is_binary());
        assert_eq!(packet.inner.index(), 2);
    }

    #[test]
    fn ack_with_binary_is_binary() {
        let packet = Packet::ack("/", vec![Bytes::from_static(&[1]).into()], 3);
        assert_eq!(packet.inner, PacketData::BinaryAck(
            PayloadValue::Array(vec![PayloadValue::Binary(Bytes::from_static(&[1]))]),
            3
        ));
    }

    #[test]
    fn set_ack_id_only_on_events() {
        let mut packet = Packet::event("/", "chat", vec![]);
        packet.inner.set_ack_id(12);
        assert!(matches!(packet.inner, PacketData::Event(_, Some(12))));

        let mut packet = Packet::disconnect("/");
        packet.inner.set_ack_id(12);
        assert_eq!(packet.inner, PacketData::Disconnect);
    }
}
