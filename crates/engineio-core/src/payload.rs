//! ## Encoder and decoder for http polling payloads
//!
//! A polling request or response body carries several packets:
//! * engine.io v4: text packets separated with the `\x1e` record separator.
//! * engine.io v3: each packet is prefixed with its length followed by `:`.
//!   The length is counted in utf16 code units, as javascript servers count it.
//!
//! Binary packets are always base64 encoded inside payloads.

use crate::{Packet, ProtocolVersion, Str, packet::PacketParseError};

const PACKET_SEPARATOR_V4: char = '\x1e';
const PACKET_SEPARATOR_V3: u8 = b':';

/// Encode a batch of packets into a single polling payload.
pub fn encode(packets: impl IntoIterator<Item = Packet>, protocol: ProtocolVersion) -> String {
    let mut data = String::new();
    match protocol {
        ProtocolVersion::V4 => {
            for packet in packets {
                if !data.is_empty() {
                    data.push(PACKET_SEPARATOR_V4);
                }
                data.push_str(&packet.encode(protocol));
            }
        }
        ProtocolVersion::V3 => {
            let mut itoa = itoa::Buffer::new();
            for packet in packets {
                let packet = packet.encode(protocol);
                data.push_str(itoa.format(packet.encode_utf16().count()));
                data.push(PACKET_SEPARATOR_V3 as char);
                data.push_str(&packet);
            }
        }
    }
    data
}

/// Decode a polling payload into its packets.
///
/// An empty payload decodes to no packets.
pub fn decode(data: Str, protocol: ProtocolVersion) -> Result<Vec<Packet>, PacketParseError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    match protocol {
        ProtocolVersion::V4 => v4_decode(data),
        ProtocolVersion::V3 => v3_decode(data),
    }
}

fn v4_decode(data: Str) -> Result<Vec<Packet>, PacketParseError> {
    let mut packets = Vec::new();
    let mut start = 0;
    for (i, _) in data.match_indices(PACKET_SEPARATOR_V4) {
        packets.push(Packet::decode(data.slice(start..i), ProtocolVersion::V4)?);
        start = i + 1;
    }
    packets.push(Packet::decode(data.slice(start..), ProtocolVersion::V4)?);
    Ok(packets)
}

fn v3_decode(data: Str) -> Result<Vec<Packet>, PacketParseError> {
    let mut packets = Vec::new();
    let bytes = data.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let sep = bytes[i..]
            .iter()
            .position(|b| *b == PACKET_SEPARATOR_V3)
            .ok_or(PacketParseError::InvalidPacketLen)?;
        let len: usize = data[i..i + sep]
            .parse()
            .map_err(|_| PacketParseError::InvalidPacketLen)?;
        let start = i + sep + 1;

        // Walk `len` utf16 code units forward to find the packet end
        let mut units = 0;
        let mut end = start;
        for c in data[start..].chars() {
            if units >= len {
                break;
            }
            units += c.len_utf16();
            end += c.len_utf8();
        }
        if units != len {
            return Err(PacketParseError::InvalidPacketLen);
        }

        packets.push(Packet::decode(data.slice(start..end), ProtocolVersion::V3)?);
        i = end;
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("decoded {} packets from v3 payload", packets.len());
    Ok(packets)
}
