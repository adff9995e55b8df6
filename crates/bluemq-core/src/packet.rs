//! MQTT 3.1.1 packet types and codec for the BLE transport.
//!
//! The parsers here operate on raw, peer-controlled byte buffers written by
//! a generic MQTT client. All reads go through the bounds-checked [`Decoder`]
//! cursor; a truncated or overlong field fails with a protocol error instead
//! of touching memory outside the buffer. Parsed string and payload fields
//! are non-owning slices of the input, valid only for the duration of the
//! call. The one exception is the PUBLISH topic name, which is copied to the
//! heap because it has to survive into a possible continuation call (see
//! [`decode_publish`]).

use bytes::Bytes;

use crate::error::{ProtocolError, Result};
use crate::varint;

/// Size of CONNACK, PUBACK and UNSUBACK frames.
pub const SIMPLE_ACK_LEN: usize = 4;

/// Size of a SUBACK frame carrying a single return code.
pub const SUBACK_LEN: usize = 5;

/// Size of PINGREQ, PINGRESP and DISCONNECT frames.
pub const PING_LEN: usize = 2;

/// MQTT Control Packet Types (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::Connack),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::Puback),
            5 => Ok(PacketType::Pubrec),
            6 => Ok(PacketType::Pubrel),
            7 => Ok(PacketType::Pubcomp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::Suback),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::Unsuback),
            12 => Ok(PacketType::Pingreq),
            13 => Ok(PacketType::Pingresp),
            14 => Ok(PacketType::Disconnect),
            _ => Err(ProtocolError::InvalidPacketType(value)),
        }
    }
}

/// Quality of Service levels.
///
/// The BLE transport supports QoS 0 and 1 only; QoS 2 is not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
}

impl QoS {
    /// Decode an already-received QoS value, down-converting QoS 2.
    ///
    /// Used for fields where the peer's requested level is advisory (will
    /// QoS, SUBSCRIBE options). Client-to-server PUBLISH traffic goes
    /// through the strict [`TryFrom`] conversion instead.
    pub fn from_wire(value: u8) -> QoS {
        match value {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => {
                log::warn!("QoS 2 is not supported by MQTT over BLE. Defaulting to QoS 1.");
                QoS::AtLeastOnce
            }
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Err(ProtocolError::QosNotSupported),
            _ => Err(ProtocolError::MalformedPacket(format!(
                "Invalid QoS: {}",
                value
            ))),
        }
    }
}

/// Bounds-checked cursor over a packet buffer.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Current offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        if self.pos >= self.buf.len() {
            return Err(ProtocolError::IncompletePacket { needed: 1, have: 0 });
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        if self.remaining() < 2 {
            return Err(ProtocolError::IncompletePacket {
                needed: 2,
                have: self.remaining(),
            });
        }
        let val = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(val)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ProtocolError::IncompletePacket {
                needed: len,
                have: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read a field prefixed with a 16-bit big-endian length.
    pub fn read_prefixed_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u16()? as usize;
        self.read_bytes(len)
    }

    /// Read the variable-length remaining length field.
    pub fn read_remaining_length(&mut self) -> Result<usize> {
        match varint::decode(&self.buf[self.pos..])? {
            Some((value, consumed)) => {
                self.pos += consumed;
                Ok(value)
            }
            None => Err(ProtocolError::IncompletePacket {
                needed: 1,
                have: 0,
            }),
        }
    }
}

/// Will message carried in a CONNECT packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Will<'a> {
    pub qos: QoS,
    pub retain: bool,
    pub topic: &'a [u8],
    pub payload: &'a [u8],
}

/// Borrowed view of a CONNECT packet.
///
/// Every slice references the input buffer and is only valid for the
/// duration of the parse call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connect<'a> {
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: &'a [u8],
    pub will: Option<Will<'a>>,
    pub username: Option<&'a [u8]>,
    pub password: Option<&'a [u8]>,
}

/// Parse a CONNECT packet written by the MQTT client.
///
/// The decoded remaining length bounds the whole parse; each subsequent
/// length-prefixed field starts where the previous one ended.
pub fn decode_connect(buf: &[u8]) -> Result<Connect<'_>> {
    let mut dec = Decoder::new(buf);

    let first = dec.read_u8()?;
    if first >> 4 != PacketType::Connect as u8 {
        return Err(ProtocolError::InvalidPacketType(first >> 4));
    }

    let remaining = dec.read_remaining_length()?;
    let mut dec = Decoder::new(dec.read_bytes(remaining)?);

    // Protocol name, 2 length bytes then the name itself.
    if dec.read_prefixed_bytes()? != b"MQTT" {
        return Err(ProtocolError::InvalidProtocolName);
    }

    // The protocol level of the packet must be 4, see [MQTT-3.1.2-2].
    let level = dec.read_u8()?;
    if level != 4 {
        return Err(ProtocolError::InvalidProtocolLevel(level));
    }

    let flags = dec.read_u8()?;

    // The LSB is reserved and must be 0, see [MQTT-3.1.2-3].
    if (flags & 0x01) != 0 {
        return Err(ProtocolError::InvalidConnectFlags(flags));
    }

    let clean_session = (flags & 0x02) != 0;
    let will_flag = (flags & 0x04) != 0;
    let will_qos = QoS::from_wire((flags & 0x18) >> 3);
    let will_retain = (flags & 0x20) != 0;
    let password_flag = (flags & 0x40) != 0;
    let username_flag = (flags & 0x80) != 0;

    let keep_alive = dec.read_u16()?;

    // Client identifier is required, see [MQTT-3.1.3-3].
    let client_id = dec.read_prefixed_bytes()?;
    if client_id.is_empty() {
        return Err(ProtocolError::MalformedPacket(
            "A client identifier must be present in a CONNECT packet".into(),
        ));
    }

    let will = if will_flag {
        let topic = dec.read_prefixed_bytes()?;
        if topic.is_empty() {
            return Err(ProtocolError::MalformedPacket(
                "The will flag was set but no will topic was given".into(),
            ));
        }
        let payload = dec.read_prefixed_bytes()?;
        Some(Will {
            qos: will_qos,
            retain: will_retain,
            topic,
            payload,
        })
    } else {
        None
    };

    let username = if username_flag {
        let username = dec.read_prefixed_bytes()?;
        if username.is_empty() {
            return Err(ProtocolError::MalformedPacket(
                "The username flag was set but no username was given".into(),
            ));
        }
        Some(username)
    } else {
        None
    };

    let password = if password_flag {
        let password = dec.read_prefixed_bytes()?;
        if password.is_empty() {
            return Err(ProtocolError::MalformedPacket(
                "The password flag was set but no password was given".into(),
            ));
        }
        Some(password)
    } else {
        None
    };

    Ok(Connect {
        clean_session,
        keep_alive,
        client_id,
        will,
        username,
        password,
    })
}

/// Decoded PUBLISH header, owned so it can wait for a continuation call.
///
/// The topic is a heap copy: when the payload arrives in a second write
/// call, the buffer the topic was parsed from is long gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishHeader {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: Bytes,
    /// Present iff QoS >= 1.
    pub packet_id: Option<u16>,
    /// Payload length computed from the remaining length field.
    pub payload_len: usize,
}

/// Parse a PUBLISH packet written by the MQTT client.
///
/// Returns the decoded header plus `Some(payload)` when the buffer carries
/// the complete payload, or `None` when the buffer ends exactly where the
/// payload would begin (the client delivers it in the next write call). A
/// buffer that stops partway through the payload, or that carries trailing
/// bytes past it, is malformed.
pub fn decode_publish(buf: &[u8]) -> Result<(PublishHeader, Option<&[u8]>)> {
    let mut dec = Decoder::new(buf);

    let first = dec.read_u8()?;
    if first >> 4 != PacketType::Publish as u8 {
        return Err(ProtocolError::InvalidPacketType(first >> 4));
    }

    let flags = first & 0x0F;
    let dup = (flags & 0x08) != 0;
    let retain = (flags & 0x01) != 0;
    // QoS 2 client publishes are rejected outright, not down-converted.
    let qos = QoS::try_from((flags >> 1) & 0x03)?;

    let remaining = dec.read_remaining_length()?;
    let body_start = dec.position();

    let topic = Bytes::copy_from_slice(dec.read_prefixed_bytes()?);

    let packet_id = if qos != QoS::AtMostOnce {
        Some(dec.read_u16()?)
    } else {
        None
    };

    let payload_len = remaining
        .checked_sub(dec.position() - body_start)
        .ok_or_else(|| {
            ProtocolError::MalformedPacket(
                "Remaining length shorter than the PUBLISH variable header".into(),
            )
        })?;

    let header = PublishHeader {
        dup,
        qos,
        retain,
        topic,
        packet_id,
        payload_len,
    };

    let payload_start = dec.position();
    if buf.len() == payload_start + payload_len {
        Ok((header, Some(&buf[payload_start..])))
    } else if buf.len() == payload_start && payload_len > 0 {
        // Header and payload were written as two separate calls.
        Ok((header, None))
    } else {
        Err(ProtocolError::MalformedPacket(format!(
            "PUBLISH buffer of {} bytes does not match the declared payload of {} bytes",
            buf.len() - payload_start,
            payload_len
        )))
    }
}

/// A single requested subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionEntry<'a> {
    pub topic_filter: &'a [u8],
    pub qos: QoS,
}

/// Decoded SUBSCRIBE packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket<'a> {
    pub packet_id: u16,
    pub filters: Vec<SubscriptionEntry<'a>>,
}

/// Decoded UNSUBSCRIBE packet. Filters carry no QoS byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket<'a> {
    pub packet_id: u16,
    pub filters: Vec<&'a [u8]>,
}

fn subscription_body<'a>(
    buf: &'a [u8],
    packet_type: PacketType,
) -> Result<(u16, Decoder<'a>)> {
    let mut dec = Decoder::new(buf);

    let first = dec.read_u8()?;
    if first >> 4 != packet_type as u8 {
        return Err(ProtocolError::InvalidPacketType(first >> 4));
    }

    // Fixed header flags must be 0010, see [MQTT-3.8.1-1] and [MQTT-3.10.1-1].
    if first & 0x0F != 0x02 {
        return Err(ProtocolError::MalformedPacket(format!(
            "{:?} fixed header flags must be 0x02, got {:#04x}",
            packet_type,
            first & 0x0F
        )));
    }

    let remaining = dec.read_remaining_length()?;
    let body = dec.read_bytes(remaining)?;
    if dec.remaining() != 0 {
        return Err(ProtocolError::MalformedPacket(format!(
            "{} bytes after the end of the declared packet",
            dec.remaining()
        )));
    }

    let mut body = Decoder::new(body);
    let packet_id = body.read_u16()?;
    Ok((packet_id, body))
}

/// Parse a SUBSCRIBE packet written by the MQTT client.
///
/// The filter list is scanned until the declared remaining length is
/// exhausted exactly; a residual byte or an overrunning filter length is a
/// protocol error. `max_filters` is the capacity of the connection's
/// subscription list.
pub fn decode_subscribe(buf: &[u8], max_filters: usize) -> Result<SubscribePacket<'_>> {
    let (packet_id, mut body) = subscription_body(buf, PacketType::Subscribe)?;

    let mut filters = Vec::new();
    while body.remaining() > 0 {
        let topic_filter = body.read_prefixed_bytes()?;
        if topic_filter.is_empty() {
            return Err(ProtocolError::MalformedPacket(
                "Topic filter must be at least 1 character".into(),
            ));
        }
        // Only bits 0-1 of the options byte are significant.
        let qos = QoS::from_wire(body.read_u8()? & 0x03);
        if filters.len() == max_filters {
            return Err(ProtocolError::TooManySubscriptions {
                max: max_filters,
                got: filters.len() + 1,
            });
        }
        filters.push(SubscriptionEntry { topic_filter, qos });
    }

    // Topic filters must exist in a SUBSCRIBE packet, see [MQTT-3.8.3-3].
    if filters.is_empty() {
        return Err(ProtocolError::MalformedPacket(
            "SUBSCRIBE with no topic filters".into(),
        ));
    }

    Ok(SubscribePacket { packet_id, filters })
}

/// Parse an UNSUBSCRIBE packet written by the MQTT client.
pub fn decode_unsubscribe(buf: &[u8], max_filters: usize) -> Result<UnsubscribePacket<'_>> {
    let (packet_id, mut body) = subscription_body(buf, PacketType::Unsubscribe)?;

    let mut filters = Vec::new();
    while body.remaining() > 0 {
        let topic_filter = body.read_prefixed_bytes()?;
        if topic_filter.is_empty() {
            return Err(ProtocolError::MalformedPacket(
                "Topic filter must be at least 1 character".into(),
            ));
        }
        if filters.len() == max_filters {
            return Err(ProtocolError::TooManySubscriptions {
                max: max_filters,
                got: filters.len() + 1,
            });
        }
        filters.push(topic_filter);
    }

    if filters.is_empty() {
        return Err(ProtocolError::MalformedPacket(
            "UNSUBSCRIBE with no topic filters".into(),
        ));
    }

    Ok(UnsubscribePacket { packet_id, filters })
}

/// Parse the standard 4-byte PUBACK frame written by the MQTT client and
/// return its packet identifier.
pub fn decode_ack(buf: &[u8]) -> Result<u16> {
    let mut dec = Decoder::new(buf);

    let first = dec.read_u8()?;
    if first >> 4 != PacketType::Puback as u8 {
        return Err(ProtocolError::InvalidPacketType(first >> 4));
    }

    if dec.read_u8()? != 2 {
        return Err(ProtocolError::MalformedPacket(
            "PUBACK remaining length must be 2".into(),
        ));
    }

    let packet_id = dec.read_u16()?;
    if packet_id == 0 {
        return Err(ProtocolError::ZeroPacketId);
    }
    Ok(packet_id)
}

/// Serialize a CONNACK, PUBACK or UNSUBACK frame into `buf`.
///
/// Packet identifier 0 is invalid for PUBACK; CONNACK and UNSUBACK do not
/// validate it.
pub fn encode_simple_ack(packet_type: PacketType, packet_id: u16, buf: &mut [u8]) -> Result<usize> {
    if buf.len() < SIMPLE_ACK_LEN {
        return Err(ProtocolError::BufferTooSmall {
            needed: SIMPLE_ACK_LEN,
            have: buf.len(),
        });
    }
    if packet_id == 0 && packet_type == PacketType::Puback {
        return Err(ProtocolError::ZeroPacketId);
    }

    buf[0] = (packet_type as u8) << 4;
    buf[1] = 2;
    buf[2..4].copy_from_slice(&packet_id.to_be_bytes());
    Ok(SIMPLE_ACK_LEN)
}

/// Serialize a SUBACK frame into `buf`.
///
/// The transport grants QoS 1 unconditionally; the single return code does
/// not echo the per-filter requested QoS.
pub fn encode_suback(packet_id: u16, buf: &mut [u8]) -> Result<usize> {
    if buf.len() < SUBACK_LEN {
        return Err(ProtocolError::BufferTooSmall {
            needed: SUBACK_LEN,
            have: buf.len(),
        });
    }
    if packet_id == 0 {
        return Err(ProtocolError::ZeroPacketId);
    }

    buf[0] = (PacketType::Suback as u8) << 4;
    buf[1] = 3;
    buf[2..4].copy_from_slice(&packet_id.to_be_bytes());
    buf[4] = 1;
    Ok(SUBACK_LEN)
}

/// Serialize a PINGRESP frame into `buf`.
pub fn encode_pingresp(buf: &mut [u8]) -> Result<usize> {
    if buf.len() < PING_LEN {
        return Err(ProtocolError::BufferTooSmall {
            needed: PING_LEN,
            have: buf.len(),
        });
    }

    buf[0] = (PacketType::Pingresp as u8) << 4;
    buf[1] = 0;
    Ok(PING_LEN)
}

/// An owned PUBLISH record, as decoded from the BLE channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: Bytes,
    /// Present iff QoS >= 1.
    pub packet_id: Option<u16>,
    pub payload: Bytes,
}

/// Serialize a standards-conformant MQTT 3.1.1 PUBLISH frame, appending to
/// `buf`. The frame is sized dynamically from the topic and payload lengths.
pub fn encode_publish(publish: &Publish, buf: &mut Vec<u8>) -> Result<()> {
    if publish.qos != QoS::AtMostOnce && publish.packet_id.unwrap_or(0) == 0 {
        return Err(ProtocolError::ZeroPacketId);
    }

    let mut fixed_header = (PacketType::Publish as u8) << 4;
    if publish.dup {
        fixed_header |= 0x08;
    }
    fixed_header |= (publish.qos as u8) << 1;
    if publish.retain {
        fixed_header |= 0x01;
    }
    buf.push(fixed_header);

    let mut remaining = 2 + publish.topic.len() + publish.payload.len();
    if publish.qos != QoS::AtMostOnce {
        remaining += 2;
    }
    varint::encode_to_vec(remaining, buf);

    buf.extend_from_slice(&(publish.topic.len() as u16).to_be_bytes());
    buf.extend_from_slice(&publish.topic);

    if let Some(id) = publish.packet_id {
        buf.extend_from_slice(&id.to_be_bytes());
    }

    buf.extend_from_slice(&publish.payload);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a CONNECT packet with the given flags and payload fields.
    fn connect_packet(
        level: u8,
        flags: u8,
        keep_alive: u16,
        fields: &[&[u8]],
    ) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&[0x00, 0x04]);
        body.extend_from_slice(b"MQTT");
        body.push(level);
        body.push(flags);
        body.extend_from_slice(&keep_alive.to_be_bytes());
        for field in fields {
            body.extend_from_slice(&(field.len() as u16).to_be_bytes());
            body.extend_from_slice(field);
        }

        let mut packet = vec![0x10];
        varint::encode_to_vec(body.len(), &mut packet);
        packet.extend_from_slice(&body);
        packet
    }

    #[test]
    fn connect_minimal() {
        let packet = connect_packet(4, 0x02, 60, &[b"dev1"]);
        let connect = decode_connect(&packet).unwrap();
        assert!(connect.clean_session);
        assert_eq!(connect.keep_alive, 60);
        assert_eq!(connect.client_id, b"dev1");
        assert!(connect.will.is_none());
        assert!(connect.username.is_none());
        assert!(connect.password.is_none());
    }

    #[test]
    fn connect_with_will_username_password() {
        // will flag + will qos 1 + will retain + username + password
        let flags = 0x04 | 0x08 | 0x20 | 0x80 | 0x40;
        let packet = connect_packet(
            4,
            flags,
            30,
            &[b"client-7", b"will/topic", b"gone", b"user", b"secret"],
        );
        let connect = decode_connect(&packet).unwrap();
        assert!(!connect.clean_session);
        assert_eq!(connect.keep_alive, 30);
        assert_eq!(connect.client_id, b"client-7");
        let will = connect.will.unwrap();
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
        assert_eq!(will.topic, b"will/topic");
        assert_eq!(will.payload, b"gone");
        assert_eq!(connect.username, Some(&b"user"[..]));
        assert_eq!(connect.password, Some(&b"secret"[..]));
    }

    #[test]
    fn connect_rejects_wrong_protocol_level() {
        let packet = connect_packet(5, 0x02, 60, &[b"dev1"]);
        assert_eq!(
            decode_connect(&packet),
            Err(ProtocolError::InvalidProtocolLevel(5))
        );
    }

    #[test]
    fn connect_rejects_reserved_flag_bit() {
        let packet = connect_packet(4, 0x03, 60, &[b"dev1"]);
        assert!(matches!(
            decode_connect(&packet),
            Err(ProtocolError::InvalidConnectFlags(_))
        ));
    }

    #[test]
    fn connect_rejects_empty_client_id() {
        let packet = connect_packet(4, 0x02, 60, &[b""]);
        assert!(matches!(
            decode_connect(&packet),
            Err(ProtocolError::MalformedPacket(_))
        ));
    }

    #[test]
    fn connect_rejects_empty_will_topic() {
        let packet = connect_packet(4, 0x06, 60, &[b"dev1", b"", b"payload"]);
        assert!(matches!(
            decode_connect(&packet),
            Err(ProtocolError::MalformedPacket(_))
        ));
    }

    #[test]
    fn connect_rejects_truncated_buffer() {
        let packet = connect_packet(4, 0x02, 60, &[b"dev1"]);
        assert!(matches!(
            decode_connect(&packet[..packet.len() - 2]),
            Err(ProtocolError::IncompletePacket { .. })
        ));
    }

    /// Build a complete QoS 1 PUBLISH packet.
    fn publish_packet(topic: &[u8], packet_id: u16, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0x32];
        varint::encode_to_vec(2 + topic.len() + 2 + payload.len(), &mut packet);
        packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        packet.extend_from_slice(topic);
        packet.extend_from_slice(&packet_id.to_be_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    #[test]
    fn publish_complete_in_one_buffer() {
        let packet = publish_packet(b"sensors/temp", 9, b"25.5");
        let (header, payload) = decode_publish(&packet).unwrap();
        assert_eq!(header.qos, QoS::AtLeastOnce);
        assert!(!header.dup);
        assert!(!header.retain);
        assert_eq!(&header.topic[..], b"sensors/temp");
        assert_eq!(header.packet_id, Some(9));
        assert_eq!(header.payload_len, 4);
        assert_eq!(payload, Some(&b"25.5"[..]));
    }

    #[test]
    fn publish_header_only_awaits_payload() {
        let packet = publish_packet(b"sensors/temp", 9, b"25.5");
        let header_len = packet.len() - 4;
        let (header, payload) = decode_publish(&packet[..header_len]).unwrap();
        assert_eq!(header.payload_len, 4);
        assert_eq!(payload, None);
    }

    #[test]
    fn publish_partial_payload_is_malformed() {
        let packet = publish_packet(b"sensors/temp", 9, b"25.5");
        assert!(matches!(
            decode_publish(&packet[..packet.len() - 2]),
            Err(ProtocolError::MalformedPacket(_))
        ));
    }

    #[test]
    fn publish_qos2_is_rejected() {
        let mut packet = publish_packet(b"t", 1, b"x");
        packet[0] = 0x34; // QoS 2 bits
        assert_eq!(decode_publish(&packet), Err(ProtocolError::QosNotSupported));
    }

    #[test]
    fn publish_qos0_empty_payload_is_complete() {
        let mut packet = vec![0x30];
        varint::encode_to_vec(2 + 1, &mut packet);
        packet.extend_from_slice(&[0x00, 0x01, b't']);
        let (header, payload) = decode_publish(&packet).unwrap();
        assert_eq!(header.packet_id, None);
        assert_eq!(header.payload_len, 0);
        assert_eq!(payload, Some(&b""[..]));
    }

    /// Build a SUBSCRIBE or UNSUBSCRIBE packet.
    fn subscription_packet(packet_type: u8, packet_id: u16, filters: &[(&[u8], Option<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&packet_id.to_be_bytes());
        for (filter, qos) in filters {
            body.extend_from_slice(&(filter.len() as u16).to_be_bytes());
            body.extend_from_slice(filter);
            if let Some(qos) = qos {
                body.push(*qos);
            }
        }

        let mut packet = vec![(packet_type << 4) | 0x02];
        varint::encode_to_vec(body.len(), &mut packet);
        packet.extend_from_slice(&body);
        packet
    }

    #[test]
    fn subscribe_three_filters_in_order() {
        let packet = subscription_packet(
            8,
            21,
            &[
                (&b"a/one"[..], Some(0)),
                (&b"b/two"[..], Some(1)),
                (&b"c/three"[..], Some(1)),
            ],
        );
        let subscribe = decode_subscribe(&packet, 8).unwrap();
        assert_eq!(subscribe.packet_id, 21);
        assert_eq!(subscribe.filters.len(), 3);
        assert_eq!(subscribe.filters[0].topic_filter, b"a/one");
        assert_eq!(subscribe.filters[0].qos, QoS::AtMostOnce);
        assert_eq!(subscribe.filters[1].topic_filter, b"b/two");
        assert_eq!(subscribe.filters[1].qos, QoS::AtLeastOnce);
        assert_eq!(subscribe.filters[2].topic_filter, b"c/three");
        assert_eq!(subscribe.filters[2].qos, QoS::AtLeastOnce);
    }

    #[test]
    fn unsubscribe_has_no_qos_bytes() {
        let packet = subscription_packet(
            10,
            22,
            &[
                (&b"a/one"[..], None),
                (&b"b/two"[..], None),
                (&b"c/three"[..], None),
            ],
        );
        let unsubscribe = decode_unsubscribe(&packet, 8).unwrap();
        assert_eq!(unsubscribe.packet_id, 22);
        assert_eq!(
            unsubscribe.filters,
            vec![&b"a/one"[..], &b"b/two"[..], &b"c/three"[..]]
        );
    }

    #[test]
    fn subscribe_rejects_empty_filter_list() {
        let packet: Vec<u8> = subscription_packet(8, 23, &[]);
        assert!(matches!(
            decode_subscribe(&packet, 8),
            Err(ProtocolError::MalformedPacket(_))
        ));
    }

    #[test]
    fn subscribe_rejects_residual_bytes() {
        let mut packet = subscription_packet(8, 24, &[(&b"a"[..], Some(0))]);
        // Declare one extra byte of remaining length: the filter scan cannot
        // exhaust it exactly.
        packet[1] += 1;
        packet.push(0x00);
        assert!(decode_subscribe(&packet, 8).is_err());
    }

    #[test]
    fn subscribe_enforces_filter_capacity() {
        let packet = subscription_packet(8, 25, &[(&b"a"[..], Some(0)), (&b"b"[..], Some(1))]);
        assert_eq!(
            decode_subscribe(&packet, 1),
            Err(ProtocolError::TooManySubscriptions { max: 1, got: 2 })
        );
    }

    #[test]
    fn ack_roundtrip() {
        assert_eq!(decode_ack(&[0x40, 2, 0x00, 0x2A]).unwrap(), 42);
        assert!(matches!(
            decode_ack(&[0x40, 2, 0x00, 0x00]),
            Err(ProtocolError::ZeroPacketId)
        ));
        assert!(decode_ack(&[0x40, 3, 0x00, 0x2A]).is_err());
    }

    #[test]
    fn simple_ack_layout() {
        let mut buf = [0u8; SIMPLE_ACK_LEN];
        let written = encode_simple_ack(PacketType::Puback, 42, &mut buf).unwrap();
        assert_eq!(written, SIMPLE_ACK_LEN);
        assert_eq!(buf, [0x40, 2, 0x00, 0x2A]);
    }

    #[test]
    fn puback_rejects_packet_id_zero() {
        let mut buf = [0u8; SIMPLE_ACK_LEN];
        assert_eq!(
            encode_simple_ack(PacketType::Puback, 0, &mut buf),
            Err(ProtocolError::ZeroPacketId)
        );
        // CONNACK does not validate the (unused) packet identifier.
        assert!(encode_simple_ack(PacketType::Connack, 0, &mut buf).is_ok());
        assert_eq!(buf, [0x20, 2, 0x00, 0x00]);
    }

    #[test]
    fn suback_layout() {
        let mut buf = [0u8; SUBACK_LEN];
        let written = encode_suback(7, &mut buf).unwrap();
        assert_eq!(written, SUBACK_LEN);
        assert_eq!(buf, [0x90, 3, 0x00, 0x07, 0x01]);
    }

    #[test]
    fn pingresp_layout() {
        let mut buf = [0u8; PING_LEN];
        assert_eq!(encode_pingresp(&mut buf).unwrap(), PING_LEN);
        assert_eq!(buf, [0xD0, 0]);
    }

    #[test]
    fn serializers_check_buffer_capacity() {
        let mut buf = [0u8; 1];
        assert!(matches!(
            encode_simple_ack(PacketType::Puback, 1, &mut buf),
            Err(ProtocolError::BufferTooSmall { .. })
        ));
        assert!(matches!(
            encode_suback(1, &mut buf),
            Err(ProtocolError::BufferTooSmall { .. })
        ));
        assert!(matches!(
            encode_pingresp(&mut buf[..0]),
            Err(ProtocolError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn encode_publish_matches_parsed_form() {
        let publish = Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: true,
            topic: Bytes::from_static(b"alerts"),
            packet_id: Some(3),
            payload: Bytes::from_static(b"on fire"),
        };
        let mut buf = Vec::new();
        encode_publish(&publish, &mut buf).unwrap();

        let (header, payload) = decode_publish(&buf).unwrap();
        assert_eq!(header.qos, QoS::AtLeastOnce);
        assert!(header.retain);
        assert_eq!(&header.topic[..], b"alerts");
        assert_eq!(header.packet_id, Some(3));
        assert_eq!(payload, Some(&b"on fire"[..]));
    }

    #[test]
    fn encode_publish_qos1_requires_packet_id() {
        let publish = Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic: Bytes::from_static(b"t"),
            packet_id: None,
            payload: Bytes::new(),
        };
        let mut buf = Vec::new();
        assert_eq!(
            encode_publish(&publish, &mut buf),
            Err(ProtocolError::ZeroPacketId)
        );
    }
}
