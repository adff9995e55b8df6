//! BLE packet codec abstraction.
//!
//! The over-the-air encoding is owned by an external serializer; the
//! transport only exchanges decoded records with it. Implementations are
//! expected to be stateless.

use bytes::Bytes;
use thiserror::Error;

use bluemq_core::packet::{Connect, Publish, PublishHeader, SubscribePacket, UnsubscribePacket};

/// Error reported by a BLE codec implementation.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("BLE encode failed: {0}")]
    Encode(String),

    #[error("BLE decode failed: {0}")]
    Decode(String),
}

/// Structured serializer/deserializer for the BLE wire encoding.
///
/// The encode side turns decoded client packets into owned over-the-air
/// frames; the decode side turns raw frames peeked from the channel back
/// into decoded records. Errors pass through the transport unchanged.
pub trait PacketCodec {
    fn encode_connect(&self, connect: &Connect<'_>) -> Result<Bytes, CodecError>;

    /// Encode a complete publish: the reassembled header plus its payload.
    fn encode_publish(&self, header: &PublishHeader, payload: &[u8]) -> Result<Bytes, CodecError>;

    fn encode_puback(&self, packet_id: u16) -> Result<Bytes, CodecError>;

    fn encode_subscribe(&self, subscribe: &SubscribePacket<'_>) -> Result<Bytes, CodecError>;

    fn encode_unsubscribe(&self, unsubscribe: &UnsubscribePacket<'_>)
        -> Result<Bytes, CodecError>;

    fn encode_pingreq(&self) -> Result<Bytes, CodecError>;

    fn encode_disconnect(&self) -> Result<Bytes, CodecError>;

    /// Validate a CONNACK frame. A refused connection is a decode error.
    fn decode_connack(&self, raw: &[u8]) -> Result<(), CodecError>;

    /// Decode a PUBACK frame, returning the acknowledged packet id.
    fn decode_puback(&self, raw: &[u8]) -> Result<u16, CodecError>;

    /// Decode a SUBACK frame, returning the acknowledged packet id.
    fn decode_suback(&self, raw: &[u8]) -> Result<u16, CodecError>;

    /// Decode an UNSUBACK frame, returning the acknowledged packet id.
    fn decode_unsuback(&self, raw: &[u8]) -> Result<u16, CodecError>;

    /// Decode an incoming publish into an owned record.
    fn decode_publish(&self, raw: &[u8]) -> Result<Publish, CodecError>;

    /// Validate a PINGRESP frame.
    fn decode_pingresp(&self, raw: &[u8]) -> Result<(), CodecError>;
}
