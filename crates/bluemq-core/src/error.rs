//! Protocol error types.

use thiserror::Error;

/// MQTT wire protocol errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("Invalid remaining length encoding")]
    InvalidRemainingLength,

    #[error("Incomplete packet: need {needed} bytes, have {have}")]
    IncompletePacket { needed: usize, have: usize },

    #[error("Invalid protocol name in CONNECT")]
    InvalidProtocolName,

    #[error("Invalid protocol level: expected 4, got {0}")]
    InvalidProtocolLevel(u8),

    #[error("Invalid connect flags: {0:#04x}")]
    InvalidConnectFlags(u8),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("QoS 2 is not supported over BLE")]
    QosNotSupported,

    #[error("Packet ID cannot be 0")]
    ZeroPacketId,

    #[error("Buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    #[error("Too many topic filters in one packet: max {max}, got {got}")]
    TooManySubscriptions { max: usize, got: usize },

    #[error("Publish payload length mismatch: expected {expected} bytes, got {got}")]
    PayloadLengthMismatch { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
