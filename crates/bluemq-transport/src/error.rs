//! Transport error types.

use thiserror::Error;

use crate::codec::CodecError;
use bluemq_core::ProtocolError;

/// Errors surfaced by the transport adapter.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Channel send truncated: sent {sent} of {expected} bytes")]
    ChannelSend { sent: usize, expected: usize },

    #[error("Only QoS 0 and 1 are supported over BLE")]
    Qos2NotSupported,

    #[error("Unexpected packet type {0:#04x} for this direction")]
    UnexpectedPacket(u8),
}

pub type Result<T> = std::result::Result<T, TransportError>;
