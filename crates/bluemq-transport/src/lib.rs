//! bluemq-transport - MQTT-over-BLE transport adapter.
//!
//! This crate lets a standard MQTT 3.1.1 client stack talk over a BLE data
//! channel whose native encoding is not MQTT's wire format. It translates
//! in both directions:
//!
//! - **Outbound**: buffers written by the MQTT client are parsed, handed to
//!   an external BLE serializer, and sent on the channel. A PUBLISH whose
//!   header and payload arrive as two separate writes is reassembled first.
//! - **Inbound**: packets decoded from the channel are reconstructed as
//!   standard MQTT wire frames and pushed into a bounded byte queue that
//!   the client's polling read drains.
//!
//! The BLE encoding itself and the channel's link layer are external
//! collaborators, injected through the [`PacketCodec`] and [`Channel`]
//! traits.
//!
//! # Example
//!
//! ```ignore
//! use bluemq_transport::{BleTransport, TransportConfig};
//!
//! let config = TransportConfig::new().queue_capacity(2048);
//! let mut transport = BleTransport::new(channel, codec, config);
//!
//! // Client task: write a CONNECT, then poll for the CONNACK bytes.
//! let written = transport.send(&connect_bytes);
//! let mut buf = [0u8; 64];
//! let n = transport.receive(&mut buf);
//!
//! // Channel notification context: drive inbound dispatch.
//! transport.accept_data()?;
//! ```

mod assembly;
mod channel;
mod codec;
mod config;
mod error;
mod queue;
mod transport;

pub use channel::Channel;
pub use codec::{CodecError, PacketCodec};
pub use config::TransportConfig;
pub use error::{Result, TransportError};
pub use queue::{ByteQueue, QueueReader};
pub use transport::BleTransport;

// Re-export useful types from core
pub use bluemq_core::packet::{
    Connect, Publish, PublishHeader, QoS, SubscribePacket, SubscriptionEntry, UnsubscribePacket,
    Will,
};
pub use bluemq_core::ProtocolError;
