//! bluemq-core - Core MQTT 3.1.1 wire types and codec.
//!
//! This crate provides the wire-level building blocks for the bluemq BLE
//! transport: the remaining-length varint codec, bounds-checked packet
//! parsers for client-to-server traffic, and the fixed-layout ack
//! serializers for the reconstructed server-to-client frames.

pub mod error;
pub mod packet;
pub mod varint;

pub use error::{ProtocolError, Result};
pub use packet::*;
