//! The BLE transport connection context.
//!
//! [`BleTransport`] glues the two directions together. The owning client
//! task is the sole caller of [`BleTransport::send`] (outbound dispatch and
//! the publish reassembly slot rely on that serialization); the BLE stack's
//! notification context drives [`BleTransport::accept_data`], whose output
//! lands in the byte queue the client polls through
//! [`BleTransport::receive`] or a [`QueueReader`].

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, error, warn};

use bluemq_core::packet::{self, PacketType, PING_LEN, SIMPLE_ACK_LEN, SUBACK_LEN};
use bluemq_core::ProtocolError;

use crate::assembly::{Assembled, PublishAssembly};
use crate::channel::Channel;
use crate::codec::PacketCodec;
use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::queue::{ByteQueue, QueueReader};

/// One MQTT-over-BLE connection context.
pub struct BleTransport<C, P> {
    channel: C,
    codec: P,
    queue: Arc<ByteQueue>,
    assembly: PublishAssembly,
    config: TransportConfig,
}

impl<C: Channel, P: PacketCodec> BleTransport<C, P> {
    /// Create a transport over the given channel and codec. The receive
    /// queue lives as long as the transport.
    pub fn new(channel: C, codec: P, config: TransportConfig) -> Self {
        let queue = Arc::new(ByteQueue::new(config.queue_capacity));
        Self {
            channel,
            codec,
            queue,
            assembly: PublishAssembly::new(),
            config,
        }
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Mutable access to the underlying channel.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Consumer-side handle for the client task's polling read.
    pub fn reader(&self) -> QueueReader {
        QueueReader::new(Arc::clone(&self.queue), self.config.recv_timeout)
    }

    /// Process one buffer written by the MQTT client.
    ///
    /// Returns the full input length when the buffer was consumed (a frame
    /// was sent, or a split publish's bytes were absorbed into the
    /// reassembly slot), or 0 when nothing was transmitted because of an
    /// error. The client owns any retry semantics.
    pub fn send(&mut self, buf: &[u8]) -> usize {
        match self.dispatch_outgoing(buf) {
            Ok(Some(frame)) => {
                let sent = self.channel.send(&frame);
                if sent != frame.len() {
                    error!(
                        "Cannot send {} bytes through the BLE channel, sent {} bytes",
                        frame.len(),
                        sent
                    );
                    return 0;
                }
                buf.len()
            }
            // Publish payload still pending: no frame on the air yet.
            Ok(None) => buf.len(),
            Err(e) => {
                error!("Failed to process outgoing packet: {}", e);
                0
            }
        }
    }

    fn dispatch_outgoing(&mut self, buf: &[u8]) -> Result<Option<Bytes>> {
        // A pending publish fully determines routing: the buffer is raw
        // payload bytes, not a packet, so the leading byte means nothing.
        if self.assembly.is_pending() {
            debug!("Processing outgoing PUBLISH payload continuation.");
            return self.handle_outgoing_publish(buf);
        }

        if buf.is_empty() {
            return Err(ProtocolError::IncompletePacket { needed: 1, have: 0 }.into());
        }

        match PacketType::try_from(buf[0] >> 4).map_err(TransportError::from)? {
            PacketType::Connect => {
                debug!("Processing outgoing CONNECT.");
                let connect = packet::decode_connect(buf)?;
                Ok(Some(self.codec.encode_connect(&connect)?))
            }
            PacketType::Publish => {
                debug!("Processing outgoing PUBLISH.");
                self.handle_outgoing_publish(buf)
            }
            PacketType::Puback => {
                debug!("Processing outgoing PUBACK.");
                let packet_id = packet::decode_ack(buf)?;
                Ok(Some(self.codec.encode_puback(packet_id)?))
            }
            PacketType::Subscribe => {
                debug!("Processing outgoing SUBSCRIBE.");
                let subscribe = packet::decode_subscribe(buf, self.config.max_filters_per_packet)?;
                Ok(Some(self.codec.encode_subscribe(&subscribe)?))
            }
            PacketType::Unsubscribe => {
                debug!("Processing outgoing UNSUBSCRIBE.");
                let unsubscribe =
                    packet::decode_unsubscribe(buf, self.config.max_filters_per_packet)?;
                Ok(Some(self.codec.encode_unsubscribe(&unsubscribe)?))
            }
            PacketType::Pingreq => {
                debug!("Processing outgoing PINGREQ.");
                Ok(Some(self.codec.encode_pingreq()?))
            }
            PacketType::Disconnect => {
                debug!("Processing outgoing DISCONNECT.");
                Ok(Some(self.codec.encode_disconnect()?))
            }
            PacketType::Pubrec | PacketType::Pubrel | PacketType::Pubcomp => {
                error!("Only QoS 0 and 1 are supported over BLE.");
                Err(TransportError::Qos2NotSupported)
            }
            // The client tried to write a server-to-client only packet.
            PacketType::Connack
            | PacketType::Suback
            | PacketType::Unsuback
            | PacketType::Pingresp => {
                error!(
                    "A server-to-client only packet was written, type {:#04x}",
                    buf[0]
                );
                Err(TransportError::UnexpectedPacket(buf[0]))
            }
        }
    }

    fn handle_outgoing_publish(&mut self, buf: &[u8]) -> Result<Option<Bytes>> {
        match self.assembly.feed(buf)? {
            Assembled::Complete { header, payload } => {
                // The topic's heap copy is dropped with the header once the
                // frame is built.
                Ok(Some(self.codec.encode_publish(&header, payload)?))
            }
            Assembled::Pending => {
                debug!("PUBLISH payload not in this buffer; awaiting the next write call.");
                Ok(None)
            }
        }
    }

    /// Process the next packet pending on the channel, invoked from the
    /// channel's data-received notification.
    ///
    /// On success exactly the peeked byte count is drained from the
    /// channel, regardless of how many bytes were reconstructed into the
    /// queue. On error the packet is left un-flushed and nothing is queued.
    pub fn accept_data(&mut self) -> Result<()> {
        let (peeked_len, result) = {
            let Some((packet_type, raw)) = self.channel.peek() else {
                return Ok(());
            };
            debug!("Receiving a packet from the server.");
            (raw.len(), self.dispatch_incoming(packet_type, raw))
        };

        match result {
            Ok(()) => {
                self.channel.consume(peeked_len);
                Ok(())
            }
            Err(e) => {
                error!(
                    "An error occurred when receiving data from the channel. No data was recorded: {}",
                    e
                );
                Err(e)
            }
        }
    }

    fn dispatch_incoming(&self, packet_type: u8, raw: &[u8]) -> Result<()> {
        match PacketType::try_from(packet_type >> 4).map_err(TransportError::from)? {
            PacketType::Connack => {
                debug!("Processing incoming CONNACK from channel.");
                self.codec.decode_connack(raw)?;
                // Packet ID is not used in CONNACK.
                self.queue_simple_ack(PacketType::Connack, 0)
            }
            PacketType::Puback => {
                debug!("Processing incoming PUBACK from channel.");
                let packet_id = self.codec.decode_puback(raw)?;
                self.queue_simple_ack(PacketType::Puback, packet_id)
            }
            PacketType::Unsuback => {
                debug!("Processing incoming UNSUBACK from channel.");
                let packet_id = self.codec.decode_unsuback(raw)?;
                self.queue_simple_ack(PacketType::Unsuback, packet_id)
            }
            PacketType::Suback => {
                debug!("Processing incoming SUBACK from channel.");
                let packet_id = self.codec.decode_suback(raw)?;
                let mut buf = [0u8; SUBACK_LEN];
                packet::encode_suback(packet_id, &mut buf)?;
                self.push_frame(&buf)
            }
            PacketType::Publish => {
                debug!("Processing incoming PUBLISH from channel.");
                let publish = self.codec.decode_publish(raw)?;
                let mut frame =
                    Vec::with_capacity(9 + publish.topic.len() + publish.payload.len());
                packet::encode_publish(&publish, &mut frame)?;
                self.push_frame(&frame)
            }
            PacketType::Pingresp => {
                debug!("Processing incoming PINGRESP from channel.");
                self.codec.decode_pingresp(raw)?;
                let mut buf = [0u8; PING_LEN];
                packet::encode_pingresp(&mut buf)?;
                self.push_frame(&buf)
            }
            PacketType::Pubrec | PacketType::Pubrel | PacketType::Pubcomp => {
                error!("Only QoS 0 and 1 are supported over BLE.");
                Err(TransportError::Qos2NotSupported)
            }
            // The server tried to send a client-to-server only packet.
            PacketType::Connect
            | PacketType::Subscribe
            | PacketType::Unsubscribe
            | PacketType::Pingreq
            | PacketType::Disconnect => {
                error!("Client received a client-to-server only packet.");
                Err(TransportError::UnexpectedPacket(packet_type))
            }
        }
    }

    fn queue_simple_ack(&self, packet_type: PacketType, packet_id: u16) -> Result<()> {
        let mut buf = [0u8; SIMPLE_ACK_LEN];
        packet::encode_simple_ack(packet_type, packet_id, &mut buf)?;
        self.push_frame(&buf)
    }

    fn push_frame(&self, frame: &[u8]) -> Result<()> {
        let accepted = self.queue.push(frame, self.config.push_timeout);
        if accepted < frame.len() {
            warn!(
                "Receive queue accepted {} of {} bytes; the client is not draining",
                accepted,
                frame.len()
            );
        }
        Ok(())
    }

    /// Blocking read for the MQTT client: pops up to `buf.len()` bytes of
    /// reconstructed MQTT stream, waiting up to the configured timeout.
    /// Short reads are legal; callers loop.
    pub fn receive(&mut self, buf: &mut [u8]) -> usize {
        self.queue.pop(buf, self.config.recv_timeout)
    }
}
