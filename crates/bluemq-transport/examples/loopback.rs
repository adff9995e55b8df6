//! Loopback example - drive the transport without a radio.
//!
//! Run with: cargo run -p bluemq-transport --example loopback
//!
//! A tiny in-memory "broker" sits behind the channel: every frame the
//! transport sends is answered with the matching BLE-encoded response, and
//! the reconstructed MQTT byte stream is read back out of the queue. The
//! over-the-air encoding here is plain MQTT, standing in for a real BLE
//! serializer.

use std::time::Duration;

use bytes::Bytes;

use bluemq_transport::{
    BleTransport, Channel, CodecError, Connect, PacketCodec, Publish, PublishHeader,
    SubscribePacket, TransportConfig, UnsubscribePacket,
};

/// Channel whose peer echoes canned responses.
struct LoopbackChannel {
    pending: Option<(u8, Vec<u8>)>,
}

impl Channel for LoopbackChannel {
    fn send(&mut self, frame: &[u8]) -> usize {
        // Answer each request with a matching response record.
        self.pending = match frame.first() {
            // CONNECT -> accepted CONNACK
            Some(0x01) => Some((0x20, vec![0x00])),
            // PUBLISH -> PUBACK for packet id 1
            Some(0x30..=0x3F) => Some((0x40, vec![0x00, 0x01])),
            // SUBSCRIBE -> SUBACK
            Some(0x08) => Some((0x90, vec![0x00, 0x02])),
            _ => None,
        };
        frame.len()
    }

    fn peek(&self) -> Option<(u8, &[u8])> {
        self.pending.as_ref().map(|(t, raw)| (*t, raw.as_slice()))
    }

    fn consume(&mut self, _len: usize) {
        self.pending = None;
    }
}

/// Stand-in BLE codec: the over-the-air form is a tagged record.
struct DemoCodec;

impl PacketCodec for DemoCodec {
    fn encode_connect(&self, connect: &Connect<'_>) -> Result<Bytes, CodecError> {
        let mut out = vec![0x01];
        out.extend_from_slice(connect.client_id);
        Ok(Bytes::from(out))
    }

    fn encode_publish(&self, header: &PublishHeader, payload: &[u8]) -> Result<Bytes, CodecError> {
        let publish = Publish {
            dup: header.dup,
            qos: header.qos,
            retain: header.retain,
            topic: header.topic.clone(),
            packet_id: header.packet_id,
            payload: Bytes::copy_from_slice(payload),
        };
        let mut out = Vec::new();
        bluemq_core::packet::encode_publish(&publish, &mut out)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Bytes::from(out))
    }

    fn encode_puback(&self, packet_id: u16) -> Result<Bytes, CodecError> {
        let mut out = vec![0x04];
        out.extend_from_slice(&packet_id.to_be_bytes());
        Ok(Bytes::from(out))
    }

    fn encode_subscribe(&self, subscribe: &SubscribePacket<'_>) -> Result<Bytes, CodecError> {
        let mut out = vec![0x08];
        out.extend_from_slice(&subscribe.packet_id.to_be_bytes());
        Ok(Bytes::from(out))
    }

    fn encode_unsubscribe(&self, unsubscribe: &UnsubscribePacket<'_>) -> Result<Bytes, CodecError> {
        let mut out = vec![0x0A];
        out.extend_from_slice(&unsubscribe.packet_id.to_be_bytes());
        Ok(Bytes::from(out))
    }

    fn encode_pingreq(&self) -> Result<Bytes, CodecError> {
        Ok(Bytes::from_static(&[0x0C]))
    }

    fn encode_disconnect(&self) -> Result<Bytes, CodecError> {
        Ok(Bytes::from_static(&[0x0E]))
    }

    fn decode_connack(&self, raw: &[u8]) -> Result<(), CodecError> {
        if raw == [0x00] {
            Ok(())
        } else {
            Err(CodecError::Decode("connection refused".into()))
        }
    }

    fn decode_puback(&self, raw: &[u8]) -> Result<u16, CodecError> {
        decode_id(raw)
    }

    fn decode_suback(&self, raw: &[u8]) -> Result<u16, CodecError> {
        decode_id(raw)
    }

    fn decode_unsuback(&self, raw: &[u8]) -> Result<u16, CodecError> {
        decode_id(raw)
    }

    fn decode_publish(&self, raw: &[u8]) -> Result<Publish, CodecError> {
        let (header, payload) = bluemq_core::packet::decode_publish(raw)
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        let payload = payload.ok_or_else(|| CodecError::Decode("truncated publish".into()))?;
        Ok(Publish {
            dup: header.dup,
            qos: header.qos,
            retain: header.retain,
            topic: header.topic,
            packet_id: header.packet_id,
            payload: Bytes::copy_from_slice(payload),
        })
    }

    fn decode_pingresp(&self, raw: &[u8]) -> Result<(), CodecError> {
        if raw.is_empty() {
            Ok(())
        } else {
            Err(CodecError::Decode("unexpected PINGRESP payload".into()))
        }
    }
}

fn decode_id(raw: &[u8]) -> Result<u16, CodecError> {
    if raw.len() == 2 {
        Ok(u16::from_be_bytes([raw[0], raw[1]]))
    } else {
        Err(CodecError::Decode("bad ack length".into()))
    }
}

/// Build a standard MQTT 3.1.1 CONNECT packet, as an MQTT client would.
fn connect_packet(client_id: &[u8], keep_alive: u16) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&[0x00, 0x04]);
    body.extend_from_slice(b"MQTT");
    body.push(4); // protocol level
    body.push(0x02); // clean session
    body.extend_from_slice(&keep_alive.to_be_bytes());
    body.extend_from_slice(&(client_id.len() as u16).to_be_bytes());
    body.extend_from_slice(client_id);

    let mut out = vec![0x10, body.len() as u8];
    out.extend_from_slice(&body);
    out
}

fn main() {
    env_logger::init();

    let config = TransportConfig::new()
        .queue_capacity(1024)
        .recv_timeout(Duration::from_millis(100));
    let mut transport = BleTransport::new(LoopbackChannel { pending: None }, DemoCodec, config);

    // The MQTT client writes a CONNECT; the peer answers with a CONNACK.
    let connect = connect_packet(b"loopback-example", 30);
    let written = transport.send(&connect);
    println!("CONNECT: wrote {} of {} bytes", written, connect.len());

    transport.accept_data().expect("inbound dispatch failed");

    let mut buf = [0u8; 64];
    let n = transport.receive(&mut buf);
    println!("CONNACK from queue: {:02X?}", &buf[..n]);

    // QoS 1 publish, header and payload as two separate writes.
    let payload = b"21.5";
    let mut header = vec![0x32, (2 + 5 + 2 + payload.len()) as u8];
    header.extend_from_slice(&[0x00, 0x05]);
    header.extend_from_slice(b"t/red");
    header.extend_from_slice(&1u16.to_be_bytes());

    transport.send(&header);
    let written = transport.send(payload);
    println!("split PUBLISH: payload call wrote {} bytes", written);

    transport.accept_data().expect("inbound dispatch failed");
    let n = transport.receive(&mut buf);
    println!("PUBACK from queue: {:02X?}", &buf[..n]);
}
