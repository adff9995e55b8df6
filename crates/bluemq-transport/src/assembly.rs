//! Stateful reassembly of a PUBLISH split across two write calls.
//!
//! The MQTT client may write a publish header (fixed header + topic) and
//! its payload as two separate calls, but the BLE serializer needs the
//! whole packet at once. One reassembly slot exists per connection context;
//! while it is pending, the next outbound call carries the missing payload
//! bytes and nothing else may interleave. The slot needs no lock because
//! outbound dispatch is serialized by the owning client task.

use bluemq_core::packet::{decode_publish, PublishHeader};
use bluemq_core::{ProtocolError, Result};

/// Outcome of feeding one outbound buffer to the reassembler.
#[derive(Debug)]
pub(crate) enum Assembled<'a> {
    /// Header and payload are both available; ready for BLE encoding.
    Complete {
        header: PublishHeader,
        payload: &'a [u8],
    },
    /// The header was stored; the payload arrives in the next call.
    Pending,
}

/// One reassembly slot per connection context.
#[derive(Debug, Default)]
pub(crate) struct PublishAssembly {
    pending: Option<PublishHeader>,
}

impl PublishAssembly {
    pub(crate) fn new() -> Self {
        Self { pending: None }
    }

    /// True while a publish header is waiting for its payload.
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed the next outbound buffer.
    ///
    /// With a pending header, the buffer is the missing payload and its
    /// length must equal the previously computed payload length exactly; a
    /// mismatch is fatal and clears the slot. Otherwise the buffer is
    /// parsed as a fresh PUBLISH packet.
    pub(crate) fn feed<'a>(&mut self, buf: &'a [u8]) -> Result<Assembled<'a>> {
        if let Some(header) = self.pending.take() {
            if buf.len() != header.payload_len {
                return Err(ProtocolError::PayloadLengthMismatch {
                    expected: header.payload_len,
                    got: buf.len(),
                });
            }
            return Ok(Assembled::Complete {
                header,
                payload: buf,
            });
        }

        let (header, payload) = decode_publish(buf)?;
        match payload {
            Some(payload) => Ok(Assembled::Complete { header, payload }),
            None => {
                self.pending = Some(header);
                Ok(Assembled::Pending)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluemq_core::packet::QoS;
    use bluemq_core::varint;

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
    fn single_call_completes_immediately() {
        let mut assembly = PublishAssembly::new();
        let packet = publish_packet(b"t/1", 5, b"data");

        match assembly.feed(&packet).unwrap() {
            Assembled::Complete { header, payload } => {
                assert_eq!(&header.topic[..], b"t/1");
                assert_eq!(header.packet_id, Some(5));
                assert_eq!(payload, b"data");
            }
            Assembled::Pending => panic!("expected complete"),
        }
        assert!(!assembly.is_pending());
    }

    #[test]
    fn split_publish_reassembles() {
        let mut assembly = PublishAssembly::new();
        let packet = publish_packet(b"t/1", 5, b"payload-bytes");
        let header_len = packet.len() - 13;

        assert!(matches!(
            assembly.feed(&packet[..header_len]).unwrap(),
            Assembled::Pending
        ));
        assert!(assembly.is_pending());

        match assembly.feed(b"payload-bytes").unwrap() {
            Assembled::Complete { header, payload } => {
                assert_eq!(&header.topic[..], b"t/1");
                assert_eq!(header.qos, QoS::AtLeastOnce);
                assert_eq!(payload, b"payload-bytes");
            }
            Assembled::Pending => panic!("expected complete"),
        }
        assert!(!assembly.is_pending());
    }

    #[test]
    fn continuation_length_mismatch_is_fatal() {
        let mut assembly = PublishAssembly::new();
        let packet = publish_packet(b"t/1", 5, b"1234");
        let header_len = packet.len() - 4;

        assembly.feed(&packet[..header_len]).unwrap();
        assert_eq!(
            assembly.feed(b"12345").unwrap_err(),
            ProtocolError::PayloadLengthMismatch {
                expected: 4,
                got: 5
            }
        );
        // The slot does not stay armed after the fatal mismatch.
        assert!(!assembly.is_pending());
    }
}
