//! BLE data channel abstraction.

/// A byte-oriented BLE data channel.
///
/// The channel moves opaque encoded blobs; it has no notion of MQTT
/// framing. Implementations wrap the platform's BLE data-transfer service.
pub trait Channel {
    /// Send an encoded frame. Returns the number of bytes actually sent;
    /// anything short of `frame.len()` is treated as a send failure by the
    /// caller.
    fn send(&mut self, frame: &[u8]) -> usize;

    /// Peek the next pending packet without consuming it.
    ///
    /// Returns the packet type byte and a borrowed view into the channel's
    /// receive buffer, valid until [`Channel::consume`] is called. `None`
    /// when no packet is pending.
    fn peek(&self) -> Option<(u8, &[u8])>;

    /// Drain `len` bytes from the receive buffer, discarding them.
    fn consume(&mut self, len: usize);
}
