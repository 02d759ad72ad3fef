//! Packet transport seam.
//!
//! Framing, checksums, escaping, and the receive ring buffer all live in
//! the transport layer. The engine only ever sees whole packet payloads.

use kgdb_rsp::PacketError;

/// Byte transport carrying framed protocol packets.
pub trait PacketIo: Send {
    /// Block until one packet arrives; copy its payload into `buf` and
    /// return the payload length (zero for an empty packet).
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, PacketError>;

    /// Frame and send one reply payload. An empty payload is the
    /// protocol's "unsupported" reply.
    fn send(&mut self, payload: &[u8]);

    /// Push any buffered output onto the wire.
    fn flush(&mut self) {}
}
