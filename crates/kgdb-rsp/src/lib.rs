//! Wire-level helpers for the GDB Remote Serial Protocol.
//!
//! This crate owns the text layer of the protocol: hex encoding and
//! decoding of binary payloads, a cursor over packet argument bytes, and
//! the informal reply codes shared with other stub implementations.
//! Packet framing (checksums, escaping, acknowledgement) lives in the
//! transport and is out of scope here.

use thiserror::Error;

mod args;
mod hex;

pub use args::Args;
pub use hex::{decode_hex, from_hex_digit, push_hex};

/// Maximum payload size of a single packet, in bytes.
pub const PACKET_SIZE: usize = 2048;

/// Successful reply.
pub const REPLY_OK: &[u8] = b"OK";

/// Empty reply, the protocol's way of saying "not supported".
pub const REPLY_UNSUPPORTED: &[u8] = b"";

// The protocol never defined error numbers properly and hosts treat all
// error packets alike. These are the informal values used by qemu and
// other stubs.

/// General error.
pub const ERR_GENERAL: &[u8] = b"E01";

/// Memory access error.
pub const ERR_MEMORY: &[u8] = b"E14";

/// Invalid argument error.
pub const ERR_INVAL: &[u8] = b"E22";

/// Errors surfaced by the packet transport when receiving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PacketError {
    /// The packet checksum did not match its payload.
    #[error("packet checksum mismatch")]
    Checksum,
    /// The packet payload exceeds the receive buffer.
    #[error("packet exceeds buffer capacity")]
    TooBig,
}
