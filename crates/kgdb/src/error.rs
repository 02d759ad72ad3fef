use kgdb_rsp::PacketError;
use thiserror::Error;

/// Debug-engine errors.
///
/// None of these are fatal to the kernel: every variant maps to an error
/// reply on the wire while the session stays open.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed packet arguments")]
    Malformed,
    #[error("command or breakpoint kind not supported")]
    Unsupported,
    #[error("address {addr:#x} not valid for this operation")]
    InvalidAddress { addr: u64 },
    #[error("access of {len} bytes at {addr:#x} denied")]
    InvalidAccess { addr: u64, len: u64 },
    #[error("no breakpoint registered at {addr:#x}")]
    NotFound { addr: u64 },
    #[error("breakpoint already set at {addr:#x}")]
    AlreadyExists { addr: u64 },
    #[error("breakpoint table full")]
    TableFull,
    #[error("architecture hook failed: {0}")]
    Hardware(&'static str),
    #[error(transparent)]
    Protocol(#[from] PacketError),
}

pub type Result<T> = std::result::Result<T, Error>;
