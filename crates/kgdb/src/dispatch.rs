//! Command dispatch.
//!
//! The first byte of every packet selects a handler. The recognized set
//! is closed, so the dense handler array of classic stubs becomes a
//! match over an enum; everything else routes to the unsupported reply.

/// Recognized command bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `m addr,len`: read memory.
    MemRead,
    /// `M addr,len:payload`: write memory.
    MemWrite,
    /// `c [addr]`: continue.
    Continue,
    /// `s [addr]`: single step.
    Step,
    /// `g`: read the full register file.
    ReadAllRegs,
    /// `G payload`: write the full register file.
    WriteAllRegs,
    /// `p regno`: read one register.
    ReadReg,
    /// `P regno=payload`: write one register.
    WriteReg,
    /// `Z type,addr,kind`: insert a breakpoint.
    InsertBreak,
    /// `z type,addr,kind`: remove a breakpoint.
    RemoveBreak,
    /// `?`: report the stop reason.
    StopReason,
    /// `H op thread`: select the target thread.
    SetThread,
    /// `T thread`: thread liveness query.
    ThreadAlive,
    /// `q ...`: general query.
    Query,
    /// `R`: restart request, acknowledged silently.
    Restart,
    /// `k`: kill, detaching and resuming the target.
    Kill,
    /// `j`: vendor diagnostic no-op.
    Diagnostic,
    /// Anything else; answered with the empty packet.
    Unsupported(u8),
}

impl Command {
    /// Classify a command byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            b'm' => Self::MemRead,
            b'M' => Self::MemWrite,
            b'c' => Self::Continue,
            b's' => Self::Step,
            b'g' => Self::ReadAllRegs,
            b'G' => Self::WriteAllRegs,
            b'p' => Self::ReadReg,
            b'P' => Self::WriteReg,
            b'Z' => Self::InsertBreak,
            b'z' => Self::RemoveBreak,
            b'?' => Self::StopReason,
            b'H' => Self::SetThread,
            b'T' => Self::ThreadAlive,
            b'q' => Self::Query,
            b'R' => Self::Restart,
            b'k' => Self::Kill,
            b'j' => Self::Diagnostic,
            other => Self::Unsupported(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognized_bytes() {
        assert_eq!(Command::from_byte(b'm'), Command::MemRead);
        assert_eq!(Command::from_byte(b'Z'), Command::InsertBreak);
        assert_eq!(Command::from_byte(b'?'), Command::StopReason);
        assert_eq!(Command::from_byte(b'k'), Command::Kill);
    }

    #[test]
    fn test_unknown_bytes_route_to_unsupported() {
        assert_eq!(Command::from_byte(b'v'), Command::Unsupported(b'v'));
        assert_eq!(Command::from_byte(0x00), Command::Unsupported(0x00));
    }
}
