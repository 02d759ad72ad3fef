//! Architecture collaborator interface.
//!
//! Everything machine-specific sits behind [`TargetArch`]: register
//! encode/decode, instruction patching, hardware breakpoint programming,
//! cache maintenance, and per-core execution control. The engine never
//! touches raw memory or debug registers directly, so host-side tests
//! can drive it against a simulated target.

use crate::breakpoint::BreakpointKind;
use crate::error::Result;

/// Core identifier; doubles as the session thread id.
pub type CoreId = u32;

/// How a core entered the debug trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The core itself hit a breakpoint or an explicit break request and
    /// wants to serve the host.
    WantMaster,
    /// The core was rounded up by another core and only parks.
    Slave,
}

/// Hardware watchpoint trigger kinds, as reported in stop replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Write,
    Read,
    Access,
}

impl WatchKind {
    /// Stop-reply field name for this trigger.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Write => "watch",
            Self::Read => "rwatch",
            Self::Access => "awatch",
        }
    }
}

/// A hardware watchpoint hit, reported by the architecture layer.
#[derive(Debug, Clone, Copy)]
pub struct WatchHit {
    pub addr: u64,
    pub kind: WatchKind,
}

/// Architecture-specific debug operations.
///
/// Implementations are shared between cores; methods take `&self` and
/// any interior state is the implementation's own concern. Register
/// payloads cross this boundary already hex-encoded in GDB target
/// order, exactly as they appear on the wire.
#[allow(unused_variables)]
pub trait TargetArch: Sync {
    /// Saved register block handed to the exception entry point.
    type Frame;

    /// Width of the trap instruction patched over a software breakpoint.
    const BREAK_INSTR_SIZE: u64;

    /// Identity of the calling core.
    fn core_id(&self) -> CoreId;

    /// Capture the saved register block and classify this entry.
    fn prepare(&self, frame: &mut Self::Frame) -> Role;

    /// Write any register edits back into the saved register block.
    fn finish(&self, frame: &mut Self::Frame) {}

    /// Append the hex encoding of one register to `out`.
    fn read_reg(&self, core: CoreId, regno: u64, out: &mut Vec<u8>) -> Result<()>;

    /// Update one register from a hex payload.
    fn write_reg(&self, core: CoreId, regno: u64, hex: &[u8]) -> Result<()>;

    /// Append the hex encoding of the full register file to `out`.
    fn read_all_regs(&self, core: CoreId, out: &mut Vec<u8>) -> Result<()>;

    /// Update the full register file from a hex payload.
    fn write_all_regs(&self, core: CoreId, hex: &[u8]) -> Result<()>;

    /// Copy target memory into `out`. Only called on validated spans.
    fn read_mem(&self, addr: u64, out: &mut [u8]) -> Result<()>;

    /// Write `data` into target memory. Only called on validated spans.
    fn write_mem(&self, addr: u64, data: &[u8]) -> Result<()>;

    /// Patch the trap instruction in at `addr`, saving the original
    /// bytes for [`TargetArch::disarm_breakpoint`].
    fn arm_breakpoint(&self, addr: u64) -> Result<()>;

    /// Restore the original instruction bytes at `addr`.
    fn disarm_breakpoint(&self, addr: u64) -> Result<()>;

    /// Program a hardware breakpoint or watchpoint.
    fn set_hw_breakpoint(&self, addr: u64, encoded_len: u64, kind: BreakpointKind) -> Result<()> {
        Err(crate::Error::Unsupported)
    }

    /// Remove a hardware breakpoint or watchpoint.
    fn remove_hw_breakpoint(&self, addr: u64, encoded_len: u64, kind: BreakpointKind) -> Result<()> {
        Err(crate::Error::Unsupported)
    }

    /// Drop every hardware breakpoint (session teardown).
    fn remove_all_hw_breakpoints(&self) {}

    /// Suppress hardware breakpoints on the calling core for the
    /// duration of the trap.
    fn disable_hw_breakpoints(&self) {}

    /// Re-arm the hardware debug registers on the calling core.
    fn correct_hw_breakpoints(&self) {}

    /// The watchpoint hit that caused this stop, if any.
    fn hit_hw_breakpoint(&self) -> Option<WatchHit> {
        None
    }

    /// Signal number describing the stop cause. 5 is SIGTRAP.
    fn stop_reason(&self) -> u8 {
        5
    }

    /// Let `core` resume normal execution.
    fn resume_core(&self, core: CoreId) -> Result<()>;

    /// Arrange for `core` to trap after one instruction.
    fn step_core(&self, core: CoreId) -> Result<()>;

    /// Force `core` to trap into the stub as a rounded-up slave.
    fn force_step(&self, core: CoreId);

    /// Instruction-cache maintenance after patching at `addr`.
    fn flush_icache(&self, addr: u64) {}

    /// Whole-icache invalidation on release paths.
    fn invalidate_icache_all(&self) {}
}
