//! Software breakpoint lifecycle.
//!
//! A fixed table of slots tracks every software breakpoint the host has
//! registered. Slots move through `Undefined -> Set -> Active -> Set`
//! as breakpoints are added and the activation sweeps patch or restore
//! instruction bytes, with `Removed` marking a logically deleted slot
//! whose address may be reused before the table is reset.
//!
//! The table itself carries no locking: it is only ever mutated while
//! every core is parked (see the rendezvous module), so no core can
//! fetch a half-patched instruction.

use tracing::{debug, warn};

use crate::arch::TargetArch;
use crate::error::{Error, Result};
use crate::region::RegionTable;

/// Default number of software breakpoint slots.
pub const BREAKPOINT_SLOTS: usize = 32;

/// Breakpoint kinds recognized on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    /// Software breakpoint: a trap instruction patched over the target.
    Instruction,
    /// Hardware write watchpoint.
    WriteWatch,
    /// Hardware access watchpoint.
    AccessWatch,
}

impl BreakpointKind {
    /// Map the `Z`/`z` type digit; anything else is an unsupported kind.
    #[must_use]
    pub const fn from_wire(ty: u64) -> Option<Self> {
        match ty {
            0 => Some(Self::Instruction),
            2 => Some(Self::WriteWatch),
            4 => Some(Self::AccessWatch),
            _ => None,
        }
    }
}

/// Lifecycle state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    /// Free slot.
    #[default]
    Undefined,
    /// Registered; original instruction bytes still in place.
    Set,
    /// Trap instruction patched in.
    Active,
    /// Logically deleted, address reusable until the table is reset.
    Removed,
}

/// One breakpoint slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct Slot {
    pub addr: u64,
    pub state: SlotState,
}

/// Fixed-capacity software breakpoint table.
///
/// Free slots are kept on an index free-list; `Removed` slots stay off
/// it so their address association survives until [`reset`] runs.
///
/// [`reset`]: BreakpointTable::reset
#[derive(Debug)]
pub struct BreakpointTable<const N: usize = BREAKPOINT_SLOTS> {
    slots: [Slot; N],
    free: Vec<usize>,
}

impl<const N: usize> Default for BreakpointTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> BreakpointTable<N> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: [Slot::default(); N],
            free: (0..N).rev().collect(),
        }
    }

    /// Register a breakpoint of `kind` at `addr`.
    ///
    /// Instruction breakpoints land in this table; watchpoint kinds are
    /// delegated to the architecture collaborator, which owns its own
    /// capacity. `encoded_len` is the host's kind field, passed through
    /// to hardware programming untouched.
    pub fn add<A: TargetArch>(
        &mut self,
        regions: &RegionTable,
        arch: &A,
        raw_kind: u64,
        addr: u64,
        encoded_len: u64,
    ) -> Result<()> {
        let kind = BreakpointKind::from_wire(raw_kind).ok_or(Error::Unsupported)?;
        if !regions.breakpoint_allowed(addr, A::BREAK_INSTR_SIZE) {
            return Err(Error::InvalidAddress { addr });
        }
        match kind {
            BreakpointKind::Instruction => self.insert(addr),
            _ => arch.set_hw_breakpoint(addr, encoded_len, kind),
        }
    }

    /// Drop a breakpoint of `kind` at `addr`.
    pub fn remove<A: TargetArch>(
        &mut self,
        regions: &RegionTable,
        arch: &A,
        raw_kind: u64,
        addr: u64,
        encoded_len: u64,
    ) -> Result<()> {
        let kind = BreakpointKind::from_wire(raw_kind).ok_or(Error::Unsupported)?;
        if !regions.breakpoint_allowed(addr, A::BREAK_INSTR_SIZE) {
            return Err(Error::InvalidAddress { addr });
        }
        match kind {
            BreakpointKind::Instruction => self.take(addr),
            _ => arch.remove_hw_breakpoint(addr, encoded_len, kind),
        }
    }

    fn insert(&mut self, addr: u64) -> Result<()> {
        if self
            .slots
            .iter()
            .any(|s| s.state == SlotState::Set && s.addr == addr)
        {
            return Err(Error::AlreadyExists { addr });
        }
        // Prefer reviving a removed slot at the same address.
        let idx = match self
            .slots
            .iter()
            .position(|s| s.state == SlotState::Removed && s.addr == addr)
        {
            Some(idx) => idx,
            None => self.free.pop().ok_or(Error::TableFull)?,
        };
        self.slots[idx] = Slot {
            addr,
            state: SlotState::Set,
        };
        debug!(addr = format_args!("{addr:#x}"), slot = idx, "breakpoint registered");
        Ok(())
    }

    fn take(&mut self, addr: u64) -> Result<()> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.state == SlotState::Set && s.addr == addr)
            .ok_or(Error::NotFound { addr })?;
        slot.state = SlotState::Removed;
        debug!(addr = format_args!("{addr:#x}"), "breakpoint removed");
        Ok(())
    }

    /// Patch the trap instruction in for every `Set` slot.
    ///
    /// Best effort: hardware failures are counted and logged, and the
    /// sweep keeps going so the remaining breakpoints still arm. Returns
    /// the failure count.
    pub fn activate_all<A: TargetArch>(&mut self, arch: &A) -> usize {
        let mut failures = 0;
        for slot in &mut self.slots {
            if slot.state != SlotState::Set {
                continue;
            }
            if let Err(err) = arch.arm_breakpoint(slot.addr) {
                warn!(addr = format_args!("{:#x}", slot.addr), %err, "failed to arm breakpoint");
                failures += 1;
                continue;
            }
            arch.flush_icache(slot.addr);
            slot.state = SlotState::Active;
        }
        failures
    }

    /// Restore original instruction bytes for every `Active` slot.
    ///
    /// Same best-effort contract as [`BreakpointTable::activate_all`];
    /// note a failed restore still returns the slot to `Set`, matching
    /// the activation sweep's view of the world.
    pub fn deactivate_all<A: TargetArch>(&mut self, arch: &A) -> usize {
        let mut failures = 0;
        for slot in &mut self.slots {
            if slot.state != SlotState::Active {
                continue;
            }
            if arch.disarm_breakpoint(slot.addr).is_err() {
                warn!(addr = format_args!("{:#x}", slot.addr), "failed to disarm breakpoint");
                failures += 1;
            }
            arch.flush_icache(slot.addr);
            slot.state = SlotState::Set;
        }
        failures
    }

    /// Force every slot back to `Undefined`. Used on session detach.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.state = SlotState::Undefined;
        }
        self.free = (0..N).rev().collect();
    }

    /// State of the slot registered at `addr`, if any.
    #[must_use]
    pub fn state_at(&self, addr: u64) -> Option<SlotState> {
        self.slots
            .iter()
            .find(|s| s.addr == addr && s.state != SlotState::Undefined)
            .map(|s| s.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove_add_reuses_slot() {
        let mut table = BreakpointTable::<4>::new();
        table.insert(0x4000).unwrap();
        table.take(0x4000).unwrap();
        table.insert(0x4000).unwrap();
        // Re-adding revived the removed slot; the rest stay free.
        assert_eq!(table.free.len(), 3);
        assert_eq!(table.state_at(0x4000), Some(SlotState::Set));
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let mut table = BreakpointTable::<4>::new();
        table.insert(0x4000).unwrap();
        assert!(matches!(
            table.insert(0x4000),
            Err(Error::AlreadyExists { addr: 0x4000 })
        ));
    }

    #[test]
    fn test_remove_unknown_address() {
        let mut table = BreakpointTable::<4>::new();
        assert!(matches!(table.take(0x9999), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_table_full() {
        let mut table = BreakpointTable::<2>::new();
        table.insert(0x1000).unwrap();
        table.insert(0x2000).unwrap();
        assert!(matches!(table.insert(0x3000), Err(Error::TableFull)));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut table = BreakpointTable::<2>::new();
        table.insert(0x1000).unwrap();
        table.take(0x1000).unwrap();
        table.reset();
        assert_eq!(table.state_at(0x1000), None);
        table.insert(0x3000).unwrap();
        table.insert(0x4000).unwrap();
    }
}
