//! Memory access validation.
//!
//! Every host-initiated memory or breakpoint operation is gated by a
//! static table of address ranges built once at initialization from
//! linker-provided section boundaries. Read/write checks are an
//! allow-list: the whole span must sit inside one region carrying the
//! needed attribute. Breakpoint protection is a deny-list: it guards the
//! stub's own code and data, and addresses covered by no region at all
//! remain breakpoint-eligible.

use bitflags::bitflags;

bitflags! {
    /// Attribute flags of a memory region.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegionAttrs: u32 {
        const READ          = 0x01;
        const WRITE         = 0x02;
        /// Software breakpoints may not be placed inside this region.
        const NO_BREAKPOINT = 0x04;
    }
}

impl RegionAttrs {
    /// Shorthand for readable and writable RAM.
    pub const RW: Self = Self::READ.union(Self::WRITE);
}

/// One address range with its attributes.
#[derive(Debug, Clone, Copy)]
pub struct MemRegion {
    /// First address of the region.
    pub start: u64,
    /// One past the last address of the region.
    pub end: u64,
    /// Attribute flags.
    pub attrs: RegionAttrs,
}

impl MemRegion {
    #[must_use]
    pub const fn new(start: u64, end: u64, attrs: RegionAttrs) -> Self {
        Self { start, end, attrs }
    }
}

/// Immutable region table; built at init, linear-scanned on each check.
#[derive(Debug, Default)]
pub struct RegionTable {
    regions: Vec<MemRegion>,
}

impl RegionTable {
    #[must_use]
    pub fn new(regions: Vec<MemRegion>) -> Self {
        Self { regions }
    }

    /// Allow-list check: some region must fully contain `[addr, addr+len]`
    /// and carry every attribute in `attrs`.
    #[must_use]
    pub fn check_access(&self, addr: u64, len: u64, attrs: RegionAttrs) -> bool {
        self.regions.iter().any(|r| {
            r.start <= addr
                && addr.checked_add(len).is_some_and(|end| end < r.end)
                && r.attrs.contains(attrs)
        })
    }

    /// Deny-list check: a breakpoint of `instr_len` bytes at `addr` is
    /// refused only when a protected region contains it.
    #[must_use]
    pub fn breakpoint_allowed(&self, addr: u64, instr_len: u64) -> bool {
        !self.check_access(addr, instr_len, RegionAttrs::NO_BREAKPOINT)
    }
}
