//! Shared coordinator state for the multi-core rendezvous.
//!
//! One [`Coordinator`] lives for the whole OS lifetime, owned by the
//! stub and passed by reference into every trap entry. It carries the
//! counters, locks, and per-core role flags the stop-the-world protocol
//! synchronizes on; the entry algorithm itself lives in the stub module.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU32, Ordering};

use bitflags::bitflags;

use crate::arch::{CoreId, Role};
use crate::sync::RawSpinLock;

/// Upper bound on core identifiers the coordinator tracks.
pub const MAX_CORES: usize = 8;

bitflags! {
    /// Per-core transient role flags, set on rendezvous entry and
    /// cleared on exit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RoleFlags: u8 {
        const WANT_MASTER = 0x1;
        const IS_SLAVE    = 0x2;
    }
}

/// Process-wide rendezvous state.
///
/// The counters are plain wrapping atomics; the protocol keeps them
/// balanced, not the types. Everything here is only ever *interpreted*
/// by the core holding the master lock, but written concurrently by any
/// core entering or leaving the rendezvous.
#[derive(Debug)]
pub struct Coordinator {
    /// Registered online cores.
    online: AtomicU32,
    /// Bitmap of online core ids.
    online_mask: AtomicU32,
    /// First (primary) core id; thread ids start here.
    first_core: AtomicI32,
    /// Serializes online registration at boot.
    init_lock: RawSpinLock,

    /// Cores that entered wanting to serve the host.
    masters: AtomicI32,
    /// Cores that entered as rounded-up slaves.
    slaves: AtomicI32,
    /// Gate holding parked slaves; locked while the host is served.
    slave_gate: RawSpinLock,
    /// Per-core role flags, indexed by core id.
    roles: [AtomicU8; MAX_CORES],

    /// Core currently designated as the exclusive stepper, -1 for none.
    step_core: AtomicI32,
    /// Set when the session exits via a single step; the next entry on
    /// the stepping core resumes the held rendezvous instead of opening
    /// a fresh one.
    step_resume: AtomicBool,

    /// Session teardown has begun; late arrivals leave immediately.
    exiting: AtomicBool,

    /// Core the host currently addresses register/memory operations to.
    selected: AtomicI32,
    /// Core whose trap opened the session.
    trapped: AtomicI32,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            online: AtomicU32::new(0),
            online_mask: AtomicU32::new(0),
            first_core: AtomicI32::new(-1),
            init_lock: RawSpinLock::new(),
            masters: AtomicI32::new(0),
            slaves: AtomicI32::new(0),
            slave_gate: RawSpinLock::new(),
            roles: std::array::from_fn(|_| AtomicU8::new(0)),
            step_core: AtomicI32::new(-1),
            step_resume: AtomicBool::new(false),
            exiting: AtomicBool::new(false),
            selected: AtomicI32::new(-1),
            trapped: AtomicI32::new(-1),
        }
    }

    /// Register `core` as online. Called once per core at boot.
    pub fn register_online(&self, core: CoreId) {
        self.init_lock.lock();
        self.online.fetch_add(1, Ordering::SeqCst);
        self.online_mask.fetch_or(1 << core, Ordering::SeqCst);
        self.init_lock.unlock();
    }

    pub fn set_first_core(&self, core: CoreId) {
        self.first_core.store(core as i32, Ordering::SeqCst);
    }

    #[must_use]
    pub fn first_core(&self) -> CoreId {
        self.first_core.load(Ordering::SeqCst).max(0) as CoreId
    }

    #[must_use]
    pub fn online_count(&self) -> u32 {
        self.online.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_online(&self, core: CoreId) -> bool {
        (core as usize) < MAX_CORES
            && self.online_mask.load(Ordering::SeqCst) & (1 << core) != 0
    }

    /// Iterate over the online core ids.
    pub fn online_cores(&self) -> impl Iterator<Item = CoreId> + '_ {
        let mask = self.online_mask.load(Ordering::SeqCst);
        (0..MAX_CORES as u32).filter(move |c| mask & (1 << c) != 0)
    }

    pub(crate) fn add_role(&self, core: CoreId, role: Role) {
        let bit = match role {
            Role::WantMaster => RoleFlags::WANT_MASTER,
            Role::Slave => RoleFlags::IS_SLAVE,
        };
        self.roles[core as usize].fetch_or(bit.bits(), Ordering::SeqCst);
    }

    pub(crate) fn roles(&self, core: CoreId) -> RoleFlags {
        RoleFlags::from_bits_truncate(self.roles[core as usize].load(Ordering::SeqCst))
    }

    pub(crate) fn clear_role(&self, core: CoreId) {
        self.roles[core as usize].store(0, Ordering::SeqCst);
    }

    pub(crate) fn inc_masters(&self) {
        self.masters.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn dec_masters(&self) {
        self.masters.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn inc_slaves(&self) {
        self.slaves.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn dec_slaves(&self) {
        self.slaves.fetch_sub(1, Ordering::SeqCst);
    }

    #[must_use]
    pub(crate) fn slave_count(&self) -> i32 {
        self.slaves.load(Ordering::SeqCst)
    }

    /// Cores accounted for so far: masters plus parked slaves.
    #[must_use]
    pub(crate) fn parked(&self) -> i32 {
        self.masters.load(Ordering::SeqCst) + self.slaves.load(Ordering::SeqCst)
    }

    pub(crate) fn lock_slave_gate(&self) {
        self.slave_gate.lock();
    }

    pub(crate) fn unlock_slave_gate(&self) {
        self.slave_gate.unlock();
    }

    #[must_use]
    pub(crate) fn slave_gate_locked(&self) -> bool {
        self.slave_gate.is_locked()
    }

    pub(crate) fn set_step_core(&self, core: CoreId) {
        self.step_core.store(core as i32, Ordering::SeqCst);
    }

    #[must_use]
    pub(crate) fn step_core(&self) -> Option<CoreId> {
        match self.step_core.load(Ordering::SeqCst) {
            -1 => None,
            c => Some(c as CoreId),
        }
    }

    pub(crate) fn set_step_resume(&self, on: bool) {
        self.step_resume.store(on, Ordering::SeqCst);
    }

    #[must_use]
    pub(crate) fn step_resume(&self) -> bool {
        self.step_resume.load(Ordering::SeqCst)
    }

    /// Forget any single-step designation.
    pub(crate) fn clear_step(&self) {
        self.step_resume.store(false, Ordering::SeqCst);
        self.step_core.store(-1, Ordering::SeqCst);
    }

    pub(crate) fn begin_exit(&self) {
        self.exiting.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn exiting(&self) -> bool {
        self.exiting.load(Ordering::SeqCst)
    }

    pub(crate) fn set_selected(&self, core: CoreId) {
        self.selected.store(core as i32, Ordering::SeqCst);
    }

    #[must_use]
    pub(crate) fn selected(&self) -> i32 {
        self.selected.load(Ordering::SeqCst)
    }

    pub(crate) fn set_trapped(&self, core: CoreId) {
        self.trapped.store(core as i32, Ordering::SeqCst);
    }

    #[must_use]
    pub(crate) fn trapped(&self) -> i32 {
        self.trapped.load(Ordering::SeqCst)
    }
}
