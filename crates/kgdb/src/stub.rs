//! The stub engine: initialization, trap entry, and the stop-the-world
//! rendezvous.
//!
//! Every core that traps while debugging is enabled enters
//! [`Stub::handle_exception`]. Exactly one core wins the master lock and
//! serves the host; every other online core is rounded up and parks
//! behind the slave gate until the session ends. Breakpoint patching
//! only ever happens while all cores are parked, so no core can fetch a
//! half-patched instruction.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use crate::arch::{CoreId, Role, TargetArch};
use crate::breakpoint::BreakpointTable;
use crate::region::{MemRegion, RegionTable};
use crate::rendezvous::{Coordinator, RoleFlags};
use crate::session::{Session, SessionCtx};
use crate::sync::{Backoff, SpinBackoff, SpinLock};
use crate::transport::PacketIo;

/// Initialization-time configuration.
#[derive(Debug)]
pub struct StubConfig {
    /// Address ranges the host may touch, from linker symbols.
    pub regions: Vec<MemRegion>,
    /// Identity of the primary (boot) core.
    pub primary_core: CoreId,
}

/// Host-facing state only the master core may touch.
struct Host<P> {
    link: P,
    session: Session,
}

/// The in-target debug stub.
///
/// Owned by the kernel's debug subsystem for the OS lifetime and shared
/// by reference across cores; all interior state is synchronized by the
/// rendezvous protocol.
pub struct Stub<A: TargetArch, P: PacketIo, B: Backoff = SpinBackoff> {
    arch: A,
    regions: RegionTable,
    coord: Coordinator,
    /// Breakpoint table. Its lock doubles as the teardown lock: the
    /// serving master and late-arriving cores on the exit path are the
    /// only contenders.
    bkpts: SpinLock<BreakpointTable>,
    /// Master lock; holding it is the exclusive right to serve the host.
    host: SpinLock<Host<P>>,
    backoff: B,
    /// Single-core reentrancy guard.
    active: AtomicBool,
}

impl<A: TargetArch, P: PacketIo> Stub<A, P> {
    /// Build the stub on the primary core: register memory regions and
    /// mark the primary core online.
    pub fn new(arch: A, link: P, config: StubConfig) -> Self {
        Self::with_backoff(arch, link, config, SpinBackoff)
    }
}

impl<A: TargetArch, P: PacketIo, B: Backoff> Stub<A, P, B> {
    /// As [`Stub::new`], with an explicit busy-wait strategy.
    pub fn with_backoff(arch: A, link: P, config: StubConfig, backoff: B) -> Self {
        let coord = Coordinator::new();
        coord.set_first_core(config.primary_core);
        coord.register_online(config.primary_core);
        Self {
            arch,
            regions: RegionTable::new(config.regions),
            coord,
            bkpts: SpinLock::new(BreakpointTable::new()),
            host: SpinLock::new(Host {
                link,
                session: Session::new(),
            }),
            backoff,
            active: AtomicBool::new(false),
        }
    }

    /// Register the calling core as online. Secondary cores call this
    /// once during their own bring-up.
    pub fn register_core(&self) {
        let cid = self.arch.core_id();
        self.coord.register_online(cid);
        debug!(core = cid, "core registered for debugging");
    }

    /// The architecture collaborator.
    pub fn arch(&self) -> &A {
        &self.arch
    }

    /// Shared coordinator state, for stop-cause inspection by the
    /// embedding kernel.
    pub fn coordinator(&self) -> &Coordinator {
        &self.coord
    }

    /// True while a debug session is being served. Single-core builds
    /// use this from the fault handler to detect recursive traps.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Exception entry point. The fault handler invokes this with the
    /// saved register block of the trapping core.
    pub fn handle_exception(&self, frame: &mut A::Frame) {
        let role = self.arch.prepare(frame);
        self.arch.disable_hw_breakpoints();
        if self.coord.online_count() <= 1 {
            self.enter_solo();
        } else {
            self.enter_rendezvous(role);
        }
        self.arch.correct_hw_breakpoints();
        self.arch.finish(frame);
    }

    /// Single-core fallback: no cores to round up, only a reentrancy
    /// guard around the session.
    fn enter_solo(&self) {
        if self.active.swap(true, Ordering::SeqCst) {
            // Recursive trap out of the stub itself; nothing to serve.
            return;
        }
        let mut host = self.host.lock();
        self.bkpts.lock().deactivate_all(&self.arch);
        self.serve(&mut host);
        self.bkpts.lock().activate_all(&self.arch);
        self.active.store(false, Ordering::SeqCst);
    }

    /// Multi-core entry: the stop-the-world rendezvous.
    fn enter_rendezvous(&self, role: Role) {
        let cid = self.arch.core_id();
        self.coord.add_role(cid, role);
        trace!(core = cid, ?role, "entering rendezvous");

        // A core arriving after teardown began restores original
        // instructions and leaves immediately.
        if self.coord.exiting() {
            let mut table = self.bkpts.lock();
            table.deactivate_all(&self.arch);
            self.arch.invalidate_icache_all();
            let _ = self.arch.resume_core(cid);
            drop(table);
            trace!(core = cid, "arrived during teardown, resuming");
            return;
        }

        match role {
            Role::WantMaster => self.coord.inc_masters(),
            Role::Slave => self.coord.inc_slaves(),
        }

        // Role acquisition: masters race for the master lock, slaves
        // park until the gate opens.
        let mut host = 'acquire: loop {
            let guard = loop {
                let flags = self.coord.roles(cid);
                if flags.contains(RoleFlags::WANT_MASTER) {
                    if let Some(guard) = self.host.try_lock() {
                        break guard;
                    }
                } else if flags.contains(RoleFlags::IS_SLAVE) {
                    if !self.coord.slave_gate_locked() {
                        self.return_normal(cid);
                        return;
                    }
                } else {
                    // This core was never asked to stop.
                    self.return_normal(cid);
                    return;
                }
                self.backoff.relax();
            };

            // During a single-instruction step only the stepping core
            // may serve the host; everyone else backs off and retries.
            match self.coord.step_core() {
                Some(stepper) if stepper != cid => {
                    drop(guard);
                    self.backoff.delay();
                }
                _ => break 'acquire guard,
            }
        };

        let active = self.active.swap(true, Ordering::SeqCst);
        debug_assert!(!active, "two masters serving at once");

        if !self.coord.step_resume() {
            // Hold all parked slaves, then round up the cores that have
            // not trapped yet.
            self.coord.lock_slave_gate();
            if self.coord.parked() != self.coord.online_count() as i32 {
                self.round_up(cid);
            }
        }

        // Safety invariant: host interaction starts only after every
        // online core is accounted for.
        while self.coord.parked() != self.coord.online_count() as i32 {
            self.backoff.delay();
        }
        debug!(core = cid, online = self.coord.online_count(), "all cores parked");

        self.bkpts.lock().deactivate_all(&self.arch);
        self.coord.set_step_resume(false);
        self.serve(&mut host);
        self.bkpts.lock().activate_all(&self.arch);

        if !self.coord.step_resume() {
            self.coord.unlock_slave_gate();
            // Wait until every slave noticed the open gate and left.
            while self.coord.slave_count() != 0 {
                self.backoff.relax();
            }
        }

        self.active.store(false, Ordering::SeqCst);
        self.coord.clear_role(cid);
        self.coord.dec_masters();
        trace!(core = cid, "leaving rendezvous");
        drop(host);
    }

    fn serve(&self, host: &mut Host<P>) {
        let Host { link, session } = host;
        SessionCtx {
            arch: &self.arch,
            regions: &self.regions,
            bkpts: &self.bkpts,
            coord: &self.coord,
            link,
            session,
        }
        .run();
    }

    /// Force every other online core to trap into this same algorithm
    /// as a slave.
    fn round_up(&self, cid: CoreId) {
        for core in self.coord.online_cores() {
            if core == cid {
                continue;
            }
            trace!(core, "rounding up");
            self.arch.force_step(core);
        }
    }

    /// Slave (or not-asked-to-stop) exit path: resume and uncount.
    fn return_normal(&self, cid: CoreId) {
        let selected = self.coord.selected();
        let trapped = self.coord.trapped();
        if selected == trapped || cid as i32 != selected {
            let _ = self.arch.resume_core(cid);
        }
        self.arch.invalidate_icache_all();
        self.coord.clear_role(cid);
        self.coord.dec_slaves();
        trace!(core = cid, "released from park");
    }
}
