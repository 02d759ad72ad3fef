//! Simulated multi-core target and loopback transport.
//!
//! The simulated "cores" are plain threads; which core a thread plays is
//! a thread-local, so one `SimTarget` can serve every thread entering
//! the stub concurrently, the way real cores share one architecture
//! layer.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use kgdb::{
    Backoff, BreakpointKind, CoreId, Error, MAX_CORES, PacketIo, Role, TargetArch, WatchHit,
};
use kgdb_rsp::PacketError;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

/// Trap pattern patched over armed breakpoints.
pub const TRAP_INSTR: [u8; 4] = [0xe7, 0xf0, 0x01, 0xf0];

thread_local! {
    static CURRENT_CORE: Cell<CoreId> = const { Cell::new(0) };
}

/// Declare which core the calling thread simulates.
pub fn set_current_core(core: CoreId) {
    CURRENT_CORE.with(|c| c.set(core));
}

/// Saved register block handed to the exception entry.
pub struct SimFrame {
    pub role: Role,
}

impl SimFrame {
    pub fn master() -> Self {
        Self {
            role: Role::WantMaster,
        }
    }

    pub fn slave() -> Self {
        Self { role: Role::Slave }
    }
}

/// Simulated architecture layer backed by a shared RAM vector.
pub struct SimTarget {
    ram_base: u64,
    ram: RwLock<Vec<u8>>,
    regs: Mutex<FxHashMap<(CoreId, u64), u32>>,
    /// Original instruction bytes saved while a breakpoint is armed.
    saved: Mutex<FxHashMap<u64, [u8; 4]>>,
    watchpoints: Mutex<Vec<(u64, u64, BreakpointKind)>>,
    forced: [AtomicBool; MAX_CORES],
    resumed: Mutex<Vec<CoreId>>,
    stepped: Mutex<Vec<CoreId>>,
    /// Arm attempts at this address fail, for best-effort sweep tests.
    fail_arm_at: Mutex<Option<u64>>,
    /// Pending hardware watchpoint hit reported at the next stop.
    watch_hit: Mutex<Option<WatchHit>>,
}

impl SimTarget {
    pub fn new(ram_base: u64, ram_size: usize) -> Self {
        Self {
            ram_base,
            ram: RwLock::new(vec![0; ram_size]),
            regs: Mutex::new(FxHashMap::default()),
            saved: Mutex::new(FxHashMap::default()),
            watchpoints: Mutex::new(Vec::new()),
            forced: std::array::from_fn(|_| AtomicBool::new(false)),
            resumed: Mutex::new(Vec::new()),
            stepped: Mutex::new(Vec::new()),
            fail_arm_at: Mutex::new(None),
            watch_hit: Mutex::new(None),
        }
    }

    fn offset(&self, addr: u64, len: usize) -> kgdb::Result<usize> {
        let off = addr
            .checked_sub(self.ram_base)
            .ok_or(Error::Hardware("address below simulated RAM"))?;
        let off = usize::try_from(off).map_err(|_| Error::Hardware("address out of range"))?;
        if off + len > self.ram.read().len() {
            return Err(Error::Hardware("address beyond simulated RAM"));
        }
        Ok(off)
    }

    /// Test-side RAM access, bypassing validation.
    pub fn poke(&self, addr: u64, data: &[u8]) {
        let off = self.offset(addr, data.len()).unwrap();
        self.ram.write()[off..off + data.len()].copy_from_slice(data);
    }

    /// Test-side RAM snapshot.
    pub fn peek(&self, addr: u64, len: usize) -> Vec<u8> {
        let off = self.offset(addr, len).unwrap();
        self.ram.read()[off..off + len].to_vec()
    }

    /// Make the next arm attempt at `addr` report a hardware failure.
    pub fn fail_arm_at(&self, addr: u64) {
        *self.fail_arm_at.lock() = Some(addr);
    }

    /// Report a hardware watchpoint hit at the next stop.
    pub fn report_watch_hit(&self, hit: WatchHit) {
        *self.watch_hit.lock() = Some(hit);
    }

    /// Whether `core` got a forced-step round-up; clears the flag.
    pub fn take_forced(&self, core: CoreId) -> bool {
        self.forced[core as usize].swap(false, Ordering::SeqCst)
    }

    pub fn resumed_cores(&self) -> Vec<CoreId> {
        self.resumed.lock().clone()
    }

    pub fn stepped_cores(&self) -> Vec<CoreId> {
        self.stepped.lock().clone()
    }

    pub fn watchpoint_count(&self) -> usize {
        self.watchpoints.lock().len()
    }

    pub fn set_reg(&self, core: CoreId, regno: u64, value: u32) {
        self.regs.lock().insert((core, regno), value);
    }

    pub fn reg(&self, core: CoreId, regno: u64) -> u32 {
        self.regs.lock().get(&(core, regno)).copied().unwrap_or(0)
    }
}

impl TargetArch for SimTarget {
    type Frame = SimFrame;

    const BREAK_INSTR_SIZE: u64 = 4;

    fn core_id(&self) -> CoreId {
        CURRENT_CORE.with(Cell::get)
    }

    fn prepare(&self, frame: &mut SimFrame) -> Role {
        frame.role
    }

    fn read_reg(&self, core: CoreId, regno: u64, out: &mut Vec<u8>) -> kgdb::Result<()> {
        let value = self.reg(core, regno);
        out.extend_from_slice(format!("{value:08x}").as_bytes());
        Ok(())
    }

    fn write_reg(&self, core: CoreId, regno: u64, hex: &[u8]) -> kgdb::Result<()> {
        let bytes = kgdb_rsp::decode_hex(hex).ok_or(Error::Malformed)?;
        let bytes: [u8; 4] = bytes.try_into().map_err(|_| Error::Malformed)?;
        self.set_reg(core, regno, u32::from_be_bytes(bytes));
        Ok(())
    }

    fn read_all_regs(&self, core: CoreId, out: &mut Vec<u8>) -> kgdb::Result<()> {
        for regno in 0..4 {
            self.read_reg(core, regno, out)?;
        }
        Ok(())
    }

    fn write_all_regs(&self, core: CoreId, hex: &[u8]) -> kgdb::Result<()> {
        if hex.len() != 4 * 8 {
            return Err(Error::Malformed);
        }
        for (regno, chunk) in hex.chunks_exact(8).enumerate() {
            self.write_reg(core, regno as u64, chunk)?;
        }
        Ok(())
    }

    fn read_mem(&self, addr: u64, out: &mut [u8]) -> kgdb::Result<()> {
        let off = self.offset(addr, out.len())?;
        out.copy_from_slice(&self.ram.read()[off..off + out.len()]);
        Ok(())
    }

    fn write_mem(&self, addr: u64, data: &[u8]) -> kgdb::Result<()> {
        let off = self.offset(addr, data.len())?;
        self.ram.write()[off..off + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn arm_breakpoint(&self, addr: u64) -> kgdb::Result<()> {
        if *self.fail_arm_at.lock() == Some(addr) {
            return Err(Error::Hardware("injected arm failure"));
        }
        let off = self.offset(addr, 4)?;
        let mut ram = self.ram.write();
        let original: [u8; 4] = ram[off..off + 4].try_into().unwrap();
        self.saved.lock().insert(addr, original);
        ram[off..off + 4].copy_from_slice(&TRAP_INSTR);
        Ok(())
    }

    fn disarm_breakpoint(&self, addr: u64) -> kgdb::Result<()> {
        let original = self
            .saved
            .lock()
            .remove(&addr)
            .ok_or(Error::Hardware("no saved bytes"))?;
        let off = self.offset(addr, 4)?;
        self.ram.write()[off..off + 4].copy_from_slice(&original);
        Ok(())
    }

    fn set_hw_breakpoint(&self, addr: u64, encoded_len: u64, kind: BreakpointKind) -> kgdb::Result<()> {
        self.watchpoints.lock().push((addr, encoded_len, kind));
        Ok(())
    }

    fn remove_hw_breakpoint(&self, addr: u64, encoded_len: u64, kind: BreakpointKind) -> kgdb::Result<()> {
        let mut wps = self.watchpoints.lock();
        let idx = wps
            .iter()
            .position(|&w| w == (addr, encoded_len, kind))
            .ok_or(Error::NotFound { addr })?;
        wps.swap_remove(idx);
        Ok(())
    }

    fn remove_all_hw_breakpoints(&self) {
        self.watchpoints.lock().clear();
    }

    fn hit_hw_breakpoint(&self) -> Option<WatchHit> {
        *self.watch_hit.lock()
    }

    fn resume_core(&self, core: CoreId) -> kgdb::Result<()> {
        self.resumed.lock().push(core);
        Ok(())
    }

    fn step_core(&self, core: CoreId) -> kgdb::Result<()> {
        self.stepped.lock().push(core);
        Ok(())
    }

    fn force_step(&self, core: CoreId) {
        self.forced[core as usize].store(true, Ordering::SeqCst);
    }
}

/// One scripted transport event.
pub enum Inject {
    Packet(Vec<u8>),
    Error(PacketError),
    /// Spin until the flag is raised, then continue with the script.
    WaitFor(Arc<AtomicBool>),
}

#[derive(Default)]
struct LinkState {
    script: VecDeque<Inject>,
    replies: Vec<Vec<u8>>,
}

/// Scripted packet transport. Clones share the same script and reply
/// log, so tests keep one clone as an inspection handle.
#[derive(Clone, Default)]
pub struct LoopbackIo {
    state: Arc<Mutex<LinkState>>,
    in_recv: Arc<AtomicU32>,
    max_concurrent: Arc<AtomicU32>,
}

impl LoopbackIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, packet: &[u8]) {
        self.state
            .lock()
            .script
            .push_back(Inject::Packet(packet.to_vec()));
    }

    pub fn push_error(&self, err: PacketError) {
        self.state.lock().script.push_back(Inject::Error(err));
    }

    pub fn push_wait(&self, flag: Arc<AtomicBool>) {
        self.state.lock().script.push_back(Inject::WaitFor(flag));
    }

    pub fn replies(&self) -> Vec<Vec<u8>> {
        self.state.lock().replies.clone()
    }

    /// Highest number of sessions ever blocked in `recv` at once; more
    /// than one means two cores were serving the host simultaneously.
    pub fn max_concurrent_receivers(&self) -> u32 {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

impl PacketIo for LoopbackIo {
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, PacketError> {
        let depth = self.in_recv.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(depth, Ordering::SeqCst);
        let result = loop {
            let item = self.state.lock().script.pop_front();
            match item {
                None => panic!("transport script exhausted while session still receiving"),
                Some(Inject::WaitFor(flag)) => {
                    while !flag.load(Ordering::SeqCst) {
                        std::thread::yield_now();
                    }
                }
                Some(Inject::Packet(packet)) => {
                    buf[..packet.len()].copy_from_slice(&packet);
                    break Ok(packet.len());
                }
                Some(Inject::Error(err)) => break Err(err),
            }
        };
        self.in_recv.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn send(&mut self, payload: &[u8]) {
        self.state.lock().replies.push(payload.to_vec());
    }
}

/// Backoff that yields to the OS scheduler, so racing simulated cores
/// make progress even on few host CPUs.
pub struct YieldBackoff;

impl Backoff for YieldBackoff {
    fn relax(&self) {
        std::thread::yield_now();
    }

    fn delay(&self) {
        std::thread::yield_now();
    }
}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
