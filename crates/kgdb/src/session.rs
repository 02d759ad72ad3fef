//! RSP session state machine.
//!
//! Runs on the master core while every other core is parked: read one
//! packet, dispatch it, reply, and loop until the host resumes or kills
//! the target. Protocol-level failures answer an error packet and keep
//! the session alive; nothing in here is fatal.

use std::fmt::Write as _;

use kgdb_rsp::{
    Args, ERR_GENERAL, ERR_INVAL, ERR_MEMORY, PACKET_SIZE, REPLY_OK, REPLY_UNSUPPORTED,
    decode_hex, push_hex,
};
use tracing::{debug, trace};

use crate::arch::{CoreId, TargetArch};
use crate::breakpoint::BreakpointTable;
use crate::dispatch::Command;
use crate::error::{Error, Result};
use crate::region::RegionAttrs;
use crate::region::RegionTable;
use crate::rendezvous::Coordinator;
use crate::sync::SpinLock;
use crate::transport::PacketIo;

/// Loop state: receive packets until a resuming command exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Receiving,
    Exit,
}

/// Per-session state that survives across stops.
#[derive(Debug)]
pub(crate) struct Session {
    /// False until the first stop since boot; the first entry suppresses
    /// the stop reply because the host never issued a resumption.
    started: bool,
    /// Cursor of the `qfThreadInfo`/`qsThreadInfo` enumeration.
    thread_iter: usize,
    /// Receive buffer, one packet payload.
    packet: Vec<u8>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            started: false,
            thread_iter: 0,
            packet: vec![0; PACKET_SIZE],
        }
    }
}

/// Everything a running session needs, borrowed from the stub.
pub(crate) struct SessionCtx<'a, A: TargetArch, P: PacketIo> {
    pub arch: &'a A,
    pub regions: &'a RegionTable,
    pub bkpts: &'a SpinLock<BreakpointTable>,
    pub coord: &'a Coordinator,
    pub link: &'a mut P,
    pub session: &'a mut Session,
}

impl<A: TargetArch, P: PacketIo> SessionCtx<'_, A, P> {
    /// Serve the host until it resumes the target.
    pub(crate) fn run(&mut self) {
        let cid = self.arch.core_id();
        if self.session.started {
            self.send_stop_reply(cid);
        } else {
            self.session.started = true;
        }
        self.coord.set_selected(cid);
        self.coord.set_trapped(cid);

        let mut flow = Flow::Receiving;
        while flow == Flow::Receiving {
            let len = match self.link.recv(&mut self.session.packet) {
                Ok(len) => len,
                Err(err) => {
                    let err = Error::from(err);
                    debug!(%err, "discarding bad packet");
                    self.link.send(error_reply(&err));
                    continue;
                }
            };
            if len == 0 {
                continue;
            }
            // Take the buffer out so handlers can borrow args freely.
            let packet = std::mem::take(&mut self.session.packet);
            let cmd = Command::from_byte(packet[0]);
            trace!(cmd = %(packet[0] as char), len, "dispatching");
            match self.dispatch(cmd, &packet[1..len]) {
                Ok(next) => flow = next,
                Err(err) => {
                    debug!(%err, "command failed");
                    self.link.send(error_reply(&err));
                    flow = Flow::Receiving;
                }
            }
            self.session.packet = packet;
            self.link.flush();
        }
    }

    fn dispatch(&mut self, cmd: Command, args: &[u8]) -> Result<Flow> {
        match cmd {
            Command::MemRead => self.cmd_mem_read(args),
            Command::MemWrite => self.cmd_mem_write(args),
            Command::Continue => self.cmd_continue(),
            Command::Step => self.cmd_step(),
            Command::ReadAllRegs => self.cmd_read_all_regs(),
            Command::WriteAllRegs => self.cmd_write_all_regs(args),
            Command::ReadReg => self.cmd_read_reg(args),
            Command::WriteReg => self.cmd_write_reg(args),
            Command::InsertBreak => self.cmd_breakpoint(args, true),
            Command::RemoveBreak => self.cmd_breakpoint(args, false),
            Command::StopReason => {
                let cid = self.arch.core_id();
                self.send_stop_reply(cid);
                Ok(Flow::Receiving)
            }
            Command::SetThread => self.cmd_set_thread(args),
            Command::ThreadAlive => self.cmd_thread_alive(args),
            Command::Query => self.cmd_query(args),
            Command::Restart => Ok(Flow::Receiving), // acknowledged silently
            Command::Kill => self.cmd_kill(),
            Command::Diagnostic => {
                self.link.send(REPLY_OK);
                Ok(Flow::Receiving)
            }
            Command::Unsupported(byte) => {
                trace!(byte, "unsupported command");
                self.link.send(REPLY_UNSUPPORTED);
                Ok(Flow::Receiving)
            }
        }
    }

    /// `T{sig}thread:{core};`, with the watchpoint address inserted when
    /// the architecture reports a hardware hit.
    fn send_stop_reply(&mut self, cid: CoreId) {
        let sig = self.arch.stop_reason();
        let mut reply = String::new();
        if let Some(hit) = self.arch.hit_hw_breakpoint() {
            let _ = write!(
                reply,
                "T{sig:02x}{}:{:x};thread:{cid:02x};",
                hit.kind.wire_name(),
                hit.addr
            );
        } else {
            let _ = write!(reply, "T{sig:02x}thread:{cid:02x};");
        }
        self.link.send(reply.as_bytes());
    }

    /// Core the host currently addresses; always valid mid-session.
    fn selected_core(&self) -> CoreId {
        self.coord.selected().max(0) as CoreId
    }

    fn cmd_mem_read(&mut self, args: &[u8]) -> Result<Flow> {
        let mut args = Args::new(args);
        let addr = args.hex_u64();
        if !args.expect(b',') {
            return Err(Error::Malformed);
        }
        let len = args.hex_u64();

        // Hosts routinely probe wild pointers while building backtraces;
        // answer those with a memory error instead of faulting.
        if !self.regions.check_access(addr, len, RegionAttrs::READ) {
            return Err(Error::InvalidAccess { addr, len });
        }
        let count = usize::try_from(len).map_err(|_| Error::Malformed)?;
        if count > (PACKET_SIZE - 4) / 2 {
            return Err(Error::Malformed);
        }
        let mut data = vec![0u8; count];
        self.arch.read_mem(addr, &mut data)?;
        let mut reply = Vec::with_capacity(2 * count);
        push_hex(&mut reply, &data);
        self.link.send(&reply);
        Ok(Flow::Receiving)
    }

    fn cmd_mem_write(&mut self, args: &[u8]) -> Result<Flow> {
        let mut args = Args::new(args);
        let addr = args.hex_u64();
        if !args.expect(b',') {
            return Err(Error::Malformed);
        }
        let len = args.hex_u64();
        if !args.expect(b':') {
            return Err(Error::Malformed);
        }
        if !self.regions.check_access(addr, len, RegionAttrs::WRITE) {
            return Err(Error::InvalidAccess { addr, len });
        }
        let count = usize::try_from(len).map_err(|_| Error::Malformed)?;
        let payload = args.rest();
        if payload.len() < 2 * count {
            return Err(Error::Malformed);
        }
        let data = decode_hex(&payload[..2 * count]).ok_or(Error::Malformed)?;
        self.arch.write_mem(addr, &data)?;
        self.link.send(REPLY_OK);
        Ok(Flow::Receiving)
    }

    fn cmd_breakpoint(&mut self, args: &[u8], insert: bool) -> Result<Flow> {
        let mut args = Args::new(args);
        let ty = args.hex_u64();
        if !args.expect(b',') {
            return Err(Error::Malformed);
        }
        let addr = args.hex_u64();
        if !args.expect(b',') {
            return Err(Error::Malformed);
        }
        let encoded_len = args.hex_u64();

        let result = {
            let mut table = self.bkpts.lock();
            if insert {
                table.add(self.regions, self.arch, ty, addr, encoded_len)
            } else {
                table.remove(self.regions, self.arch, ty, addr, encoded_len)
            }
        };
        match result {
            Ok(()) => self.link.send(REPLY_OK),
            Err(Error::Unsupported) => self.link.send(REPLY_UNSUPPORTED),
            Err(err) => {
                debug!(%err, insert, "breakpoint operation rejected");
                self.link.send(ERR_INVAL);
            }
        }
        Ok(Flow::Receiving)
    }

    fn cmd_read_reg(&mut self, args: &[u8]) -> Result<Flow> {
        let mut args = Args::new(args);
        let regno = args.hex_u64();
        let mut reply = Vec::new();
        self.arch.read_reg(self.selected_core(), regno, &mut reply)?;
        self.link.send(&reply);
        Ok(Flow::Receiving)
    }

    fn cmd_write_reg(&mut self, args: &[u8]) -> Result<Flow> {
        let mut args = Args::new(args);
        let (regno, _) = args.hex_u64_counted();
        if !args.expect(b'=') {
            return Err(Error::Malformed);
        }
        self.arch.write_reg(self.selected_core(), regno, args.rest())?;
        self.link.send(REPLY_OK);
        Ok(Flow::Receiving)
    }

    fn cmd_read_all_regs(&mut self) -> Result<Flow> {
        let mut reply = Vec::new();
        self.arch.read_all_regs(self.selected_core(), &mut reply)?;
        self.link.send(&reply);
        Ok(Flow::Receiving)
    }

    fn cmd_write_all_regs(&mut self, args: &[u8]) -> Result<Flow> {
        self.arch.write_all_regs(self.selected_core(), args)?;
        self.link.send(REPLY_OK);
        Ok(Flow::Receiving)
    }

    fn cmd_set_thread(&mut self, args: &[u8]) -> Result<Flow> {
        let mut args = Args::new(args);
        let op = args.next_byte().ok_or(Error::Malformed)?;
        if op == b's' {
            self.link.send(REPLY_UNSUPPORTED);
            return Ok(Flow::Receiving);
        }
        let ok = (op == b'g' || op == b'c') && {
            let id = args.hex_u64() as i64;
            if id == -1 {
                self.coord.set_selected(self.coord.first_core());
                true
            } else if let Ok(id) = u32::try_from(id) {
                if self.coord.is_online(id) {
                    self.coord.set_selected(id);
                    true
                } else {
                    false
                }
            } else {
                false
            }
        };
        self.link.send(if ok { REPLY_OK } else { ERR_INVAL });
        Ok(Flow::Receiving)
    }

    fn cmd_thread_alive(&mut self, args: &[u8]) -> Result<Flow> {
        let mut args = Args::new(args);
        let id = args.hex_u64();
        let alive = u32::try_from(id).is_ok_and(|id| self.coord.is_online(id));
        self.link.send(if alive { REPLY_OK } else { ERR_INVAL });
        Ok(Flow::Receiving)
    }

    fn cmd_query(&mut self, args: &[u8]) -> Result<Flow> {
        match args.first() {
            Some(sub @ (b'f' | b's')) if args[1..].starts_with(b"ThreadInfo") => {
                if *sub == b'f' {
                    self.session.thread_iter = 0;
                }
                if let Some(id) = self.coord.online_cores().nth(self.session.thread_iter) {
                    self.session.thread_iter += 1;
                    self.link.send(format!("m{id:x}").as_bytes());
                } else {
                    self.link.send(b"l");
                }
            }
            Some(b'C') => {
                let reply = format!("QC{:x};", self.arch.core_id());
                self.link.send(reply.as_bytes());
            }
            _ => self.link.send(REPLY_UNSUPPORTED),
        }
        Ok(Flow::Receiving)
    }

    fn cmd_continue(&mut self) -> Result<Flow> {
        let core = self.selected_core();
        if self.arch.resume_core(core).is_err() {
            self.link.send(ERR_INVAL);
            return Ok(Flow::Receiving);
        }
        self.coord.clear_step();
        let trapped = self.coord.trapped();
        if trapped != core as i32 {
            let _ = self.arch.resume_core(trapped as CoreId);
        }
        debug!(core, "continuing");
        self.link.send(REPLY_OK);
        Ok(Flow::Exit)
    }

    fn cmd_step(&mut self) -> Result<Flow> {
        let core = self.selected_core();
        if self.arch.step_core(core).is_err() {
            return Ok(Flow::Receiving);
        }
        self.coord.set_step_resume(true);
        self.coord.set_step_core(core);
        let trapped = self.coord.trapped();
        if trapped != core as i32 {
            // Stepping a different core than the one that trapped: the
            // trapped core resumes normally and the step is not an
            // in-place session resumption.
            let _ = self.arch.resume_core(trapped as CoreId);
            self.coord.set_step_resume(false);
        }
        debug!(core, "single-stepping");
        Ok(Flow::Exit)
    }

    fn cmd_kill(&mut self) -> Result<Flow> {
        self.bkpts.lock().reset();
        self.arch.remove_all_hw_breakpoints();
        let _ = self.arch.resume_core(self.selected_core());
        self.coord.begin_exit();
        debug!("host detached, tearing down debug session");
        Ok(Flow::Exit)
    }
}

/// Wire code for a failed command. Hosts only distinguish memory errors
/// from everything else.
fn error_reply(err: &Error) -> &'static [u8] {
    match err {
        Error::InvalidAccess { .. } => ERR_MEMORY,
        _ => ERR_GENERAL,
    }
}
