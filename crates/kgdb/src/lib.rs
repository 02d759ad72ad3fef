//! In-target GDB remote-debugging engine for a multi-core RTOS.
//!
//! The stub lets a host debugger halt, inspect, and resume a running
//! kernel over a byte transport speaking the GDB Remote Serial
//! Protocol. Four pieces make up the core:
//!
//! - a command dispatcher over the recognized packet bytes,
//! - a software-breakpoint table with an explicit patch lifecycle,
//! - an address-range validator gating every host-initiated access,
//! - a stop-the-world rendezvous that parks every core before the host
//!   may look at shared state, and releases them afterwards.
//!
//! Architecture specifics (register encoding, instruction patching,
//! hardware breakpoints, cache maintenance) and packet framing stay
//! behind the [`TargetArch`] and [`PacketIo`] traits.
//!
//! # Example
//!
//! ```ignore
//! use kgdb::{MemRegion, RegionAttrs, Stub, StubConfig};
//!
//! let stub = Stub::new(arch, uart_link, StubConfig {
//!     regions: vec![MemRegion::new(ram_start, ram_end, RegionAttrs::RW)],
//!     primary_core: 0,
//! });
//! // From the fault handler, on any core:
//! stub.handle_exception(&mut frame);
//! ```

pub mod arch;
pub mod breakpoint;
pub mod dispatch;
mod error;
pub mod region;
pub mod rendezvous;
mod session;
pub mod stub;
pub mod sync;
pub mod transport;

pub use arch::{CoreId, Role, TargetArch, WatchHit, WatchKind};
pub use breakpoint::{BREAKPOINT_SLOTS, BreakpointKind, BreakpointTable, SlotState};
pub use dispatch::Command;
pub use error::{Error, Result};
pub use region::{MemRegion, RegionAttrs, RegionTable};
pub use rendezvous::{Coordinator, MAX_CORES};
pub use stub::{Stub, StubConfig};
pub use sync::{Backoff, SpinBackoff};
pub use transport::PacketIo;
