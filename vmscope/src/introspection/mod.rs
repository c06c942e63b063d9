//! # Guest Introspection
//!
//! The sampler never touches guest memory directly. Everything it needs from
//! the inspected machine goes through the narrow [`Introspector`] trait:
//!
//! ```text
//! ┌──────────────┐  get_registers / read_u64_*   ┌───────────────────┐
//! │ Stack Walker │ ────────────────────────────▶ │    Introspector   │
//! └──────────────┘  translate / resolve_symbol   │  (QemuMachine,    │
//! ┌──────────────┐                               │   test doubles)   │
//! │ Sampler Loop │ ──────── pause / resume ────▶ │                   │
//! └──────────────┘                               └───────────────────┘
//! ```
//!
//! ## Address modes
//!
//! Frame records can be read two ways, selected once per session by
//! [`AddressMode`]:
//!
//! - **Virtual**: read straight from the guest's virtual address space.
//! - **Physical**: translate virtual → physical first, then read guest RAM.
//!   Useful when the backend's virtual reads go through a different set of
//!   page tables than the sampled vCPU.
//!
//! Both strategies sit behind [`read_guest_u64`], so the walking algorithm
//! exists exactly once.
//!
//! ## Backends
//!
//! - [`qmp`]: QEMU machine protocol over a unix socket (`-qmp unix:...`)
//! - [`hmp`]: parsers for the human-monitor text QEMU returns

pub mod hmp;
pub mod qmp;

pub use qmp::{QemuMachine, QmpClient};

use crate::domain::{GuestPhysAddr, GuestVirtAddr, IntrospectionError, VcpuId};

pub type Result<T> = std::result::Result<T, IntrospectionError>;

/// Register state of one vCPU at the moment the guest was paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterSnapshot {
    pub rip: u64,
    pub rsp: u64,
    /// Base pointer: head of the frame-pointer chain
    pub rbp: u64,
    pub cr3: u64,
}

impl RegisterSnapshot {
    #[must_use]
    pub fn frame_pointer(&self) -> GuestVirtAddr {
        GuestVirtAddr(self.rbp)
    }
}

/// How frame records are read from guest memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    #[default]
    Virtual,
    /// Virtual-to-physical translation followed by a physical read
    Physical,
}

impl AddressMode {
    #[must_use]
    pub fn from_vmem_flag(vmem_enabled: bool) -> Self {
        if vmem_enabled {
            Self::Physical
        } else {
            Self::Virtual
        }
    }
}

/// Access to a running guest: registers, memory, symbols, run control
///
/// Every operation is fallible and failures are reported, never replaced
/// with a default value. The only exception is [`resolve_symbol`], where a
/// lookup miss is `Ok(None)` rather than an error.
///
/// [`resolve_symbol`]: Introspector::resolve_symbol
pub trait Introspector {
    fn get_registers(&mut self, vcpu: VcpuId) -> Result<RegisterSnapshot>;

    fn translate_virtual_to_physical(&mut self, addr: GuestVirtAddr) -> Result<GuestPhysAddr>;

    fn read_u64_virtual(&mut self, addr: GuestVirtAddr) -> Result<u64>;

    fn read_u64_physical(&mut self, addr: GuestPhysAddr) -> Result<u64>;

    fn resolve_symbol(&mut self, addr: GuestVirtAddr) -> Result<Option<String>>;

    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;
}

/// Read one 64-bit word at a guest virtual address using `mode`
///
/// # Errors
/// Propagates translation and read failures from the backend unchanged.
pub fn read_guest_u64<I: Introspector + ?Sized>(
    machine: &mut I,
    mode: AddressMode,
    addr: GuestVirtAddr,
) -> Result<u64> {
    match mode {
        AddressMode::Virtual => machine.read_u64_virtual(addr),
        AddressMode::Physical => {
            let paddr = machine.translate_virtual_to_physical(addr)?;
            machine.read_u64_physical(paddr)
        }
    }
}
