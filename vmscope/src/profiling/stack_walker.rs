//! Frame-pointer stack walking over guest memory
//!
//! On x86-64 with frame pointers preserved, every frame starts with the
//! classic record pushed by the prologue (`push rbp; mov rbp, rsp`):
//!
//! ```text
//!   fp + 8  ──▶ return address into the caller
//!   fp      ──▶ caller's saved frame pointer ──▶ next record
//! ```
//!
//! The walk starts at the paused vCPU's `RBP` and follows the chain until a
//! null or self-referencing link, or until [`STACK_FRAME_LIMIT`] frames have
//! been collected. No CFI fallback is attempted: code built without frame
//! pointers simply yields a short (or garbage-terminated) chain.

use log::debug;

use crate::domain::{FrameSlot, GuestVirtAddr, VcpuId, WalkError};
use crate::introspection::{read_guest_u64, AddressMode, Introspector, RegisterSnapshot};

/// Maximum number of frames collected per sample
pub const STACK_FRAME_LIMIT: usize = 35;

/// Label used when no symbol covers a return address
pub const UNKNOWN_SYMBOL: &str = "unknown";

const ADDRESS_SIZE: u64 = std::mem::size_of::<u64>() as u64;

/// One slot of the reusable frame buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackFrame {
    pub frame_pointer: GuestVirtAddr,
    pub return_address: GuestVirtAddr,
    /// Resolved symbol or [`UNKNOWN_SYMBOL`]; `None` for slots past the trace
    pub label: Option<String>,
}

impl StackFrame {
    /// Label as emitted in output; only meaningful for slots inside a trace
    #[must_use]
    pub fn symbol(&self) -> &str {
        self.label.as_deref().unwrap_or(UNKNOWN_SYMBOL)
    }
}

/// The frames produced by one walk, innermost first
pub type StackTrace<'a> = &'a [StackFrame];

/// Fixed-capacity frame storage, allocated once and overwritten by every walk
pub struct StackBuffer {
    frames: Vec<StackFrame>,
    len: usize,
}

impl Default for StackBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl StackBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self { frames: vec![StackFrame::default(); STACK_FRAME_LIMIT], len: 0 }
    }

    /// Frames kept from the last successful walk
    #[must_use]
    pub fn trace(&self) -> StackTrace<'_> {
        &self.frames[..self.len]
    }

    /// Walk the guest stack described by `registers`
    ///
    /// On error the partially filled buffer is discarded: [`trace`](Self::trace)
    /// is empty until the next successful walk.
    ///
    /// # Errors
    /// Any failed memory read, translation or symbol lookup aborts the walk.
    pub fn walk<I: Introspector + ?Sized>(
        &mut self,
        registers: &RegisterSnapshot,
        machine: &mut I,
        mode: AddressMode,
        debug: bool,
    ) -> Result<StackTrace<'_>, WalkError> {
        self.len = 0;

        let mut frame_pointer = registers.frame_pointer();
        let mut index = 0;
        let result = loop {
            if frame_pointer.is_null() || index >= STACK_FRAME_LIMIT {
                break Ok(());
            }
            if debug {
                debug!("frame {index}: frame pointer {frame_pointer}");
            }
            match self.fill_slot(index, frame_pointer, machine, mode, debug) {
                Ok(Some(next)) => {
                    frame_pointer = next;
                    index += 1;
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        // slots past the trace (or all of them, on failure) carry no label
        let used = if result.is_ok() { index } else { 0 };
        for slot in &mut self.frames[used..] {
            slot.label = None;
        }

        result?;
        self.len = index;
        Ok(self.trace())
    }

    /// Record frame `index`; returns the next frame pointer, or `None` when
    /// the chain ends here
    fn fill_slot<I: Introspector + ?Sized>(
        &mut self,
        index: usize,
        frame_pointer: GuestVirtAddr,
        machine: &mut I,
        mode: AddressMode,
        debug: bool,
    ) -> Result<Option<GuestVirtAddr>, WalkError> {
        let slot = &mut self.frames[index];
        slot.label = None;
        slot.frame_pointer = frame_pointer;

        let next = read_guest_u64(machine, mode, frame_pointer).map_err(|source| WalkError::Read {
            index,
            slot: FrameSlot::SavedFramePointer,
            addr: frame_pointer,
            source,
        })?;
        let next = GuestVirtAddr(next);

        if next.is_null() || next == frame_pointer {
            if debug {
                debug!("frame {index}: invalid or cyclic frame pointer {next}, stopping");
            }
            return Ok(None);
        }

        let ra_addr = frame_pointer
            .checked_add(ADDRESS_SIZE)
            .ok_or(WalkError::AddressOverflow { index, addr: frame_pointer })?;
        let return_address =
            read_guest_u64(machine, mode, ra_addr).map_err(|source| WalkError::Read {
                index,
                slot: FrameSlot::ReturnAddress,
                addr: ra_addr,
                source,
            })?;
        let return_address = GuestVirtAddr(return_address);

        let label = machine
            .resolve_symbol(return_address)
            .map_err(|source| WalkError::Symbol { addr: return_address, source })?
            .unwrap_or_else(|| UNKNOWN_SYMBOL.to_string());

        if debug {
            debug!("frame {index}: return address {return_address} ({label})");
        }

        slot.return_address = return_address;
        slot.label = Some(label);
        Ok(Some(next))
    }
}

/// Read the vCPU's registers and walk its stack into `buffer`
///
/// # Errors
/// Fails if the registers cannot be read or the walk aborts.
pub fn walk<'a, I: Introspector + ?Sized>(
    buffer: &'a mut StackBuffer,
    machine: &mut I,
    vcpu: VcpuId,
    mode: AddressMode,
    debug: bool,
) -> Result<StackTrace<'a>, WalkError> {
    let registers = machine.get_registers(vcpu).map_err(WalkError::Registers)?;
    if debug {
        debug!("{vcpu}: rip=0x{:x} rsp=0x{:x} rbp=0x{:x}", registers.rip, registers.rsp, registers.rbp);
    }
    buffer.walk(&registers, machine, mode, debug)
}
