//! Domain types providing compile-time safety and self-documentation
//!
//! Guest virtual and guest physical addresses are both plain `u64`s on the
//! wire. Wrapping them keeps a translated address from being fed back into a
//! virtual read by accident.

use std::fmt;

/// Address in the guest's virtual address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GuestVirtAddr(pub u64);

impl GuestVirtAddr {
    /// Returns true for the null address, which terminates a frame chain
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `bytes` further on, or `None` on overflow
    #[must_use]
    pub fn checked_add(self, bytes: u64) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

impl fmt::Display for GuestVirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::LowerHex for GuestVirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<u64> for GuestVirtAddr {
    fn from(addr: u64) -> Self {
        Self(addr)
    }
}

/// Address in guest physical memory (after page-table translation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuestPhysAddr(pub u64);

impl fmt::Display for GuestPhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::LowerHex for GuestPhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Virtual CPU index inside the guest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VcpuId(pub u32);

impl fmt::Display for VcpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vCPU#{}", self.0)
    }
}
