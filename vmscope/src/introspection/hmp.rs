//! Parsers for QEMU human-monitor output
//!
//! QMP has no structured command for guest memory or x86 register reads, so
//! the backend tunnels HMP commands through `human-monitor-command` and
//! parses the text that comes back:
//!
//! ```text
//! info registers   RAX=0000000000000000 RBX=ffffffff82613940 ...
//!                  RSI=... RDI=... RBP=ffffc90000013e48 RSP=ffffc90000013e28
//!                  RIP=ffffffff81c3b5e4 RFL=00000246 [---Z-P-] CPL=0 ...
//!                  CR0=80050033 CR2=00007f2d6c1b3000 CR3=000000010a2c4000 ...
//! x /1gx 0x...     ffffc90000013e48: 0xffffc90000013e80
//! xp /1gx 0x...    0000000102c13e48: 0xffffc90000013e80
//! gva2gpa 0x...    gpa: 0x102c13e48
//! ```

use super::RegisterSnapshot;
use crate::domain::{GuestPhysAddr, GuestVirtAddr, IntrospectionError, VcpuId};

/// Monitor command reading one quadword at a virtual address
#[must_use]
pub fn read_virtual_command(addr: GuestVirtAddr) -> String {
    format!("x /1gx 0x{addr:x}")
}

/// Monitor command reading one quadword at a physical address
#[must_use]
pub fn read_physical_command(addr: GuestPhysAddr) -> String {
    format!("xp /1gx 0x{addr:x}")
}

#[must_use]
pub fn translate_command(addr: GuestVirtAddr) -> String {
    format!("gva2gpa 0x{addr:x}")
}

pub const INFO_REGISTERS: &str = "info registers";

/// Parse `info registers` output for the registers the walker needs
///
/// # Errors
/// Returns [`IntrospectionError::MissingRegister`] if `RBP` (or one of the
/// other required registers) is absent, e.g. for a 32-bit guest.
pub fn parse_registers(vcpu: VcpuId, text: &str) -> Result<RegisterSnapshot, IntrospectionError> {
    let find = |register: &'static str| -> Result<u64, IntrospectionError> {
        text.split_whitespace()
            .find_map(|token| {
                let value = token.strip_prefix(register)?.strip_prefix('=')?;
                u64::from_str_radix(value, 16).ok()
            })
            .ok_or(IntrospectionError::MissingRegister { vcpu, register })
    };

    Ok(RegisterSnapshot { rip: find("RIP")?, rsp: find("RSP")?, rbp: find("RBP")?, cr3: find("CR3")? })
}

/// Parse one `x`/`xp` line: `<addr>: 0x<value>`
///
/// Returns `None` when the monitor reported the address as inaccessible.
#[must_use]
pub fn parse_memory_word(text: &str) -> Option<u64> {
    let (_, values) = text.lines().find_map(|line| line.split_once(": "))?;
    let first = values.split_whitespace().next()?;
    u64::from_str_radix(first.strip_prefix("0x")?, 16).ok()
}

/// Parse `gva2gpa` output: `gpa: 0x<paddr>`
///
/// Returns `None` for `Unmapped` or any error text.
#[must_use]
pub fn parse_translation(text: &str) -> Option<GuestPhysAddr> {
    let value = text.trim().strip_prefix("gpa: 0x")?;
    u64::from_str_radix(value, 16).ok().map(GuestPhysAddr)
}
