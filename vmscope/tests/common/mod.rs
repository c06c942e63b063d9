//! Scripted in-memory guest shared by the integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use vmscope::domain::{GuestPhysAddr, GuestVirtAddr, IntrospectionError, VcpuId};
use vmscope::introspection::{Introspector, RegisterSnapshot, Result};
use vmscope::profiling::{RunFlag, StopReason};

/// Offset between guest virtual and guest physical addresses
pub const DIRECT_MAP: u64 = 0xffff_8880_0000_0000;

pub const FP0: u64 = DIRECT_MAP + 0x3e00;
pub const FP1: u64 = DIRECT_MAP + 0x3e40;
pub const FP2: u64 = DIRECT_MAP + 0x3e80;
pub const FP3: u64 = DIRECT_MAP + 0x3ec0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Pause,
    Resume,
    Registers,
    Read,
}

#[derive(Default)]
pub struct ScriptedGuest {
    pub memory: HashMap<u64, u64>,
    pub symbols: HashMap<u64, String>,
    pub rbp: u64,
    pub paused: bool,
    pub calls: Vec<Call>,
    /// 1-based pause numbers during which every memory read fails
    pub failing_ticks: HashSet<usize>,
    pub fail_pause: bool,
    pub fail_resume: bool,
    /// Clear the flag once this many pauses have happened
    pub stop_after: Option<(usize, RunFlag)>,
}

impl ScriptedGuest {
    /// Guest whose stack is foo → bar → main, terminated by a null link
    pub fn three_frames() -> Self {
        let mut guest = Self { rbp: FP0, ..Self::default() };
        for (fp, next, ra, name) in [
            (FP0, FP1, 0xffff_ffff_8100_1100, "foo"),
            (FP1, FP2, 0xffff_ffff_8100_2200, "bar"),
            (FP2, FP3, 0xffff_ffff_8100_3300, "main"),
        ] {
            guest.memory.insert(fp, next);
            guest.memory.insert(fp + 8, ra);
            guest.symbols.insert(ra, name.to_string());
        }
        guest.memory.insert(FP3, 0);
        guest.memory.insert(FP3 + 8, 0xffff_ffff_8100_4400);
        guest
    }

    pub fn stop_after(mut self, pauses: usize, flag: &RunFlag) -> Self {
        self.stop_after = Some((pauses, flag.clone()));
        self
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    fn pauses(&self) -> usize {
        self.count(Call::Pause)
    }

    fn read(&mut self, addr: u64) -> Option<u64> {
        self.calls.push(Call::Read);
        assert!(self.paused, "guest memory read while the guest was running");
        if self.failing_ticks.contains(&self.pauses()) {
            return None;
        }
        self.memory.get(&addr).copied()
    }
}

impl Introspector for ScriptedGuest {
    fn get_registers(&mut self, _vcpu: VcpuId) -> Result<RegisterSnapshot> {
        self.calls.push(Call::Registers);
        Ok(RegisterSnapshot { rbp: self.rbp, ..RegisterSnapshot::default() })
    }

    fn translate_virtual_to_physical(&mut self, addr: GuestVirtAddr) -> Result<GuestPhysAddr> {
        addr.0.checked_sub(DIRECT_MAP).map(GuestPhysAddr).ok_or(IntrospectionError::Unmapped(addr))
    }

    fn read_u64_virtual(&mut self, addr: GuestVirtAddr) -> Result<u64> {
        self.read(addr.0).ok_or(IntrospectionError::UnreadableVirtual(addr))
    }

    fn read_u64_physical(&mut self, addr: GuestPhysAddr) -> Result<u64> {
        self.read(addr.0 + DIRECT_MAP).ok_or(IntrospectionError::UnreadablePhysical(addr))
    }

    fn resolve_symbol(&mut self, addr: GuestVirtAddr) -> Result<Option<String>> {
        Ok(self.symbols.get(&addr.0).cloned())
    }

    fn pause(&mut self) -> Result<()> {
        if self.fail_pause {
            return Err(IntrospectionError::Command {
                command: "stop".to_string(),
                class: "GenericError".to_string(),
                desc: "injected".to_string(),
            });
        }
        self.calls.push(Call::Pause);
        self.paused = true;
        if let Some((limit, ref flag)) = self.stop_after {
            if self.pauses() >= limit {
                flag.stop(StopReason::Interrupted);
            }
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.calls.push(Call::Resume);
        if self.fail_resume {
            return Err(IntrospectionError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "injected",
            )));
        }
        self.paused = false;
        Ok(())
    }
}
