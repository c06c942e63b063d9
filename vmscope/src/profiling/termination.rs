//! Session termination: the shared run flag and what clears it
//!
//! Both triggers (Ctrl+C and the optional session timeout) do nothing but
//! flip the flag. The sampler polls it after each interval sleep, so a walk
//! in progress always completes and the guest is always resumed.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const RUNNING: u8 = 0;

/// Why the sampling loop was asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StopReason {
    Interrupted = 1,
    TimedOut = 2,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => f.write_str("interrupted"),
            Self::TimedOut => f.write_str("timeout reached"),
        }
    }
}

/// Monotonic run flag shared between the sampler and its stop triggers
///
/// Once cleared it stays cleared; the first trigger to fire decides the
/// reported [`StopReason`].
#[derive(Debug, Clone, Default)]
pub struct RunFlag(Arc<AtomicU8>);

impl RunFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire) == RUNNING
    }

    /// Clear the flag; a no-op if it was already cleared
    pub fn stop(&self, reason: StopReason) {
        let _ = self.0.compare_exchange(RUNNING, reason as u8, Ordering::AcqRel, Ordering::Acquire);
    }

    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self.0.load(Ordering::Acquire) {
            1 => Some(StopReason::Interrupted),
            2 => Some(StopReason::TimedOut),
            _ => None,
        }
    }
}

/// Clear `flag` on SIGINT
///
/// # Errors
/// Fails if a handler is already installed for this process.
pub fn install_interrupt_handler(flag: &RunFlag) -> Result<(), ctrlc::Error> {
    let flag = flag.clone();
    ctrlc::set_handler(move || flag.stop(StopReason::Interrupted))
}

/// Clear `flag` once `timeout` has elapsed
///
/// # Errors
/// Fails if the timer thread cannot be spawned.
pub fn arm_timeout(flag: &RunFlag, timeout: Duration) -> std::io::Result<JoinHandle<()>> {
    let flag = flag.clone();
    thread::Builder::new().name("vmscope-timeout".to_string()).spawn(move || {
        thread::sleep(timeout);
        flag.stop(StopReason::TimedOut);
    })
}
