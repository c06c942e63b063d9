//! The sampling loop
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ sleep(interval) → flag set? → pause → walk → write → resume  │
//!   └──────────────▲────────────────────────────────────────┬──────┘
//!                  └────────────────────────────────────────┘
//! ```
//!
//! Failure policy:
//! - pause or resume fails: fatal, the session ends with an error
//! - the walk fails: the guest is resumed, nothing is written, and the next
//!   tick retries
//! - the output stream fails: fatal, raised only after the guest is resumed

use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use super::stack_walker::{walk, StackBuffer};
use super::termination::RunFlag;
use crate::domain::{SamplerError, VcpuId};
use crate::export::{OutputFormat, TraceWriter};
use crate::introspection::{AddressMode, Introspector};

/// Default time between samples
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(10);

/// Typed session settings, built from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    pub interval: Duration,
    /// `None` samples until interrupted
    pub timeout: Option<Duration>,
    pub mode: AddressMode,
    pub format: OutputFormat,
    pub vcpu: VcpuId,
    pub debug: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: None,
            mode: AddressMode::Virtual,
            format: OutputFormat::Flamegraph,
            vcpu: VcpuId(0),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Running,
    /// Stop requested; draining the current iteration
    Stopping,
    Terminated,
}

/// What a single tick produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Written,
    /// The walk succeeded but found no frames; a frameless record was written
    Empty,
    /// The walk failed; the guest was resumed and nothing was written
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleStats {
    pub ticks: u64,
    /// Records written, frameless ones included
    pub written: u64,
    pub empty: u64,
    pub failed: u64,
}

/// Drives pause → walk → write → resume at a fixed interval
pub struct Sampler<'m, I: Introspector + ?Sized, W: Write> {
    machine: &'m mut I,
    writer: TraceWriter<W>,
    buffer: StackBuffer,
    config: SamplerConfig,
    run_flag: RunFlag,
    state: SamplerState,
    /// Set between a successful pause and the matching resume
    paused: bool,
    stats: SampleStats,
}

impl<'m, I: Introspector + ?Sized, W: Write> Sampler<'m, I, W> {
    pub fn new(
        machine: &'m mut I,
        writer: TraceWriter<W>,
        config: SamplerConfig,
        run_flag: RunFlag,
    ) -> Self {
        Self {
            machine,
            writer,
            buffer: StackBuffer::new(),
            config,
            run_flag,
            state: SamplerState::Idle,
            paused: false,
            stats: SampleStats::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> SamplerState {
        self.state
    }

    #[must_use]
    pub fn stats(&self) -> SampleStats {
        self.stats
    }

    /// Sample until the run flag is cleared
    ///
    /// # Errors
    /// Returns the first fatal error (pause, resume or output failure).
    /// Soft walk failures are logged and retried on the next tick.
    pub fn run(&mut self) -> Result<SampleStats, SamplerError> {
        self.state = SamplerState::Running;
        let started = Instant::now();

        while self.run_flag.is_running() {
            thread::sleep(self.config.interval);

            // a trigger may have fired while we slept
            if !self.run_flag.is_running() {
                break;
            }

            if let Err(e) = self.tick() {
                self.state = SamplerState::Terminated;
                return Err(e);
            }
        }

        self.state = SamplerState::Stopping;
        if let Some(reason) = self.run_flag.stop_reason() {
            info!(
                "{reason}, ending stack tracing after {:.1}s ({} records)",
                started.elapsed().as_secs_f64(),
                self.writer.records()
            );
        }
        let result = self.finish();
        self.state = SamplerState::Terminated;
        result.map(|()| self.stats)
    }

    /// Take one sample
    ///
    /// # Errors
    /// Returns fatal errors only; a failed walk yields [`TickOutcome::Skipped`].
    pub fn tick(&mut self) -> Result<TickOutcome, SamplerError> {
        self.stats.ticks += 1;

        self.machine.pause().map_err(SamplerError::Pause)?;
        self.paused = true;

        let walked =
            walk(&mut self.buffer, &mut *self.machine, self.config.vcpu, self.config.mode, self.config.debug);
        let written = match walked {
            Ok(trace) => {
                let outcome = if trace.is_empty() { TickOutcome::Empty } else { TickOutcome::Written };
                self.writer.write_trace(trace).map(|()| outcome)
            }
            Err(e) => {
                warn!("{}, resuming guest and retrying", SamplerError::Walk(e));
                Ok(TickOutcome::Skipped)
            }
        };

        self.resume()?;
        let outcome = written.map_err(SamplerError::Output)?;

        match outcome {
            TickOutcome::Written => self.stats.written += 1,
            TickOutcome::Empty => {
                self.stats.written += 1;
                self.stats.empty += 1;
            }
            TickOutcome::Skipped => self.stats.failed += 1,
        }
        Ok(outcome)
    }

    fn resume(&mut self) -> Result<(), SamplerError> {
        self.machine.resume().map_err(SamplerError::Resume)?;
        self.paused = false;
        Ok(())
    }

    /// Release the guest if still held and flush buffered records
    fn finish(&mut self) -> Result<(), SamplerError> {
        if self.paused {
            self.resume()?;
        }
        self.writer.flush().map_err(SamplerError::Output)
    }

    /// Hand back the output stream once sampling is over
    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }
}
