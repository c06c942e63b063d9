//! Profiling core modules
//!
//! - Stack walking over guest memory (frame-pointer chains)
//! - The sampling loop with pause/resume around every walk
//! - Session termination (interrupt and timeout)

pub mod sampler;
pub mod stack_walker;
pub mod termination;

pub use sampler::{SampleStats, Sampler, SamplerConfig, SamplerState, TickOutcome};
pub use stack_walker::{
    walk, StackBuffer, StackFrame, StackTrace, STACK_FRAME_LIMIT, UNKNOWN_SYMBOL,
};
pub use termination::{arm_timeout, install_interrupt_handler, RunFlag, StopReason};
