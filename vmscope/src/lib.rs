//! # vmscope - Guest Stack Sampler for QEMU/KVM
//!
//! vmscope periodically pauses a running virtual machine, walks the
//! frame-pointer chain of one vCPU through guest memory, resolves every
//! return address to a symbol, and appends the result to a trace file,
//! either as folded stacks for flamegraph tooling or as readable blocks.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Guest (kernel / unikernel)                   │
//! │                built with frame pointers preserved              │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ QMP: stop / cont / info registers / x / xp
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      vmscope (This Crate)                       │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Sampler    │──▶│ Stack Walker │──▶│    Export    │         │
//! │  │    Loop      │   │  (fp chain)  │   │ (folded/txt) │         │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘         │
//! │         │                  │                                    │
//! │         ▼                  ▼                                    │
//! │  ┌──────────────┐   ┌──────────────┐                            │
//! │  │ Termination  │   │ Symbolizer   │                            │
//! │  │ (^C/timeout) │   │ (map / ELF)  │                            │
//! │  └──────────────┘   └──────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`profiling`]: the sampling loop, the stack walker, run-flag handling
//! - [`introspection`]: the [`Introspector`](introspection::Introspector)
//!   trait and the QMP backend
//! - [`symbolization`]: `System.map` tables and ELF/DWARF symbolization
//! - [`export`]: folded and human-readable trace records
//! - [`cli`]: command-line arguments and session configuration
//! - [`domain`]: address newtypes and error types
//! - [`preflight`]: input validation before connecting
//!
//! ## Sampling Invariants
//!
//! - At most [`STACK_FRAME_LIMIT`](profiling::STACK_FRAME_LIMIT) frames per sample
//! - A null or self-referencing saved frame pointer ends the walk
//! - The guest is paused only for the duration of one walk and is resumed
//!   on every path before the next sleep
//! - A failed walk writes nothing; the next tick retries
//!
//! ## Typical Usage
//!
//! ```bash
//! # QEMU side
//! qemu-system-x86_64 -name guest0 -qmp unix:/run/guest0.qmp,server,wait=off ...
//!
//! # Sample for 30 seconds and render a flamegraph
//! vmscope -n guest0 -s /run/guest0.qmp --symbols System.map -t 30 -o out.folded
//! inferno-flamegraph out.folded > guest.svg
//! ```

pub mod cli;
pub mod domain;
pub mod export;
pub mod introspection;
pub mod preflight;
pub mod profiling;
pub mod symbolization;
