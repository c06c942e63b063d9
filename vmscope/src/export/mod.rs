//! Trace export functionality
//!
//! One record is written per successful sample, either as a human-readable
//! block or as a folded stack line for flamegraph tooling.

pub mod folded;

pub use folded::{format_trace, OutputFormat, TraceWriter};
