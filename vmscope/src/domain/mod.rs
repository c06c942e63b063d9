//! Domain model for vmscope
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time separation of guest virtual and physical addresses
//! - Structured error handling for every layer of the sampler

pub mod errors;
pub mod types;

pub use types::{GuestPhysAddr, GuestVirtAddr, VcpuId};

pub use errors::{FrameSlot, IntrospectionError, SamplerError, SymbolError, WalkError};
