//! Structured error types for vmscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::{GuestPhysAddr, GuestVirtAddr, VcpuId};
use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by an introspection backend
#[derive(Error, Debug)]
pub enum IntrospectionError {
    #[error("QMP transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed QMP message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("QMP command {command} failed: {class}: {desc}")]
    Command { command: String, class: String, desc: String },

    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: String },

    #[error("Cannot read guest memory at {0}")]
    UnreadableVirtual(GuestVirtAddr),

    #[error("Cannot read guest physical memory at {0}")]
    UnreadablePhysical(GuestPhysAddr),

    #[error("Virtual address {0} is not mapped")]
    Unmapped(GuestVirtAddr),

    #[error("Register {register} missing from {vcpu} register dump")]
    MissingRegister { vcpu: VcpuId, register: &'static str },
}

/// Which 8-byte slot of a frame record a read was aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSlot {
    /// `[fp]`: the caller's saved frame pointer
    SavedFramePointer,
    /// `[fp + 8]`: the return address
    ReturnAddress,
}

impl std::fmt::Display for FrameSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SavedFramePointer => f.write_str("saved frame pointer"),
            Self::ReturnAddress => f.write_str("return address"),
        }
    }
}

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("Failed to read vCPU registers: {0}")]
    Registers(#[source] IntrospectionError),

    #[error("Failed to read {slot} of frame {index} at {addr}: {source}")]
    Read {
        index: usize,
        slot: FrameSlot,
        addr: GuestVirtAddr,
        #[source]
        source: IntrospectionError,
    },

    #[error("Frame {index}: frame pointer {addr} wraps the address space")]
    AddressOverflow { index: usize, addr: GuestVirtAddr },

    #[error("Symbol lookup failed for {addr}: {source}")]
    Symbol {
        addr: GuestVirtAddr,
        #[source]
        source: IntrospectionError,
    },
}

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Failed to pause guest: {0}")]
    Pause(#[source] IntrospectionError),

    #[error("Failed to resume guest: {0}")]
    Resume(#[source] IntrospectionError),

    /// Soft: the sampler logs it and skips the sample, `run` never returns it
    #[error("Failed to collect stack trace: {0}")]
    Walk(#[from] WalkError),

    #[error("Failed to write trace record: {0}")]
    Output(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SymbolError {
    #[error("Failed to read symbol file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: malformed symbol entry")]
    Parse { path: PathBuf, line: usize },

    #[error("No text symbols found in {0}")]
    Empty(PathBuf),

    #[error("Failed to parse ELF image {path}: {reason}")]
    Elf { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_error_display() {
        let err = WalkError::Read {
            index: 3,
            slot: FrameSlot::ReturnAddress,
            addr: GuestVirtAddr(0xffff_c900_0001_3e58),
            source: IntrospectionError::UnreadableVirtual(GuestVirtAddr(0xffff_c900_0001_3e58)),
        };
        let msg = err.to_string();
        assert!(msg.contains("return address of frame 3"));
        assert!(msg.contains("0xffffc90000013e58"));
    }

    #[test]
    fn test_command_error_display() {
        let err = IntrospectionError::Command {
            command: "stop".to_string(),
            class: "GenericError".to_string(),
            desc: "VM is shutting down".to_string(),
        };
        assert_eq!(err.to_string(), "QMP command stop failed: GenericError: VM is shutting down");
    }
}
