//! # Symbol Resolution for Guest Code
//!
//! The stack walker produces raw return addresses such as
//! `0xffffffff81c3b5e4`. Turning them into `default_idle` or
//! `uk_sched_thread_sleep` needs a symbol table for the code the guest is
//! running, which has to come from outside the guest:
//!
//! - **`System.map` / `/proc/kallsyms`** text dumps, the usual artefact of a
//!   Linux kernel build. Handled by [`KernelSymbols`].
//! - **ELF images** (`vmlinux`, unikernel `.dbg` images). Handled by
//!   [`ElfSymbolizer`], which prefers DWARF (via `addr2line`) and falls back
//!   to the ELF symbol table.
//!
//! Guest kernels are linked at fixed virtual addresses, so unlike userspace
//! PIE binaries no load-bias adjustment is needed: the return address read
//! from the stack is looked up as-is.
//!
//! ## Lookup semantics
//!
//! A return address points *into* a function, almost never at its first
//! byte, so both resolvers answer with the symbol that contains the address
//! (nearest preceding start), not only exact matches.
//!
//! ## Module Structure
//!
//! - **`kallsyms`**: `System.map` parsing and sorted-table lookup
//! - **`symbolizer`**: ELF/DWARF symbolization with a per-address cache

pub mod kallsyms;
pub mod symbolizer;

pub use kallsyms::KernelSymbols;
pub use symbolizer::ElfSymbolizer;

use crate::domain::SymbolError;
use log::info;
use std::path::Path;

/// Maps a guest code address to a function name
pub trait SymbolResolver {
    fn resolve(&self, addr: u64) -> Option<String>;
}

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// Load a symbol source, picking the parser from the file's contents
///
/// # Errors
/// Returns an error if the file cannot be read or holds no usable symbols.
pub fn load_symbols<P: AsRef<Path>>(path: P) -> Result<Box<dyn SymbolResolver>, SymbolError> {
    let path = path.as_ref();
    let data = std::fs::read(path)
        .map_err(|source| SymbolError::Read { path: path.to_path_buf(), source })?;

    if data.starts_with(ELF_MAGIC) {
        let symbolizer = ElfSymbolizer::from_bytes(path, &data)?;
        info!("Loaded ELF symbols from {}", path.display());
        Ok(Box::new(symbolizer))
    } else {
        let text = String::from_utf8_lossy(&data);
        let symbols = KernelSymbols::parse(path, &text)?;
        info!("Loaded {} text symbols from {}", symbols.len(), path.display());
        Ok(Box::new(symbols))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_symbols_text_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ffffffff81000000 T _stext").unwrap();
        writeln!(file, "ffffffff81001000 T do_idle").unwrap();

        let resolver = load_symbols(file.path()).unwrap();
        assert_eq!(resolver.resolve(0xffff_ffff_8100_1042).as_deref(), Some("do_idle"));
    }

    #[test]
    fn test_load_symbols_missing_file() {
        let err = load_symbols("/nonexistent/System.map").err().unwrap();
        assert!(matches!(err, SymbolError::Read { .. }));
    }
}
