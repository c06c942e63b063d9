use addr2line::Context;
use gimli::{EndianRcSlice, RunTimeEndian};
use log::debug;
use object::{Object, ObjectSection, ObjectSymbol, SymbolKind};
use rustc_demangle::demangle;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use super::SymbolResolver;
use crate::domain::SymbolError;

#[derive(Debug, Clone)]
struct TextSymbol {
    addr: u64,
    size: u64,
    name: String,
}

/// Symbolizer for guest images linked at their run-time addresses
///
/// Includes a cache, since a sampling session hits the same few hundred
/// return addresses over and over.
pub struct ElfSymbolizer {
    ctx: Context<EndianRcSlice<RunTimeEndian>>,
    has_dwarf: bool,
    /// Sized text symbols from `.symtab`, sorted by address
    symbols: Vec<TextSymbol>,
    cache: RefCell<HashMap<u64, Option<String>>>,
}

impl ElfSymbolizer {
    /// Create a symbolizer for the ELF image at `path`
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or carries
    /// neither DWARF nor a symbol table.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, SymbolError> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|source| SymbolError::Read { path: path.to_path_buf(), source })?;
        Self::from_bytes(path, &data)
    }

    /// Create a symbolizer from an image already in memory
    ///
    /// # Errors
    /// Same as [`new`](Self::new), minus the read.
    pub fn from_bytes(path: &Path, data: &[u8]) -> Result<Self, SymbolError> {
        let elf_error =
            |reason: String| SymbolError::Elf { path: path.to_path_buf(), reason };

        let obj_file = object::File::parse(data).map_err(|e| elf_error(e.to_string()))?;

        let endian =
            if obj_file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section =
            |id: gimli::SectionId| -> Result<EndianRcSlice<RunTimeEndian>, gimli::Error> {
                let data = obj_file
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
                Ok(EndianRcSlice::new(Rc::from(&*data), endian))
            };

        let dwarf = gimli::Dwarf::load(&load_section).map_err(|e| elf_error(e.to_string()))?;
        let ctx = Context::from_dwarf(dwarf).map_err(|e| elf_error(e.to_string()))?;
        let has_dwarf = obj_file.section_by_name(".debug_info").is_some_and(|s| s.size() > 0);

        let mut symbols: Vec<TextSymbol> = obj_file
            .symbols()
            .filter(|sym| sym.kind() == SymbolKind::Text && sym.address() != 0)
            .filter_map(|sym| {
                let name = sym.name().ok().filter(|name| !name.is_empty())?;
                Some(TextSymbol { addr: sym.address(), size: sym.size(), name: Self::demangle_symbol(name) })
            })
            .collect();
        symbols.sort_by_key(|s| s.addr);

        if symbols.is_empty() && !has_dwarf {
            return Err(SymbolError::Empty(path.to_path_buf()));
        }
        debug!(
            "{}: {} text symbols, DWARF {}",
            path.display(),
            symbols.len(),
            if has_dwarf { "present" } else { "absent" }
        );

        Ok(Self { ctx, has_dwarf, symbols, cache: RefCell::new(HashMap::new()) })
    }

    /// Demangle a Rust symbol name; other names pass through unchanged
    #[must_use]
    pub fn demangle_symbol(symbol: &str) -> String {
        format!("{:#}", demangle(symbol))
    }

    fn resolve_dwarf(&self, addr: u64) -> Option<String> {
        if !self.has_dwarf {
            return None;
        }
        let mut frames = self.ctx.find_frames(addr).skip_all_loads().ok()?;
        // innermost (possibly inlined) function first
        while let Ok(Some(frame)) = frames.next() {
            if let Some(name) = frame.function.and_then(|f| f.demangle().ok().map(|s| s.to_string())) {
                return Some(name);
            }
        }
        None
    }

    fn resolve_symtab(&self, addr: u64) -> Option<String> {
        let idx = self.symbols.partition_point(|s| s.addr <= addr).checked_sub(1)?;
        let sym = &self.symbols[idx];
        // unsized symbols (hand-written asm) cover everything up to the next one
        if sym.size == 0 || addr < sym.addr + sym.size {
            Some(sym.name.clone())
        } else {
            None
        }
    }
}

impl SymbolResolver for ElfSymbolizer {
    fn resolve(&self, addr: u64) -> Option<String> {
        if let Some(cached) = self.cache.borrow().get(&addr) {
            return cached.clone();
        }

        let resolved = self.resolve_dwarf(addr).or_else(|| self.resolve_symtab(addr));
        self.cache.borrow_mut().insert(addr, resolved.clone());
        resolved
    }
}
