//! `System.map` / `/proc/kallsyms` symbol tables
//!
//! Each line is `<hex address> <type> <name>`, optionally followed by a
//! tab and a `[module]` tag in kallsyms output. Only text symbols
//! (`t`, `T`, `w`, `W`) can be the target of a return address; data
//! symbols are dropped so they never shadow the enclosing function.

use super::SymbolResolver;
use crate::domain::SymbolError;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Symbol {
    addr: u64,
    name: String,
}

/// Sorted table of text symbols
#[derive(Debug, Clone)]
pub struct KernelSymbols {
    symbols: Vec<Symbol>,
}

impl KernelSymbols {
    /// Parse a symbol table. `path` is only used in error messages.
    ///
    /// # Errors
    /// Returns an error for lines that are not `<hex> <type> <name>`, or if
    /// no text symbols remain after filtering.
    pub fn parse(path: &Path, text: &str) -> Result<Self, SymbolError> {
        let mut symbols = Vec::new();

        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let malformed = || SymbolError::Parse { path: path.to_path_buf(), line: lineno + 1 };

            let mut fields = line.split_whitespace();
            let (Some(addr), Some(kind), Some(name)) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(malformed());
            };
            let addr = u64::from_str_radix(addr, 16).map_err(|_| malformed())?;

            // kallsyms read without privileges reports every address as 0
            if addr == 0 || !matches!(kind, "t" | "T" | "w" | "W") {
                continue;
            }
            symbols.push(Symbol { addr, name: name.to_string() });
        }

        if symbols.is_empty() {
            return Err(SymbolError::Empty(path.to_path_buf()));
        }

        symbols.sort_by_key(|s| s.addr);
        // aliases share an address; keep the first name listed
        symbols.dedup_by_key(|s| s.addr);

        Ok(Self { symbols })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Name of the symbol starting at or closest below `addr`
    #[must_use]
    pub fn lookup(&self, addr: u64) -> Option<&str> {
        let idx = self.symbols.partition_point(|s| s.addr <= addr);
        idx.checked_sub(1).map(|i| self.symbols[i].name.as_str())
    }
}

impl SymbolResolver for KernelSymbols {
    fn resolve(&self, addr: u64) -> Option<String> {
        self.lookup(addr).map(str::to_string)
    }
}
