#![allow(clippy::format_push_string)]

use serde::Serialize;
use std::path::{Path, PathBuf};

use super::index::{DebugTables, SymbolTable};
use crate::domain::Addr;

/// Queryable form of one symbol source
///
/// Holds the symbol table and optional DWARF tables in link-time addresses
/// plus the bias that translates them into the runtime address space
/// (`runtime = link_time + bias`). Immutable once built, so one resolver
/// can be shared by any number of concurrent lookups.
#[derive(Debug)]
pub struct Resolver {
    origin: PathBuf,
    bias: u64,
    symbols: SymbolTable,
    debug: Option<DebugTables>,
}

impl Resolver {
    pub(crate) fn new(
        origin: impl Into<PathBuf>,
        bias: u64,
        symbols: SymbolTable,
        debug: Option<DebugTables>,
    ) -> Self {
        Self { origin: origin.into(), bias, symbols, debug }
    }

    /// Resolve a runtime address to the symbol covering it
    ///
    /// Returns `None` when the address is below the bias or not covered by
    /// any symbol. When the address lies in inlined code the location is the
    /// outermost call site; otherwise it is the line-table row covering the
    /// address.
    #[must_use]
    pub fn lookup(&self, addr: Addr) -> Option<SymbolMatch> {
        let link_addr = addr.checked_sub(self.bias)?;
        let symbol = self.symbols.lookup(link_addr)?;
        let start_address = symbol.address.wrapping_add(self.bias);

        let debug = self.debug.as_ref();
        if let Some(inline) = debug.and_then(|d| d.inlines.lookup(link_addr)) {
            return Some(SymbolMatch {
                name: symbol.name.clone(),
                start_address,
                file: inline.call_file.as_deref().map(str::to_string),
                line: inline.call_line,
                column: inline.call_column,
            });
        }

        let row = debug.and_then(|d| d.lines.lookup(link_addr));
        Some(SymbolMatch {
            name: symbol.name.clone(),
            start_address,
            file: row.and_then(|r| r.file.as_deref().map(str::to_string)),
            line: row.and_then(|r| r.line),
            column: row.and_then(|r| r.column),
        })
    }

    /// Append every match for `addr`: inlined callees innermost first, then
    /// the enclosing symbol
    ///
    /// Inlined matches carry the enclosing symbol's start address.
    pub fn lookup_into(&self, addr: Addr, matches: &mut Vec<SymbolMatch>) {
        let Some(outer) = self.lookup(addr) else {
            return;
        };

        let inline = self
            .debug
            .as_ref()
            .and_then(|d| d.inlines.lookup(addr.wrapping_sub(self.bias)));
        if let Some(inline) = inline {
            matches.extend(inline.frames.iter().map(|frame| SymbolMatch {
                name: frame.name.clone(),
                start_address: outer.start_address,
                file: frame.file.as_deref().map(str::to_string),
                line: frame.line,
                column: frame.column,
            }));
        }
        matches.push(outer);
    }

    /// The file this resolver was built from
    #[must_use]
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    #[must_use]
    pub fn bias(&self) -> u64 {
        self.bias
    }

    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn has_line_info(&self) -> bool {
        self.debug.as_ref().is_some_and(|d| !d.lines.is_empty())
    }
}

/// One symbol an address resolved to
///
/// Source fields are `None` when no debug information covers the address;
/// they are never filled with empty or zero placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolMatch {
    pub name: String,
    pub start_address: Addr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl SymbolMatch {
    /// Byte offset of `addr` from the start of the symbol
    #[must_use]
    pub fn offset_of(&self, addr: Addr) -> u64 {
        addr.wrapping_sub(self.start_address)
    }

    /// Format the match for display
    #[must_use]
    pub fn format(&self, addr: Addr) -> String {
        let mut output = format!("0x{addr:016x} {}", self.name);

        let offset = self.offset_of(addr);
        if offset != 0 {
            output.push_str(&format!("+0x{offset:x}"));
        }

        if let Some(ref file) = self.file {
            output.push_str(&format!("\n                   at {file}"));
            if let Some(line) = self.line {
                output.push_str(&format!(":{line}"));
                if let Some(col) = self.column {
                    output.push_str(&format!(":{col}"));
                }
            }
        }

        output
    }
}
