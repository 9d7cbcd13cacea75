//! Sorted address indices for symbol and line tables
//!
//! All tables share the same lookup rule: the entry with the greatest
//! address less than or equal to the query wins, and a sized entry only
//! covers `[address, address + size)`. Entries are not nested: an address
//! past the end of the nearest entry resolves to nothing even when an
//! earlier, larger entry would still cover it.

use crate::domain::Addr;
use std::sync::Arc;

/// An entry that starts at an address and optionally spans a known size
pub trait AddrRange {
    fn address(&self) -> Addr;
    fn size(&self) -> Option<u64>;

    /// Check if `addr` falls inside this entry's range
    ///
    /// Unsized entries extend up to the next entry in their table.
    fn covers(&self, addr: Addr) -> bool {
        addr >= self.address()
            && self.size().map_or(true, |size| addr - self.address() < size)
    }
}

/// Immutable table of entries sorted ascending by address
///
/// Duplicate addresses keep only the entry inserted last.
#[derive(Debug, Clone)]
pub struct AddrIndex<T> {
    entries: Vec<T>,
}

impl<T: AddrRange> AddrIndex<T> {
    /// Build an index from entries in insertion order
    pub fn build<I: IntoIterator<Item = T>>(entries: I) -> Self {
        let mut sorted: Vec<T> = entries.into_iter().collect();
        // Stable sort: equal addresses stay in insertion order
        sorted.sort_by_key(AddrRange::address);

        let mut entries: Vec<T> = Vec::with_capacity(sorted.len());
        for entry in sorted {
            match entries.last_mut() {
                Some(last) if last.address() == entry.address() => *last = entry,
                _ => entries.push(entry),
            }
        }
        entries.shrink_to_fit();

        Self { entries }
    }

    /// Find the entry covering `addr`, if any
    #[must_use]
    pub fn lookup(&self, addr: Addr) -> Option<&T> {
        let idx = self.entries.partition_point(|e| e.address() <= addr);
        let entry = self.entries.get(idx.checked_sub(1)?)?;
        entry.covers(addr).then_some(entry)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T: AddrRange> Default for AddrIndex<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

/// A named program entity (function or object)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub address: Addr,
    pub name: String,
    pub size: Option<u64>,
}

impl SymbolEntry {
    #[must_use]
    pub fn new(address: Addr, name: impl Into<String>, size: Option<u64>) -> Self {
        Self { address, name: name.into(), size: size.filter(|&s| s > 0) }
    }
}

impl AddrRange for SymbolEntry {
    fn address(&self) -> Addr {
        self.address
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

/// Start of a line-table row: the source position of the code at `address`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry {
    pub address: Addr,
    pub size: Option<u64>,
    pub file: Option<Arc<str>>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl AddrRange for LineEntry {
    fn address(&self) -> Addr {
        self.address
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

/// A function inlined into the code at some address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinedFrame {
    pub name: String,
    pub file: Option<Arc<str>>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

/// Inline call chain of one line-table row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineEntry {
    pub address: Addr,
    pub size: Option<u64>,
    /// Inlined callees, innermost first
    pub frames: Vec<InlinedFrame>,
    /// Where the outermost inlined call sits in the enclosing function
    pub call_file: Option<Arc<str>>,
    pub call_line: Option<u32>,
    pub call_column: Option<u32>,
}

impl AddrRange for InlineEntry {
    fn address(&self) -> Addr {
        self.address
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

pub type SymbolTable = AddrIndex<SymbolEntry>;
pub type LineTable = AddrIndex<LineEntry>;
pub type InlineTable = AddrIndex<InlineEntry>;

/// Everything extracted from DWARF for one object file
#[derive(Debug, Clone, Default)]
pub struct DebugTables {
    pub lines: LineTable,
    pub inlines: InlineTable,
}

impl DebugTables {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.inlines.is_empty()
    }
}
