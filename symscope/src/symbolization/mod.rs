//! # Symbol Resolution and Address Translation
//!
//! This module converts raw addresses (instruction pointers collected by a
//! profiler, tracer or crash handler) into symbol names, symbol start
//! addresses and, where DWARF is available, file/line/column.
//!
//! ## Sources
//!
//! A batch is resolved against an ordered list of [`SourceDescriptor`]s:
//!
//! - **ELF**: one object file plus the base address it was loaded at. The
//!   base is always explicit: a wrong base yields wrong names, not errors.
//! - **Kernel**: a kallsyms snapshot (default `/proc/kallsyms`) and,
//!   optionally, a `vmlinux` image for line information. Kernel addresses are
//!   absolute, so no translation happens.
//! - **Process**: every executable file-backed mapping in
//!   `/proc/<pid>/maps`, each resolved with its own ELF resolver placed at
//!   the mapping's load address.
//!
//! ## Address Translation
//!
//! ```text
//! Runtime Address   = Link-time Address + Bias
//! Link-time Address = Runtime Address - Bias
//! ```
//!
//! For an ELF source the bias is the caller's base address. For a process
//! module it is derived from the maps entry:
//!
//! ```text
//! 555555556000-55555555a000 r-xp 00002000 fd:01 1054 /usr/bin/app
//!
//! load address = 0x555555556000 - 0x2000          = 0x555555554000
//! bias         = load address - (p_vaddr - p_offset of the executable PT_LOAD)
//! ```
//!
//! which is the load address itself for the usual PIE layout and zero for a
//! non-PIE executable.
//!
//! ## Lookup
//!
//! Symbol and line tables are sorted by address. A lookup takes the entry
//! with the greatest address not above the query; sized entries only match
//! inside `[address, address + size)`. Duplicate addresses keep the entry
//! inserted last (`.dynsym` after `.symtab`).
//!
//! When DWARF records inlined calls at an address, each inlined function is
//! reported as its own match ahead of the enclosing symbol, innermost first.
//! The enclosing symbol then carries the outermost call site as its location.
//!
//! ## Caching
//!
//! Resolvers are cached per normalized source identity (kind, path(s), base)
//! for the lifetime of a [`Symbolizer`]. Process memory maps are re-read on
//! every call; the per-file resolvers they lead to are cached.
//!
//! ## Example
//!
//! ```rust,no_run
//! use symscope::symbolization::{SourceDescriptor, Symbolizer};
//!
//! let symbolizer = Symbolizer::new();
//! let sources = [SourceDescriptor::elf("/usr/bin/app", 0x5555_5555_4000)];
//! let results = symbolizer.symbolize(&sources, &[0x5555_5555_6780]).unwrap();
//! for found in &results[0] {
//!     println!("{}", found.format(0x5555_5555_6780));
//! }
//! ```

pub mod cache;
pub mod elf;
pub mod index;
pub mod kernel;
pub mod memory_maps;
pub mod process;
pub mod resolver;
pub mod symbolizer;

pub use cache::{CacheKey, CacheStats};
pub use index::{
    DebugTables, InlineEntry, InlineTable, InlinedFrame, LineEntry, LineTable, SymbolEntry,
    SymbolTable,
};
pub use memory_maps::{MapsEntry, MapsProvider, MemoryRange, ProcMaps};
pub use process::{ModuleMapping, ProcessImage};
pub use resolver::{Resolver, SymbolMatch};
pub use symbolizer::{QueryResult, SourceDescriptor, Symbolizer, SymbolizerConfig};
