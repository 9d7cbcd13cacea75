//! ELF symbol source
//!
//! Extracts defined function and data symbols from `.symtab` and
//! `.dynsym`, plus (best effort) the DWARF line table and inline call
//! chains, and binds them to a runtime address space through a load bias.

use addr2line::Context;
use gimli::{EndianRcSlice, RunTimeEndian};
use log::{debug, info, warn};
use object::{Object, ObjectSection, ObjectSegment, ObjectSymbol, SegmentFlags, SymbolKind};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use super::index::{
    DebugTables, InlineEntry, InlineTable, InlinedFrame, LineEntry, LineTable, SymbolEntry,
    SymbolTable,
};
use super::resolver::Resolver;
use crate::domain::{Addr, LoadError};

/// Parsed contents of one ELF file, still in link-time addresses
pub(crate) struct ElfImage {
    symbols: SymbolTable,
    debug: Option<DebugTables>,
    /// `p_vaddr - p_offset` of the lowest executable `PT_LOAD` segment
    exec_segment_delta: u64,
}

impl ElfImage {
    fn read(path: &Path, with_symbols: bool, debug_info: bool) -> Result<Self, LoadError> {
        let data = fs::read(path).map_err(|e| LoadError::from_io(path, e))?;
        let obj = object::File::parse(&*data).map_err(|e| LoadError::malformed(path, e))?;

        if obj.format() != object::BinaryFormat::Elf {
            return Err(LoadError::malformed(path, "not an ELF object"));
        }

        let symbols = if with_symbols { extract_symbols(&obj) } else { SymbolTable::default() };

        let debug = if debug_info {
            match extract_debug_tables(&obj) {
                Ok(tables) if tables.is_empty() => {
                    debug!("{}: no DWARF line information", path.display());
                    None
                }
                Ok(tables) => Some(tables),
                Err(e) => {
                    warn!("{}: unusable DWARF line information ({e}); symbols only", path.display());
                    None
                }
            }
        } else {
            None
        };

        info!(
            "Loaded {} symbols, {} line rows and {} inlined ranges from {}",
            symbols.len(),
            debug.as_ref().map_or(0, |d| d.lines.len()),
            debug.as_ref().map_or(0, |d| d.inlines.len()),
            path.display()
        );

        Ok(Self { symbols, debug, exec_segment_delta: exec_segment_delta(&obj) })
    }
}

/// Load an ELF file whose link-time addresses are shifted by `base`
///
/// # Errors
/// `NotFound`/`PermissionDenied` when the file cannot be read and
/// `MalformedContainer` when it is not an ELF object. Missing or broken debug
/// information is not an error.
pub fn load(path: &Path, base: Addr, debug_info: bool) -> Result<Resolver, LoadError> {
    let image = ElfImage::read(path, true, debug_info)?;
    Ok(Resolver::new(path, base, image.symbols, image.debug))
}

/// Load an ELF file mapped into a process
///
/// `load_address` is the runtime address corresponding to file offset zero
/// (mapping start minus mapping file offset). The bias is derived from it
/// and the executable segment's placement in the file.
///
/// # Errors
/// Same as [`load`].
pub fn load_mapped(path: &Path, load_address: Addr, debug_info: bool) -> Result<Resolver, LoadError> {
    let image = ElfImage::read(path, true, debug_info)?;
    let bias = load_address.wrapping_sub(image.exec_segment_delta);
    debug!(
        "{}: load address 0x{load_address:x}, segment delta 0x{:x}, bias 0x{bias:x}",
        path.display(),
        image.exec_segment_delta
    );
    Ok(Resolver::new(path, bias, image.symbols, image.debug))
}

/// Load only the DWARF tables of an ELF file, in absolute addresses
///
/// # Errors
/// Same as [`load`]. Returns `Ok(None)` when the file carries no usable
/// line information.
pub fn load_debug_tables(path: &Path) -> Result<Option<DebugTables>, LoadError> {
    Ok(ElfImage::read(path, false, true)?.debug)
}

fn extract_symbols(obj: &object::File<'_>) -> SymbolTable {
    let mut skipped = 0usize;
    let entries: Vec<SymbolEntry> = obj
        .symbols()
        .chain(obj.dynamic_symbols())
        .filter_map(|sym| {
            if sym.is_undefined() || !matches!(sym.kind(), SymbolKind::Text | SymbolKind::Data) {
                return None;
            }
            match sym.name() {
                Ok(name) if !name.is_empty() => {
                    Some(SymbolEntry::new(sym.address(), name, Some(sym.size())))
                }
                _ => {
                    skipped += 1;
                    None
                }
            }
        })
        .collect();

    if skipped > 0 {
        debug!("Skipped {skipped} defined symbols without a usable name");
    }

    SymbolTable::build(entries)
}

fn exec_segment_delta(obj: &object::File<'_>) -> u64 {
    obj.segments()
        .filter(|seg| {
            matches!(seg.flags(), SegmentFlags::Elf { p_flags } if p_flags & object::elf::PF_X != 0)
        })
        .min_by_key(ObjectSegment::address)
        .map_or(0, |seg| seg.address().wrapping_sub(seg.file_range().0))
}

fn extract_debug_tables(obj: &object::File<'_>) -> Result<DebugTables, gimli::Error> {
    let endian = if obj.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

    let load_section = |id: gimli::SectionId| -> Result<EndianRcSlice<RunTimeEndian>, gimli::Error> {
        let data = obj
            .section_by_name(id.name())
            .and_then(|section| section.uncompressed_data().ok())
            .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
        Ok(EndianRcSlice::new(Rc::from(&*data), endian))
    };

    let dwarf = gimli::Dwarf::load(&load_section)?;
    let ctx = Context::from_dwarf(dwarf)?;

    let mut files = FileNames::default();
    let mut rows = Vec::new();
    let mut inlines = Vec::new();

    for (address, size, location) in ctx.find_location_range(0, u64::MAX)? {
        let size = (size > 0).then_some(size);
        rows.push(LineEntry {
            address,
            size,
            file: location.file.map(|name| files.intern(name)),
            line: location.line,
            column: location.column,
        });

        match inline_chain(&ctx, address, size, &mut files) {
            Ok(Some(entry)) => inlines.push(entry),
            Ok(None) => {}
            Err(e) => debug!("No inline frames at 0x{address:x}: {e}"),
        }
    }

    Ok(DebugTables { lines: LineTable::build(rows), inlines: InlineTable::build(inlines) })
}

/// Frames addr2line reports at `address`, if more than the enclosing function
fn inline_chain(
    ctx: &Context<EndianRcSlice<RunTimeEndian>>,
    address: Addr,
    size: Option<u64>,
    files: &mut FileNames,
) -> Result<Option<InlineEntry>, gimli::Error> {
    let mut frames = Vec::new();
    let mut frame_iter = ctx.find_frames(address).skip_all_loads()?;
    while let Some(frame) = frame_iter.next()? {
        let name = frame
            .function
            .as_ref()
            .and_then(|f| f.raw_name().ok().map(|n| n.into_owned()));
        let (file, line, column) = match frame.location {
            Some(loc) => (loc.file.map(|f| files.intern(f)), loc.line, loc.column),
            None => (None, None, None),
        };
        frames.push((name, file, line, column));
    }

    // The last frame is the enclosing function; its location is the call site
    let Some((_, call_file, call_line, call_column)) = frames.pop() else {
        return Ok(None);
    };
    let frames: Vec<InlinedFrame> = frames
        .into_iter()
        .filter_map(|(name, file, line, column)| Some(InlinedFrame { name: name?, file, line, column }))
        .collect();
    if frames.is_empty() {
        return Ok(None);
    }

    Ok(Some(InlineEntry { address, size, frames, call_file, call_line, call_column }))
}

/// Interned source file names shared by all rows of one object file
#[derive(Default)]
struct FileNames(HashMap<String, Arc<str>>);

impl FileNames {
    fn intern(&mut self, name: &str) -> Arc<str> {
        self.0.entry(name.to_string()).or_insert_with(|| Arc::from(name)).clone()
    }
}
