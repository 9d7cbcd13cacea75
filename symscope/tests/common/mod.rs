//! Test fixtures: small ELF relocatable objects generated on the fly
//!
//! Objects carry no program headers, so their link-time addresses are the
//! raw symbol values and any load base applies linearly.

#![allow(dead_code)]

use gimli::write::{Address, AttributeValue, DwarfUnit, EndianVec, LineProgram, LineString, Sections};
use gimli::{Encoding, Format, LineEncoding, LittleEndian};
use object::write::{Object, StandardSection, Symbol, SymbolSection};
use object::{Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope};
use std::path::{Path, PathBuf};

/// A row of a generated line program
#[derive(Debug, Clone, Copy)]
pub struct Row {
    pub address: u64,
    pub file: &'static str,
    pub line: u64,
    pub column: u64,
}

/// Symbol definition: (name, link-time address, size)
pub type Sym = (&'static str, u64, u64);

/// An inlined call: `callee` occupies `[address, address + size)` inside
/// `caller`, called from line `call_line` of the first row's file
#[derive(Debug, Clone, Copy)]
pub struct Inline {
    pub caller: Sym,
    pub callee: Sym,
    pub call_line: u64,
    pub call_column: u64,
}

pub struct ElfFixture {
    symbols: Vec<Sym>,
    weak: Vec<&'static str>,
    rows: Vec<Row>,
    rows_end: u64,
    inline: Option<Inline>,
    raw: Vec<(&'static str, Vec<u8>)>,
}

impl ElfFixture {
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
            weak: Vec::new(),
            rows: Vec::new(),
            rows_end: 0,
            inline: None,
            raw: Vec::new(),
        }
    }

    pub fn symbol(mut self, name: &'static str, address: u64, size: u64) -> Self {
        self.symbols.push((name, address, size));
        self
    }

    pub fn weak_symbol(mut self, name: &'static str, address: u64, size: u64) -> Self {
        self.weak.push(name);
        self.symbol(name, address, size)
    }

    /// Add one line program sequence; rows must be ascending and below `end`
    pub fn lines(mut self, rows: &[Row], end: u64) -> Self {
        self.rows = rows.to_vec();
        self.rows_end = end;
        self
    }

    /// Describe an inlined call in the DWARF; needs `lines`
    pub fn inline(mut self, inline: Inline) -> Self {
        self.inline = Some(inline);
        self
    }

    /// Add a section with arbitrary contents
    pub fn raw_section(mut self, name: &'static str, data: &[u8]) -> Self {
        self.raw.push((name, data.to_vec()));
        self
    }

    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);

        let text = obj.section_id(StandardSection::Text);
        obj.append_section_data(text, &[0x90; 0x100], 16);

        for &(sym_name, value, size) in &self.symbols {
            obj.add_symbol(Symbol {
                name: sym_name.as_bytes().to_vec(),
                value,
                size,
                kind: SymbolKind::Text,
                scope: SymbolScope::Dynamic,
                weak: self.weak.contains(&sym_name),
                section: SymbolSection::Section(text),
                flags: SymbolFlags::None,
            });
        }

        if !self.rows.is_empty() {
            for (id, data) in dwarf_sections(&self.rows, self.rows_end, self.inline) {
                let section = obj.add_section(Vec::new(), id.into_bytes(), SectionKind::Debug);
                obj.append_section_data(section, &data, 1);
            }
        }

        for (section_name, data) in &self.raw {
            let section =
                obj.add_section(Vec::new(), section_name.as_bytes().to_vec(), SectionKind::Debug);
            obj.append_section_data(section, data, 1);
        }

        let path = dir.join(name);
        std::fs::write(&path, obj.write().expect("write object")).expect("write fixture");
        path
    }
}

fn dwarf_sections(rows: &[Row], end: u64, inline: Option<Inline>) -> Vec<(String, Vec<u8>)> {
    let encoding = Encoding { format: Format::Dwarf32, version: 4, address_size: 8 };
    let start = rows[0].address;

    let mut program = LineProgram::new(
        encoding,
        LineEncoding::default(),
        LineString::String(Vec::new()),
        LineString::String(rows[0].file.as_bytes().to_vec()),
        None,
    );
    let dir = program.default_directory();

    let first_file = program.add_file(LineString::String(rows[0].file.as_bytes().to_vec()), dir, None);

    program.begin_sequence(Some(Address::Constant(start)));
    for row in rows {
        let file = program.add_file(LineString::String(row.file.as_bytes().to_vec()), dir, None);
        program.row().address_offset = row.address - start;
        program.row().file = file;
        program.row().line = row.line;
        program.row().column = row.column;
        program.generate_row();
    }
    program.end_sequence(end - start);

    let mut dwarf = DwarfUnit::new(encoding);
    dwarf.unit.line_program = program;
    let root = dwarf.unit.root();
    let entry = dwarf.unit.get_mut(root);
    entry.set(gimli::DW_AT_name, AttributeValue::String(rows[0].file.as_bytes().to_vec()));
    entry.set(gimli::DW_AT_low_pc, AttributeValue::Address(Address::Constant(start)));
    entry.set(gimli::DW_AT_high_pc, AttributeValue::Udata(end - start));

    if let Some(inline) = inline {
        let subprogram = dwarf.unit.add(root, gimli::DW_TAG_subprogram);
        set_range(dwarf.unit.get_mut(subprogram), inline.caller);

        let inlined = dwarf.unit.add(subprogram, gimli::DW_TAG_inlined_subroutine);
        let entry = dwarf.unit.get_mut(inlined);
        set_range(entry, inline.callee);
        entry.set(gimli::DW_AT_call_file, AttributeValue::FileIndex(Some(first_file)));
        entry.set(gimli::DW_AT_call_line, AttributeValue::Udata(inline.call_line));
        entry.set(gimli::DW_AT_call_column, AttributeValue::Udata(inline.call_column));
    }

    let mut sections = Sections::new(EndianVec::new(LittleEndian));
    dwarf.write(&mut sections).expect("write DWARF");

    let mut out = Vec::new();
    sections
        .for_each(|id, data| -> Result<(), gimli::write::Error> {
            if !data.slice().is_empty() {
                out.push((id.name().to_string(), data.slice().to_vec()));
            }
            Ok(())
        })
        .expect("collect DWARF sections");
    out
}

fn set_range(entry: &mut gimli::write::DebuggingInformationEntry, (name, address, size): Sym) {
    entry.set(gimli::DW_AT_name, AttributeValue::String(name.as_bytes().to_vec()));
    entry.set(gimli::DW_AT_low_pc, AttributeValue::Address(Address::Constant(address)));
    entry.set(gimli::DW_AT_high_pc, AttributeValue::Udata(size));
}

/// Write a text file (kallsyms snapshot, maps file) under `dir`
pub fn write_text(dir: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture dir");
    }
    std::fs::write(&path, contents).expect("write fixture");
    path
}

/// `foo` at 0x10 (0x20 bytes) and `bar` at 0x40 (8 bytes)
pub fn foo_fixture() -> ElfFixture {
    ElfFixture::new().symbol("foo", 0x10, 0x20).symbol("bar", 0x40, 0x8)
}

pub fn foo_rows() -> Vec<Row> {
    vec![
        Row { address: 0x10, file: "a.c", line: 5, column: 3 },
        Row { address: 0x20, file: "a.c", line: 7, column: 1 },
        Row { address: 0x40, file: "b.c", line: 12, column: 0 },
    ]
}

/// `helper` inlined into `foo` at 0x18..0x20, called from a.c:6:9
pub fn inlining_fixture() -> ElfFixture {
    ElfFixture::new()
        .symbol("foo", 0x10, 0x20)
        .lines(
            &[
                Row { address: 0x10, file: "a.c", line: 5, column: 3 },
                Row { address: 0x18, file: "h.h", line: 2, column: 5 },
                Row { address: 0x20, file: "a.c", line: 7, column: 1 },
            ],
            0x30,
        )
        .inline(Inline {
            caller: ("foo", 0x10, 0x20),
            callee: ("helper", 0x18, 0x8),
            call_line: 6,
            call_column: 9,
        })
}
