//! Report output for symbolization results
//!
//! Renders a [`QueryResult`] either as human-readable text or as a JSON
//! array with one object per input address.

use serde::Serialize;
use std::io::Write;

use crate::domain::{Addr, ExportError};
use crate::symbolization::{QueryResult, SymbolMatch};

#[derive(Debug, Serialize)]
struct AddressReport<'a> {
    address: String,
    matches: &'a [SymbolMatch],
}

/// Write results as a JSON array aligned with `addresses`
///
/// # Errors
/// Returns an error if serialization or writing fails.
pub fn write_json<W: Write>(
    mut writer: W,
    addresses: &[Addr],
    results: &QueryResult,
) -> Result<(), ExportError> {
    let report: Vec<AddressReport<'_>> = addresses
        .iter()
        .zip(results)
        .map(|(addr, matches)| AddressReport { address: format!("0x{addr:x}"), matches })
        .collect();

    serde_json::to_writer_pretty(&mut writer, &report)?;
    writeln!(writer)?;
    Ok(())
}

/// Write results as text, one block per address
///
/// # Errors
/// Returns an error if writing fails.
pub fn write_text<W: Write>(
    mut writer: W,
    addresses: &[Addr],
    results: &QueryResult,
) -> Result<(), ExportError> {
    for (addr, matches) in addresses.iter().zip(results) {
        if matches.is_empty() {
            writeln!(writer, "0x{addr:016x} <unknown>")?;
        }
        for found in matches {
            writeln!(writer, "{}", found.format(*addr))?;
        }
    }
    Ok(())
}
