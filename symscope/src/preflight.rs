//! Pre-flight checks for symscope
//!
//! Spots configurations that load fine but symbolize poorly (stripped
//! binaries, hidden kernel addresses) and reports them before any work.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use object::{Object, ObjectSection};
use std::path::Path;

const KPTR_RESTRICT: &str = "/proc/sys/kernel/kptr_restrict";

/// Check that an ELF source path exists and is a regular file
pub fn check_binary_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!(
            "Binary not found: {}\n\n\
             Make sure the path is correct and the binary exists.",
            path.display()
        );
    }
    if !path.is_file() {
        bail!(
            "Not a file: {}\n\n\
             --elf must point to an object file, not a directory.",
            path.display()
        );
    }
    Ok(())
}

/// What an object file offers for symbolization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSymbols {
    Full,
    SymbolsOnly,
    Stripped,
}

/// Inspect an object file for `.symtab` and `.debug_info`
///
/// Returns `None` for files that are not object files, leaving the error
/// to the loader.
pub fn inspect_debug_symbols(path: &Path) -> Result<Option<DebugSymbols>> {
    let file_data =
        std::fs::read(path).with_context(|| format!("Failed to read binary: {}", path.display()))?;

    let Ok(obj) = object::File::parse(&*file_data) else {
        return Ok(None);
    };

    let has_debug_info = obj.section_by_name(".debug_info").is_some_and(|s| s.size() > 0);
    let has_symtab = obj.section_by_name(".symtab").is_some_and(|s| s.size() > 0);

    Ok(Some(match (has_symtab, has_debug_info) {
        (_, true) => DebugSymbols::Full,
        (true, false) => DebugSymbols::SymbolsOnly,
        (false, false) => DebugSymbols::Stripped,
    }))
}

/// Warn about binaries that will symbolize poorly
pub fn check_debug_symbols(path: &Path, quiet: bool) -> Result<()> {
    if quiet {
        return Ok(());
    }

    match inspect_debug_symbols(path)? {
        Some(DebugSymbols::Stripped) => eprintln!(
            "warning: {} is stripped, only exported symbols will resolve",
            path.display()
        ),
        Some(DebugSymbols::SymbolsOnly) => eprintln!(
            "warning: {} has no DWARF debug info, source locations unavailable",
            path.display()
        ),
        Some(DebugSymbols::Full) | None => {}
    }

    Ok(())
}

/// Returns true if the live kallsyms will show real addresses to us
///
/// With `kptr_restrict` at 0 everyone sees addresses; at 1 only privileged
/// readers do; at 2 nobody does.
#[must_use]
pub fn kernel_addresses_visible() -> bool {
    let restrict = std::fs::read_to_string(KPTR_RESTRICT)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(1);
    let is_root = unsafe { libc::geteuid() } == 0;
    kptr_visible(restrict, is_root)
}

fn kptr_visible(restrict: u32, is_root: bool) -> bool {
    match restrict {
        0 => true,
        1 => is_root,
        _ => false,
    }
}

/// Warn when the live kallsyms will only list zero addresses
pub fn check_kernel_symbol_access(quiet: bool) {
    if !quiet && !kernel_addresses_visible() {
        eprintln!(
            "warning: kernel addresses are hidden by kernel.kptr_restrict; \
             run with sudo or pass --kallsyms with a privileged snapshot"
        );
    }
}
