//! Kernel symbol source: a kallsyms snapshot plus optional kernel image
//!
//! kallsyms lines look like `ffffffff81000000 T _stext` with an optional
//! trailing `[module]` column. Unprivileged readers see every address as
//! zero; those lines are dropped instead of being indexed at address 0.

use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use super::elf;
use super::index::{SymbolEntry, SymbolTable};
use super::resolver::Resolver;
use crate::domain::LoadError;

/// The running kernel's symbol table
pub const KALLSYMS: &str = "/proc/kallsyms";

const OSRELEASE: &str = "/proc/sys/kernel/osrelease";

/// Load a kernel resolver
///
/// `kallsyms` defaults to [`KALLSYMS`]. Without an explicit `kernel_image`
/// the running kernel's `vmlinux` is searched for in well-known locations;
/// failing to find or parse it only disables line information.
///
/// # Errors
/// Any failure to read or parse the kallsyms table, and any failure to read
/// or parse an explicitly given kernel image.
pub fn load(
    kallsyms: Option<&Path>,
    kernel_image: Option<&Path>,
    debug_info: bool,
) -> Result<Resolver, LoadError> {
    let kallsyms = kallsyms.unwrap_or(Path::new(KALLSYMS));
    let symbols = load_kallsyms(kallsyms)?;

    let debug = match (debug_info, kernel_image) {
        (false, _) => None,
        (true, Some(image)) => elf::load_debug_tables(image)?,
        (true, None) => match locate_kernel_image() {
            Some(image) => elf::load_debug_tables(&image).unwrap_or_else(|e| {
                warn!("Ignoring kernel image {}: {e}", image.display());
                None
            }),
            None => {
                debug!("No kernel image found for the running kernel");
                None
            }
        },
    };

    Ok(Resolver::new(kallsyms, 0, symbols, debug))
}

/// Read and index a kallsyms snapshot
///
/// # Errors
/// `NotFound`, `PermissionDenied` or `Io` if the file cannot be read;
/// `MalformedContainer` if it has content but no parseable line.
pub fn load_kallsyms(path: &Path) -> Result<SymbolTable, LoadError> {
    let raw = fs::read(path).map_err(|e| LoadError::from_io(path, e))?;
    let text = String::from_utf8_lossy(&raw);
    let symbols = parse_kallsyms(&text).map_err(|reason| LoadError::malformed(path, reason))?;
    info!("Loaded {} kernel symbols from {}", symbols.len(), path.display());
    Ok(symbols)
}

fn parse_kallsyms(text: &str) -> Result<SymbolTable, String> {
    let mut entries = Vec::new();
    let mut hidden = 0usize;
    let mut unparsable = 0usize;
    let mut non_blank = 0usize;

    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let Some(addr) = fields.next() else {
            continue;
        };
        non_blank += 1;

        let (Ok(addr), Some(_kind), Some(name)) =
            (u64::from_str_radix(addr, 16), fields.next(), fields.next())
        else {
            debug!("Skipping kallsyms line: {line}");
            unparsable += 1;
            continue;
        };

        if addr == 0 {
            hidden += 1;
            continue;
        }

        entries.push(SymbolEntry::new(addr, name, None));
    }

    if non_blank > 0 && unparsable == non_blank {
        return Err("no line in kallsyms format".to_string());
    }

    if hidden > 0 && entries.is_empty() {
        warn!("All {hidden} kallsyms addresses are hidden; reading them requires privileges");
    } else if hidden > 0 {
        debug!("Skipped {hidden} kallsyms lines with address zero");
    }

    Ok(SymbolTable::build(entries))
}

/// Find the running kernel's `vmlinux` image
#[must_use]
pub fn locate_kernel_image() -> Option<PathBuf> {
    let release = fs::read_to_string(OSRELEASE).ok()?;
    let release = release.trim();
    if release.is_empty() {
        return None;
    }
    kernel_image_candidates(release).into_iter().find(|path| path.is_file())
}

fn kernel_image_candidates(release: &str) -> Vec<PathBuf> {
    vec![
        PathBuf::from(format!("/boot/vmlinux-{release}")),
        PathBuf::from(format!("/usr/lib/debug/boot/vmlinux-{release}")),
        PathBuf::from(format!("/lib/modules/{release}/vmlinux")),
        PathBuf::from(format!("/usr/lib/debug/lib/modules/{release}/vmlinux")),
    ]
}
