//! Process symbol source
//!
//! A process is symbolized through the object files it has mapped
//! executable. Every call takes a fresh [`ProcessImage`] snapshot since
//! mappings change over a process's lifetime; only the per-file resolvers
//! are worth keeping around.
//!
//! Mapped files that have vanished or are not ELF objects (JIT code caches,
//! device mappings) are skipped; the rest of the process still resolves.

use log::{debug, warn};
use std::path::PathBuf;
use std::sync::Arc;

use super::elf;
use super::memory_maps::{MapsEntry, MapsProvider, MemoryRange};
use super::resolver::{Resolver, SymbolMatch};
use crate::domain::{Addr, LoadError, Pid};

/// An object file mapped into a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMapping {
    pub path: PathBuf,
    /// Runtime address of file offset zero, taken from the lowest executable mapping
    pub load_address: Addr,
    /// Executable mappings of this file, ascending
    pub ranges: Vec<MemoryRange>,
    /// Alternate route to the same file through procfs
    pub map_file: Option<PathBuf>,
}

impl ModuleMapping {
    #[must_use]
    pub fn contains(&self, addr: Addr) -> bool {
        self.ranges.iter().any(|range| range.contains(addr))
    }

    /// Lowest mapped start to highest mapped end
    #[must_use]
    pub fn span(&self) -> MemoryRange {
        MemoryRange {
            start: self.ranges.first().map_or(0, |r| r.start),
            end: self.ranges.last().map_or(0, |r| r.end),
        }
    }
}

/// The executable object files of one process at one instant
#[derive(Debug, Clone)]
pub struct ProcessImage {
    pid: Pid,
    modules: Vec<ModuleMapping>,
}

impl ProcessImage {
    /// Snapshot the mappings of `pid`
    ///
    /// # Errors
    /// `ProcessNotFound` if the mappings cannot be read.
    pub fn snapshot(pid: Pid, maps: &dyn MapsProvider) -> Result<Self, LoadError> {
        let entries = maps.executable_mappings(pid)?;
        Ok(Self::from_entries(pid, entries))
    }

    /// Group executable file-backed entries by backing file
    ///
    /// Modules keep the order in which their files first appear.
    #[must_use]
    pub fn from_entries(pid: Pid, entries: Vec<MapsEntry>) -> Self {
        let mut grouped: Vec<(PathBuf, Vec<MapsEntry>)> = Vec::new();

        for entry in entries.into_iter().filter(MapsEntry::is_symbolization_relevant) {
            let Some(path) = entry.path.clone() else {
                continue;
            };
            match grouped.iter_mut().find(|(p, _)| *p == path) {
                Some((_, group)) => group.push(entry),
                None => grouped.push((path, vec![entry])),
            }
        }

        let modules = grouped
            .into_iter()
            .filter_map(|(path, mut group)| {
                group.sort_by_key(|e| e.range.start);
                let lowest = group.first()?;
                Some(ModuleMapping {
                    load_address: lowest.load_address(),
                    map_file: lowest.map_file.clone(),
                    ranges: group.iter().map(|e| e.range).collect(),
                    path,
                })
            })
            .collect();

        Self { pid, modules }
    }

    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[must_use]
    pub fn modules(&self) -> &[ModuleMapping] {
        &self.modules
    }
}

/// A module's resolver, answering only inside the module's mappings
#[derive(Debug, Clone)]
pub struct ModuleResolver {
    pub mapping: ModuleMapping,
    pub resolver: Arc<Resolver>,
}

impl ModuleResolver {
    /// Append all matches for `addr`, inlined callees included
    pub fn lookup_into(&self, addr: Addr, matches: &mut Vec<SymbolMatch>) {
        if self.mapping.contains(addr) {
            self.resolver.lookup_into(addr, matches);
        }
    }
}

/// Load the resolver of one module
///
/// Falls back to the mapping's `map_files` link when the path the process
/// sees does not exist for us.
///
/// # Errors
/// The error of the ELF loader for the mapped file.
pub fn load_module(mapping: &ModuleMapping, debug_info: bool) -> Result<Resolver, LoadError> {
    match elf::load_mapped(&mapping.path, mapping.load_address, debug_info) {
        Err(LoadError::NotFound { path }) => match mapping.map_file {
            Some(ref map_file) => {
                debug!("{} not visible, reading {}", path.display(), map_file.display());
                elf::load_mapped(map_file, mapping.load_address, debug_info)
                    .map_err(|_| LoadError::NotFound { path })
            }
            None => Err(LoadError::NotFound { path }),
        },
        result => result,
    }
}

/// Build resolvers for every module of a process without caching
///
/// # Errors
/// `ProcessNotFound` if the mappings cannot be read, or the first fatal
/// module error (see [`bind`]).
pub fn load(
    pid: Pid,
    maps: &dyn MapsProvider,
    debug_info: bool,
) -> Result<Vec<ModuleResolver>, LoadError> {
    let image = ProcessImage::snapshot(pid, maps)?;
    bind(&image, |mapping| load_module(mapping, debug_info).map(Arc::new))
}

/// Pair each module of `image` with a resolver obtained from `resolve`
///
/// Modules whose file is gone or is not an object file are dropped.
///
/// # Errors
/// The first other error returned by `resolve`, such as `PermissionDenied`.
pub fn bind<F>(image: &ProcessImage, mut resolve: F) -> Result<Vec<ModuleResolver>, LoadError>
where
    F: FnMut(&ModuleMapping) -> Result<Arc<Resolver>, LoadError>,
{
    debug!("{} has {} executable modules", image.pid, image.modules.len());

    let mut bound = Vec::with_capacity(image.modules.len());
    for mapping in &image.modules {
        let span = mapping.span();
        match resolve(mapping) {
            Ok(resolver) => {
                debug!(
                    "{}: 0x{:x}-0x{:x} from {} at bias 0x{:x}",
                    image.pid,
                    span.start,
                    span.end,
                    resolver.origin().display(),
                    resolver.bias()
                );
                bound.push(ModuleResolver { mapping: mapping.clone(), resolver });
            }
            Err(e @ (LoadError::NotFound { .. } | LoadError::MalformedContainer { .. })) => {
                warn!("{}: skipping 0x{:x}-0x{:x}: {e}", image.pid, span.start, span.end);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolization::index::{SymbolEntry, SymbolTable};
    use crate::symbolization::memory_maps::parse_maps;
    use std::path::Path;

    const MAPS: &str = "\
555000-556000 r-xp 00000000 fd:01 1054 /usr/bin/app
556000-557000 r--p 00001000 fd:01 1054 /usr/bin/app
7f0000002000-7f0000004000 r-xp 00002000 fd:01 2210 /usr/lib/libfoo.so
7f0000008000-7f0000009000 r-xp 00008000 fd:01 2210 /usr/lib/libfoo.so
7ffff7ff9000-7ffff7ffd000 r-xp 00000000 00:00 0 [vdso]
";

    fn image() -> ProcessImage {
        ProcessImage::from_entries(Pid(77), parse_maps(MAPS))
    }

    fn find_module<'a>(image: &'a ProcessImage, path: &str) -> &'a ModuleMapping {
        image.modules().iter().find(|m| m.path == Path::new(path)).unwrap()
    }

    fn resolver_for(mapping: &ModuleMapping) -> Arc<Resolver> {
        let symbols = SymbolTable::build([SymbolEntry::new(0x0, "everything", None)]);
        Arc::new(Resolver::new(&mapping.path, mapping.load_address, symbols, None))
    }

    #[test]
    fn test_modules_are_grouped_by_file() {
        let image = image();
        assert_eq!(image.modules().len(), 2);

        let app = find_module(&image, "/usr/bin/app");
        assert_eq!(app.load_address, 0x555000);
        assert_eq!(app.ranges.len(), 1);

        let lib = find_module(&image, "/usr/lib/libfoo.so");
        assert_eq!(lib.load_address, 0x7f00_0000_0000);
        assert_eq!(lib.ranges.len(), 2);
        assert_eq!(lib.span(), MemoryRange { start: 0x7f00_0000_2000, end: 0x7f00_0000_9000 });
    }

    #[test]
    fn test_module_resolver_is_confined_to_its_mappings() {
        let image = image();
        let modules = bind(&image, |mapping| Ok(resolver_for(mapping))).unwrap();

        let lib = &modules[1];
        let hits = |addr| {
            let mut matches = Vec::new();
            lib.lookup_into(addr, &mut matches);
            matches.len()
        };
        assert_eq!(hits(0x7f00_0000_2100), 1);
        // Gap between the two executable mappings
        assert_eq!(hits(0x7f00_0000_5000), 0);
        assert_eq!(hits(0x7f00_0000_8fff), 1);
        assert_eq!(hits(0x7f00_0000_9000), 0);
    }

    #[test]
    fn test_bind_skips_foreign_and_vanished_files() {
        let image = image();
        let modules = bind(&image, |mapping| {
            if mapping.path == Path::new("/usr/bin/app") {
                Err(LoadError::MalformedContainer {
                    path: mapping.path.clone(),
                    reason: "Unknown file magic".to_string(),
                })
            } else {
                Ok(resolver_for(mapping))
            }
        })
        .unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].mapping.path, Path::new("/usr/lib/libfoo.so"));

        let modules =
            bind(&image, |mapping| Err(LoadError::NotFound { path: mapping.path.clone() })).unwrap();
        assert!(modules.is_empty());
    }

    #[test]
    fn test_bind_propagates_permission_denied() {
        let err = bind(&image(), |mapping| {
            Err(LoadError::PermissionDenied { path: mapping.path.clone() })
        })
        .unwrap_err();
        assert!(err.is_permission_denied());
    }

    #[test]
    fn test_load_module_falls_back_to_map_file() {
        let exe = std::env::current_exe().unwrap();
        let mapping = ModuleMapping {
            path: PathBuf::from("/nonexistent/inside/container/app"),
            load_address: 0,
            ranges: vec![MemoryRange { start: 0x1000, end: 0x2000 }],
            map_file: Some(exe),
        };
        assert!(load_module(&mapping, false).unwrap().symbol_count() > 0);

        let mapping = ModuleMapping { map_file: None, ..mapping };
        assert!(matches!(load_module(&mapping, false), Err(LoadError::NotFound { .. })));
    }
}
