use log::{debug, info};
use rustc_demangle::demangle;
use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use super::cache::{CacheKey, CacheStats, ResolverCache};
use super::memory_maps::{MapsProvider, ProcMaps};
use super::process::{self, ModuleResolver, ProcessImage};
use super::resolver::{Resolver, SymbolMatch};
use super::{elf, kernel};
use crate::domain::{Addr, LoadError, Pid, SymbolizeError};

/// Where symbols come from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceDescriptor {
    /// An object file whose link-time addresses are shifted by `base_address`
    Elf { path: PathBuf, base_address: Addr },
    /// A kallsyms snapshot (default: the live table) and optional kernel image
    Kernel { kallsyms: Option<PathBuf>, kernel_image: Option<PathBuf> },
    /// Every executable object file mapped by a process
    Process { pid: Pid },
}

impl SourceDescriptor {
    pub fn elf(path: impl Into<PathBuf>, base_address: Addr) -> Self {
        SourceDescriptor::Elf { path: path.into(), base_address }
    }

    /// The running kernel, with its image auto-located
    #[must_use]
    pub fn kernel() -> Self {
        SourceDescriptor::Kernel { kallsyms: None, kernel_image: None }
    }

    #[must_use]
    pub fn process(pid: Pid) -> Self {
        SourceDescriptor::Process { pid }
    }
}

/// One match list per input address, in input order
pub type QueryResult = Vec<Vec<SymbolMatch>>;

/// Symbolizer settings
#[derive(Debug, Clone)]
pub struct SymbolizerConfig {
    /// Demangle Rust symbol names in matches
    pub demangle: bool,
    /// Extract DWARF line tables for file/line/column
    pub debug_info: bool,
    /// Batches at least this large are split across threads
    pub parallel_threshold: usize,
    /// Worker threads for large batches
    pub threads: usize,
    /// procfs root for process sources
    pub proc_root: PathBuf,
}

impl Default for SymbolizerConfig {
    fn default() -> Self {
        Self {
            demangle: true,
            debug_info: true,
            parallel_threshold: 4096,
            threads: thread::available_parallelism().map_or(1, NonZeroUsize::get),
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl SymbolizerConfig {
    #[must_use]
    pub fn with_demangle(mut self, demangle: bool) -> Self {
        self.demangle = demangle;
        self
    }

    #[must_use]
    pub fn with_debug_info(mut self, debug_info: bool) -> Self {
        self.debug_info = debug_info;
        self
    }

    #[must_use]
    pub fn with_parallel_threshold(mut self, parallel_threshold: usize) -> Self {
        self.parallel_threshold = parallel_threshold;
        self
    }

    /// Worker thread count, at least one
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    #[must_use]
    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }
}

/// Resolves address batches against a set of symbol sources
///
/// Resolvers are cached for the lifetime of the symbolizer and never
/// invalidated: if a file changes on disk, create a new symbolizer to see it.
/// The symbolizer is `Sync`; concurrent calls share the cache and build
/// each resolver only once.
pub struct Symbolizer {
    config: SymbolizerConfig,
    maps: Box<dyn MapsProvider>,
    cache: ResolverCache,
}

impl Symbolizer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SymbolizerConfig::default())
    }

    #[must_use]
    pub fn with_config(config: SymbolizerConfig) -> Self {
        let maps = Box::new(ProcMaps::with_root(&config.proc_root));
        Self { config, maps, cache: ResolverCache::new() }
    }

    /// Replace the source of process memory maps
    #[must_use]
    pub fn with_maps_provider(mut self, maps: impl MapsProvider + 'static) -> Self {
        self.maps = Box::new(maps);
        self
    }

    #[must_use]
    pub fn config(&self) -> &SymbolizerConfig {
        &self.config
    }

    /// Resolve every address against every source
    ///
    /// All sources are loaded before any address is looked up. Matches for an
    /// address are concatenated in source order; an address no source covers
    /// gets an empty list.
    ///
    /// # Errors
    /// The first source that fails to load, tagged with its index.
    pub fn symbolize(
        &self,
        sources: &[SourceDescriptor],
        addresses: &[Addr],
    ) -> Result<QueryResult, SymbolizeError> {
        let bound = sources
            .iter()
            .enumerate()
            .map(|(index, source)| {
                self.bind(source).map_err(|source| SymbolizeError::Source { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!("Symbolizing {} addresses against {} sources", addresses.len(), bound.len());
        Ok(self.resolve_batch(&bound, addresses))
    }

    /// Resolve a single address
    ///
    /// # Errors
    /// Same as [`Symbolizer::symbolize`].
    pub fn symbolize_one(
        &self,
        sources: &[SourceDescriptor],
        addr: Addr,
    ) -> Result<Vec<SymbolMatch>, SymbolizeError> {
        Ok(self.symbolize(sources, &[addr])?.pop().unwrap_or_default())
    }

    /// Resolver construction and reuse counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Demangle a Rust symbol name, returning other names unchanged
    #[must_use]
    pub fn demangle_symbol(symbol: &str) -> String {
        format!("{:#}", demangle(symbol))
    }

    fn bind(&self, source: &SourceDescriptor) -> Result<BoundSource, LoadError> {
        let debug_info = self.config.debug_info;

        match source {
            SourceDescriptor::Elf { path, base_address } => {
                let key = CacheKey::Elf { path: normalize(path), base: *base_address };
                let resolver =
                    self.cache.get_or_build(&key, || elf::load(path, *base_address, debug_info))?;
                Ok(BoundSource::Whole(resolver))
            }
            SourceDescriptor::Kernel { kallsyms, kernel_image } => {
                let kallsyms = kallsyms.as_deref().unwrap_or(Path::new(kernel::KALLSYMS));
                let key = CacheKey::Kernel {
                    kallsyms: normalize(kallsyms),
                    image: kernel_image.as_deref().map(normalize),
                };
                let resolver = self.cache.get_or_build(&key, || {
                    kernel::load(Some(kallsyms), kernel_image.as_deref(), debug_info)
                })?;
                Ok(BoundSource::Whole(resolver))
            }
            SourceDescriptor::Process { pid } => {
                let image = ProcessImage::snapshot(*pid, self.maps.as_ref())?;
                let modules = process::bind(&image, |mapping| {
                    let key = CacheKey::Module {
                        path: normalize(&mapping.path),
                        load_address: mapping.load_address,
                    };
                    self.cache.get_or_build(&key, || process::load_module(mapping, debug_info))
                })?;
                Ok(BoundSource::Modules(modules))
            }
        }
    }

    fn resolve_batch(&self, bound: &[BoundSource], addresses: &[Addr]) -> QueryResult {
        let threads = self.config.threads.max(1);
        if threads == 1 || addresses.len() < self.config.parallel_threshold.max(1) {
            return addresses.iter().map(|&addr| self.resolve_address(bound, addr)).collect();
        }

        let chunk_size = addresses.len().div_ceil(threads);
        debug!("Splitting {} addresses into chunks of {chunk_size}", addresses.len());

        thread::scope(|scope| {
            let workers: Vec<_> = addresses
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|&addr| self.resolve_address(bound, addr))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            // Joining in spawn order keeps results aligned with the input
            workers
                .into_iter()
                .flat_map(|worker| worker.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        })
    }

    fn resolve_address(&self, bound: &[BoundSource], addr: Addr) -> Vec<SymbolMatch> {
        let mut matches = Vec::new();
        for source in bound {
            source.lookup_into(addr, &mut matches);
        }
        if self.config.demangle {
            for found in &mut matches {
                found.name = Self::demangle_symbol(&found.name);
            }
        }
        matches
    }
}

impl Default for Symbolizer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Symbolizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Symbolizer")
            .field("config", &self.config)
            .field("cached_resolvers", &self.cache.len())
            .finish_non_exhaustive()
    }
}

/// Resolvers obtained for one source descriptor during one call
enum BoundSource {
    Whole(Arc<Resolver>),
    Modules(Vec<ModuleResolver>),
}

impl BoundSource {
    fn lookup_into(&self, addr: Addr, matches: &mut Vec<SymbolMatch>) {
        match self {
            BoundSource::Whole(resolver) => resolver.lookup_into(addr, matches),
            BoundSource::Modules(modules) => {
                for module in modules {
                    module.lookup_into(addr, matches);
                }
            }
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demangle_rust_symbol() {
        let mangled = "_ZN4core3ptr13drop_in_place17h0123456789abcdefE";
        assert_eq!(Symbolizer::demangle_symbol(mangled), "core::ptr::drop_in_place");
        assert_eq!(Symbolizer::demangle_symbol("memcpy"), "memcpy");
    }

    #[test]
    fn test_empty_sources_yield_empty_lists() {
        let symbolizer = Symbolizer::new();
        let result = symbolizer.symbolize(&[], &[0x1000, 0x2000]).unwrap();
        assert_eq!(result, vec![Vec::<SymbolMatch>::new(), Vec::new()]);
    }

    #[test]
    fn test_failing_source_reports_index() {
        let symbolizer = Symbolizer::new();
        let sources = [SourceDescriptor::elf("/nonexistent/path/to/binary", 0)];
        let err = symbolizer.symbolize(&sources, &[0x1000]).unwrap_err();
        let SymbolizeError::Source { index, ref source } = err;
        assert_eq!(index, 0);
        assert!(matches!(source, LoadError::NotFound { .. }));
    }

    #[test]
    fn test_config_builder() {
        let config = SymbolizerConfig::default()
            .with_demangle(false)
            .with_debug_info(false)
            .with_parallel_threshold(16)
            .with_threads(0)
            .with_proc_root("/host/proc");

        assert!(!config.demangle);
        assert!(!config.debug_info);
        assert_eq!(config.parallel_threshold, 16);
        assert_eq!(config.threads, 1);
        assert_eq!(config.proc_root, PathBuf::from("/host/proc"));
    }

    #[test]
    fn test_symbolizer_is_sync() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<Symbolizer>();
    }
}
