//! Resolver cache with at most one build per key
//!
//! Each key owns a slot holding a write-once cell and a build lock. Cached
//! reads only take the map's read lock; a miss takes the slot's build lock,
//! so concurrent misses on the same key wait for the first builder and
//! reuse its result while builds of other keys proceed independently.
//! Failed builds leave the slot empty and are retried by the next caller.

use log::debug;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use super::resolver::Resolver;
use crate::domain::{Addr, LoadError};

/// Normalized identity of a resolver
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Elf { path: PathBuf, base: Addr },
    Kernel { kallsyms: PathBuf, image: Option<PathBuf> },
    Module { path: PathBuf, load_address: Addr },
}

/// Counters exposed for instrumentation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Resolvers constructed (successful builds only)
    pub builds: usize,
    /// Lookups answered from the cache
    pub hits: usize,
}

#[derive(Default)]
struct Slot {
    resolver: OnceLock<Arc<Resolver>>,
    build: Mutex<()>,
}

#[derive(Default)]
pub struct ResolverCache {
    slots: RwLock<HashMap<CacheKey, Arc<Slot>>>,
    builds: AtomicUsize,
    hits: AtomicUsize,
}

impl ResolverCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached resolver for `key`, building it with `build` on a miss
    ///
    /// # Errors
    /// Whatever `build` returns; the error is not cached.
    pub fn get_or_build<F>(&self, key: &CacheKey, build: F) -> Result<Arc<Resolver>, LoadError>
    where
        F: FnOnce() -> Result<Resolver, LoadError>,
    {
        let slot = self.slot(key);

        if let Some(resolver) = slot.resolver.get() {
            return Ok(self.hit(key, resolver));
        }

        let _guard = slot.build.lock().unwrap_or_else(PoisonError::into_inner);
        // Another builder may have finished while we waited
        if let Some(resolver) = slot.resolver.get() {
            return Ok(self.hit(key, resolver));
        }

        let resolver = Arc::new(build()?);
        self.builds.fetch_add(1, Ordering::Relaxed);
        // Only the holder of the build lock sets the cell
        let _ = slot.resolver.set(Arc::clone(&resolver));
        Ok(resolver)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            builds: self.builds.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }

    /// Number of resolvers currently cached
    #[must_use]
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| slot.resolver.get().is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn hit(&self, key: &CacheKey, resolver: &Arc<Resolver>) -> Arc<Resolver> {
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!("Resolver cache hit: {key:?}");
        Arc::clone(resolver)
    }

    fn slot(&self, key: &CacheKey) -> Arc<Slot> {
        if let Some(slot) = self.slots.read().unwrap_or_else(PoisonError::into_inner).get(key) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }
}
