//! Identity-keyed result cache.
//!
//! An invocation is fingerprinted by the identity tokens of its concrete
//! argument values, never by their contents: two structurally equal but
//! distinct values are different keys. Every fingerprinted value is kept
//! alive in an arena until the cache is cleared, so a token can never be
//! recycled for another value while an entry might still match it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::error::Result;
use crate::operation::{Arguments, Operation};
use crate::term::Term;
use crate::value::{ObjectId, Value};

static GLOBAL: LazyLock<ResultCache> = LazyLock::new(ResultCache::new);

/// Identity fingerprint of one invocation's arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<(String, ObjectId)>);

impl Fingerprint {
    /// Fingerprint `arguments`, returning the values whose identities were
    /// used. Variadic arguments contribute one token per element.
    pub fn of(arguments: &Arguments) -> (Self, Vec<Value>) {
        let mut tokens = Vec::new();
        let mut held = Vec::new();
        for bound in arguments.iter() {
            match &bound.spread {
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        tokens.push((format!("{}[{i}]", bound.name), item.id()));
                        held.push(item.clone());
                    }
                }
                None => {
                    tokens.push((bound.name.clone(), bound.value.id()));
                    held.push(bound.value.clone());
                }
            }
        }
        (Self(tokens), held)
    }
}

#[derive(Default)]
struct CacheState {
    /// operation id → fingerprint → stored result
    tables: HashMap<u64, HashMap<Fingerprint, Term>>,
    /// Strong references keeping fingerprinted identities alive.
    arena: HashMap<ObjectId, Value>,
    /// Bumped on every clear.
    generation: u64,
    hits: u64,
    misses: u64,
}

#[derive(Default)]
struct Shared {
    state: Mutex<CacheState>,
    /// Number of live [`CacheScope`]s.
    scopes: AtomicUsize,
}

/// Counters describing a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub tracked_objects: usize,
    pub generation: u64,
    pub hits: u64,
    pub misses: u64,
}

/// A memoization cache shared by every operation wrapped with it.
///
/// Cloning gives another handle to the same cache.
#[derive(Clone, Default)]
pub struct ResultCache(std::sync::Arc<Shared>);

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by [`defer_cached`](crate::defer_cached).
    pub fn global() -> &'static ResultCache {
        &GLOBAL
    }

    /// Wrap `operation` so its invocations are memoized here.
    pub fn memoize(&self, operation: &Operation) -> Operation {
        operation.memoized(self)
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.0.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the stored result for this operation and argument identities,
    /// or compute, store and return it. The lock is not held while
    /// `compute` runs, so bodies may evaluate other memoized calls.
    pub(crate) fn lookup_or_compute(
        &self,
        operation: &Operation,
        arguments: &Arguments,
        compute: impl FnOnce() -> Result<Term>,
    ) -> Result<Term> {
        let (fingerprint, held) = Fingerprint::of(arguments);
        let generation = {
            let mut state = self.state();
            let hit = state
                .tables
                .get(&operation.id())
                .and_then(|table| table.get(&fingerprint))
                .cloned();
            if let Some(result) = hit {
                state.hits += 1;
                debug!(operation = operation.name(), "Cache hit");
                return Ok(result);
            }
            state.misses += 1;
            state.generation
        };

        debug!(operation = operation.name(), "Cache miss");
        let result = compute()?;

        let mut state = self.state();
        // A clear while computing invalidated the identities we fingerprinted.
        if state.generation == generation {
            for value in held {
                state.arena.entry(value.id()).or_insert(value);
            }
            state
                .tables
                .entry(operation.id())
                .or_default()
                .insert(fingerprint, result.clone());
        }
        Ok(result)
    }

    /// Drop every stored result and release every held identity.
    pub fn clear(&self) {
        let mut state = self.state();
        let dropped: usize = state.tables.values().map(HashMap::len).sum();
        state.tables.clear();
        state.arena.clear();
        state.generation += 1;
        info!(dropped, generation = state.generation, "Result cache cleared");
    }

    /// Enter a cache region; the cache is cleared when the returned guard
    /// drops, however the region is left. Regions nest, and every exit
    /// clears.
    pub fn scope(&self) -> CacheScope<'_> {
        let depth = self.0.scopes.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(depth, "Cache scope entered");
        CacheScope { cache: self }
    }

    /// Number of cache regions currently open.
    pub fn open_scopes(&self) -> usize {
        self.0.scopes.load(Ordering::SeqCst)
    }

    /// Number of stored results.
    pub fn len(&self) -> usize {
        self.state().tables.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored results for one operation.
    pub fn entries_for(&self, operation: &Operation) -> usize {
        self.state()
            .tables
            .get(&operation.id())
            .map_or(0, HashMap::len)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        CacheStats {
            entries: state.tables.values().map(HashMap::len).sum(),
            tracked_objects: state.arena.len(),
            generation: state.generation,
            hits: state.hits,
            misses: state.misses,
        }
    }
}

/// Scoped cache region over the process-wide cache.
pub fn with_cache_scope() -> CacheScope<'static> {
    ResultCache::global().scope()
}

/// Guard returned by [`ResultCache::scope`].
pub struct CacheScope<'a> {
    cache: &'a ResultCache,
}

impl CacheScope<'_> {
    pub fn cache(&self) -> &ResultCache {
        self.cache
    }
}

impl Drop for CacheScope<'_> {
    fn drop(&mut self) {
        self.cache.0.scopes.fetch_sub(1, Ordering::SeqCst);
        self.cache.clear();
    }
}
