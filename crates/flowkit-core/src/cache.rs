//! Reference-data lookup cache for step handlers.
//!
//! Handlers often need slow-changing reference data (tag catalogs,
//! correspondent lists) without hitting the backing store on every step.
//! The cache is explicitly constructed with a loader and passed to handlers
//! through [`crate::registry::StepServices`]; refresh is the caller's
//! responsibility, typically guarded by [`LookupCache::is_stale`].

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("lookup load failed: {0}")]
    Load(String),
}

type Loader = Box<dyn Fn() -> Result<HashMap<String, Value>, CacheError> + Send + Sync>;

struct CacheState {
    entries: HashMap<String, Value>,
    refreshed_at: Option<Instant>,
}

/// Keyed reference-data cache with explicit refresh.
pub struct LookupCache {
    loader: Option<Loader>,
    state: RwLock<CacheState>,
}

impl LookupCache {
    pub fn new(
        loader: impl Fn() -> Result<HashMap<String, Value>, CacheError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            loader: Some(Box::new(loader)),
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                refreshed_at: None,
            }),
        }
    }

    /// A cache with no loader; stays empty. Used where handlers need no
    /// reference data.
    pub fn empty() -> Self {
        Self {
            loader: None,
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                refreshed_at: None,
            }),
        }
    }

    /// Re-run the loader and replace the cached entries.
    pub fn refresh(&self) -> Result<(), CacheError> {
        let Some(loader) = &self.loader else {
            return Ok(());
        };
        let entries = loader()?;
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.entries = entries;
        state.refreshed_at = Some(Instant::now());
        tracing::debug!(entries = state.entries.len(), "lookup cache refreshed");
        Ok(())
    }

    /// True if the cache was never refreshed or the last refresh is older
    /// than `ttl`.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        let state = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match state.refreshed_at {
            Some(at) => at.elapsed() > ttl,
            None => true,
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let state = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        let state = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LookupCache {
    fn default() -> Self {
        Self::empty()
    }
}
