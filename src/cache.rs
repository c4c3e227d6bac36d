//! Result caches
//!
//! [`ResultCache`] is the seam for the outer (orchestration-level) cache.
//! [`InMemoryCache`] is the in-process implementation used for both cache
//! layers. Entries store results with `meta.cached = false`; callers mark
//! hits on the way out.

use crate::result::GenerationResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Errors a cache backend may raise
///
/// Generation paths treat these as misses and keep going.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Cache entry could not be encoded: {0}")]
    Encoding(String),
}

/// Key-value store for generation results
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Look up a live entry
    async fn get(&self, key: &str) -> Result<Option<GenerationResult>, CacheError>;

    /// Store an entry; `ttl = None` keeps it until process exit
    async fn set(
        &self,
        key: &str,
        value: GenerationResult,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: GenerationResult,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Process-local cache with lazy expiry
///
/// Expired entries are removed when a lookup finds them, and swept in bulk
/// by the first write after the earliest deadline passes.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    /// Earliest `expires_at` among stored entries, if any can expire
    next_expiry: Option<Instant>,
}

impl State {
    fn sweep(&mut self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        self.next_expiry = self.entries.values().filter_map(|e| e.expires_at).min();
        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!(
                evicted,
                remaining = self.entries.len(),
                "Swept expired cache entries"
            );
        }
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.next_expiry = None;
    }
}

#[async_trait]
impl ResultCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<GenerationResult>, CacheError> {
        let now = Instant::now();
        {
            let state = self.state.read().await;
            match state.entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Re-check under the write lock; a writer may have refreshed it
        let mut state = self.state.write().await;
        if state.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            state.entries.remove(key);
            tracing::trace!(cache_key = %key, "Evicted expired cache entry");
        }
        Ok(state
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: GenerationResult,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = ttl.map(|ttl| now + ttl);
        let mut state = self.state.write().await;
        if state.next_expiry.is_some_and(|at| now >= at) {
            state.sweep(now);
        }
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.with_cached(false),
                expires_at,
            },
        );
        if let Some(at) = expires_at {
            state.next_expiry = Some(state.next_expiry.map_or(at, |next| next.min(at)));
        }
        Ok(())
    }
}
