//! Process-wide in-memory state shared by the lyrics and translation engines.
//!
//! Memory entries never expire; they live until overwritten, evicted by the
//! LRU bound, or cleared by a cache reset.

use crate::error::Result;
use crate::lyrics::{LyricsPayload, ResolvedLyrics};
use futures::future::{BoxFuture, Shared};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

/// Pending result of a provider fan-out that several callers may await.
pub type SharedFetch = Shared<BoxFuture<'static, Result<ResolvedLyrics>>>;

/// A translation together with the lyrics version it was produced from.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTranslation {
    pub translated_lyrics: LyricsPayload,
    pub original_version: i64,
}

pub struct CacheState {
    lyrics: Mutex<LruCache<String, ResolvedLyrics>>,
    translations: Mutex<LruCache<String, CachedTranslation>>,
    ongoing: Mutex<HashMap<String, SharedFetch>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl CacheState {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            lyrics: Mutex::new(LruCache::new(cap)),
            translations: Mutex::new(LruCache::new(cap)),
            ongoing: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_lyrics(&self, key: &str) -> Option<ResolvedLyrics> {
        lock(&self.lyrics).get(key).cloned()
    }

    pub fn set_cached_lyrics(&self, key: &str, entry: ResolvedLyrics) {
        lock(&self.lyrics).put(key.to_string(), entry);
    }

    /// Drop every memory lyrics entry matching `pred`, returning how many went.
    pub fn evict_lyrics_where(&self, pred: impl Fn(&ResolvedLyrics) -> bool) -> usize {
        let mut cache = lock(&self.lyrics);
        let stale: Vec<String> = cache
            .iter()
            .filter(|(_, entry)| pred(entry))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            cache.pop(key);
        }
        stale.len()
    }

    pub fn cached_translation(&self, key: &str) -> Option<CachedTranslation> {
        lock(&self.translations).get(key).cloned()
    }

    pub fn set_cached_translation(&self, key: &str, entry: CachedTranslation) {
        lock(&self.translations).put(key.to_string(), entry);
    }

    /// Join the fetch already running for `key`, or register the one built by `start`.
    ///
    /// Check and insert happen under one lock so two racing callers can never
    /// both start a fetch. The bool is true when `start` was used.
    pub fn join_or_register(
        &self,
        key: &str,
        start: impl FnOnce() -> SharedFetch,
    ) -> (SharedFetch, bool) {
        let mut ongoing = lock(&self.ongoing);
        if let Some(existing) = ongoing.get(key) {
            return (existing.clone(), false);
        }
        let fetch = start();
        ongoing.insert(key.to_string(), fetch.clone());
        (fetch, true)
    }

    pub fn has_ongoing_fetch(&self, key: &str) -> bool {
        lock(&self.ongoing).contains_key(key)
    }

    pub fn remove_ongoing_fetch(&self, key: &str) {
        lock(&self.ongoing).remove(key);
    }

    /// Number of entries in the (lyrics, translation) memory caches.
    pub fn entry_counts(&self) -> (usize, usize) {
        (lock(&self.lyrics).len(), lock(&self.translations).len())
    }

    /// Drop every resolved entry. In-flight fetches are left alone.
    pub fn clear(&self) {
        lock(&self.lyrics).clear();
        lock(&self.translations).clear();
    }
}

impl Default for CacheState {
    fn default() -> Self {
        Self::new(crate::config::CacheConfig::default().memory_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn resolved(version: i64) -> ResolvedLyrics {
        ResolvedLyrics {
            lyrics: LyricsPayload::default(),
            version,
        }
    }

    #[test]
    fn test_lru_bound() {
        let state = CacheState::new(2);
        state.set_cached_lyrics("a", resolved(1));
        state.set_cached_lyrics("b", resolved(2));
        state.set_cached_lyrics("c", resolved(3));

        assert!(state.cached_lyrics("a").is_none());
        assert_eq!(state.cached_lyrics("c").unwrap().version, 3);
        assert_eq!(state.entry_counts(), (2, 0));

        state.clear();
        assert_eq!(state.entry_counts(), (0, 0));
    }

    #[test]
    fn test_evict_lyrics_where() {
        let state = CacheState::new(8);
        state.set_cached_lyrics("a", resolved(1));
        state.set_cached_lyrics("b", resolved(2));
        state.set_cached_lyrics("c", resolved(3));

        assert_eq!(state.evict_lyrics_where(|e| e.version != 2), 2);
        assert!(state.cached_lyrics("a").is_none());
        assert_eq!(state.cached_lyrics("b").unwrap().version, 2);
        assert_eq!(state.evict_lyrics_where(|_| false), 0);
    }

    #[tokio::test]
    async fn test_join_or_register() {
        let state = CacheState::new(4);
        let (first, started) = state.join_or_register("k", || {
            async { Ok::<_, crate::error::LyricsError>(resolved(7)) }.boxed().shared()
        });
        assert!(started);

        let (second, started) = state.join_or_register("k", || unreachable!());
        assert!(!started);
        assert!(state.has_ongoing_fetch("k"));

        assert_eq!(first.await.unwrap().version, 7);
        assert_eq!(second.await.unwrap().version, 7);

        state.remove_ongoing_fetch("k");
        assert!(!state.has_ongoing_fetch("k"));
    }
}
