//! # Lyrics resolution engine
//!
//! Resolves a song to lyrics by walking the tiers in order, stopping at the
//! first hit:
//!
//! 1. in-memory cache (no expiry)
//! 2. persistent cache, subject to the configured cache strategy
//! 3. local uploads
//! 4. a fetch already in flight for the same cache key
//! 5. a new provider fan-out, then platform subtitles
//!
//! `force_reload` skips tiers 1-3 but still joins an in-flight fetch, so there
//! is never more than one fan-out per cache key at a time.

use super::local::LocalLyricsIndex;
use super::providers::{FetchOptions, LyricsProvider, ProviderId, SubtitleSource, provider_order};
use super::{LyricsPayload, SongInfo};
use crate::config::{CacheStrategy, SettingsSource};
use crate::error::{LyricsError, Result};
use crate::state::CacheState;
use crate::storage::{LyricsRecord, RecordStore};
use crate::util::now_ms;
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lyrics plus the version token dependent caches validate against.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLyrics {
    pub lyrics: LyricsPayload,
    /// Wall-clock ms at which these lyrics were fetched
    pub version: i64,
}

struct Inner {
    state: Arc<CacheState>,
    store: Arc<dyn RecordStore<LyricsRecord>>,
    local: Arc<LocalLyricsIndex>,
    settings: Arc<dyn SettingsSource>,
    providers: Vec<Arc<dyn LyricsProvider>>,
    subtitles: Option<Arc<dyn SubtitleSource>>,
}

#[derive(Clone)]
pub struct LyricsService {
    inner: Arc<Inner>,
}

pub struct LyricsServiceBuilder {
    state: Arc<CacheState>,
    store: Arc<dyn RecordStore<LyricsRecord>>,
    local: Arc<LocalLyricsIndex>,
    settings: Arc<dyn SettingsSource>,
    providers: Vec<Arc<dyn LyricsProvider>>,
    subtitles: Option<Arc<dyn SubtitleSource>>,
}

impl LyricsServiceBuilder {
    /// Register a remote provider. Order of registration doesn't matter;
    /// settings decide the order they are tried in.
    pub fn provider(mut self, provider: Arc<dyn LyricsProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn subtitles(mut self, source: Arc<dyn SubtitleSource>) -> Self {
        self.subtitles = Some(source);
        self
    }

    pub fn build(self) -> LyricsService {
        LyricsService {
            inner: Arc::new(Inner {
                state: self.state,
                store: self.store,
                local: self.local,
                settings: self.settings,
                providers: self.providers,
                subtitles: self.subtitles,
            }),
        }
    }
}

impl LyricsService {
    pub fn builder(
        state: Arc<CacheState>,
        store: Arc<dyn RecordStore<LyricsRecord>>,
        local: Arc<LocalLyricsIndex>,
        settings: Arc<dyn SettingsSource>,
    ) -> LyricsServiceBuilder {
        LyricsServiceBuilder {
            state,
            store,
            local,
            settings,
            providers: Vec::new(),
            subtitles: None,
        }
    }

    pub fn local(&self) -> &LocalLyricsIndex {
        &self.inner.local
    }

    pub fn state(&self) -> &CacheState {
        &self.inner.state
    }

    pub fn store(&self) -> &dyn RecordStore<LyricsRecord> {
        self.inner.store.as_ref()
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> crate::config::Settings {
        self.inner.settings.settings()
    }

    /// Resolve lyrics for a song. See the module docs for the tier order.
    pub async fn resolve(&self, song: &SongInfo, force_reload: bool) -> Result<ResolvedLyrics> {
        song.validate()?;
        let key = song.cache_key();

        if !force_reload {
            if let Some(hit) = self.inner.state.cached_lyrics(&key) {
                debug!(%key, "lyrics memory cache hit");
                return Ok(hit);
            }

            let strategy = self.inner.settings.settings().cache_strategy;
            if let Some(hit) = self.inner.from_store(&key, strategy).await {
                debug!(%key, "lyrics persistent cache hit");
                self.inner.state.set_cached_lyrics(&key, hit.clone());
                return Ok(hit);
            }

            match self.inner.local.lookup(song).await {
                Ok(Some(hit)) => {
                    debug!(%key, "local lyrics hit");
                    self.inner.state.set_cached_lyrics(&key, hit.clone());
                    return Ok(hit);
                }
                Ok(None) => {}
                Err(e) => warn!(%key, error = %e, "local lyrics lookup failed"),
            }
        }

        let (fetch, started) = self.inner.state.join_or_register(&key, || {
            let inner = self.inner.clone();
            let song = song.clone();
            let key = key.clone();
            let guard = OngoingGuard {
                state: inner.state.clone(),
                key: key.clone(),
            };
            // Spawned so the fetch completes even if every waiter goes away.
            let handle = tokio::spawn(async move {
                let _guard = guard;
                inner.fetch_new(&song, &key, force_reload).await
            });
            async move {
                handle
                    .await
                    .unwrap_or_else(|e| Err(LyricsError::Task(e.to_string())))
            }
            .boxed()
            .shared()
        });

        if !started {
            debug!(%key, "joining in-flight lyrics fetch");
        }
        fetch.await
    }

    /// Force the local lyrics index to rebuild on next access.
    pub fn invalidate_local_lyrics(&self) {
        self.inner.local.invalidate();
    }

    /// Store a local upload; cached local hits are dropped so it takes effect.
    pub async fn upload_local(&self, song_info: SongInfo, raw: serde_json::Value) -> Result<String> {
        let song_id = self.inner.local.upload(song_info, raw).await?;
        self.inner.forget_local_hits().await;
        Ok(song_id)
    }

    pub async fn update_local(&self, song_id: &str, raw: serde_json::Value) -> Result<()> {
        self.inner.local.update(song_id, raw).await?;
        self.inner.forget_local_hits().await;
        Ok(())
    }

    pub async fn delete_local(&self, song_id: &str) -> Result<()> {
        self.inner.local.delete(song_id).await?;
        self.inner.forget_local_hits().await;
        Ok(())
    }
}

/// Deregisters an in-flight fetch when the task finishes, panics or is cancelled.
struct OngoingGuard {
    state: Arc<CacheState>,
    key: String,
}

impl Drop for OngoingGuard {
    fn drop(&mut self) {
        self.state.remove_ongoing_fetch(&self.key);
    }
}

impl Inner {
    async fn from_store(&self, key: &str, strategy: CacheStrategy) -> Option<ResolvedLyrics> {
        let max_age = strategy.max_age_ms()?;

        let record = match self.store.get(key).await {
            Ok(record) => record?,
            Err(e) => {
                warn!(%key, error = %e, "lyrics cache read failed");
                return None;
            }
        };

        let age = now_ms() - record.timestamp;
        if age < max_age {
            return Some(ResolvedLyrics {
                lyrics: record.lyrics,
                version: record.version,
            });
        }

        debug!(%key, age_ms = age, "persisted lyrics expired");
        if let Err(e) = self.store.delete(key).await {
            warn!(%key, error = %e, "failed to delete expired lyrics");
        }
        None
    }

    /// Evict cached lyrics that came from local uploads, in memory and on disk.
    async fn forget_local_hits(&self) {
        let local = ProviderId::Local.as_str();
        let is_local = |lyrics: &LyricsPayload| {
            lyrics.metadata.as_ref().and_then(|m| m.source.as_deref()) == Some(local)
        };

        let evicted = self.state.evict_lyrics_where(|entry| is_local(&entry.lyrics));
        let records = match self.store.get_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "lyrics cache scan failed");
                Vec::new()
            }
        };
        for record in records.iter().filter(|r| is_local(&r.lyrics)) {
            if let Err(e) = self.store.delete(&record.key).await {
                warn!(key = %record.key, error = %e, "failed to delete cached local lyrics");
            }
        }
        debug!(evicted, "dropped cached local lyrics");
    }

    fn provider(&self, id: ProviderId) -> Option<&Arc<dyn LyricsProvider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    async fn try_provider(
        &self,
        id: ProviderId,
        song: &SongInfo,
        options: &FetchOptions,
    ) -> anyhow::Result<Option<LyricsPayload>> {
        if id == ProviderId::Local {
            let hit = self.local.lookup(song).await?;
            return Ok(hit.map(|r| r.lyrics));
        }
        match self.provider(id) {
            Some(provider) => provider.fetch(song, options).await,
            None => Ok(None),
        }
    }

    async fn fetch_new(
        &self,
        song: &SongInfo,
        key: &str,
        force_reload: bool,
    ) -> Result<ResolvedLyrics> {
        let settings = self.settings.settings();
        let strategy = settings.cache_strategy;
        let order = provider_order(&settings.lyrics_provider);
        let options = FetchOptions::new(settings, force_reload);

        let mut found: Option<(LyricsPayload, &str)> = None;
        for id in order {
            match self.try_provider(id, song, &options).await {
                Ok(Some(lyrics)) if !lyrics.is_empty() => {
                    found = Some((lyrics, id.as_str()));
                    break;
                }
                Ok(_) => debug!(provider = %id, %key, "no lyrics from provider"),
                Err(e) => warn!(provider = %id, %key, error = %e, "provider failed"),
            }
        }

        if found.is_none()
            && song.has_subtitles()
            && let Some(subtitles) = &self.subtitles
        {
            match subtitles.fetch_subtitles(song).await {
                Ok(Some(lyrics)) if !lyrics.is_empty() => found = Some((lyrics, "subtitles")),
                Ok(_) => debug!(%key, "no usable subtitles"),
                Err(e) => warn!(%key, error = %e, "subtitle fallback failed"),
            }
        }

        let Some((mut lyrics, source)) = found else {
            info!(%key, "no lyrics found from any provider");
            return Err(LyricsError::NoLyricsFound);
        };

        let version = now_ms();
        lyrics.stamp(source, version);
        let resolved = ResolvedLyrics {
            lyrics: lyrics.clone(),
            version,
        };
        self.state.set_cached_lyrics(key, resolved.clone());

        if strategy.persists() {
            let record = LyricsRecord {
                key: key.to_string(),
                lyrics,
                version,
                timestamp: now_ms(),
                duration: song.duration,
            };
            if let Err(e) = self.store.set(record).await {
                warn!(%key, error = %e, "failed to persist lyrics");
            }
        }

        info!(%key, source, lines = resolved.lyrics.data.len(), "fetched lyrics");
        Ok(resolved)
    }
}
