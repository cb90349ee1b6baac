//! Wires storage, providers and the two engines into one handle.

use crate::cache::{self, CacheStats};
use crate::config::{Config, SharedSettings};
use crate::error::Result;
use crate::lyrics::providers::{KpoeClient, LrclibClient, YouTubeSubtitles};
use crate::lyrics::{LocalLyricsIndex, LyricsService};
use crate::sponsorblock::{Segment, SponsorBlockClient};
use crate::state::CacheState;
use crate::storage::Storage;
use crate::translation::{GeminiTranslator, GoogleTranslator, TranslationService};
use anyhow::Context;
use std::sync::Arc;
use tracing::debug;

pub struct Engine {
    settings: SharedSettings,
    translations: TranslationService,
    sponsorblock: SponsorBlockClient,
}

impl Engine {
    /// Open the on-disk database under the configured data dir.
    pub fn open(cfg: &Config) -> anyhow::Result<Self> {
        let path = cfg.database_path();
        debug!(path = %path.display(), "opening database");
        let storage = Storage::open(&path).context("open database")?;
        Self::with_storage(cfg, storage)
    }

    pub fn with_storage(cfg: &Config, storage: Storage) -> anyhow::Result<Self> {
        let settings = SharedSettings::new(cfg.settings.clone());
        let state = Arc::new(CacheState::new(cfg.cache.memory_capacity));
        let local = Arc::new(LocalLyricsIndex::new(Arc::new(storage.local_lyrics())));

        let lyrics = LyricsService::builder(
            state,
            Arc::new(storage.lyrics()),
            local,
            Arc::new(settings.clone()),
        )
        .provider(Arc::new(KpoeClient::new()?))
        .provider(Arc::new(KpoeClient::custom()?))
        .provider(Arc::new(LrclibClient::new()?))
        .subtitles(Arc::new(YouTubeSubtitles::new()?))
        .build();

        let translations = TranslationService::new(
            lyrics,
            Arc::new(storage.translations()),
            Arc::new(GoogleTranslator::new()?),
        )
        .with_ai(Arc::new(GeminiTranslator::new()?));

        Ok(Self {
            settings,
            translations,
            sponsorblock: SponsorBlockClient::new()?,
        })
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn lyrics(&self) -> &LyricsService {
        self.translations.lyrics()
    }

    pub fn translations(&self) -> &TranslationService {
        &self.translations
    }

    /// Read access to local uploads. Mutate through [`LyricsService::upload_local`]
    /// and friends so cached hits are dropped.
    pub fn local(&self) -> &LocalLyricsIndex {
        self.lyrics().local()
    }

    pub async fn reset_cache(&self) -> Result<()> {
        cache::reset_cache(
            self.lyrics().state(),
            self.lyrics().store(),
            self.translations.store(),
        )
        .await
    }

    pub async fn cache_size(&self) -> Result<CacheStats> {
        cache::cache_size(
            self.lyrics().state(),
            self.lyrics().store(),
            self.translations.store(),
        )
        .await
    }

    pub async fn sponsor_segments(&self, video_id: &str) -> Vec<Segment> {
        self.sponsorblock.fetch_segments(video_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::SongInfo;
    use crate::translation::Action;
    use serde_json::json;

    fn engine() -> Engine {
        Engine::with_storage(&Config::default(), Storage::open_in_memory().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_local_upload_resolves_offline() {
        let engine = engine();
        let id = engine
            .lyrics()
            .upload_local(
                SongInfo::new("Night Drive", "Neon"),
                json!("[00:01.00]first\n[00:03.00]second"),
            )
            .await
            .unwrap();

        let song = SongInfo::new("night drive ", "NEON").with_duration(180.0);
        let resolved = engine.lyrics().resolve(&song, false).await.unwrap();
        assert_eq!(resolved.lyrics.texts(), vec!["first", "second"]);

        let plain = engine
            .translations()
            .resolve(&song, Action::None, "en", false)
            .await
            .unwrap();
        assert_eq!(plain.texts(), vec!["first", "second"]);

        let stats = engine.cache_size().await.unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.memory_lyrics, 1);
        assert_eq!(stats.memory_translations, 1);

        engine.reset_cache().await.unwrap();
        assert_eq!(engine.cache_size().await.unwrap(), CacheStats::default());
        assert!(engine.local().get(&id).await.unwrap().is_some());
    }
}
