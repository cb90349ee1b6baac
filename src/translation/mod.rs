//! Translation and romanization on top of resolved lyrics.
//!
//! Results are cached per (song, action, target language) and are only valid
//! for the lyrics version they were produced from; a re-fetch of the original
//! lyrics silently invalidates every translation derived from it.

pub mod gemini;
pub mod google;

pub use gemini::GeminiTranslator;
pub use google::GoogleTranslator;

use crate::config::Settings;
use crate::error::{LyricsError, Result};
use crate::lyrics::{LyricLine, LyricsPayload, LyricsService, SongInfo};
use crate::state::CachedTranslation;
use crate::storage::{RecordStore, TranslationRecord};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Upper bound on concurrent per-line translation requests.
pub const MAX_TRANSLATION_WORKERS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Translate,
    Romanize,
    None,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Translate => "translate",
            Self::Romanize => "romanize",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = LyricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "translate" => Ok(Self::Translate),
            "romanize" => Ok(Self::Romanize),
            "none" => Ok(Self::None),
            other => Err(LyricsError::InvalidInput(format!("unknown action: {other}"))),
        }
    }
}

/// Non-AI translation backend, called once per line.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str) -> anyhow::Result<String>;

    /// Romanize a whole payload, returning its lines with `romanized_text` filled.
    async fn romanize(&self, lyrics: &LyricsPayload) -> anyhow::Result<Vec<LyricLine>>;
}

/// AI backend that handles a whole song per request.
#[async_trait]
pub trait AiTranslator: Send + Sync {
    async fn translate(
        &self,
        texts: &[String],
        target_lang: &str,
        settings: &Settings,
    ) -> anyhow::Result<Vec<String>>;

    async fn romanize(
        &self,
        lyrics: &LyricsPayload,
        settings: &Settings,
    ) -> anyhow::Result<Vec<LyricLine>>;
}

/// `{lyrics cache key} - {action} - {target}`
pub fn translation_key(song: &SongInfo, action: Action, target_lang: &str) -> String {
    format!("{} - {} - {}", song.cache_key(), action, target_lang)
}

/// Translate `texts` one line at a time with at most [`MAX_TRANSLATION_WORKERS`]
/// requests in flight.
///
/// Workers pull the next index from a shared cursor, so output order always
/// matches input order. A line whose request fails keeps its original text.
pub async fn translate_lines(
    translator: &dyn Translator,
    texts: &[String],
    target_lang: &str,
) -> Vec<String> {
    let workers = texts.len().clamp(1, MAX_TRANSLATION_WORKERS);
    let cursor = AtomicUsize::new(0);
    let cursor = &cursor;

    let worker = |_: usize| async move {
        let mut done = Vec::new();
        loop {
            let i = cursor.fetch_add(1, Ordering::SeqCst);
            let Some(text) = texts.get(i) else { break };
            let translated = match translator.translate(text, target_lang).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(line = i, error = %e, "line translation failed, keeping original");
                    text.clone()
                }
            };
            done.push((i, translated));
        }
        done
    };

    let batches = futures::future::join_all((0..workers).map(worker)).await;

    let mut out = texts.to_vec();
    for (i, translated) in batches.into_iter().flatten() {
        out[i] = translated;
    }
    out
}

/// Attach translations to lines positionally; missing or empty ones fall back to the original.
fn zip_translations(lines: &[LyricLine], translated: &[String]) -> Vec<LyricLine> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let text = translated
                .get(i)
                .filter(|t| !t.is_empty())
                .cloned()
                .unwrap_or_else(|| line.text.clone());
            LyricLine {
                translated_text: Some(text),
                ..line.clone()
            }
        })
        .collect()
}

pub struct TranslationService {
    lyrics: LyricsService,
    store: Arc<dyn RecordStore<TranslationRecord>>,
    translator: Arc<dyn Translator>,
    ai: Option<Arc<dyn AiTranslator>>,
}

impl TranslationService {
    pub fn new(
        lyrics: LyricsService,
        store: Arc<dyn RecordStore<TranslationRecord>>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            lyrics,
            store,
            translator,
            ai: None,
        }
    }

    pub fn with_ai(mut self, ai: Arc<dyn AiTranslator>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn lyrics(&self) -> &LyricsService {
        &self.lyrics
    }

    pub fn store(&self) -> &dyn RecordStore<TranslationRecord> {
        self.store.as_ref()
    }

    /// Lyrics for `song` with `action` applied.
    ///
    /// `force_reload` re-fetches the original lyrics and skips the translation caches.
    pub async fn resolve(
        &self,
        song: &SongInfo,
        action: Action,
        target_lang: &str,
        force_reload: bool,
    ) -> Result<LyricsPayload> {
        let original = self.lyrics.resolve(song, force_reload).await?;
        if original.lyrics.is_empty() {
            return Err(LyricsError::EmptyOriginalLyrics);
        }

        let key = translation_key(song, action, target_lang);
        if !force_reload && let Some(hit) = self.cached(&key, original.version).await {
            debug!(%key, "translation cache hit");
            return Ok(hit);
        }

        let settings = self.lyrics.settings();
        let target = settings.effective_target_lang(target_lang).to_string();
        let data = self
            .perform(&original.lyrics, action, &target, &settings)
            .await?;
        let translated = original.lyrics.with_data(data);

        self.lyrics.state().set_cached_translation(
            &key,
            CachedTranslation {
                translated_lyrics: translated.clone(),
                original_version: original.version,
            },
        );
        let record = TranslationRecord {
            key: key.clone(),
            translated_lyrics: translated.clone(),
            original_version: original.version,
        };
        if let Err(e) = self.store.set(record).await {
            warn!(%key, error = %e, "failed to persist translation");
        }

        info!(%key, %target, "translation ready");
        Ok(translated)
    }

    async fn cached(&self, key: &str, version: i64) -> Option<LyricsPayload> {
        let state = self.lyrics.state();
        if let Some(hit) = state.cached_translation(key)
            && hit.original_version == version
        {
            return Some(hit.translated_lyrics);
        }

        let record = match self.store.get(key).await {
            Ok(record) => record?,
            Err(e) => {
                warn!(%key, error = %e, "translation cache read failed");
                return None;
            }
        };

        if record.original_version == version {
            state.set_cached_translation(
                key,
                CachedTranslation {
                    translated_lyrics: record.translated_lyrics.clone(),
                    original_version: record.original_version,
                },
            );
            return Some(record.translated_lyrics);
        }

        debug!(
            %key,
            stored = record.original_version,
            current = version,
            "dropping stale translation"
        );
        if let Err(e) = self.store.delete(key).await {
            warn!(%key, error = %e, "failed to delete stale translation");
        }
        None
    }

    async fn perform(
        &self,
        lyrics: &LyricsPayload,
        action: Action,
        target_lang: &str,
        settings: &Settings,
    ) -> Result<Vec<LyricLine>> {
        match action {
            Action::Translate => {
                let texts = lyrics.texts();
                let translated = match &self.ai {
                    Some(ai) if settings.ai_translation_enabled() => ai
                        .translate(&texts, target_lang, settings)
                        .await
                        .map_err(|e| LyricsError::Translation(format!("{e:#}")))?,
                    _ => translate_lines(self.translator.as_ref(), &texts, target_lang).await,
                };
                Ok(zip_translations(&lyrics.data, &translated))
            }
            Action::Romanize => {
                if lyrics.has_prebuilt_romanization() {
                    debug!("using prebuilt romanization");
                    return Ok(lyrics.data.clone());
                }
                let romanized = match &self.ai {
                    Some(ai) if settings.ai_romanization_enabled() => {
                        ai.romanize(lyrics, settings).await
                    }
                    _ => self.translator.romanize(lyrics).await,
                };
                romanized.map_err(|e| LyricsError::Translation(format!("{e:#}")))
            }
            Action::None => Ok(lyrics.data.clone()),
        }
    }
}
