//! Cache administration: wipe everything, or report how much is stored.

use crate::error::{LyricsError, Result};
use crate::state::CacheState;
use crate::storage::{LyricsRecord, RecordStore, TranslationRecord};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Persisted lyrics + translation records
    pub entries: usize,
    /// Serialized JSON size of those records
    pub bytes: usize,
    pub memory_lyrics: usize,
    pub memory_translations: usize,
}

/// Clear both memory caches and both persistent caches. Local uploads are kept.
pub async fn reset_cache(
    state: &CacheState,
    lyrics: &dyn RecordStore<LyricsRecord>,
    translations: &dyn RecordStore<TranslationRecord>,
) -> Result<()> {
    state.clear();
    lyrics.clear().await.map_err(LyricsError::storage)?;
    translations.clear().await.map_err(LyricsError::storage)?;
    info!("cache reset");
    Ok(())
}

pub async fn cache_size(
    state: &CacheState,
    lyrics: &dyn RecordStore<LyricsRecord>,
    translations: &dyn RecordStore<TranslationRecord>,
) -> Result<CacheStats> {
    let lyric_records = lyrics.get_all().await.map_err(LyricsError::storage)?;
    let translation_records = translations.get_all().await.map_err(LyricsError::storage)?;

    let bytes = lyric_records
        .iter()
        .map(json_len)
        .chain(translation_records.iter().map(json_len))
        .sum();
    let (memory_lyrics, memory_translations) = state.entry_counts();

    Ok(CacheStats {
        entries: lyric_records.len() + translation_records.len(),
        bytes,
        memory_lyrics,
        memory_translations,
    })
}

fn json_len<T: Serialize>(record: &T) -> usize {
    serde_json::to_vec(record).map(|v| v.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::{LyricLine, LyricsPayload, ResolvedLyrics};
    use crate::storage::MemoryStore;

    fn lyrics_record(key: &str) -> LyricsRecord {
        LyricsRecord {
            key: key.to_string(),
            lyrics: LyricsPayload::from_lines(vec![LyricLine::new("la la")]),
            version: 1,
            timestamp: 1,
            duration: None,
        }
    }

    #[tokio::test]
    async fn test_size_then_reset() {
        let state = CacheState::new(8);
        let lyrics = MemoryStore::<LyricsRecord>::new();
        let translations = MemoryStore::<TranslationRecord>::new();

        lyrics.set(lyrics_record("a")).await.unwrap();
        lyrics.set(lyrics_record("b")).await.unwrap();
        translations
            .set(TranslationRecord {
                key: "a - translate - fr".into(),
                translated_lyrics: LyricsPayload::default(),
                original_version: 1,
            })
            .await
            .unwrap();
        state.set_cached_lyrics(
            "a",
            ResolvedLyrics {
                lyrics: LyricsPayload::default(),
                version: 1,
            },
        );

        let stats = cache_size(&state, &lyrics, &translations).await.unwrap();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.memory_lyrics, 1);
        assert_eq!(stats.memory_translations, 0);
        let expected = json_len(&lyrics_record("a")) * 2;
        assert!(stats.bytes > expected);

        reset_cache(&state, &lyrics, &translations).await.unwrap();
        let stats = cache_size(&state, &lyrics, &translations).await.unwrap();
        assert_eq!(stats, CacheStats::default());
    }
}
