//! Lyrics the user uploaded themselves.
//!
//! Lookups by title/artist go through an index built lazily from the whole
//! local store. The index is rebuilt on the first lookup after any upload,
//! update or delete; concurrent lookups during a build wait for that build
//! instead of starting their own.

use super::parser::parse_local_lyrics;
use super::providers::ProviderId;
use super::service::ResolvedLyrics;
use super::{LyricsPayload, SongInfo};
use crate::error::{LyricsError, Result};
use crate::storage::{LocalLyricsRecord, RecordStore};
use crate::util::now_ms;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One song in the index, keyed by its normalized `title|artist`.
#[derive(Debug, Clone)]
pub struct LocalIndexEntry {
    pub song_id: String,
    pub parsed_lyrics: LyricsPayload,
    pub version: i64,
    pub timestamp: i64,
}

/// What `list` reports per upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalLyricsSummary {
    pub song_id: String,
    pub song_info: SongInfo,
    pub timestamp: Option<i64>,
}

struct BuiltIndex {
    generation: u64,
    entries: Arc<HashMap<String, LocalIndexEntry>>,
}

pub struct LocalLyricsIndex {
    store: Arc<dyn RecordStore<LocalLyricsRecord>>,
    built: Mutex<Option<BuiltIndex>>,
    generation: AtomicU64,
    builds: AtomicU64,
    next_id: AtomicU64,
}

fn record_version(record: &LocalLyricsRecord) -> i64 {
    record
        .timestamp
        .or_else(|| record.song_id.parse().ok())
        .unwrap_or(0)
}

/// Parse a stored upload and tag it as local, whatever the upload claimed.
fn parse_upload(raw: &serde_json::Value) -> Option<LyricsPayload> {
    let mut lyrics = parse_local_lyrics(raw)?;
    let meta = lyrics.metadata.get_or_insert_with(Default::default);
    meta.source = Some(ProviderId::Local.as_str().to_string());
    Some(lyrics)
}

impl LocalLyricsIndex {
    pub fn new(store: Arc<dyn RecordStore<LocalLyricsRecord>>) -> Self {
        Self {
            store,
            built: Mutex::new(None),
            generation: AtomicU64::new(0),
            builds: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
        }
    }

    /// Force the next lookup to rebuild the index.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// How many times the index has been built.
    pub fn build_count(&self) -> u64 {
        self.builds.load(Ordering::SeqCst)
    }

    /// Find local lyrics for a song.
    ///
    /// A `song_id` on the song is tried first against the store directly, so it
    /// always reflects persisted state; otherwise the title/artist index is used.
    pub async fn lookup(&self, song: &SongInfo) -> Result<Option<ResolvedLyrics>> {
        if let Some(song_id) = song.song_id.as_deref() {
            let record = self.store.get(song_id).await.map_err(LyricsError::storage)?;
            if let Some(record) = record
                && let Some(lyrics) = parse_upload(&record.lyrics)
            {
                debug!(song_id, "local lyrics matched by id");
                return Ok(Some(ResolvedLyrics {
                    lyrics,
                    version: record_version(&record),
                }));
            }
        }

        let Some(key) = song.normalized_key() else {
            return Ok(None);
        };
        let index = self.ensure_built().await?;
        Ok(index.get(&key).map(|entry| ResolvedLyrics {
            lyrics: entry.parsed_lyrics.clone(),
            version: entry.version,
        }))
    }

    async fn ensure_built(&self) -> Result<Arc<HashMap<String, LocalIndexEntry>>> {
        let mut built = self.built.lock().await;
        let generation = self.generation.load(Ordering::SeqCst);
        if let Some(index) = built.as_ref()
            && index.generation == generation
        {
            return Ok(index.entries.clone());
        }

        let records = self.store.get_all().await.map_err(LyricsError::storage)?;
        let entries = Arc::new(Self::build_entries(records));
        self.builds.fetch_add(1, Ordering::SeqCst);
        info!(songs = entries.len(), "built local lyrics index");

        // An invalidation that raced this build leaves the stored generation
        // behind, so the next lookup rebuilds.
        *built = Some(BuiltIndex {
            generation,
            entries: entries.clone(),
        });
        Ok(entries)
    }

    fn build_entries(records: Vec<LocalLyricsRecord>) -> HashMap<String, LocalIndexEntry> {
        let mut map: HashMap<String, LocalIndexEntry> = HashMap::new();
        for record in records {
            let Some(key) = record.song_info.normalized_key() else {
                continue;
            };
            let Some(parsed_lyrics) = parse_upload(&record.lyrics) else {
                debug!(song_id = %record.song_id, "skipping unparseable local lyrics");
                continue;
            };
            let timestamp = record.timestamp.unwrap_or(0);
            if map.get(&key).is_some_and(|existing| existing.timestamp >= timestamp) {
                continue;
            }
            let version = record_version(&record);
            map.insert(
                key,
                LocalIndexEntry {
                    song_id: record.song_id,
                    parsed_lyrics,
                    version,
                    timestamp,
                },
            );
        }
        map
    }

    fn new_song_id(&self) -> String {
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("local-{}-{}", now_ms(), seq)
    }

    /// Store a new upload and return its id.
    pub async fn upload(&self, song_info: SongInfo, raw: serde_json::Value) -> Result<String> {
        song_info.validate()?;
        if parse_local_lyrics(&raw).is_none() {
            return Err(LyricsError::LocalLyrics("lyrics could not be parsed".into()));
        }

        let song_id = self.new_song_id();
        self.store
            .set(LocalLyricsRecord {
                song_id: song_id.clone(),
                song_info,
                lyrics: raw,
                timestamp: Some(now_ms()),
            })
            .await
            .map_err(LyricsError::storage)?;
        self.invalidate();
        info!(%song_id, "uploaded local lyrics");
        Ok(song_id)
    }

    /// Replace the lyrics of an existing upload.
    pub async fn update(&self, song_id: &str, raw: serde_json::Value) -> Result<()> {
        let mut record = self
            .get(song_id)
            .await?
            .ok_or_else(|| LyricsError::LocalLyrics(format!("unknown song id {song_id}")))?;
        if parse_local_lyrics(&raw).is_none() {
            return Err(LyricsError::LocalLyrics("lyrics could not be parsed".into()));
        }

        record.lyrics = raw;
        record.timestamp = Some(now_ms());
        self.store.set(record).await.map_err(LyricsError::storage)?;
        self.invalidate();
        info!(song_id, "updated local lyrics");
        Ok(())
    }

    pub async fn delete(&self, song_id: &str) -> Result<()> {
        self.store.delete(song_id).await.map_err(LyricsError::storage)?;
        self.invalidate();
        info!(song_id, "deleted local lyrics");
        Ok(())
    }

    pub async fn get(&self, song_id: &str) -> Result<Option<LocalLyricsRecord>> {
        self.store.get(song_id).await.map_err(LyricsError::storage)
    }

    pub async fn list(&self) -> Result<Vec<LocalLyricsSummary>> {
        let records = self.store.get_all().await.map_err(LyricsError::storage)?;
        Ok(records
            .into_iter()
            .map(|r| LocalLyricsSummary {
                song_id: r.song_id,
                song_info: r.song_info,
                timestamp: r.timestamp,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    /// Wraps a store and counts full scans.
    struct CountingStore {
        inner: MemoryStore<LocalLyricsRecord>,
        scans: AtomicU64,
    }

    #[async_trait]
    impl RecordStore<LocalLyricsRecord> for CountingStore {
        async fn get(&self, key: &str) -> anyhow::Result<Option<LocalLyricsRecord>> {
            self.inner.get(key).await
        }
        async fn set(&self, record: LocalLyricsRecord) -> anyhow::Result<()> {
            self.inner.set(record).await
        }
        async fn delete(&self, key: &str) -> anyhow::Result<()> {
            self.inner.delete(key).await
        }
        async fn get_all(&self) -> anyhow::Result<Vec<LocalLyricsRecord>> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            // Give concurrent callers a chance to pile up behind the build.
            tokio::task::yield_now().await;
            self.inner.get_all().await
        }
        async fn clear(&self) -> anyhow::Result<()> {
            self.inner.clear().await
        }
    }

    fn record(id: &str, title: &str, text: &str, timestamp: i64) -> LocalLyricsRecord {
        LocalLyricsRecord {
            song_id: id.into(),
            song_info: SongInfo::new(title, "Artist"),
            lyrics: json!({ "data": [{ "text": text }] }),
            timestamp: Some(timestamp),
        }
    }

    fn counting() -> Arc<CountingStore> {
        Arc::new(CountingStore {
            inner: MemoryStore::new(),
            scans: AtomicU64::new(0),
        })
    }

    #[tokio::test]
    async fn test_latest_timestamp_wins() {
        let store = Arc::new(MemoryStore::<LocalLyricsRecord>::new());
        store.set(record("1", "Song", "old", 10)).await.unwrap();
        store.set(record("2", " SONG ", "new", 20)).await.unwrap();
        store.set(record("3", "Song", "older", 5)).await.unwrap();
        store
            .set(LocalLyricsRecord {
                lyrics: json!(12),
                ..record("4", "Song", "", 99)
            })
            .await
            .unwrap();

        let index = LocalLyricsIndex::new(store);
        let hit = index.lookup(&SongInfo::new("song", "artist")).await.unwrap().unwrap();
        assert_eq!(hit.lyrics.texts(), vec!["new"]);
        assert_eq!(hit.version, 20);
    }

    #[tokio::test]
    async fn test_lookup_by_song_id_bypasses_index() {
        let store = Arc::new(MemoryStore::<LocalLyricsRecord>::new());
        store.set(record("abc", "Other", "by id", 1)).await.unwrap();

        let index = LocalLyricsIndex::new(store);
        let mut song = SongInfo::new("Unrelated", "Nobody");
        song.song_id = Some("abc".into());

        let hit = index.lookup(&song).await.unwrap().unwrap();
        assert_eq!(hit.lyrics.texts(), vec!["by id"]);
        let source = hit.lyrics.metadata.and_then(|m| m.source);
        assert_eq!(source.as_deref(), Some("local"));
        assert_eq!(index.build_count(), 0);
    }

    #[tokio::test]
    async fn test_index_reused_until_invalidated() {
        let store = counting();
        store.set(record("1", "Song", "a", 1)).await.unwrap();
        let index = LocalLyricsIndex::new(store.clone());
        let song = SongInfo::new("Song", "Artist");

        index.lookup(&song).await.unwrap();
        index.lookup(&song).await.unwrap();
        assert_eq!(store.scans.load(Ordering::SeqCst), 1);

        index.invalidate();
        index.lookup(&song).await.unwrap();
        assert_eq!(store.scans.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_lookups_share_one_rebuild() {
        let store = counting();
        store.set(record("1", "Song", "a", 1)).await.unwrap();
        let index = Arc::new(LocalLyricsIndex::new(store.clone()));

        index.lookup(&SongInfo::new("Song", "Artist")).await.unwrap();
        index.invalidate();
        let before = store.scans.load(Ordering::SeqCst);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let index = index.clone();
                tokio::spawn(async move { index.lookup(&SongInfo::new("Song", "Artist")).await })
            })
            .collect();
        for h in handles {
            assert!(h.await.unwrap().unwrap().is_some());
        }

        assert_eq!(store.scans.load(Ordering::SeqCst) - before, 1);
    }

    #[tokio::test]
    async fn test_mutations_invalidate() {
        let store = Arc::new(MemoryStore::<LocalLyricsRecord>::new());
        let index = LocalLyricsIndex::new(store);
        let song = SongInfo::new("Song", "Artist");

        assert!(index.lookup(&song).await.unwrap().is_none());

        let id = index
            .upload(song.clone(), json!("[00:01.00]first"))
            .await
            .unwrap();
        assert_eq!(index.lookup(&song).await.unwrap().unwrap().lyrics.texts(), vec!["first"]);

        index.update(&id, json!("[00:01.00]second")).await.unwrap();
        assert_eq!(index.lookup(&song).await.unwrap().unwrap().lyrics.texts(), vec!["second"]);
        assert_eq!(index.list().await.unwrap().len(), 1);

        index.delete(&id).await.unwrap();
        assert!(index.lookup(&song).await.unwrap().is_none());
        assert_eq!(index.build_count(), 4);
    }

    #[tokio::test]
    async fn test_upload_rejects_garbage() {
        let index = LocalLyricsIndex::new(Arc::new(MemoryStore::<LocalLyricsRecord>::new()));
        let err = index
            .upload(SongInfo::new("t", "a"), json!({ "nope": true }))
            .await
            .unwrap_err();
        assert!(matches!(err, LyricsError::LocalLyrics(_)));

        let err = index.update("missing", json!("text")).await.unwrap_err();
        assert!(matches!(err, LyricsError::LocalLyrics(_)));
    }
}
