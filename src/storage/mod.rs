//! Persistent key-value stores backing the lyric caches and local uploads.
//!
//! Three logical stores share one SQLite file, each in its own table with
//! records kept as JSON. [`MemoryStore`] offers the same interface without
//! touching disk.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, Storage};

use crate::lyrics::{LyricsPayload, SongInfo};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A record that knows its own primary key.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn key(&self) -> &str;
}

/// Minimal store contract: get/set/delete/get_all, plus clear for cache resets.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<R>>;
    async fn set(&self, record: R) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
    async fn get_all(&self) -> anyhow::Result<Vec<R>>;
    async fn clear(&self) -> anyhow::Result<()>;
}

/// A persisted lyrics cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricsRecord {
    pub key: String,
    pub lyrics: LyricsPayload,
    pub version: i64,
    /// When the record was written (ms); drives expiry
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl Record for LyricsRecord {
    fn key(&self) -> &str {
        &self.key
    }
}

/// A persisted translation, valid only against one version of the original lyrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRecord {
    pub key: String,
    pub translated_lyrics: LyricsPayload,
    pub original_version: i64,
}

impl Record for TranslationRecord {
    fn key(&self) -> &str {
        &self.key
    }
}

/// Lyrics uploaded by the user, stored raw (LRC text or KPoe JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalLyricsRecord {
    pub song_id: String,
    pub song_info: SongInfo,
    pub lyrics: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl Record for LocalLyricsRecord {
    fn key(&self) -> &str {
        &self.song_id
    }
}
