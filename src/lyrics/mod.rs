//! Lyrics resolution: song identity, lyric payloads, providers and the
//! caching engine that ties them together.
//!
//! This module provides:
//! - `SongInfo` and the cache keys derived from it
//! - `LyricsPayload` / `LyricLine`, the shape every provider returns
//! - LRC and KPoe parsers for locally uploaded lyrics
//! - `LyricsService`, the resolution engine

pub mod local;
pub mod parser;
pub mod providers;
pub mod service;

pub use local::LocalLyricsIndex;
pub use service::{LyricsService, ResolvedLyrics};

use crate::error::{LyricsError, Result};
use serde::{Deserialize, Serialize};

/// Identity of the song currently playing, as scraped by the page integration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<SubtitleTrack>,
    /// Identifier of a locally uploaded lyrics record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_id: Option<String>,
}

/// A caption track exposed by the streaming platform's player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleTrack {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl SongInfo {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            ..Self::default()
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Reject songs without a usable title or artist.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(LyricsError::InvalidInput("missing title".into()));
        }
        if self.artist.trim().is_empty() {
            return Err(LyricsError::InvalidInput("missing artist".into()));
        }
        Ok(())
    }

    /// `title - artist - album - duration`, the key for both lyric caches.
    ///
    /// Absent fields render as `undefined` so keys stay compatible with
    /// records written by the browser extension.
    pub fn cache_key(&self) -> String {
        let album = self.album.as_deref().unwrap_or("undefined");
        let duration = self
            .duration
            .map(|d| d.to_string())
            .unwrap_or_else(|| "undefined".to_string());
        format!("{} - {} - {} - {}", self.title, self.artist, album, duration)
    }

    /// `title|artist`, trimmed and lowercased. Used only for local lyrics matching.
    pub fn normalized_key(&self) -> Option<String> {
        let title = self.title.trim();
        let artist = self.artist.trim();
        if title.is_empty() || artist.is_empty() {
            return None;
        }
        Some(format!("{}|{}", title.to_lowercase(), artist.to_lowercase()))
    }

    pub fn has_subtitles(&self) -> bool {
        self.video_id.is_some() && self.subtitle.is_some()
    }
}

/// Syllable-level timing inside a line (word-synced lyrics).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Syllable {
    #[serde(default)]
    pub text: String,
    /// Start time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub romanized_text: Option<String>,
}

/// A single displayable lyric line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricLine {
    #[serde(default)]
    pub text: String,
    /// Start time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub syllabus: Vec<Syllable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub romanized_text: Option<String>,
}

impl LyricLine {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn timed(time_ms: u64, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            time: Some(time_ms),
            ..Self::default()
        }
    }

    /// Whether this line, or any of its syllables, already carries a romanization.
    pub fn has_romanization(&self) -> bool {
        self.romanized_text.as_deref().is_some_and(|r| !r.is_empty())
            || self
                .syllabus
                .iter()
                .any(|s| s.romanized_text.as_deref().is_some_and(|r| !r.is_empty()))
    }
}

/// Provider-supplied metadata. Unknown fields are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Wall-clock ms at which the lyrics were fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Lyrics as returned by providers and handed to the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LyricsPayload {
    /// "Line" or "Word" synced, "None" for plain text
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Vec<LyricLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<LyricsMetadata>,
}

impl LyricsPayload {
    pub fn from_lines(data: Vec<LyricLine>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        crate::util::is_empty_lyrics(Some(self))
    }

    pub fn texts(&self) -> Vec<String> {
        self.data.iter().map(|l| l.text.clone()).collect()
    }

    pub fn has_prebuilt_romanization(&self) -> bool {
        self.data.iter().any(LyricLine::has_romanization)
    }

    /// Record where and when these lyrics were obtained.
    pub fn stamp(&mut self, source: &str, fetched_at: i64) {
        let meta = self.metadata.get_or_insert_with(LyricsMetadata::default);
        if meta.source.is_none() {
            meta.source = Some(source.to_string());
        }
        meta.fetched_at = Some(fetched_at);
    }

    pub fn with_data(&self, data: Vec<LyricLine>) -> Self {
        Self {
            kind: self.kind.clone(),
            data,
            metadata: self.metadata.clone(),
        }
    }
}
