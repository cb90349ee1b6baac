//! LRCLIB API client
//!
//! LRCLIB is a free lyrics API that provides synchronized (LRC format) lyrics.
//! API Documentation: https://lrclib.net/docs

use super::{FetchOptions, LyricsProvider, ProviderId};
use crate::lyrics::parser::parse_lrc;
use crate::lyrics::{LyricsPayload, SongInfo};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, HeaderValue};
use serde::Deserialize;

/// LRCLIB API response
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LrclibResponse {
    pub id: i64,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: Option<String>,
    pub duration: Option<f64>,
    #[serde(default)]
    pub instrumental: bool,
    pub plain_lyrics: Option<String>,
    pub synced_lyrics: Option<String>,
}

impl LrclibResponse {
    /// Synced lyrics when available, otherwise plain text.
    pub fn into_payload(self) -> Option<LyricsPayload> {
        let mut payload = if let Some(synced) = self.synced_lyrics.as_deref()
            && !synced.trim().is_empty()
        {
            parse_lrc(synced, true)
        } else if let Some(plain) = self.plain_lyrics.as_deref()
            && !plain.trim().is_empty()
        {
            parse_lrc(plain, false)
        } else {
            return None;
        };
        let meta = payload.metadata.get_or_insert_with(Default::default);
        meta.source = Some(ProviderId::Lrclib.as_str().to_string());
        meta.extra.insert("lrclibId".into(), self.id.into());
        Some(payload)
    }
}

/// LRCLIB API client
#[derive(Debug, Clone)]
pub struct LrclibClient {
    client: reqwest::Client,
    base_url: String,
}

impl LrclibClient {
    const DEFAULT_BASE_URL: &'static str = "https://lrclib.net/api";
    const USER_AGENT: &'static str = "lyplus/0.1.0 (https://github.com/lyplus)";

    pub fn new() -> anyhow::Result<Self> {
        Self::with_base_url(Self::DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(Self::USER_AGENT)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build lrclib http client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Get lyrics by track info: exact match first, then search.
    pub async fn get_lyrics(
        &self,
        song: &SongInfo,
        no_store: bool,
    ) -> anyhow::Result<Option<LrclibResponse>> {
        if let Some(lyrics) = self.get_exact(song, no_store).await? {
            return Ok(Some(lyrics));
        }

        self.search(&song.title, &song.artist, no_store).await
    }

    async fn get_exact(
        &self,
        song: &SongInfo,
        no_store: bool,
    ) -> anyhow::Result<Option<LrclibResponse>> {
        let mut url = format!(
            "{}/get?track_name={}&artist_name={}",
            self.base_url,
            urlencoding::encode(&song.title),
            urlencoding::encode(&song.artist)
        );

        if let Some(album) = song.album.as_deref().filter(|a| !a.is_empty()) {
            url.push_str(&format!("&album_name={}", urlencoding::encode(album)));
        }

        if let Some(duration) = song.duration {
            url.push_str(&format!("&duration={}", duration.round() as u64));
        }

        let response = self.request(&url, no_store).send().await?;

        if response.status().is_success() {
            let lyrics: LrclibResponse = response.json().await.context("parse lrclib get")?;
            Ok(Some(lyrics))
        } else if response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            anyhow::bail!("LRCLIB API error: {}", response.status());
        }
    }

    async fn search(
        &self,
        track_name: &str,
        artist_name: &str,
        no_store: bool,
    ) -> anyhow::Result<Option<LrclibResponse>> {
        let url = format!(
            "{}/search?track_name={}&artist_name={}",
            self.base_url,
            urlencoding::encode(track_name),
            urlencoding::encode(artist_name)
        );

        let response = self.request(&url, no_store).send().await?;

        if response.status().is_success() {
            let results: Vec<LrclibResponse> =
                response.json().await.context("parse lrclib search")?;

            // Prefer a result with synced lyrics
            let best = results
                .iter()
                .find(|r| r.synced_lyrics.is_some())
                .or_else(|| results.first());

            Ok(best.cloned())
        } else if response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            anyhow::bail!("LRCLIB search error: {}", response.status());
        }
    }

    fn request(&self, url: &str, no_store: bool) -> reqwest::RequestBuilder {
        let req = self.client.get(url);
        if no_store {
            req.header(CACHE_CONTROL, HeaderValue::from_static("no-store"))
        } else {
            req
        }
    }
}

#[async_trait]
impl LyricsProvider for LrclibClient {
    fn id(&self) -> ProviderId {
        ProviderId::Lrclib
    }

    async fn fetch(
        &self,
        song: &SongInfo,
        options: &FetchOptions,
    ) -> anyhow::Result<Option<LyricsPayload>> {
        let response = self.get_lyrics(song, options.no_store).await?;
        Ok(response
            .filter(|r| !r.instrumental)
            .and_then(LrclibResponse::into_payload))
    }
}
