//! KPoe (lyricsplus) client
//!
//! The lyricsplus backends aggregate several upstream sources (Apple Music,
//! Musixmatch, Spotify, ...) and answer in the KPoe JSON format. The public
//! deployment is mirrored on several hosts; they are tried in order until one
//! answers.

use super::{FetchOptions, LyricsProvider, ProviderId};
use crate::lyrics::parser::parse_kpoe;
use crate::lyrics::{LyricsPayload, SongInfo};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, HeaderValue};
use tracing::{debug, warn};

pub const KPOE_SERVERS: [&str; 4] = [
    "https://lyricsplus.prjktla.workers.dev",
    "https://lyrics-plus-backend.vercel.app",
    "https://lyricsplus.onrender.com",
    "https://lyricsplus.prjktla.online",
];

/// Which set of servers the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deployment {
    /// The public mirrors in [`KPOE_SERVERS`]
    Public,
    /// The user's own server from `custom_kpoe_url`
    Custom,
}

#[derive(Debug, Clone)]
pub struct KpoeClient {
    client: reqwest::Client,
    deployment: Deployment,
    servers: Vec<String>,
}

impl KpoeClient {
    const USER_AGENT: &'static str = "lyplus/0.1.0";

    fn build(deployment: Deployment, servers: Vec<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(Self::USER_AGENT)
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("build kpoe http client")?;
        Ok(Self {
            client,
            deployment,
            servers,
        })
    }

    /// Client for the public lyricsplus mirrors.
    pub fn new() -> anyhow::Result<Self> {
        Self::build(
            Deployment::Public,
            KPOE_SERVERS.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Client for a self-hosted backend; the URL is read from settings on every fetch.
    pub fn custom() -> anyhow::Result<Self> {
        Self::build(Deployment::Custom, Vec::new())
    }

    fn lyrics_url(base: &str, song: &SongInfo, options: &FetchOptions) -> String {
        let mut url = format!(
            "{}/v2/lyrics/get?title={}&artist={}",
            base.trim_end_matches('/'),
            urlencoding::encode(&song.title),
            urlencoding::encode(&song.artist)
        );
        if let Some(album) = song.album.as_deref().filter(|a| !a.is_empty()) {
            url.push_str(&format!("&album={}", urlencoding::encode(album)));
        }
        if let Some(duration) = song.duration {
            url.push_str(&format!("&duration={}", duration.round() as u64));
        }
        let order = options.settings.lyrics_source_order.trim();
        if !order.is_empty() {
            url.push_str(&format!("&source={}", urlencoding::encode(order)));
        }
        if options.force_reload {
            url.push_str("&forceReload=true");
        }
        url
    }

    async fn fetch_from(
        &self,
        base: &str,
        song: &SongInfo,
        options: &FetchOptions,
    ) -> anyhow::Result<Option<LyricsPayload>> {
        let url = Self::lyrics_url(base, song, options);
        let mut req = self.client.get(&url);
        if options.no_store {
            req = req.header(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        }

        let response = req.send().await.with_context(|| format!("GET {base}"))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("KPoe server {base} error: {}", response.status());
        }

        let body: serde_json::Value = response.json().await.context("parse kpoe json")?;
        Ok(parse_kpoe(&body))
    }
}

#[async_trait]
impl LyricsProvider for KpoeClient {
    fn id(&self) -> ProviderId {
        match self.deployment {
            Deployment::Public => ProviderId::Kpoe,
            Deployment::Custom => ProviderId::CustomKpoe,
        }
    }

    async fn fetch(
        &self,
        song: &SongInfo,
        options: &FetchOptions,
    ) -> anyhow::Result<Option<LyricsPayload>> {
        let servers = match self.deployment {
            Deployment::Public => self.servers.clone(),
            Deployment::Custom => match options.settings.custom_kpoe_url.as_deref() {
                Some(url) if !url.trim().is_empty() => vec![url.trim().to_string()],
                _ => {
                    debug!("custom KPoe server not configured");
                    return Ok(None);
                }
            },
        };

        let mut last_err = None;
        for base in &servers {
            match self.fetch_from(base, song, options).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(server = %base, error = %e, "KPoe server failed, trying next");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(e.context("all KPoe servers failed")),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_lyrics_url() {
        let song = SongInfo::new("Hello World", "A&B").with_album("X").with_duration(200.4);
        let options = FetchOptions::new(Settings::default(), true);
        let url = KpoeClient::lyrics_url("https://example.com/", &song, &options);
        assert!(url.starts_with("https://example.com/v2/lyrics/get?title=Hello%20World"));
        assert!(url.contains("&artist=A%26B"));
        assert!(url.contains("&album=X"));
        assert!(url.contains("&duration=200"));
        assert!(url.contains("&source=apple%2Clyricsplus"));
        assert!(url.ends_with("&forceReload=true"));
    }

    #[tokio::test]
    async fn test_custom_without_url_is_empty() {
        let client = KpoeClient::custom().unwrap();
        assert_eq!(client.id(), ProviderId::CustomKpoe);
        let options = FetchOptions::new(Settings::default(), false);
        let result = client.fetch(&SongInfo::new("t", "a"), &options).await.unwrap();
        assert!(result.is_none());
    }
}
