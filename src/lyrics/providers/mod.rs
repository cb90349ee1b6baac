//! Lyrics provider adapters and the ordering rules for trying them.

pub mod kpoe;
pub mod lrclib;
pub mod youtube;

pub use kpoe::KpoeClient;
pub use lrclib::LrclibClient;
pub use youtube::YouTubeSubtitles;

use super::{LyricsPayload, SongInfo};
use crate::config::Settings;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

/// Every provider name the settings may mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    Kpoe,
    CustomKpoe,
    Lrclib,
    Local,
    Gemini,
    Google,
}

impl ProviderId {
    /// Lyric sources in fallback order. Translation-only providers are absent.
    pub const LYRICS_FALLBACK_ORDER: [ProviderId; 4] =
        [Self::Kpoe, Self::CustomKpoe, Self::Lrclib, Self::Local];

    /// Used when the preferred provider is unknown or can't serve lyrics.
    pub const PRIMARY: ProviderId = Self::Kpoe;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kpoe => "kpoe",
            Self::CustomKpoe => "customKpoe",
            Self::Lrclib => "lrclib",
            Self::Local => "local",
            Self::Gemini => "gemini",
            Self::Google => "google",
        }
    }

    pub fn is_translation_only(&self) -> bool {
        matches!(self, Self::Gemini | Self::Google)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kpoe" => Ok(Self::Kpoe),
            "customKpoe" => Ok(Self::CustomKpoe),
            "lrclib" => Ok(Self::Lrclib),
            "local" => Ok(Self::Local),
            "gemini" => Ok(Self::Gemini),
            "google" => Ok(Self::Google),
            other => anyhow::bail!("unknown provider: {other}"),
        }
    }
}

/// Preferred provider first, then the rest of the lyric sources in fixed order.
pub fn provider_order(preferred: &str) -> Vec<ProviderId> {
    let first = match preferred.parse::<ProviderId>() {
        Ok(id) if !id.is_translation_only() => id,
        _ => ProviderId::PRIMARY,
    };

    std::iter::once(first)
        .chain(
            ProviderId::LYRICS_FALLBACK_ORDER
                .into_iter()
                .filter(|p| *p != first),
        )
        .collect()
}

/// Per-fetch knobs handed to every provider.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub settings: Settings,
    pub force_reload: bool,
    /// Ask upstream HTTP caches not to store the response.
    pub no_store: bool,
}

impl FetchOptions {
    pub fn new(settings: Settings, force_reload: bool) -> Self {
        let no_store = !settings.cache_strategy.persists();
        Self {
            settings,
            force_reload,
            no_store,
        }
    }
}

/// A remote source of lyrics.
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Fetch lyrics for a song.
    ///
    /// # Returns
    /// * `Ok(Some(lyrics))` if lyrics found
    /// * `Ok(None)` if lyrics not found
    /// * `Err` on network or parse failure
    async fn fetch(
        &self,
        song: &SongInfo,
        options: &FetchOptions,
    ) -> anyhow::Result<Option<LyricsPayload>>;
}

/// Last-resort source: captions exposed by the streaming platform itself.
#[async_trait]
pub trait SubtitleSource: Send + Sync {
    async fn fetch_subtitles(&self, song: &SongInfo) -> anyhow::Result<Option<LyricsPayload>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProviderId::*;

    #[test]
    fn test_preferred_first() {
        assert_eq!(provider_order("lrclib"), vec![Lrclib, Kpoe, CustomKpoe, Local]);
        assert_eq!(provider_order("local"), vec![Local, Kpoe, CustomKpoe, Lrclib]);
    }

    #[test]
    fn test_unknown_falls_back_to_primary() {
        assert_eq!(provider_order("musixmatch"), vec![Kpoe, CustomKpoe, Lrclib, Local]);
        assert_eq!(provider_order(""), vec![Kpoe, CustomKpoe, Lrclib, Local]);
    }

    #[test]
    fn test_translation_providers_excluded() {
        for preferred in ["google", "gemini", "kpoe", "nonsense"] {
            let order = provider_order(preferred);
            assert_eq!(order[0], Kpoe);
            assert!(!order.iter().any(ProviderId::is_translation_only));
            assert_eq!(order.len(), 4);
        }
    }

    #[test]
    fn test_round_trip_names() {
        for id in [Kpoe, CustomKpoe, Lrclib, Local, Gemini, Google] {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
        }
    }
}
