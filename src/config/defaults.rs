use super::{CacheConfig, CacheStrategy, Config, PathsConfig, Settings};

/// Upstream sources the KPoe backends try, in order.
pub const DEFAULT_SOURCE_ORDER: &str = "apple,lyricsplus,musixmatch,spotify,musixmatch-word";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Config written on first run.
pub fn defaults() -> Config {
    Config {
        paths: PathsConfig::default(),
        cache: CacheConfig::default(),
        settings: Settings::default(),
    }
}

impl Default for Config {
    fn default() -> Self {
        defaults()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_strategy: CacheStrategy::Aggressive,
            lyrics_provider: "kpoe".to_string(),
            lyrics_source_order: DEFAULT_SOURCE_ORDER.to_string(),
            custom_kpoe_url: None,
            translation_provider: "google".to_string(),
            romanization_provider: "google".to_string(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            override_translate_target: false,
            custom_translate_target: None,
        }
    }
}
