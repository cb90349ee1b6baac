use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub mod defaults;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub cache: CacheConfig,
    pub settings: Settings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Max resolved entries kept in memory per cache (lyrics, translations).
    pub memory_capacity: usize,
}

/// How long persisted lyrics stay valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    /// Never read or write the persistent lyrics cache.
    None,
    /// 12 hours
    Moderate,
    /// 24 hours
    #[default]
    Aggressive,
}

impl CacheStrategy {
    /// Max age of a persisted entry in ms, or `None` when persistence is off.
    pub fn max_age_ms(self) -> Option<i64> {
        const HOUR_MS: i64 = 60 * 60 * 1000;
        match self {
            Self::None => None,
            Self::Moderate => Some(12 * HOUR_MS),
            Self::Aggressive => Some(24 * HOUR_MS),
        }
    }

    pub fn persists(self) -> bool {
        self != Self::None
    }
}

/// User-facing settings, re-read on every resolution so edits apply immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache_strategy: CacheStrategy,
    /// Preferred lyrics provider (kpoe, customKpoe, lrclib, local)
    pub lyrics_provider: String,
    /// Comma-separated upstream source order forwarded to KPoe backends
    pub lyrics_source_order: String,
    pub custom_kpoe_url: Option<String>,
    /// google or gemini
    pub translation_provider: String,
    /// google or gemini
    pub romanization_provider: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub override_translate_target: bool,
    pub custom_translate_target: Option<String>,
}

impl Settings {
    fn has_gemini_key(&self) -> bool {
        self.gemini_api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn ai_translation_enabled(&self) -> bool {
        self.translation_provider == "gemini" && self.has_gemini_key()
    }

    pub fn ai_romanization_enabled(&self) -> bool {
        self.romanization_provider == "gemini" && self.has_gemini_key()
    }

    /// The user's forced target language wins over the one the caller asked for.
    pub fn effective_target_lang<'a>(&'a self, requested: &'a str) -> &'a str {
        match self.custom_translate_target.as_deref() {
            Some(custom) if self.override_translate_target && !custom.trim().is_empty() => custom,
            _ => requested,
        }
    }
}

/// Anything that can hand out the current settings.
pub trait SettingsSource: Send + Sync {
    fn settings(&self) -> Settings;
}

impl SettingsSource for Settings {
    fn settings(&self) -> Settings {
        self.clone()
    }
}

/// Settings that can be swapped at runtime while engines hold a handle.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }
}

impl SettingsSource for SharedSettings {
    fn settings(&self) -> Settings {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "lyplus", "lyplus")
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data_dir = project_dirs()
            .as_ref()
            .map(|p| p.data_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("lyplus"));
        Self { data_dir }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 512,
        }
    }
}

impl Config {
    pub fn database_path(&self) -> PathBuf {
        self.paths.data_dir.join("lyplus.sqlite3")
    }
}

pub fn save(cfg: &Config, override_path: Option<&Path>) -> anyhow::Result<()> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    write_config(&path, cfg)
}

fn write_config(path: &Path, cfg: &Config) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let raw = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, raw).with_context(|| format!("write {}", path.display()))?;
    #[cfg(unix)]
    {
        // The file may hold an API key.
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let proj = project_dirs().context("ProjectDirs unavailable")?;
    Ok(proj.config_dir().join("config.toml"))
}

pub fn load(override_path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        let cfg = defaults::defaults();
        write_config(&path, &cfg).context("write default config")?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg = toml::from_str::<Config>(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_strategy_thresholds() {
        assert_eq!(CacheStrategy::None.max_age_ms(), None);
        assert_eq!(CacheStrategy::Moderate.max_age_ms(), Some(43_200_000));
        assert_eq!(CacheStrategy::Aggressive.max_age_ms(), Some(86_400_000));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let raw = r#"
[settings]
cache_strategy = "moderate"
lyrics_provider = "lrclib"
"#;
        let cfg: Config = toml::from_str(raw).unwrap();
        assert_eq!(cfg.settings.cache_strategy, CacheStrategy::Moderate);
        assert_eq!(cfg.settings.lyrics_provider, "lrclib");
        assert_eq!(cfg.settings.translation_provider, "google");
        assert_eq!(cfg.cache.memory_capacity, 512);
    }

    #[test]
    fn test_effective_target_lang() {
        let mut s = Settings::default();
        assert_eq!(s.effective_target_lang("fr"), "fr");

        s.custom_translate_target = Some("de".into());
        assert_eq!(s.effective_target_lang("fr"), "fr");

        s.override_translate_target = true;
        assert_eq!(s.effective_target_lang("fr"), "de");
    }

    #[test]
    fn test_ai_requires_key() {
        let mut s = Settings {
            translation_provider: "gemini".into(),
            ..Settings::default()
        };
        assert!(!s.ai_translation_enabled());
        s.gemini_api_key = Some("  ".into());
        assert!(!s.ai_translation_enabled());
        s.gemini_api_key = Some("key".into());
        assert!(s.ai_translation_enabled());
        assert!(!s.ai_romanization_enabled());
    }

    #[test]
    fn test_load_writes_defaults() {
        let dir = std::env::temp_dir().join(format!("lyplus-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = fs::remove_file(&path);

        let cfg = load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.settings, Settings::default());

        let reloaded = load(Some(&path)).unwrap();
        assert_eq!(reloaded.settings, cfg.settings);
        let _ = fs::remove_dir_all(&dir);
    }
}
