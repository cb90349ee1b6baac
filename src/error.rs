use thiserror::Error;

/// Failures surfaced by the lyrics and translation engines.
///
/// The enum is `Clone` because a single in-flight fetch hands the same outcome
/// to every caller that coalesced onto it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LyricsError {
    #[error("Invalid song info: {0}")]
    InvalidInput(String),

    #[error("No lyrics found from any provider")]
    NoLyricsFound,

    #[error("Original lyrics not found or empty")]
    EmptyOriginalLyrics,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("Local lyrics error: {0}")]
    LocalLyrics(String),

    #[error("Fetch task failed: {0}")]
    Task(String),
}

impl LyricsError {
    pub(crate) fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, LyricsError>;
