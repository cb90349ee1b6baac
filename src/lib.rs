//! Lyrics resolution with caching, request coalescing and translation.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod lyrics;
pub mod sponsorblock;
pub mod state;
pub mod storage;
pub mod translation;
pub mod util;

pub use engine::Engine;
pub use error::{LyricsError, Result};
