//! Google Translate through the public `translate_a/single` endpoint.

use super::Translator;
use crate::lyrics::{LyricLine, LyricsPayload};
use crate::util::{delay, is_purely_latin_script};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct GoogleTranslator {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleTranslator {
    const DEFAULT_BASE_URL: &'static str = "https://translate.googleapis.com/translate_a/single";

    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build google translate http client")?;
        Ok(Self {
            client,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        })
    }

    fn url(&self, text: &str, target_lang: &str, dt: &str) -> String {
        format!(
            "{}?client=gtx&sl=auto&tl={}&dt={}&q={}",
            self.base_url,
            urlencoding::encode(target_lang),
            dt,
            urlencoding::encode(text)
        )
    }

    async fn request(&self, text: &str, target_lang: &str, dt: &str) -> anyhow::Result<Value> {
        self.client
            .get(self.url(text, target_lang, dt))
            .send()
            .await
            .context("send translate request")?
            .error_for_status()
            .context("translate http status")?
            .json()
            .await
            .context("parse translate json")
    }

    async fn romanize_line(&self, text: &str) -> anyhow::Result<Option<String>> {
        let v = self.request(text, "en", "rm").await?;
        Ok(extract_romanization(&v))
    }
}

/// Concatenate the translated chunks from `[[["chunk", "source", ...], ...], ...]`.
fn extract_translation(v: &Value) -> Option<String> {
    let chunks = v.get(0)?.as_array()?;
    let text: String = chunks
        .iter()
        .filter_map(|c| c.get(0).and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

/// The transliteration sits at index 3 of one of the first-level chunks.
fn extract_romanization(v: &Value) -> Option<String> {
    v.get(0)?
        .as_array()?
        .iter()
        .filter_map(|c| c.get(3).and_then(Value::as_str))
        .find(|r| !r.trim().is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> anyhow::Result<String> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let mut attempt = 1;
        loop {
            let result = self
                .request(text, target_lang, "t")
                .await
                .and_then(|v| extract_translation(&v).context("empty translate response"));
            match result {
                Ok(translated) => return Ok(translated),
                Err(e) if attempt < MAX_ATTEMPTS => {
                    debug!(attempt, error = %e, "google translate failed, retrying");
                    attempt += 1;
                    delay(RETRY_DELAY_MS).await;
                }
                Err(e) => return Err(e.context(format!("translate failed after {MAX_ATTEMPTS} attempts"))),
            }
        }
    }

    async fn romanize(&self, lyrics: &LyricsPayload) -> anyhow::Result<Vec<LyricLine>> {
        let mut out = Vec::with_capacity(lyrics.data.len());
        for line in &lyrics.data {
            if line.text.trim().is_empty() || is_purely_latin_script(&line.text) {
                out.push(line.clone());
                continue;
            }
            match self.romanize_line(&line.text).await {
                Ok(romanized) => out.push(LyricLine {
                    romanized_text: romanized,
                    ..line.clone()
                }),
                Err(e) => {
                    warn!(error = %e, "romanization failed, keeping original line");
                    out.push(line.clone());
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url() {
        let t = GoogleTranslator::new().unwrap();
        let url = t.url("you & me", "zh-TW", "t");
        assert_eq!(
            url,
            "https://translate.googleapis.com/translate_a/single?client=gtx&sl=auto&tl=zh-TW&dt=t&q=you%20%26%20me"
        );
    }

    #[test]
    fn test_extract_translation_joins_chunks() {
        let v = json!([[["Bonjour. ", "Hello. ", null, null], ["Au revoir", "Bye", null, null]], null, "en"]);
        assert_eq!(extract_translation(&v).as_deref(), Some("Bonjour. Au revoir"));
        assert_eq!(extract_translation(&json!([[]])), None);
    }

    #[test]
    fn test_extract_romanization() {
        let v = json!([[[null, null, null, "annyeonghaseyo"]], null, "ko"]);
        assert_eq!(extract_romanization(&v).as_deref(), Some("annyeonghaseyo"));
        assert_eq!(extract_romanization(&json!([[["x", "y"]]])), None);
    }

    #[tokio::test]
    async fn test_latin_lines_skip_network() {
        let t = GoogleTranslator::new().unwrap();
        let lyrics = LyricsPayload::from_lines(vec![LyricLine::new("Hello there"), LyricLine::new("")]);
        let out = t.romanize(&lyrics).await.unwrap();
        assert_eq!(out, lyrics.data);
    }
}
