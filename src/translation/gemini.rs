//! Gemini-backed translation and romanization.
//!
//! Each request sends the whole song as a JSON array and asks for a JSON array
//! back. Responses that don't line up with the input are retried.

use super::AiTranslator;
use crate::config::Settings;
use crate::lyrics::{LyricLine, LyricsPayload};
use crate::util::similarity;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 5;
/// Minimum similarity between an echoed original line and the input line.
const ECHO_SIMILARITY: f64 = 0.8;

#[derive(Debug, Deserialize)]
struct RomanizedLine {
    #[serde(default)]
    original: String,
    #[serde(default)]
    romanized: String,
}

#[derive(Debug, Clone)]
pub struct GeminiTranslator {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiTranslator {
    const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com/v1beta";

    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("build gemini http client")?;
        Ok(Self {
            client,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        })
    }

    async fn generate(&self, prompt: &str, settings: &Settings) -> anyhow::Result<String> {
        let key = settings
            .gemini_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .context("gemini api key not configured")?;
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            settings.gemini_model,
            urlencoding::encode(key.trim())
        );

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0.2,
                "responseMimeType": "application/json"
            }
        });

        let v: Value = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("send gemini request")?
            .error_for_status()
            .context("gemini http status")?
            .json()
            .await
            .context("parse gemini json")?;

        response_text(&v).context("gemini response has no text")
    }

    /// Ask until `accept` takes the reply or attempts run out.
    async fn generate_validated<T>(
        &self,
        prompt: &str,
        settings: &Settings,
        accept: impl Fn(&str) -> anyhow::Result<T> + Send + Sync,
    ) -> anyhow::Result<T> {
        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.generate(prompt, settings).await.and_then(|t| accept(&t)) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(attempt, error = %e, "gemini reply rejected");
                    last_err = Some(e);
                }
            }
        }
        let err = last_err.unwrap_or_else(|| anyhow::anyhow!("no attempts made"));
        warn!(error = %err, "gemini gave up after {MAX_ATTEMPTS} attempts");
        Err(err)
    }
}

fn response_text(v: &Value) -> Option<String> {
    let parts = v
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

/// Strip a surrounding Markdown code fence if the model added one.
fn strip_fence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn translate_prompt(texts: &[String], target_lang: &str) -> String {
    format!(
        "Translate each lyric line below into the language with code \"{target_lang}\". \
         Keep the meaning and tone. Reply with only a JSON array of exactly {} strings, \
         one per input line, in the same order. Keep empty lines empty.\n\n{}",
        texts.len(),
        serde_json::Value::from(texts.to_vec())
    )
}

fn romanize_prompt(texts: &[String]) -> String {
    format!(
        "Romanize each lyric line below into Latin script using the standard romanization \
         for its language. Reply with only a JSON array of exactly {} objects of the form \
         {{\"original\": <input line>, \"romanized\": <romanization>}}, in the same order. \
         Lines already in Latin script are returned unchanged.\n\n{}",
        texts.len(),
        serde_json::Value::from(texts.to_vec())
    )
}

fn accept_translation(reply: &str, expected: usize) -> anyhow::Result<Vec<String>> {
    let lines: Vec<String> =
        serde_json::from_str(strip_fence(reply)).context("translation reply is not a string array")?;
    if lines.len() != expected {
        anyhow::bail!("expected {expected} lines, got {}", lines.len());
    }
    Ok(lines)
}

fn accept_romanization(reply: &str, texts: &[String]) -> anyhow::Result<Vec<String>> {
    let lines: Vec<RomanizedLine> =
        serde_json::from_str(strip_fence(reply)).context("romanization reply is not an object array")?;
    if lines.len() != texts.len() {
        anyhow::bail!("expected {} lines, got {}", texts.len(), lines.len());
    }
    for (i, (line, input)) in lines.iter().zip(texts).enumerate() {
        let score = similarity(&line.original, input);
        if score < ECHO_SIMILARITY {
            anyhow::bail!("line {i} echoed as {:?} (similarity {score:.2})", line.original);
        }
    }
    Ok(lines.into_iter().map(|l| l.romanized).collect())
}

#[async_trait]
impl AiTranslator for GeminiTranslator {
    async fn translate(
        &self,
        texts: &[String],
        target_lang: &str,
        settings: &Settings,
    ) -> anyhow::Result<Vec<String>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = translate_prompt(texts, target_lang);
        self.generate_validated(&prompt, settings, |reply| accept_translation(reply, texts.len()))
            .await
    }

    async fn romanize(
        &self,
        lyrics: &LyricsPayload,
        settings: &Settings,
    ) -> anyhow::Result<Vec<LyricLine>> {
        let texts = lyrics.texts();
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = romanize_prompt(&texts);
        let romanized = self
            .generate_validated(&prompt, settings, |reply| accept_romanization(reply, &texts))
            .await?;

        Ok(lyrics
            .data
            .iter()
            .zip(romanized)
            .map(|(line, r)| LyricLine {
                romanized_text: (!r.trim().is_empty()).then_some(r),
                ..line.clone()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_response_text() {
        let v = json!({"candidates":[{"content":{"parts":[{"text":"[\"a\","},{"text":"\"b\"]"}]}}]});
        assert_eq!(response_text(&v).as_deref(), Some("[\"a\",\"b\"]"));
        assert_eq!(response_text(&json!({"candidates":[]})), None);
    }

    #[test]
    fn test_strip_fence() {
        assert_eq!(strip_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_fence("  [1] "), "[1]");
    }

    #[test]
    fn test_translation_length_must_match() {
        assert_eq!(accept_translation(r#"["x","y"]"#, 2).unwrap(), lines(&["x", "y"]));
        assert!(accept_translation(r#"["x"]"#, 2).is_err());
        assert!(accept_translation("not json", 1).is_err());
    }

    #[test]
    fn test_romanization_echo_check() {
        let input = lines(&["Hello world", "Good night"]);
        let good = r#"[{"original":"hello world!","romanized":"hello world"},
                       {"original":"Good night","romanized":"good night"}]"#;
        assert_eq!(
            accept_romanization(good, &input).unwrap(),
            lines(&["hello world", "good night"])
        );

        let shifted = r#"[{"original":"Good night","romanized":"a"},
                          {"original":"Hello world","romanized":"b"}]"#;
        assert!(accept_romanization(shifted, &input).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_is_error() {
        let g = GeminiTranslator::new().unwrap();
        let err = g.generate("hi", &Settings::default()).await.unwrap_err();
        assert!(err.to_string().contains("api key"));
    }
}
