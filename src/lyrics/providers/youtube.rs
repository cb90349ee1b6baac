//! YouTube timed-text captions as a last-resort lyrics source.

use super::SubtitleSource;
use crate::lyrics::{LyricLine, LyricsMetadata, LyricsPayload, SongInfo};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TimedText {
    #[serde(default)]
    events: Vec<TimedTextEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimedTextEvent {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    d_duration_ms: Option<u64>,
    #[serde(default)]
    segs: Vec<TimedTextSeg>,
}

#[derive(Debug, Deserialize)]
struct TimedTextSeg {
    #[serde(default)]
    utf8: String,
}

fn to_payload(doc: TimedText, language: Option<&str>) -> LyricsPayload {
    let data = doc
        .events
        .into_iter()
        .filter_map(|ev| {
            let text: String = ev.segs.iter().map(|s| s.utf8.as_str()).collect();
            let text = text.replace('\n', " ").trim().to_string();
            if text.is_empty() {
                return None;
            }
            Some(LyricLine {
                text,
                time: Some(ev.t_start_ms),
                duration: ev.d_duration_ms,
                ..LyricLine::default()
            })
        })
        .collect();

    let mut metadata = LyricsMetadata {
        source: Some("youtube".to_string()),
        ..LyricsMetadata::default()
    };
    if let Some(lang) = language {
        metadata.extra.insert("language".into(), lang.into());
    }

    LyricsPayload {
        kind: Some("Line".to_string()),
        data,
        metadata: Some(metadata),
    }
}

#[derive(Debug, Clone)]
pub struct YouTubeSubtitles {
    client: reqwest::Client,
}

impl YouTubeSubtitles {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build youtube http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SubtitleSource for YouTubeSubtitles {
    async fn fetch_subtitles(&self, song: &SongInfo) -> anyhow::Result<Option<LyricsPayload>> {
        let Some(track) = song.subtitle.as_ref() else {
            return Ok(None);
        };

        let sep = if track.url.contains('?') { '&' } else { '?' };
        let url = format!("{}{}fmt=json3", track.url, sep);

        let response = self.client.get(&url).send().await.context("GET timedtext")?;
        if !response.status().is_success() {
            anyhow::bail!("timedtext error: {}", response.status());
        }

        let doc: TimedText = response.json().await.context("parse timedtext json")?;
        let payload = to_payload(doc, track.language.as_deref());
        Ok((!payload.is_empty()).then_some(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json3_to_payload() {
        let raw = r#"{"events":[
            {"tStartMs":0,"dDurationMs":500},
            {"tStartMs":1200,"dDurationMs":2000,"segs":[{"utf8":"first"},{"utf8":" line\nwrapped"}]},
            {"tStartMs":3200,"segs":[{"utf8":"\n"}]}
        ]}"#;
        let doc: TimedText = serde_json::from_str(raw).unwrap();
        let payload = to_payload(doc, Some("en"));

        assert_eq!(payload.data.len(), 1);
        assert_eq!(payload.data[0].text, "first line wrapped");
        assert_eq!(payload.data[0].time, Some(1200));
        assert_eq!(payload.data[0].duration, Some(2000));
        let meta = payload.metadata.unwrap();
        assert_eq!(meta.source.as_deref(), Some("youtube"));
        assert_eq!(meta.extra["language"], "en");
    }
}
