//! SponsorBlock skip segments.
//!
//! Lookups use the privacy-preserving hash-prefix endpoint: only the first
//! four hex chars of the SHA-256 of the video id leave the machine, and the
//! matching video is picked out of the response locally.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

pub const DEFAULT_CATEGORIES: [&str; 8] = [
    "sponsor",
    "selfpromo",
    "interaction",
    "intro",
    "outro",
    "preview",
    "filler",
    "music_offtopic",
];

const HASH_PREFIX_LEN: usize = 4;

/// A skippable span of a video, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub segment: [f64; 2],
    #[serde(default)]
    pub category: String,
    #[serde(rename = "UUID", default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_duration: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SponsorBlockClient {
    client: reqwest::Client,
    base_url: String,
}

pub fn hash_prefix(video_id: &str) -> String {
    let digest = Sha256::digest(video_id.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_PREFIX_LEN);
    hex
}

/// The response is either a bare segment list or one `{videoID, segments}` entry
/// per video sharing the hash prefix.
fn extract_segments(video_id: &str, data: Value) -> Vec<Segment> {
    let Value::Array(items) = data else {
        return Vec::new();
    };

    let grouped = items.first().is_some_and(|i| i.get("videoID").is_some());
    let segments = if grouped {
        items
            .into_iter()
            .find(|i| i.get("videoID").and_then(Value::as_str) == Some(video_id))
            .and_then(|mut i| i.get_mut("segments").map(Value::take))
            .unwrap_or(Value::Null)
    } else {
        Value::Array(items)
    };

    match segments {
        Value::Array(list) => list
            .into_iter()
            .filter_map(|s| serde_json::from_value(s).ok())
            .collect(),
        _ => Vec::new(),
    }
}

impl SponsorBlockClient {
    const DEFAULT_BASE_URL: &'static str = "https://sponsor.ajay.app/api/skipSegments";

    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build sponsorblock http client")?;
        Ok(Self {
            client,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        })
    }

    fn url(&self, video_id: &str) -> String {
        let categories = serde_json::to_string(&DEFAULT_CATEGORIES).unwrap_or_default();
        format!(
            "{}/{}?categories={}",
            self.base_url,
            hash_prefix(video_id),
            urlencoding::encode(&categories)
        )
    }

    async fn try_fetch(&self, video_id: &str) -> anyhow::Result<Vec<Segment>> {
        let response = self
            .client
            .get(self.url(video_id))
            .send()
            .await
            .context("send sponsorblock request")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(%video_id, "no sponsorblock segments");
            return Ok(Vec::new());
        }

        let data: Value = response
            .error_for_status()
            .context("sponsorblock http status")?
            .json()
            .await
            .context("parse sponsorblock json")?;
        Ok(extract_segments(video_id, data))
    }

    /// Segments for `video_id`. Never fails: errors are logged and yield no segments.
    pub async fn fetch_segments(&self, video_id: &str) -> Vec<Segment> {
        if video_id.trim().is_empty() {
            return Vec::new();
        }
        match self.try_fetch(video_id).await {
            Ok(segments) => segments,
            Err(e) => {
                warn!(%video_id, error = %e, "sponsorblock lookup failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_prefix() {
        let prefix = hash_prefix("dQw4w9WgXcQ");
        assert_eq!(prefix.len(), 4);
        assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash_prefix("abc"), "ba78");
    }

    #[test]
    fn test_url_carries_categories() {
        let client = SponsorBlockClient::new().unwrap();
        let url = client.url("abc");
        assert!(url.starts_with("https://sponsor.ajay.app/api/skipSegments/ba78?categories="));
        assert!(url.contains("music_offtopic"));
    }

    #[test]
    fn test_extract_grouped_by_video() {
        let data = json!([
            {"videoID": "other", "segments": [{"segment": [1.0, 2.0], "category": "intro"}]},
            {"videoID": "mine", "segments": [{"segment": [10.5, 20.0], "category": "sponsor", "UUID": "u1"}]}
        ]);
        let segs = extract_segments("mine", data);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].segment, [10.5, 20.0]);
        assert_eq!(segs[0].uuid.as_deref(), Some("u1"));

        let data = json!([{"videoID": "other", "segments": []}]);
        assert!(extract_segments("mine", data).is_empty());
    }

    #[test]
    fn test_extract_flat_list() {
        let data = json!([{"segment": [0.0, 5.0], "category": "outro", "actionType": "skip"}]);
        let segs = extract_segments("any", data);
        assert_eq!(segs[0].action_type.as_deref(), Some("skip"));
        assert!(extract_segments("any", json!({"error": true})).is_empty());
    }
}
