//! Parsers for lyrics handed to us as raw text or JSON.
//!
//! Two formats are understood:
//!
//! LRC (line-synced or plain):
//! [mm:ss.xx] Lyrics line here
//!
//! KPoe JSON, as served by the lyricsplus backends and stored for local uploads:
//! { "type": "Word", "lyrics": [{ "time": 1200, "duration": 800, "text": "...",
//!   "syllabus": [...], "transliteration": { "text": "..." } }] }

use super::{LyricLine, LyricsMetadata, LyricsPayload, Syllable};
use serde::Deserialize;
use serde_json::Value;

/// Parse an LRC document into a payload.
///
/// Lines are sorted by timestamp and each line's duration runs until the next
/// one starts. With `synced == false` every line is kept as plain text.
pub fn parse_lrc(content: &str, synced: bool) -> LyricsPayload {
    let mut lines = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Skip metadata tags like [ti:Title]
        if parse_metadata(line).is_some() {
            continue;
        }

        if synced && let Some(parsed) = parse_timed_line(line) {
            lines.extend(parsed);
            continue;
        }

        if !line.starts_with('[') {
            lines.push(LyricLine::new(line));
        }
    }

    let timed = lines.iter().any(|l| l.time.is_some());
    if timed {
        lines.sort_by_key(|l| l.time.unwrap_or(0));
        for i in 0..lines.len().saturating_sub(1) {
            if let (Some(start), Some(next)) = (lines[i].time, lines[i + 1].time) {
                lines[i].duration = Some(next.saturating_sub(start));
            }
        }
    }

    LyricsPayload {
        kind: Some(if timed { "Line" } else { "None" }.to_string()),
        data: lines,
        metadata: None,
    }
}

/// Parse metadata tag like [ti:Title]
fn parse_metadata(line: &str) -> Option<(String, String)> {
    if !line.starts_with('[') || !line.contains(':') {
        return None;
    }

    let end = line.find(']')?;
    let tag_content = &line[1..end];

    let colon_pos = tag_content.find(':')?;
    let tag = &tag_content[..colon_pos];

    // Metadata tags are typically 2-3 chars
    if tag.len() <= 3 && !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphabetic()) {
        let value = tag_content[colon_pos + 1..].trim().to_string();
        return Some((tag.to_string(), value));
    }

    None
}

/// Parse a timed line like [00:12.34]Lyrics or [00:12.34][00:15.00]Lyrics
fn parse_timed_line(line: &str) -> Option<Vec<LyricLine>> {
    let mut timestamps = Vec::new();
    let mut pos = 0;

    while pos < line.len() && line[pos..].starts_with('[') {
        let Some(end) = line[pos..].find(']') else {
            break;
        };
        match parse_timestamp(&line[pos + 1..pos + end]) {
            Some(ms) => {
                timestamps.push(ms);
                pos += end + 1;
            }
            None => break,
        }
    }

    if timestamps.is_empty() {
        return None;
    }

    let text = line[pos..].trim();
    Some(
        timestamps
            .into_iter()
            .map(|ts| LyricLine::timed(ts, text))
            .collect(),
    )
}

/// Parse timestamp string like "00:12.34" or "00:12:34" to milliseconds
fn parse_timestamp(s: &str) -> Option<u64> {
    let parts: Vec<&str> = s.split([':', '.']).collect();

    match parts.len() {
        2 => {
            let min: u64 = parts[0].parse().ok()?;
            let sec: u64 = parts[1].parse().ok()?;
            to_ms(min, sec, 0)
        }
        3 => {
            let min: u64 = parts[0].parse().ok()?;
            let sec: u64 = parts[1].parse().ok()?;
            let ms_str = parts[2];
            // Handle both "34" (centiseconds) and "340" (milliseconds)
            let ms: u64 = match ms_str.len() {
                1 => ms_str.parse::<u64>().ok()? * 100,
                2 => ms_str.parse::<u64>().ok()? * 10,
                3 => ms_str.parse().ok()?,
                _ => return None,
            };
            to_ms(min, sec, ms)
        }
        _ => None,
    }
}

/// None when the tag is too large to represent, so the line is dropped.
fn to_ms(min: u64, sec: u64, ms: u64) -> Option<u64> {
    min.checked_mul(60_000)?
        .checked_add(sec.checked_mul(1000)?)?
        .checked_add(ms)
}

#[derive(Debug, Deserialize)]
struct KpoeDocument {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    lyrics: Vec<KpoeLine>,
    metadata: Option<LyricsMetadata>,
}

#[derive(Debug, Deserialize)]
struct KpoeLine {
    #[serde(default)]
    time: Option<f64>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    syllabus: Vec<KpoeSyllable>,
    #[serde(default)]
    transliteration: Option<KpoeTransliteration>,
}

#[derive(Debug, Deserialize)]
struct KpoeSyllable {
    #[serde(default)]
    time: Option<f64>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct KpoeTransliteration {
    #[serde(default)]
    text: String,
    #[serde(default)]
    syllabus: Vec<KpoeSyllable>,
}

fn ms(v: Option<f64>) -> Option<u64> {
    v.filter(|x| x.is_finite() && *x >= 0.0).map(|x| x.round() as u64)
}

/// Convert a KPoe document into a payload. Returns `None` if the value isn't one.
pub fn parse_kpoe(value: &Value) -> Option<LyricsPayload> {
    let doc: KpoeDocument = serde_json::from_value(value.clone()).ok()?;
    if doc.lyrics.is_empty() {
        return None;
    }

    let data = doc
        .lyrics
        .into_iter()
        .map(|line| {
            let roman_syllables = line
                .transliteration
                .as_ref()
                .map(|t| t.syllabus.as_slice())
                .unwrap_or_default();

            let syllabus: Vec<Syllable> = line
                .syllabus
                .iter()
                .enumerate()
                .map(|(i, s)| Syllable {
                    text: s.text.clone(),
                    time: ms(s.time),
                    duration: ms(s.duration),
                    romanized_text: roman_syllables
                        .get(i)
                        .map(|r| r.text.clone())
                        .filter(|t| !t.is_empty()),
                })
                .collect();

            let text = if line.text.is_empty() {
                syllabus.iter().map(|s| s.text.as_str()).collect::<String>()
            } else {
                line.text
            };

            LyricLine {
                text,
                time: ms(line.time),
                duration: ms(line.duration),
                syllabus,
                translated_text: None,
                romanized_text: line
                    .transliteration
                    .map(|t| t.text)
                    .filter(|t| !t.is_empty()),
            }
        })
        .collect();

    Some(LyricsPayload {
        kind: doc.kind,
        data,
        metadata: doc.metadata,
    })
}

/// Parse raw lyrics as stored for a local upload.
///
/// Accepts an LRC string, a KPoe document, or an already-normalized payload
/// (`{ "data": [...] }`). Returns `None` when nothing displayable comes out.
pub fn parse_local_lyrics(raw: &Value) -> Option<LyricsPayload> {
    let payload = match raw {
        Value::String(text) => {
            let synced = text.lines().any(|l| parse_timed_line(l.trim()).is_some());
            parse_lrc(text, synced)
        }
        Value::Object(map) if map.contains_key("lyrics") => parse_kpoe(raw)?,
        Value::Object(map) if map.contains_key("data") => {
            serde_json::from_value::<LyricsPayload>(raw.clone()).ok()?
        }
        _ => return None,
    };

    (!payload.is_empty()).then_some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("00:12"), Some(12000));
        assert_eq!(parse_timestamp("01:30"), Some(90000));
        assert_eq!(parse_timestamp("00:12.34"), Some(12340));
        assert_eq!(parse_timestamp("00:12.340"), Some(12340));
        assert_eq!(parse_timestamp("00:12:34"), Some(12340));
    }

    #[test]
    fn test_huge_timestamp_is_rejected() {
        assert_eq!(parse_timestamp("999999999999999:00"), None);
        assert_eq!(parse_timestamp("00:99999999999999999"), None);
        assert_eq!(parse_timestamp("307445734561825:60"), None);

        let lyrics = parse_lrc("[999999999999999:00]boom\n[00:01.00]fine", true);
        assert_eq!(lyrics.texts(), vec!["fine"]);
        assert_eq!(lyrics.data[0].time, Some(1000));

        assert!(parse_local_lyrics(&json!("[999999999999999:00]boom")).is_none());
    }

    #[test]
    fn test_parse_lrc() {
        let lrc = r#"
[ti:Test Song]
[ar:Test Artist]
[00:15.00]Second line
[00:12.34]First line
"#;
        let parsed = parse_lrc(lrc, true);
        assert_eq!(parsed.kind.as_deref(), Some("Line"));
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[0].time, Some(12340));
        assert_eq!(parsed.data[0].text, "First line");
        assert_eq!(parsed.data[0].duration, Some(2660));
        assert_eq!(parsed.data[1].duration, None);
    }

    #[test]
    fn test_parse_plain() {
        let parsed = parse_lrc("one\n\ntwo\n", false);
        assert_eq!(parsed.kind.as_deref(), Some("None"));
        assert_eq!(parsed.texts(), vec!["one", "two"]);
    }

    #[test]
    fn test_parse_kpoe_word_synced() {
        let raw = json!({
            "type": "Word",
            "metadata": { "source": "Apple" },
            "lyrics": [{
                "time": 1000, "duration": 900, "text": "",
                "syllabus": [
                    { "time": 1000, "duration": 400, "text": "안녕" },
                    { "time": 1400, "duration": 500, "text": "하세요" }
                ],
                "transliteration": {
                    "text": "annyeong haseyo",
                    "syllabus": [{ "text": "annyeong" }, { "text": "haseyo" }]
                }
            }]
        });
        let parsed = parse_kpoe(&raw).unwrap();
        assert_eq!(parsed.kind.as_deref(), Some("Word"));
        let line = &parsed.data[0];
        assert_eq!(line.text, "안녕하세요");
        assert_eq!(line.romanized_text.as_deref(), Some("annyeong haseyo"));
        assert_eq!(line.syllabus[1].romanized_text.as_deref(), Some("haseyo"));
        assert_eq!(line.time, Some(1000));
    }

    #[test]
    fn test_parse_local_variants() {
        let lrc = json!("[00:01.00]hello\n[00:02.00]world");
        assert_eq!(parse_local_lyrics(&lrc).unwrap().data.len(), 2);

        let normalized = json!({ "data": [{ "text": "line" }] });
        assert_eq!(parse_local_lyrics(&normalized).unwrap().texts(), vec!["line"]);

        assert!(parse_local_lyrics(&json!(42)).is_none());
        assert!(parse_local_lyrics(&json!({ "lyrics": [] })).is_none());
        assert!(parse_local_lyrics(&json!("")).is_none());
    }
}
