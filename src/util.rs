//! Small pure helpers shared by the engines and the provider adapters.

use crate::lyrics::LyricsPayload;
use std::time::Duration;

/// True when there is nothing to display: no payload, no lines, or only blank lines.
pub fn is_empty_lyrics(lyrics: Option<&LyricsPayload>) -> bool {
    match lyrics {
        None => true,
        Some(l) => l.data.is_empty() || l.data.iter().all(|line| line.text.is_empty()),
    }
}

/// Whether `text` contains only Latin letters, digits, punctuation, symbols and whitespace.
pub fn is_purely_latin_script(text: &str) -> bool {
    text.chars().all(|c| {
        c.is_whitespace()
            || (!c.is_control() && (c.is_ascii() || is_latin_letter(c) || !c.is_alphabetic()))
    })
}

fn is_latin_letter(c: char) -> bool {
    matches!(c as u32,
        0x00C0..=0x024F     // Latin-1 Supplement letters, Extended-A/B
        | 0x1E00..=0x1EFF   // Latin Extended Additional
        | 0x2C60..=0x2C7F   // Latin Extended-C
        | 0xA720..=0xA7FF   // Latin Extended-D
        | 0xFF21..=0xFF3A   // fullwidth A-Z
        | 0xFF41..=0xFF5A)  // fullwidth a-z
}

/// Collapse whitespace, trim, lowercase and drop everything that isn't a word char or space.
pub fn normalize_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == ' ')
        .collect()
}

/// Classic Levenshtein edit distance over chars.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();

    // track[j][i]: distance between a[..i] and b[..j]
    let mut track = vec![vec![0usize; a.len() + 1]; b.len() + 1];
    for (i, cell) in track[0].iter_mut().enumerate() {
        *cell = i;
    }
    for (j, row) in track.iter_mut().enumerate() {
        row[0] = j;
    }

    for j in 1..=b.len() {
        for i in 1..=a.len() {
            let indicator = usize::from(a[i - 1] != b[j - 1]);
            track[j][i] = (track[j][i - 1] + 1)
                .min(track[j - 1][i] + 1)
                .min(track[j - 1][i - 1] + indicator);
        }
    }

    track[b.len()][a.len()]
}

/// Similarity in `[0, 1]` between two strings after [`normalize_text`].
pub fn similarity(s1: &str, s2: &str) -> f64 {
    let a = normalize_text(s1);
    let b = normalize_text(s2);
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(&a, &b) as f64 / max_len as f64
}

/// Sleep helper used for retry backoff.
pub async fn delay(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::LyricLine;

    #[test]
    fn test_empty_lyrics() {
        assert!(is_empty_lyrics(None));
        assert!(is_empty_lyrics(Some(&LyricsPayload::default())));

        let blank = LyricsPayload::from_lines(vec![LyricLine::new(""), LyricLine::new("")]);
        assert!(is_empty_lyrics(Some(&blank)));

        let one = LyricsPayload::from_lines(vec![LyricLine::new(""), LyricLine::new("la")]);
        assert!(!is_empty_lyrics(Some(&one)));
    }

    #[test]
    fn test_latin_script() {
        assert!(is_purely_latin_script("Hello, world! 123"));
        assert!(is_purely_latin_script("Ça va très bien ♪"));
        assert!(!is_purely_latin_script("こんにちは"));
        assert!(!is_purely_latin_script("사랑해 baby"));
    }

    #[test]
    fn test_control_chars_are_not_latin() {
        assert!(is_purely_latin_script("hello\tworld\n"));
        assert!(!is_purely_latin_script("abc\u{0007}"));
        assert!(!is_purely_latin_script("\u{0000}"));
        assert!(!is_purely_latin_script("line\u{009B}"));
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello,   World!  "), "hello world");
        assert_eq!(normalize_text("It's\tme"), "its me");
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("Hello!", "hello"), 1.0);
        assert!(similarity("kitten", "sitting") < 0.8);
        assert_eq!(similarity("", ""), 1.0);
    }
}
