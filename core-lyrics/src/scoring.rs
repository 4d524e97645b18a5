//! # Candidate Scoring
//!
//! Ranks lyrics database candidates against the query on a 0-100 scale:
//!
//! | Component | Weight | Missing on the query side |
//! |-----------|--------|---------------------------|
//! | track title similarity | 50 | n/a |
//! | artist similarity | 25 | 12.5 |
//! | album similarity | 10 | 5 |
//! | duration closeness | 10 | 5 (either side) |
//! | synced lyrics available | 5 | 0 |
//!
//! Similarity is a normalized Levenshtein ratio over the match-normalized
//! strings (see [`normalize_for_match`]).

use crate::types::LyricsQuery;
use once_cell::sync::Lazy;
use regex::Regex;

const TRACK_WEIGHT: f64 = 50.0;
const ARTIST_WEIGHT: f64 = 25.0;
const ALBUM_WEIGHT: f64 = 10.0;
const DURATION_WEIGHT: f64 = 10.0;
const SYNCED_BONUS: f64 = 5.0;

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").expect("valid bracket regex"));

static LRC_TIMESTAMPS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\[\d{1,2}:\d{2}(?:[.:]\d{1,3})?\])+").expect("valid timestamp regex")
});

/// The parts of a candidate that take part in scoring.
#[derive(Debug, Clone, Copy)]
pub struct CandidateFields<'a> {
    pub track: &'a str,
    pub artist: Option<&'a str>,
    pub album: Option<&'a str>,
    pub duration_sec: Option<f64>,
    pub has_synced: bool,
}

/// Strip bracketed segments (`(Live)`, `[Remastered]`), drop punctuation,
/// lowercase, collapse whitespace.
pub fn normalize_for_match(s: &str) -> String {
    let without_brackets = BRACKETED.replace_all(s, " ");
    let kept: String = without_brackets
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Similarity in `[0, 1]` of two strings after match normalization.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize_for_match(a);
    let b = normalize_for_match(b);
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b)
}

fn optional_component(query: Option<&str>, candidate: Option<&str>, weight: f64) -> f64 {
    match query.filter(|q| !q.trim().is_empty()) {
        None => weight / 2.0,
        Some(q) => weight * similarity(q, candidate.unwrap_or("")),
    }
}

fn duration_component(query: Option<f64>, candidate: Option<f64>) -> f64 {
    match (query, candidate) {
        (Some(q), Some(c)) if q > 0.0 => {
            let relative = (q - c).abs() / q;
            if relative <= 0.05 {
                DURATION_WEIGHT
            } else if relative <= 0.10 {
                DURATION_WEIGHT / 2.0
            } else {
                0.0
            }
        }
        _ => DURATION_WEIGHT / 2.0,
    }
}

/// Score a candidate against the query. Always within `[0, 100]`.
pub fn score(query: &LyricsQuery, candidate: &CandidateFields<'_>) -> f64 {
    let mut total = TRACK_WEIGHT * similarity(&query.track, candidate.track);
    total += optional_component(query.artist.as_deref(), candidate.artist, ARTIST_WEIGHT);
    total += optional_component(query.album.as_deref(), candidate.album, ALBUM_WEIGHT);
    total += duration_component(query.duration_sec, candidate.duration_sec);
    if candidate.has_synced {
        total += SYNCED_BONUS;
    }
    total.clamp(0.0, 100.0)
}

/// Remove leading `[mm:ss.xx]` timestamps from every line of LRC text.
pub fn strip_lrc_timestamps(lrc: &str) -> String {
    lrc.lines()
        .map(|line| LRC_TIMESTAMPS.replace(line.trim(), "").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate<'a>(track: &'a str, artist: &'a str) -> CandidateFields<'a> {
        CandidateFields {
            track,
            artist: Some(artist),
            album: None,
            duration_sec: None,
            has_synced: false,
        }
    }

    #[test]
    fn test_normalize_for_match() {
        assert_eq!(normalize_for_match("  Hello (Live) [Remastered 2011] "), "hello");
        assert_eq!(normalize_for_match("Don't  Stop—Me"), "don t stop me");
        assert_eq!(normalize_for_match("Mưa Rơi"), "mưa rơi");
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("Hello", "hello (Live)"), 1.0);
        assert_eq!(similarity("", "hello"), 0.0);
        let s = similarity("Hello", "Hallo");
        assert!(s > 0.0 && s < 1.0);
    }

    #[test]
    fn test_exact_match_scores_high() {
        let query = LyricsQuery::new("Hello")
            .with_artist("Adele")
            .with_album("25")
            .with_duration(295.0);
        let exact = CandidateFields {
            track: "Hello",
            artist: Some("Adele"),
            album: Some("25"),
            duration_sec: Some(296.0),
            has_synced: true,
        };
        assert_eq!(score(&query, &exact), 100.0);
    }

    #[test]
    fn test_missing_query_fields_give_half_credit() {
        let query = LyricsQuery::new("Hello");
        let c = candidate("Hello", "Adele");
        // 50 + 12.5 + 5 + 5
        assert!((score(&query, &c) - 72.5).abs() < 1e-9);
    }

    #[test]
    fn test_duration_bands() {
        assert_eq!(duration_component(Some(200.0), Some(209.0)), 10.0);
        assert_eq!(duration_component(Some(200.0), Some(215.0)), 5.0);
        assert_eq!(duration_component(Some(200.0), Some(260.0)), 0.0);
        assert_eq!(duration_component(None, Some(260.0)), 5.0);
        assert_eq!(duration_component(Some(200.0), None), 5.0);
    }

    #[test]
    fn test_score_monotone_in_artist_similarity() {
        let query = LyricsQuery::new("Hello").with_artist("Adele");
        let close = score(&query, &candidate("Hello", "Adela"));
        let far = score(&query, &candidate("Hello", "Metallica"));
        let exact = score(&query, &candidate("Hello", "Adele"));
        assert!(exact >= close);
        assert!(close >= far);
    }

    #[test]
    fn test_score_monotone_in_track_similarity() {
        let query = LyricsQuery::new("Hello").with_artist("Adele");
        let titles = ["Hello", "Hello (Live)", "Hallo", "Hell", "Yellow", "Goodbye"];

        let scored: Vec<(f64, f64)> = titles
            .iter()
            .map(|t| (similarity("Hello", t), score(&query, &candidate(t, "Adele"))))
            .collect();
        for (sim_a, score_a) in &scored {
            for (sim_b, score_b) in &scored {
                if sim_a > sim_b {
                    assert!(score_a > score_b, "{sim_a}/{score_a} vs {sim_b}/{score_b}");
                }
            }
        }

        let exact = score(&query, &candidate("Hello", "Adele"));
        let near = score(&query, &candidate("Hallo", "Adele"));
        let far = score(&query, &candidate("Goodbye", "Adele"));
        assert!(exact > near && near > far);
    }

    #[test]
    fn test_strip_lrc_timestamps() {
        let lrc = "[00:12.34]Hello, it's me\n[00:15.00][01:15.00]I was wondering\n\n[02:01]After all";
        assert_eq!(
            strip_lrc_timestamps(lrc),
            "Hello, it's me\nI was wondering\n\nAfter all"
        );
    }
}
