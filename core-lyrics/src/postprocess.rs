//! # Transcript Post-processing
//!
//! Speech-to-text output of songs is noisy: recognizers hallucinate outro
//! phrases ("thanks for watching"), loop on a chorus, and sometimes answer in
//! English for a Vietnamese song. [`TextPostProcessor`] cleans a raw transcript
//! and then decides whether what is left is usable as lyrics.
//!
//! Cleaning runs, in order:
//! 1. marker removal and hallucinated-sentence filtering
//! 2. chunk de-duplication (consecutive repeats, per-chunk cap)
//! 3. rolling 4-gram de-duplication when the text is repetitive
//! 4. language corrections (Vietnamese only, when enforcement is on)
//! 5. reflow into lines of 4 to 10 words
//!
//! The passes repeat until the text stops changing, so cleaning already clean
//! text is a no-op.

use core_runtime::config::TextGateConfig;
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

const NGRAM_SIZE: usize = 4;
const MIN_LINE_WORDS: usize = 4;
const MAX_LINE_WORDS: usize = 10;
const MAX_CLEAN_PASSES: usize = 3;
const TRANSLATION_STOPWORD_RATIO: f64 = 0.18;

const SENTENCE_END: [char; 4] = ['.', '!', '?', '…'];

const VIETNAMESE_LETTERS: &str = "àáảãạăằắẳẵặâầấẩẫậèéẻẽẹêềếểễệìíỉĩịòóỏõọôồốổỗộơờớởỡợùúủũụưừứửữựỳýỷỹỵđ";

const ENGLISH_STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "to", "of", "in", "on", "for", "with", "is", "are",
    "was", "were", "be", "i", "you", "he", "she", "it", "we", "they", "me", "my", "your", "our",
    "that", "this", "at", "so", "do", "don't", "not", "no", "just", "all", "can", "will",
];

static SENTENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?…]+[.!?…]*").expect("valid sentence regex"));

static MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)[\[(]\s*(?:music|intro|outro|applause|instrumental|laughter|nhạc)[^\])]*[\])]|♪[^♪\n]*♪|♪",
    )
    .expect("valid marker regex")
});

static ENGLISH_HALLUCINATIONS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"(?i)\bsubscrib(?:e|ed|ing)\b",
        r"(?i)\blike\s+(?:and|&)\s+share\b",
        r"(?i)\bthanks?\s+(?:you\s+)?(?:so\s+much\s+)?for\s+(?:watching|listening)\b",
        r"(?i)\bdon'?t\s+forget\s+to\s+(?:like|subscribe|comment|share)\b",
        r"(?i)\bfollow\s+(?:us|me)\s+on\b",
        r"(?i)\bsubtitles?\s+(?:by|created\s+by)\b",
        r"(?i)\bsee\s+you\s+in\s+the\s+next\s+video\b",
    ])
});

static VIETNAMESE_HALLUCINATIONS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"(?i)đăng\s*ký\s+kênh",
        r"(?i)hãy\s+(?:like|đăng\s*ký|subscribe)",
        r"(?i)cảm\s+ơn\s+(?:các\s+bạn\s+)?đã\s+(?:xem|theo\s+dõi|lắng\s+nghe)",
        r"(?i)nhấn\s+chuông",
        r"(?i)ghiền\s+mì\s+gõ",
        r"(?i)bỏ\s+lỡ\s+những\s+video",
    ])
});

/// Built-in Vietnamese fixes, applied in order.
static VIETNAMESE_CORRECTIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bko\b", "không"),
        (r"(?i)\b(?:đc|dc)\b", "được"),
        (r"(?i)\biu\b", "yêu"),
        (r"(?i)\bvs\b", "với"),
        (r"(?i)\bmk\b", "mình"),
        (r"\s+([,.!?…])", "$1"),
        (r"([,!?…])(\p{L})", "$1 $2"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("valid correction regex"),
            replacement,
        )
    })
    .collect()
});

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("valid hallucination regex"))
        .collect()
}

/// Why a cleaned transcript was not accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    TooFewWords { count: usize, min: usize },
    LowUniqueWordRatio { ratio: f64, min: f64 },
    ExcessiveRepetition { ratio: f64, max: f64 },
    /// Looks like an English rendering of a song requested in Vietnamese
    LikelyTranslation { stopword_ratio: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooFewWords { count, min } => {
                write!(f, "{} words, need at least {}", count, min)
            }
            RejectReason::LowUniqueWordRatio { ratio, min } => {
                write!(f, "unique word ratio {:.3} below {:.3}", ratio, min)
            }
            RejectReason::ExcessiveRepetition { ratio, max } => {
                write!(f, "4-gram repetition {:.3} above {:.3}", ratio, max)
            }
            RejectReason::LikelyTranslation { stopword_ratio } => {
                write!(f, "likely translated (stopword ratio {:.3})", stopword_ratio)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UsabilityVerdict {
    Accepted,
    Rejected(RejectReason),
}

impl UsabilityVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, UsabilityVerdict::Accepted)
    }
}

/// Cleans and gates speech-to-text output.
pub struct TextPostProcessor {
    config: TextGateConfig,
    corrections: Vec<(Regex, String)>,
}

impl TextPostProcessor {
    pub fn new(config: TextGateConfig) -> Self {
        let mut entries: Vec<(&String, &String)> = config.custom_corrections.iter().collect();
        // Longest first so phrases win over the words inside them
        entries.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()).then(a.0.cmp(b.0)));

        let corrections = entries
            .into_iter()
            .filter(|(wrong, _)| !wrong.trim().is_empty())
            .filter_map(|(wrong, right)| match custom_rule(wrong) {
                Ok(regex) => Some((regex, right.clone())),
                Err(e) => {
                    warn!(wrong = %wrong, error = %e, "Skipping invalid custom correction");
                    None
                }
            })
            .collect();

        Self {
            config,
            corrections,
        }
    }

    pub fn config(&self) -> &TextGateConfig {
        &self.config
    }

    /// Clean `raw` and return it only if it passes the usability gate.
    pub fn process(&self, raw: &str, language: Option<&str>) -> Option<String> {
        let cleaned = self.clean(raw, language);
        if cleaned.is_empty() {
            debug!("Transcript empty after cleaning");
            return None;
        }

        match self.evaluate(&cleaned, language) {
            UsabilityVerdict::Accepted => Some(cleaned),
            UsabilityVerdict::Rejected(reason) => {
                debug!(reason = %reason, "Transcript rejected");
                None
            }
        }
    }

    /// Lighter path: hallucination filtering and the word-count floor only.
    pub fn process_legacy(&self, raw: &str, language: Option<&str>) -> Option<String> {
        let text = self.remove_hallucinations(raw, language).join(" ");
        let count = text.split_whitespace().count();
        if count < self.config.min_word_count {
            debug!(count, "Transcript too short");
            return None;
        }
        Some(text)
    }

    pub fn clean(&self, raw: &str, language: Option<&str>) -> String {
        let mut current = self.clean_once(raw, language);
        for _ in 1..MAX_CLEAN_PASSES {
            let next = self.clean_once(&current, language);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn clean_once(&self, text: &str, language: Option<&str>) -> String {
        let chunks = self.remove_hallucinations(text, language);
        let chunks = self.dedupe_chunks(chunks);

        let joined = chunks.join(" ");
        let tokens: Vec<&str> = joined.split_whitespace().collect();
        let text = if ngram_repeat_ratio(&tokens) > self.config.max_ngram_repeat_ratio {
            collapse_repeated_ngrams(&tokens).join(" ")
        } else {
            tokens.join(" ")
        };

        let text = self.apply_corrections(&text, language);
        reflow(&text)
    }

    /// Strip non-lyric markers and drop sentences that match known
    /// recognizer hallucinations. Returns the surviving sentences.
    pub fn remove_hallucinations(&self, text: &str, language: Option<&str>) -> Vec<String> {
        let check_vietnamese = language.map_or(true, is_vietnamese);
        let stripped = MARKERS.replace_all(text, " ");

        split_chunks(&stripped)
            .into_iter()
            .filter(|sentence| {
                let hallucinated = ENGLISH_HALLUCINATIONS.iter().any(|re| re.is_match(sentence))
                    || (check_vietnamese
                        && VIETNAMESE_HALLUCINATIONS.iter().any(|re| re.is_match(sentence)));
                if hallucinated {
                    debug!(sentence = %sentence, "Dropping hallucinated sentence");
                }
                !hallucinated
            })
            .collect()
    }

    /// Drop a chunk that repeats the one before it, or once
    /// `max_chunk_repeats` identical copies have been kept.
    pub fn dedupe_chunks(&self, chunks: Vec<String>) -> Vec<String> {
        let mut kept_counts: HashMap<String, usize> = HashMap::new();
        let mut previous: Option<String> = None;
        let mut kept = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let key = chunk_key(&chunk);
            if key.is_empty() {
                continue;
            }
            if previous.as_deref() == Some(key.as_str()) {
                continue;
            }

            let count = kept_counts.entry(key.clone()).or_insert(0);
            previous = Some(key);
            if *count >= self.config.max_chunk_repeats {
                continue;
            }
            *count += 1;
            kept.push(chunk);
        }

        kept
    }

    pub fn apply_corrections(&self, text: &str, language: Option<&str>) -> String {
        if !self.config.enforce_original_language || !language.is_some_and(is_vietnamese) {
            return text.to_string();
        }

        let mut corrected = text.to_string();
        for (regex, replacement) in VIETNAMESE_CORRECTIONS.iter() {
            corrected = regex.replace_all(&corrected, *replacement).into_owned();
        }
        for (regex, replacement) in &self.corrections {
            corrected = regex
                .replace_all(&corrected, NoExpand(replacement))
                .into_owned();
        }
        corrected
    }

    /// Decide whether cleaned text is usable as lyrics.
    pub fn evaluate(&self, text: &str, language: Option<&str>) -> UsabilityVerdict {
        let words: Vec<String> = text
            .split_whitespace()
            .map(word_key)
            .filter(|w| !w.is_empty())
            .collect();

        if words.len() < self.config.min_word_count {
            return UsabilityVerdict::Rejected(RejectReason::TooFewWords {
                count: words.len(),
                min: self.config.min_word_count,
            });
        }

        let unique: HashSet<&str> = words.iter().map(String::as_str).collect();
        let ratio = unique.len() as f64 / words.len() as f64;
        if ratio < self.config.min_unique_word_ratio {
            return UsabilityVerdict::Rejected(RejectReason::LowUniqueWordRatio {
                ratio,
                min: self.config.min_unique_word_ratio,
            });
        }

        let repetition = ngram_ratio_of_keys(&words);
        if repetition > self.config.max_ngram_repeat_ratio {
            return UsabilityVerdict::Rejected(RejectReason::ExcessiveRepetition {
                ratio: repetition,
                max: self.config.max_ngram_repeat_ratio,
            });
        }

        if self.config.enforce_original_language
            && language.is_some_and(is_vietnamese)
            && !has_vietnamese_letters(text)
        {
            let stopwords = words
                .iter()
                .filter(|w| ENGLISH_STOPWORDS.contains(&w.as_str()))
                .count();
            let stopword_ratio = stopwords as f64 / words.len() as f64;
            if stopword_ratio >= TRANSLATION_STOPWORD_RATIO {
                return UsabilityVerdict::Rejected(RejectReason::LikelyTranslation {
                    stopword_ratio,
                });
            }
        }

        UsabilityVerdict::Accepted
    }
}

fn custom_rule(wrong: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(wrong);
    let starts_word = wrong.chars().next().is_some_and(char::is_alphanumeric);
    let ends_word = wrong.chars().last().is_some_and(char::is_alphanumeric);
    let pattern = format!(
        "(?i){}{}{}",
        if starts_word { r"\b" } else { "" },
        escaped,
        if ends_word { r"\b" } else { "" }
    );
    Regex::new(&pattern)
}

fn is_vietnamese(language: &str) -> bool {
    language.eq_ignore_ascii_case("vi") || language.to_ascii_lowercase().starts_with("vi-")
}

fn has_vietnamese_letters(text: &str) -> bool {
    text.chars()
        .flat_map(char::to_lowercase)
        .any(|c| VIETNAMESE_LETTERS.contains(c))
}

/// Split into line and sentence chunks, trimmed, empties removed.
fn split_chunks(text: &str) -> Vec<String> {
    text.lines()
        .flat_map(|line| SENTENCES.find_iter(line).map(|m| m.as_str().trim().to_string()))
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

/// Comparison key for a chunk: lowercase, punctuation other than
/// apostrophes removed, whitespace collapsed.
fn chunk_key(chunk: &str) -> String {
    chunk
        .split_whitespace()
        .map(word_key)
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn word_key(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric() || *c == '\'')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Share of 4-gram positions taken by the most frequent 4-gram.
///
/// Zero when no 4-gram occurs twice.
pub fn ngram_repeat_ratio(tokens: &[&str]) -> f64 {
    let keys: Vec<String> = tokens.iter().map(|t| word_key(t)).collect();
    ngram_ratio_of_keys(&keys)
}

fn ngram_ratio_of_keys(keys: &[String]) -> f64 {
    if keys.len() < NGRAM_SIZE {
        return 0.0;
    }

    let mut counts: HashMap<&[String], usize> = HashMap::new();
    for window in keys.windows(NGRAM_SIZE) {
        *counts.entry(window).or_insert(0) += 1;
    }

    let max = counts.values().copied().max().unwrap_or(0);
    if max < 2 {
        return 0.0;
    }
    max as f64 / (keys.len() - NGRAM_SIZE + 1) as f64
}

/// Walk the tokens and skip every 4-word window seen before. Tokens too close
/// to the end to start a window are always kept.
pub fn collapse_repeated_ngrams<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    let keys: Vec<String> = tokens.iter().map(|t| word_key(t)).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < tokens.len() {
        if i + NGRAM_SIZE <= tokens.len() {
            let window = keys[i..i + NGRAM_SIZE].join(" ");
            if seen.contains(&window) {
                i += NGRAM_SIZE;
                continue;
            }
            seen.insert(window);
        }
        kept.push(tokens[i]);
        i += 1;
    }

    kept
}

/// Re-break text into lines of 4-10 words, preferring sentence ends.
pub fn reflow(text: &str) -> String {
    let mut lines = Vec::new();
    let mut line: Vec<&str> = Vec::new();

    for word in text.split_whitespace() {
        line.push(word);
        let sentence_end = word.ends_with(SENTENCE_END);
        if (sentence_end && line.len() >= MIN_LINE_WORDS) || line.len() >= MAX_LINE_WORDS {
            lines.push(line.join(" "));
            line.clear();
        }
    }
    if !line.is_empty() {
        lines.push(line.join(" "));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> TextPostProcessor {
        TextPostProcessor::new(TextGateConfig::default())
    }

    #[test]
    fn test_markers_removed() {
        let kept = processor().remove_hallucinations("[Music] ♪ la la ♪ Hello there (Intro)", None);
        assert_eq!(kept, vec!["Hello there".to_string()]);
    }

    #[test]
    fn test_english_hallucinations_dropped() {
        let kept = processor().remove_hallucinations(
            "I walk alone tonight. Subscribe to my channel! Thanks for watching!",
            Some("en"),
        );
        assert_eq!(kept, vec!["I walk alone tonight.".to_string()]);
    }

    #[test]
    fn test_vietnamese_hallucinations_depend_on_language() {
        let text = "Em về đi. Hãy đăng ký kênh để ủng hộ!";
        let p = processor();
        assert_eq!(p.remove_hallucinations(text, Some("vi")), vec!["Em về đi.".to_string()]);
        assert_eq!(p.remove_hallucinations(text, None), vec!["Em về đi.".to_string()]);
        assert_eq!(p.remove_hallucinations(text, Some("en")).len(), 2);
    }

    #[test]
    fn test_dedupe_chunks() {
        let chunks = ["Hold me close.", "hold me close!", "Let go.", "Hold me close.", "Run.", "Hold me close."]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let kept = processor().dedupe_chunks(chunks);
        assert_eq!(kept, vec!["Hold me close.", "Let go.", "Hold me close.", "Run."]);
    }

    #[test]
    fn test_ngram_ratio() {
        let tokens: Vec<&str> = "one two three four five six seven eight".split(' ').collect();
        assert_eq!(ngram_repeat_ratio(&tokens), 0.0);

        let looped: Vec<&str> = std::iter::repeat("love").take(50).collect();
        assert_eq!(ngram_repeat_ratio(&looped), 1.0);
    }

    #[test]
    fn test_collapse_repeated_ngrams() {
        let tokens: Vec<&str> = "a b c d e f g h i j a b c d e f g h i j".split(' ').collect();
        assert_eq!(
            collapse_repeated_ngrams(&tokens).join(" "),
            "a b c d e f g h i j i j"
        );

        let looped: Vec<&str> = std::iter::repeat("love").take(50).collect();
        assert_eq!(collapse_repeated_ngrams(&looped), vec!["love", "love"]);
    }

    #[test]
    fn test_collapse_keeps_closing_words() {
        let tokens: Vec<&str> = "a b c d x y a b c d a b".split(' ').collect();
        assert_eq!(collapse_repeated_ngrams(&tokens).join(" "), "a b c d x y a b");
    }

    #[test]
    fn test_reflow_line_lengths() {
        let text = "one two. three four five six. seven eight nine ten eleven twelve thirteen fourteen fifteen sixteen";
        assert_eq!(
            reflow(text),
            "one two. three four five six.\nseven eight nine ten eleven twelve thirteen fourteen fifteen sixteen"
        );
    }

    #[test]
    fn test_vietnamese_corrections() {
        let mut config = TextGateConfig::default();
        config
            .custom_corrections
            .insert("em iu".to_string(), "em yêu".to_string());
        config
            .custom_corrections
            .insert("sai gon".to_string(), "Sài Gòn".to_string());
        let p = TextPostProcessor::new(config);

        assert_eq!(
            p.apply_corrections("anh ko biết , vì sai gon xa", Some("vi")),
            "anh không biết, vì Sài Gòn xa"
        );
        assert_eq!(p.apply_corrections("anh ko biết", Some("en")), "anh ko biết");
    }

    #[test]
    fn test_gate_unique_ratio_boundary() {
        let p = processor();
        // 20 words, 6 distinct: ratio exactly 0.3
        let at_min = "sun moon star rain wind fire sun star wind moon rain fire sun rain moon fire star wind sun wind";
        assert_eq!(p.evaluate(at_min, None), UsabilityVerdict::Accepted);

        let below = "sun moon star rain wind wind sun star wind moon rain wind sun rain moon wind star wind sun wind";
        assert!(matches!(
            p.evaluate(below, None),
            UsabilityVerdict::Rejected(RejectReason::LowUniqueWordRatio { .. })
        ));
    }

    #[test]
    fn test_gate_word_count() {
        assert!(matches!(
            processor().evaluate("only four words here", None),
            UsabilityVerdict::Rejected(RejectReason::TooFewWords { count: 4, min: 8 })
        ));
    }

    #[test]
    fn test_gate_repetitive_loop() {
        let looped = vec!["love"; 50].join(" ");
        assert!(matches!(
            processor().evaluate(&looped, None),
            UsabilityVerdict::Rejected(RejectReason::LowUniqueWordRatio { .. })
        ));
        assert_eq!(processor().process(&looped, None), None);
    }

    #[test]
    fn test_gate_rejects_translation() {
        let english = "I am walking in the rain and thinking of you all the time my love";
        assert!(matches!(
            processor().evaluate(english, Some("vi")),
            UsabilityVerdict::Rejected(RejectReason::LikelyTranslation { .. })
        ));
        assert!(processor().evaluate(english, Some("en")).is_accepted());
    }

    #[test]
    fn test_clean_is_idempotent() {
        let raw = "[Music] Ngày mai em đi, biển nhớ tên em gọi về. Ngày mai em đi, biển nhớ tên em gọi về. \
                   Ngày mai em đi, biển nhớ tên em gọi về. Đồi núi mấy lúc bâng khuâng. \
                   Cảm ơn các bạn đã xem video. Sỏi đá cũng cần có nhau";
        let p = processor();
        let once = p.clean(raw, Some("vi"));
        assert_eq!(p.clean(&once, Some("vi")), once);
        assert!(!once.contains("Cảm ơn"));
        assert!(!once.contains("[Music]"));
    }

    #[test]
    fn test_process_hallucination_only_transcript() {
        assert_eq!(
            processor().process("Subscribe to my channel! Thanks for watching!", None),
            None
        );
    }

    #[test]
    fn test_process_legacy_word_floor() {
        let p = processor();
        assert_eq!(p.process_legacy("la la la", None), None);
        assert_eq!(
            p.process_legacy("la la la la la la la la. Thanks for watching!", None).as_deref(),
            Some("la la la la la la la la.")
        );
    }
}
