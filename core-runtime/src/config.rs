//! # Lyrics Configuration
//!
//! Runtime settings for the lyrics resolution pipeline. Every threshold the
//! pipeline uses is configuration rather than a hard-coded constant, so hosts
//! can tune matching and text gating without a rebuild.
//!
//! ## Sources
//!
//! [`LyricsConfig::from_env`] reads the process environment. Tests and
//! embedders can call [`LyricsConfig::from_lookup`] with any key lookup, or
//! start from [`LyricsConfig::default`] and use the `with_*` builders.
//!
//! ```ignore
//! use core_runtime::config::{ExtractionStrategy, LyricsConfig};
//!
//! let config = LyricsConfig::from_env()?
//!     .with_worker_pool_size(4)
//!     .with_strategy(ExtractionStrategy::Enhanced);
//! config.validate()?;
//! ```
//!
//! | Variable | Default |
//! |----------|---------|
//! | `LYRICS_EXTRACTION_ENABLED` | `true` |
//! | `LYRICS_CACHE_ENABLED` / `LYRICS_LRCLIB_ENABLED` / `LYRICS_TRANSCRIPTION_ENABLED` | `true` |
//! | `LYRICS_EXTRACTION_STRATEGY` | `enhanced` |
//! | `LYRICS_WORKER_POOL_SIZE` | `2` |
//! | `LYRICS_CACHE_TTL_DAYS` | `30` |
//! | `LYRICS_MAX_DOWNLOAD_MB` | `50` |
//! | `LYRICS_DOWNLOAD_IDLE_TIMEOUT_SECS` | `30` |
//! | `LYRICS_MIN_UNIQUE_WORD_RATIO` | `0.3` |
//! | `LYRICS_MAX_NGRAM_REPEAT_RATIO` | `0.08` |
//! | `LYRICS_MAX_CHUNK_REPEATS` | `2` |
//! | `LYRICS_MIN_WORD_COUNT` | `8` |
//! | `LYRICS_MIN_MATCH_SCORE` | `50` |
//! | `LYRICS_PREFER_SYNCED` | `true` |
//! | `LYRICS_ENFORCE_ORIGINAL_LANGUAGE` | `true` |
//! | `LYRICS_CUSTOM_CORRECTIONS` | `{}` (JSON object, wrong → right) |
//! | `LYRICS_DATABASE_PATH` | unset |
//! | `LRCLIB_BASE_URL` | `https://lrclib.net/api` |
//! | `LRCLIB_REQUESTS_PER_MINUTE` | `30` |
//! | `LRCLIB_MAX_RETRIES` | `3` |
//! | `LRCLIB_RETRY_BASE_DELAY_MS` | `500` |
//! | `LRCLIB_TIMEOUT_SECS` | `10` |
//! | `ASSEMBLYAI_API_KEY` | unset (transcription tier off) |
//! | `ASSEMBLYAI_BASE_URL` | `https://api.assemblyai.com` |
//! | `ASSEMBLYAI_POLL_INTERVAL_SECS` | `3` |
//! | `ASSEMBLYAI_POLL_TIMEOUT_SECS` | `600` |
//! | `ASSEMBLYAI_REQUEST_TIMEOUT_SECS` | `300` |

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which resolution chain the orchestrator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionStrategy {
    /// Metadata, structured database search, lightly filtered transcription.
    Legacy,
    /// Full chain: metadata, cache, database search with fallbacks, gated transcription.
    #[default]
    Enhanced,
}

impl FromStr for ExtractionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "enhanced" => Ok(Self::Enhanced),
            other => Err(Error::Config(format!(
                "LYRICS_EXTRACTION_STRATEGY: unknown strategy '{}'",
                other
            ))),
        }
    }
}

/// Per-tier switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub extraction_enabled: bool,
    pub cache_enabled: bool,
    pub lrclib_enabled: bool,
    pub transcription_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            extraction_enabled: true,
            cache_enabled: true,
            lrclib_enabled: true,
            transcription_enabled: true,
        }
    }
}

/// Thresholds for cleaning and accepting speech-to-text output.
#[derive(Debug, Clone, PartialEq)]
pub struct TextGateConfig {
    /// Unique words / total words must be at least this (inclusive)
    pub min_unique_word_ratio: f64,
    /// Share of 4-gram positions the most frequent 4-gram may occupy
    pub max_ngram_repeat_ratio: f64,
    /// Times an identical chunk may be kept before further copies are dropped
    pub max_chunk_repeats: usize,
    pub min_word_count: usize,
    /// Apply language corrections and reject translated output
    pub enforce_original_language: bool,
    /// Literal wrong → right replacements applied after the built-in rules
    pub custom_corrections: HashMap<String, String>,
}

impl Default for TextGateConfig {
    fn default() -> Self {
        Self {
            min_unique_word_ratio: 0.3,
            max_ngram_repeat_ratio: 0.08,
            max_chunk_repeats: 2,
            min_word_count: 8,
            enforce_original_language: true,
            custom_corrections: HashMap::new(),
        }
    }
}

/// LRCLIB client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LrcLibConfig {
    pub base_url: String,
    pub requests_per_minute: u32,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub timeout: Duration,
    /// Candidates scoring below this (out of 100) are never accepted
    pub min_match_score: f64,
    pub prefer_synced: bool,
}

impl Default for LrcLibConfig {
    fn default() -> Self {
        Self {
            base_url: "https://lrclib.net/api".to_string(),
            requests_per_minute: 30,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
            min_match_score: 50.0,
            prefer_synced: true,
        }
    }
}

/// AssemblyAI transcription settings.
#[derive(Clone, PartialEq)]
pub struct TranscriptionConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// Deadline for each API call, including the audio upload
    pub request_timeout: Duration,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.assemblyai.com".to_string(),
            poll_interval: Duration::from_secs(3),
            poll_timeout: Duration::from_secs(600),
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl fmt::Debug for TranscriptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .field("poll_timeout", &self.poll_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Top-level configuration for lyrics resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct LyricsConfig {
    pub features: FeatureFlags,
    pub strategy: ExtractionStrategy,
    pub worker_pool_size: usize,
    pub cache_ttl_days: u32,
    pub max_download_mb: u64,
    /// A download that delivers no bytes for this long is abandoned
    pub download_idle_timeout: Duration,
    pub text_gate: TextGateConfig,
    pub lrclib: LrcLibConfig,
    pub transcription: TranscriptionConfig,
    /// SQLite file holding the cache and library items
    pub database_path: Option<PathBuf>,
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            features: FeatureFlags::default(),
            strategy: ExtractionStrategy::default(),
            worker_pool_size: 2,
            cache_ttl_days: 30,
            max_download_mb: 50,
            download_idle_timeout: Duration::from_secs(30),
            text_gate: TextGateConfig::default(),
            lrclib: LrcLibConfig::default(),
            transcription: TranscriptionConfig::default(),
            database_path: None,
        }
    }
}

impl LyricsConfig {
    /// Build from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let vars = EnvReader { lookup: &lookup };

        let flags = &mut config.features;
        vars.set_bool("LYRICS_EXTRACTION_ENABLED", &mut flags.extraction_enabled)?;
        vars.set_bool("LYRICS_CACHE_ENABLED", &mut flags.cache_enabled)?;
        vars.set_bool("LYRICS_LRCLIB_ENABLED", &mut flags.lrclib_enabled)?;
        vars.set_bool("LYRICS_TRANSCRIPTION_ENABLED", &mut flags.transcription_enabled)?;

        if let Some(raw) = vars.get("LYRICS_EXTRACTION_STRATEGY") {
            config.strategy = raw.parse()?;
        }
        vars.set_parsed("LYRICS_WORKER_POOL_SIZE", &mut config.worker_pool_size)?;
        vars.set_parsed("LYRICS_CACHE_TTL_DAYS", &mut config.cache_ttl_days)?;
        vars.set_parsed("LYRICS_MAX_DOWNLOAD_MB", &mut config.max_download_mb)?;
        vars.set_secs(
            "LYRICS_DOWNLOAD_IDLE_TIMEOUT_SECS",
            &mut config.download_idle_timeout,
        )?;

        let gate = &mut config.text_gate;
        vars.set_parsed("LYRICS_MIN_UNIQUE_WORD_RATIO", &mut gate.min_unique_word_ratio)?;
        vars.set_parsed("LYRICS_MAX_NGRAM_REPEAT_RATIO", &mut gate.max_ngram_repeat_ratio)?;
        vars.set_parsed("LYRICS_MAX_CHUNK_REPEATS", &mut gate.max_chunk_repeats)?;
        vars.set_parsed("LYRICS_MIN_WORD_COUNT", &mut gate.min_word_count)?;
        vars.set_bool(
            "LYRICS_ENFORCE_ORIGINAL_LANGUAGE",
            &mut gate.enforce_original_language,
        )?;
        if let Some(raw) = vars.get("LYRICS_CUSTOM_CORRECTIONS") {
            gate.custom_corrections = serde_json::from_str(&raw).map_err(|e| {
                Error::Config(format!(
                    "LYRICS_CUSTOM_CORRECTIONS: expected a JSON object of strings: {}",
                    e
                ))
            })?;
        }

        let lrclib = &mut config.lrclib;
        if let Some(url) = vars.get("LRCLIB_BASE_URL") {
            lrclib.base_url = url.trim_end_matches('/').to_string();
        }
        vars.set_parsed("LYRICS_MIN_MATCH_SCORE", &mut lrclib.min_match_score)?;
        vars.set_bool("LYRICS_PREFER_SYNCED", &mut lrclib.prefer_synced)?;
        vars.set_parsed("LRCLIB_REQUESTS_PER_MINUTE", &mut lrclib.requests_per_minute)?;
        vars.set_parsed("LRCLIB_MAX_RETRIES", &mut lrclib.max_retries)?;
        vars.set_millis("LRCLIB_RETRY_BASE_DELAY_MS", &mut lrclib.retry_base_delay)?;
        vars.set_secs("LRCLIB_TIMEOUT_SECS", &mut lrclib.timeout)?;

        let transcription = &mut config.transcription;
        transcription.api_key = vars.get("ASSEMBLYAI_API_KEY");
        if let Some(url) = vars.get("ASSEMBLYAI_BASE_URL") {
            transcription.base_url = url.trim_end_matches('/').to_string();
        }
        vars.set_secs("ASSEMBLYAI_POLL_INTERVAL_SECS", &mut transcription.poll_interval)?;
        vars.set_secs("ASSEMBLYAI_POLL_TIMEOUT_SECS", &mut transcription.poll_timeout)?;
        vars.set_secs(
            "ASSEMBLYAI_REQUEST_TIMEOUT_SECS",
            &mut transcription.request_timeout,
        )?;

        config.database_path = vars.get("LYRICS_DATABASE_PATH").map(PathBuf::from);

        Ok(config)
    }

    pub fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn with_strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    pub fn with_cache_ttl_days(mut self, days: u32) -> Self {
        self.cache_ttl_days = days;
        self
    }

    pub fn with_max_download_mb(mut self, mb: u64) -> Self {
        self.max_download_mb = mb;
        self
    }

    pub fn with_download_idle_timeout(mut self, timeout: Duration) -> Self {
        self.download_idle_timeout = timeout;
        self
    }

    pub fn with_text_gate(mut self, gate: TextGateConfig) -> Self {
        self.text_gate = gate;
        self
    }

    pub fn with_lrclib(mut self, lrclib: LrcLibConfig) -> Self {
        self.lrclib = lrclib;
        self
    }

    pub fn with_transcription(mut self, transcription: TranscriptionConfig) -> Self {
        self.transcription = transcription;
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Transcription runs only when enabled and an API key is present.
    pub fn transcription_available(&self) -> bool {
        self.features.transcription_enabled
            && self
                .transcription
                .api_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty())
    }

    /// Cache TTL as a duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.cache_ttl_days) * 24 * 60 * 60)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(Error::Config(
                "Worker pool size must be greater than 0".to_string(),
            ));
        }
        if self.cache_ttl_days == 0 {
            return Err(Error::Config(
                "Cache TTL must be at least 1 day".to_string(),
            ));
        }
        if self.max_download_mb == 0 {
            return Err(Error::Config(
                "Max download size must be greater than 0 MB".to_string(),
            ));
        }

        if self.download_idle_timeout.is_zero() {
            return Err(Error::Config(
                "Download idle timeout must be greater than 0".to_string(),
            ));
        }

        let gate = &self.text_gate;
        for (name, ratio) in [
            ("min_unique_word_ratio", gate.min_unique_word_ratio),
            ("max_ngram_repeat_ratio", gate.max_ngram_repeat_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(Error::Config(format!(
                    "{} must be between 0 and 1, got {}",
                    name, ratio
                )));
            }
        }

        if !(0.0..=100.0).contains(&self.lrclib.min_match_score) {
            return Err(Error::Config(format!(
                "Minimum match score must be between 0 and 100, got {}",
                self.lrclib.min_match_score
            )));
        }
        if self.lrclib.requests_per_minute == 0 {
            return Err(Error::Config(
                "LRCLIB rate limit must allow at least 1 request per minute".to_string(),
            ));
        }
        if self.transcription.poll_interval.is_zero() {
            return Err(Error::Config(
                "Transcription poll interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

struct EnvReader<'a, F> {
    lookup: &'a F,
}

impl<F> EnvReader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn set_parsed<T: FromStr>(&self, key: &str, target: &mut T) -> Result<()> {
        if let Some(raw) = self.get(key) {
            *target = raw
                .parse()
                .map_err(|_| Error::Config(format!("{}: invalid value '{}'", key, raw)))?;
        }
        Ok(())
    }

    fn set_bool(&self, key: &str, target: &mut bool) -> Result<()> {
        if let Some(raw) = self.get(key) {
            *target = match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(Error::Config(format!(
                        "{}: expected a boolean, got '{}'",
                        key, raw
                    )))
                }
            };
        }
        Ok(())
    }

    fn set_secs(&self, key: &str, target: &mut Duration) -> Result<()> {
        let mut secs = target.as_secs();
        self.set_parsed(key, &mut secs)?;
        *target = Duration::from_secs(secs);
        Ok(())
    }

    fn set_millis(&self, key: &str, target: &mut Duration) -> Result<()> {
        let mut millis = target.as_millis() as u64;
        self.set_parsed(key, &mut millis)?;
        *target = Duration::from_millis(millis);
        Ok(())
    }
}
