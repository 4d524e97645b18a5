//! Domain models for lyrics persistence

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Lyrics cache
// =============================================================================

/// A resolved lyrics record keyed by normalized `artist:title`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LyricsCacheEntry {
    /// SHA-256 hex of the normalized `artist:title`
    pub cache_key: String,
    pub artist: String,
    pub title: String,
    pub album: Option<String>,
    pub lyrics_text: String,
    /// Original LRC text when the source had timestamps
    pub synced_lyrics: Option<String>,
    /// Identifier in the external lyrics database
    pub external_id: Option<i64>,
    pub duration_sec: Option<f64>,
    /// Match score (0-100) the entry was accepted with
    pub match_score: Option<f64>,
    /// Unix seconds
    pub created_at: i64,
}

impl LyricsCacheEntry {
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_key.len() != 64 || !self.cache_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("Cache key must be a 64 character hex digest".to_string());
        }

        if self.lyrics_text.trim().is_empty() {
            return Err("Lyrics text cannot be empty".to_string());
        }

        if let Some(score) = self.match_score {
            if !(0.0..=100.0).contains(&score) {
                return Err(format!("Match score {} outside 0-100", score));
            }
        }

        Ok(())
    }

    /// Age in whole seconds relative to `now` (unix seconds)
    pub fn age_secs(&self, now: i64) -> i64 {
        now - self.created_at
    }
}

// =============================================================================
// Library items
// =============================================================================

/// Background lyrics extraction state of a library item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    NotRequested,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::NotRequested => "not_requested",
            ExtractionStatus::Queued => "queued",
            ExtractionStatus::Processing => "processing",
            ExtractionStatus::Completed => "completed",
            ExtractionStatus::Failed => "failed",
        }
    }

    /// Job finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExtractionStatus::Completed | ExtractionStatus::Failed)
    }
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_requested" => Ok(ExtractionStatus::NotRequested),
            "queued" => Ok(ExtractionStatus::Queued),
            "processing" => Ok(ExtractionStatus::Processing),
            "completed" => Ok(ExtractionStatus::Completed),
            "failed" => Ok(ExtractionStatus::Failed),
            other => Err(format!("Unknown extraction status: {}", other)),
        }
    }
}

/// The fields of a library item the lyrics subsystem reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LibraryItem {
    pub id: i64,
    /// Remote URL or local path of the audio
    pub audio_url: String,
    pub lyrics: Option<String>,
    /// Provenance tag of `lyrics` (metadata, lrclib_cache, lrclib, assemblyai)
    pub lyrics_source: Option<String>,
    pub lyrics_extraction_status: ExtractionStatus,
    pub lyrics_extraction_error: Option<String>,
    pub updated_at: i64,
}
