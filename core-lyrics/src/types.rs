//! Request and result types shared by the resolution pipeline.

use crate::error::{LyricsError, Result};
use core_runtime::logging::strip_path;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Failure reason reported when every tier ran and none produced lyrics.
pub const NO_LYRICS_DETECTED: &str = "No lyrics detected in audio";

/// Where the audio for an extraction comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Remote file, downloaded to a temporary file before reading
    Url(String),
    LocalPath(PathBuf),
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSource::Url(url) => {
                let without_query = url.split(['?', '#']).next().unwrap_or(url);
                write!(f, "url:{}", without_query)
            }
            AudioSource::LocalPath(path) => {
                write!(f, "file:{}", strip_path(&path.to_string_lossy()))
            }
        }
    }
}

/// One audio source plus an optional language hint (ISO code, e.g. `vi`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub source: AudioSource,
    pub language: Option<String>,
}

impl ExtractionRequest {
    /// Build a request from the two optional source fields a caller may supply.
    ///
    /// Exactly one of `audio_url` / `local_path` must be present.
    pub fn new(
        audio_url: Option<String>,
        local_path: Option<PathBuf>,
        language: Option<String>,
    ) -> Result<Self> {
        let source = match (audio_url, local_path) {
            (Some(url), None) if !url.trim().is_empty() => AudioSource::Url(url),
            (None, Some(path)) => AudioSource::LocalPath(path),
            (Some(_), Some(_)) => {
                return Err(LyricsError::InvalidRequest(
                    "Provide either an audio URL or a local path, not both".to_string(),
                ))
            }
            _ => {
                return Err(LyricsError::InvalidRequest(
                    "An audio URL or local path is required".to_string(),
                ))
            }
        };

        Ok(Self {
            source,
            language: normalize_language(language),
        })
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            source: AudioSource::Url(url.into()),
            language: None,
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: AudioSource::LocalPath(path.into()),
            language: None,
        }
    }

    /// Interpret a stored library location: `http(s)://` is remote,
    /// `file://` and bare paths are local.
    pub fn for_library_item(location: &str) -> Self {
        let trimmed = location.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::from_url(trimmed)
        } else if let Some(path) = trimmed.strip_prefix("file://") {
            Self::from_path(Path::new(path))
        } else {
            Self::from_path(Path::new(trimmed))
        }
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = normalize_language(language);
        self
    }
}

fn normalize_language(language: Option<String>) -> Option<String> {
    language
        .map(|l| l.trim().to_ascii_lowercase())
        .filter(|l| !l.is_empty())
}

/// Which tier produced the lyrics. Stored as the item's provenance tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricsSource {
    /// Embedded in the audio file's tags
    Metadata,
    LrclibCache,
    Lrclib,
    /// Speech-to-text
    Assemblyai,
}

impl LyricsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LyricsSource::Metadata => "metadata",
            LyricsSource::LrclibCache => "lrclib_cache",
            LyricsSource::Lrclib => "lrclib",
            LyricsSource::Assemblyai => "assemblyai",
        }
    }
}

impl fmt::Display for LyricsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LyricsSource {
    type Err = LyricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "metadata" => Ok(LyricsSource::Metadata),
            "lrclib_cache" => Ok(LyricsSource::LrclibCache),
            "lrclib" => Ok(LyricsSource::Lrclib),
            "assemblyai" => Ok(LyricsSource::Assemblyai),
            other => Err(LyricsError::InvalidRequest(format!(
                "Unknown lyrics source: {}",
                other
            ))),
        }
    }
}

/// Outcome of one extraction. Found results carry lyrics and source;
/// failures carry only an error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub lyrics: Option<String>,
    pub source: Option<LyricsSource>,
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn found(lyrics: impl Into<String>, source: LyricsSource) -> Self {
        Self {
            lyrics: Some(lyrics.into()),
            source: Some(source),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            lyrics: None,
            source: None,
            error: Some(error.into()),
        }
    }

    pub fn not_detected() -> Self {
        Self::failure(NO_LYRICS_DETECTED)
    }

    pub fn is_found(&self) -> bool {
        self.lyrics.is_some()
    }
}

/// Search parameters for the external lyrics database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricsQuery {
    pub track: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_sec: Option<f64>,
}

impl LyricsQuery {
    pub fn new(track: impl Into<String>) -> Self {
        Self {
            track: track.into(),
            artist: None,
            album: None,
            duration_sec: None,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_duration(mut self, duration_sec: f64) -> Self {
        self.duration_sec = Some(duration_sec);
        self
    }
}

/// The accepted candidate from a lyrics database search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedLyrics {
    /// Plain text, timestamps removed
    pub text: String,
    /// Original LRC text when the candidate had it
    pub synced: Option<String>,
    pub external_id: Option<i64>,
    pub score: f64,
    pub track: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_sec: Option<f64>,
}
