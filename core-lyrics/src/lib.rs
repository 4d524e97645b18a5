//! # Lyrics Resolution
//!
//! Produces lyrics for an audio track, with the tier that found them:
//!
//! - [`tags`] - lyrics and identity read from the file's embedded tags
//! - [`cache`] - TTL cache of previous database hits
//! - [`lrclib`] - fuzzy-matched search of the LRCLIB database
//! - [`transcription`] + [`postprocess`] - gated speech-to-text
//! - [`orchestrator`] - runs the tiers in order
//! - [`job_service`] - background jobs that record results on library items
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_lyrics::{AsyncJobService, ExtractionOrchestrator, ExtractionRequest};
//!
//! let orchestrator = ExtractionOrchestrator::with_defaults(config, http, pool, clock);
//! let result = orchestrator
//!     .extract(ExtractionRequest::from_path("/music/song.flac"))
//!     .await;
//!
//! if let (Some(lyrics), Some(source)) = (result.lyrics, result.source) {
//!     println!("{} ({})", lyrics, source);
//! }
//! ```

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod job_service;
pub mod lrclib;
pub mod orchestrator;
pub mod postprocess;
pub mod scoring;
pub mod tags;
pub mod transcription;
pub mod types;

pub use cache::{cache_key, CacheWrite, LyricsCache};
pub use error::{LyricsError, Result};
pub use fetcher::{DownloadedAudio, RemoteFetcher};
pub use job_service::AsyncJobService;
pub use lrclib::{LrcLibClient, LyricsProvider, SearchMode};
pub use orchestrator::{ExtractionOrchestrator, LyricsExtractor};
pub use postprocess::{RejectReason, TextPostProcessor, UsabilityVerdict};
pub use tags::{AudioTags, LoftyTagReader, TagReader};
pub use transcription::{AssemblyAiTranscriber, Transcriber};
pub use types::{
    AudioSource, ExtractionRequest, ExtractionResult, LyricsQuery, LyricsSource, MatchedLyrics,
    NO_LYRICS_DETECTED,
};
