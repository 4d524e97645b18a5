//! # Extraction Orchestrator
//!
//! Runs the resolution tiers in order and returns the first hit:
//!
//! 1. lyrics embedded in the audio file's tags
//! 2. the local lyrics cache (needs artist and title; enhanced only)
//! 3. the LRCLIB database
//! 4. speech-to-text, cleaned and gated
//!
//! The [`ExtractionStrategy`] picked at construction decides how much each
//! tier does. `Legacy` skips the cache, runs one structured database search
//! and applies only the light transcript filter. `Enhanced` runs everything.
//!
//! Tier-local failures (network trouble, HTTP errors, transcription errors)
//! are logged and the next tier runs. Anything else ends the extraction with
//! a failure result carrying the error message.

use crate::cache::{CacheWrite, LyricsCache};
use crate::error::{LyricsError, Result};
use crate::fetcher::{DownloadedAudio, RemoteFetcher};
use crate::lrclib::{LrcLibClient, LyricsProvider, SearchMode};
use crate::postprocess::TextPostProcessor;
use crate::tags::{AudioTags, LoftyTagReader, TagReader};
use crate::transcription::{AssemblyAiTranscriber, Transcriber};
use crate::types::{AudioSource, ExtractionRequest, ExtractionResult, LyricsQuery, LyricsSource};
use async_trait::async_trait;
use bridge_traits::http::HttpClient;
use bridge_traits::time::Clock;
use core_library::SqliteLyricsCacheRepository;
use core_runtime::config::{ExtractionStrategy, LyricsConfig};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Anything that turns a request into a result. The job service depends on
/// this rather than on the orchestrator directly.
#[async_trait]
pub trait LyricsExtractor: Send + Sync {
    async fn extract(&self, request: ExtractionRequest) -> ExtractionResult;
}

/// Audio available on local disk for the duration of one extraction.
enum LocalAudio {
    Path(PathBuf),
    /// Deleted when dropped
    Downloaded(DownloadedAudio),
}

impl LocalAudio {
    fn path(&self) -> &Path {
        match self {
            LocalAudio::Path(path) => path,
            LocalAudio::Downloaded(download) => download.path(),
        }
    }
}

pub struct ExtractionOrchestrator {
    config: LyricsConfig,
    tag_reader: Arc<dyn TagReader>,
    fetcher: Option<RemoteFetcher>,
    cache: Option<LyricsCache>,
    provider: Option<Arc<dyn LyricsProvider>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    post_processor: TextPostProcessor,
}

impl ExtractionOrchestrator {
    /// Orchestrator with only the metadata tier. Add the others with the
    /// `with_*` methods.
    pub fn new(config: LyricsConfig, tag_reader: Arc<dyn TagReader>) -> Self {
        let post_processor = TextPostProcessor::new(config.text_gate.clone());
        Self {
            config,
            tag_reader,
            fetcher: None,
            cache: None,
            provider: None,
            transcriber: None,
            post_processor,
        }
    }

    /// Fully wired orchestrator: lofty tags, SQLite cache, LRCLIB, and
    /// AssemblyAI when an API key is configured.
    pub fn with_defaults(
        config: LyricsConfig,
        http: Arc<dyn HttpClient>,
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = LyricsCache::new(
            Arc::new(SqliteLyricsCacheRepository::new(pool)),
            clock,
            config.cache_ttl(),
        );
        let provider = LrcLibClient::new(Arc::clone(&http), config.lrclib.clone());
        let transcriber = AssemblyAiTranscriber::new(Arc::clone(&http), config.transcription.clone());
        let fetcher = RemoteFetcher::new(http).with_idle_timeout(config.download_idle_timeout);

        let mut orchestrator = Self::new(config, Arc::new(LoftyTagReader::new()))
            .with_fetcher(fetcher)
            .with_cache(cache)
            .with_lyrics_provider(Arc::new(provider));
        if let Some(transcriber) = transcriber {
            orchestrator = orchestrator.with_transcriber(Arc::new(transcriber));
        }
        orchestrator
    }

    pub fn with_fetcher(mut self, fetcher: RemoteFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_cache(mut self, cache: LyricsCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_lyrics_provider(mut self, provider: Arc<dyn LyricsProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn strategy(&self) -> ExtractionStrategy {
        self.config.strategy
    }

    pub fn cache(&self) -> Option<&LyricsCache> {
        self.cache.as_ref()
    }

    /// Resolve lyrics for one request. Never fails; problems are reported
    /// in the result's `error`.
    #[instrument(skip_all, fields(source = %request.source, strategy = ?self.config.strategy))]
    pub async fn extract(&self, request: ExtractionRequest) -> ExtractionResult {
        if !self.config.features.extraction_enabled {
            return ExtractionResult::failure("Lyrics extraction is disabled");
        }

        match self.resolve(&request).await {
            Ok(Some((lyrics, source))) => {
                info!(source = %source, "Lyrics resolved");
                ExtractionResult::found(lyrics, source)
            }
            Ok(None) => {
                info!("No lyrics found by any tier");
                ExtractionResult::not_detected()
            }
            Err(e) => {
                error!(error = %e, "Lyrics extraction failed");
                ExtractionResult::failure(e.to_string())
            }
        }
    }

    async fn resolve(&self, request: &ExtractionRequest) -> Result<Option<(String, LyricsSource)>> {
        let audio = self.materialize(&request.source).await?;
        let tags = self.tag_reader.read_tags(audio.path()).await;

        if let Some(lyrics) = tags.embedded_lyrics.clone() {
            debug!("Using embedded lyrics");
            return Ok(Some((lyrics, LyricsSource::Metadata)));
        }

        if let Some(entry) = self.lookup_cache(&tags).await {
            return Ok(Some((entry, LyricsSource::LrclibCache)));
        }

        if let Some(lyrics) = self.search_database(&tags).await? {
            return Ok(Some((lyrics, LyricsSource::Lrclib)));
        }

        let language = request.language.as_deref();
        if let Some(lyrics) = self.transcribe(audio.path(), language).await? {
            return Ok(Some((lyrics, LyricsSource::Assemblyai)));
        }

        Ok(None)
    }

    async fn materialize(&self, source: &AudioSource) -> Result<LocalAudio> {
        match source {
            AudioSource::LocalPath(path) => Ok(LocalAudio::Path(path.clone())),
            AudioSource::Url(url) => {
                let fetcher = self.fetcher.as_ref().ok_or_else(|| {
                    LyricsError::Internal("Remote audio requires an HTTP client".to_string())
                })?;
                let download = fetcher.download(url, self.config.max_download_mb).await?;
                Ok(LocalAudio::Downloaded(download))
            }
        }
    }

    async fn lookup_cache(&self, tags: &AudioTags) -> Option<String> {
        if self.config.strategy != ExtractionStrategy::Enhanced || !self.config.features.cache_enabled {
            return None;
        }
        let cache = self.cache.as_ref()?;
        let (artist, title) = tags.identity()?;
        cache.get(artist, title).await.map(|entry| entry.lyrics_text)
    }

    async fn search_database(&self, tags: &AudioTags) -> Result<Option<String>> {
        if !self.config.features.lrclib_enabled {
            return Ok(None);
        }
        let (Some(provider), Some(title)) = (self.provider.as_ref(), tags.title.as_deref()) else {
            return Ok(None);
        };

        let query = LyricsQuery {
            track: title.to_string(),
            artist: tags.artist.clone(),
            album: tags.album.clone(),
            duration_sec: tags.duration_sec,
        };
        let mode = match self.config.strategy {
            ExtractionStrategy::Legacy => SearchMode::Structured,
            ExtractionStrategy::Enhanced => SearchMode::WithFallbacks,
        };

        let matched = match provider.find_best_match(&query, mode).await {
            Ok(Some(matched)) => matched,
            Ok(None) => return Ok(None),
            Err(e) if e.is_tier_local() => {
                warn!(provider = provider.name(), error = %e, "Lyrics database tier failed");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if self.config.strategy == ExtractionStrategy::Enhanced && self.config.features.cache_enabled {
            if let (Some(cache), Some((artist, title))) = (self.cache.as_ref(), tags.identity()) {
                cache
                    .put(CacheWrite {
                        artist: artist.to_string(),
                        title: title.to_string(),
                        album: tags.album.clone(),
                        lyrics_text: matched.text.clone(),
                        synced_lyrics: matched.synced.clone(),
                        external_id: matched.external_id,
                        duration_sec: matched.duration_sec,
                        match_score: Some(matched.score),
                    })
                    .await;
            }
        }

        Ok(Some(matched.text))
    }

    async fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<Option<String>> {
        if !self.config.transcription_available() {
            return Ok(None);
        }
        let Some(transcriber) = self.transcriber.as_ref() else {
            return Ok(None);
        };

        let raw = match transcriber.transcribe(audio, language).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(e) if e.is_tier_local() => {
                warn!(error = %e, "Transcription tier failed");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let text = match self.config.strategy {
            ExtractionStrategy::Enhanced => self.post_processor.process(&raw, language),
            ExtractionStrategy::Legacy => self.post_processor.process_legacy(&raw, language),
        };
        if text.is_none() {
            info!("Transcript rejected as lyrics");
        }
        Ok(text)
    }
}

#[async_trait]
impl LyricsExtractor for ExtractionOrchestrator {
    async fn extract(&self, request: ExtractionRequest) -> ExtractionResult {
        ExtractionOrchestrator::extract(self, request).await
    }
}
