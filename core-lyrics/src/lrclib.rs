//! # LRCLIB Client
//!
//! Searches the LRCLIB lyrics database and picks the best-matching candidate.
//!
//! ## Search strategies
//!
//! [`LrcLibClient::search_with_fallbacks`] stops at the first strategy that
//! returns at least one candidate:
//! 1. structured (`track_name` + `artist_name` + `album_name`)
//! 2. keyword (`q = "track artist"`)
//! 3. title only (`track_name`)
//!
//! Without an artist only the title-only search runs. Every candidate is
//! scored against the original query (see [`crate::scoring`]).
//!
//! ## Rate limiting and retries
//!
//! Outbound requests share a sliding 60 second window. Timeouts, connection
//! failures, 429 and 5xx responses are retried with exponential backoff;
//! other 4xx responses abandon the request at once. A 404 is an empty result.

use crate::error::{LyricsError, Result};
use crate::scoring::{self, CandidateFields};
use crate::types::{LyricsQuery, MatchedLyrics};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use core_runtime::config::LrcLibConfig;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const CLIENT_HEADER: &str = concat!("lyrics-workspace/", env!("CARGO_PKG_VERSION"));
const RATE_WINDOW: Duration = Duration::from_secs(60);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// How much effort a lookup spends before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// One structured query
    Structured,
    /// Structured, then keyword, then title-only
    WithFallbacks,
}

/// A lyrics database the resolver can consult.
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// Best acceptable candidate for `query`.
    ///
    /// `Ok(None)` when nothing scored high enough; `Err` when the lookup
    /// itself failed.
    async fn find_best_match(
        &self,
        query: &LyricsQuery,
        mode: SearchMode,
    ) -> Result<Option<MatchedLyrics>>;

    fn name(&self) -> &'static str;
}

/// One search result as LRCLIB returns it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LrcLibRecord {
    pub id: Option<i64>,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    pub duration: Option<f64>,
    #[serde(default)]
    pub instrumental: bool,
    pub plain_lyrics: Option<String>,
    pub synced_lyrics: Option<String>,
}

impl LrcLibRecord {
    fn has_synced(&self) -> bool {
        self.synced_lyrics
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    fn plain_text(&self) -> Option<String> {
        self.plain_lyrics
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn synced_as_plain(&self) -> Option<String> {
        self.synced_lyrics
            .as_deref()
            .map(scoring::strip_lrc_timestamps)
            .filter(|s| !s.is_empty())
    }

    /// Text to store for this record, honoring the synced preference.
    fn lyrics_text(&self, prefer_synced: bool) -> Option<String> {
        if prefer_synced {
            self.synced_as_plain().or_else(|| self.plain_text())
        } else {
            self.plain_text().or_else(|| self.synced_as_plain())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub record: LrcLibRecord,
    pub score: f64,
}

/// Sliding-window limiter: at most `max_requests` per window.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            sent: Mutex::new(VecDeque::new()),
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests as usize, RATE_WINDOW)
    }

    /// Wait until a request may be sent, then record it.
    pub async fn acquire(&self) {
        if self.max_requests == 0 {
            return;
        }

        loop {
            let wait = {
                let mut sent = self.sent.lock().await;
                let now = Instant::now();
                while sent
                    .front()
                    .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
                {
                    sent.pop_front();
                }

                if sent.len() < self.max_requests {
                    sent.push_back(now);
                    return;
                }

                match sent.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "LRCLIB rate limit reached");
            tokio::time::sleep(wait).await;
        }
    }
}

pub struct LrcLibClient {
    http: Arc<dyn HttpClient>,
    config: LrcLibConfig,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl LrcLibClient {
    pub fn new(http: Arc<dyn HttpClient>, config: LrcLibConfig) -> Self {
        let limiter = RateLimiter::per_minute(config.requests_per_minute);
        let retry = RetryPolicy {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
            max_delay: MAX_BACKOFF,
        };
        Self {
            http,
            config,
            limiter,
            retry,
        }
    }

    /// Structured search. Errors propagate.
    pub async fn search(&self, query: &LyricsQuery) -> Result<Vec<ScoredCandidate>> {
        let mut params = vec![("track_name", query.track.as_str())];
        if let Some(artist) = query.artist.as_deref() {
            params.push(("artist_name", artist));
        }
        if let Some(album) = query.album.as_deref() {
            params.push(("album_name", album));
        }

        let records = self.fetch_records(&params).await?;
        Ok(self.rank(query, records))
    }

    /// Try structured, keyword and title-only searches in turn. A failing
    /// strategy is logged and the next one runs.
    pub async fn search_with_fallbacks(&self, query: &LyricsQuery) -> Result<Vec<ScoredCandidate>> {
        let keyword;
        let mut attempts: Vec<(&str, Vec<(&str, &str)>)> = Vec::new();

        match query.artist.as_deref().filter(|a| !a.trim().is_empty()) {
            Some(artist) => {
                let mut structured = vec![("track_name", query.track.as_str()), ("artist_name", artist)];
                if let Some(album) = query.album.as_deref() {
                    structured.push(("album_name", album));
                }
                attempts.push(("structured", structured));

                keyword = format!("{} {}", query.track, artist);
                attempts.push(("keyword", vec![("q", keyword.as_str())]));
            }
            None => debug!("No artist, skipping structured and keyword searches"),
        }
        attempts.push(("title_only", vec![("track_name", query.track.as_str())]));

        let mut last_error = None;
        let mut any_succeeded = false;
        for (strategy, params) in attempts {
            match self.fetch_records(&params).await {
                Ok(records) if !records.is_empty() => {
                    debug!(strategy, count = records.len(), "LRCLIB search returned candidates");
                    return Ok(self.rank(query, records));
                }
                Ok(_) => {
                    any_succeeded = true;
                    debug!(strategy, "LRCLIB search returned nothing");
                }
                Err(e) => {
                    warn!(strategy, error = %e, "LRCLIB search failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !any_succeeded => Err(e),
            _ => Ok(Vec::new()),
        }
    }

    /// Pick the first candidate (by score) that clears the minimum score,
    /// is not instrumental and has text.
    pub fn select_best(&self, candidates: &[ScoredCandidate]) -> Option<MatchedLyrics> {
        candidates
            .iter()
            .filter(|c| c.score >= self.config.min_match_score)
            .filter(|c| !c.record.instrumental)
            .find_map(|c| {
                let text = c.record.lyrics_text(self.config.prefer_synced)?;
                Some(MatchedLyrics {
                    text,
                    synced: c.record.synced_lyrics.clone().filter(|s| !s.trim().is_empty()),
                    external_id: c.record.id,
                    score: c.score,
                    track: c.record.track_name.clone().unwrap_or_default(),
                    artist: c.record.artist_name.clone(),
                    album: c.record.album_name.clone(),
                    duration_sec: c.record.duration,
                })
            })
    }

    fn rank(&self, query: &LyricsQuery, records: Vec<LrcLibRecord>) -> Vec<ScoredCandidate> {
        let mut candidates: Vec<ScoredCandidate> = records
            .into_iter()
            .map(|record| {
                let fields = CandidateFields {
                    track: record.track_name.as_deref().unwrap_or(""),
                    artist: record.artist_name.as_deref(),
                    album: record.album_name.as_deref(),
                    duration_sec: record.duration,
                    has_synced: record.has_synced(),
                };
                let score = scoring::score(query, &fields);
                ScoredCandidate { record, score }
            })
            .collect();

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates
    }

    async fn fetch_records(&self, params: &[(&str, &str)]) -> Result<Vec<LrcLibRecord>> {
        let query_string = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}/search?{}", self.config.base_url.trim_end_matches('/'), query_string);

        let Some(response) = self.get_with_retry(&url).await? else {
            return Ok(Vec::new());
        };

        response
            .json::<Vec<LrcLibRecord>>()
            .map_err(|e| LyricsError::InvalidResponse(format!("LRCLIB search: {}", e)))
    }

    /// `Ok(None)` for 404.
    async fn get_with_retry(&self, url: &str) -> Result<Option<HttpResponse>> {
        let request = HttpRequest::get(url)
            .header("Lrclib-Client", CLIENT_HEADER)
            .header("Accept", "application/json")
            .timeout(self.config.timeout);

        let mut attempt = 0;
        loop {
            self.limiter.acquire().await;

            let error = match self.http.execute(request.clone()).await {
                Ok(response) if response.is_success() => return Ok(Some(response)),
                Ok(response) if response.status == 404 => return Ok(None),
                Ok(response) if response.is_retryable() => LyricsError::TransientNetwork(
                    format!("LRCLIB returned HTTP {}", response.status),
                ),
                Ok(response) => {
                    let message = response
                        .text()
                        .unwrap_or_default()
                        .chars()
                        .take(200)
                        .collect();
                    return Err(LyricsError::NonRetryableHttp {
                        status: response.status,
                        message,
                    });
                }
                Err(e) if e.is_transient() => LyricsError::TransientNetwork(e.to_string()),
                Err(e) => return Err(e.into()),
            };

            if attempt >= self.retry.max_retries {
                return Err(error);
            }

            let delay = self.retry.backoff_delay(attempt);
            warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying LRCLIB request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl LyricsProvider for LrcLibClient {
    async fn find_best_match(
        &self,
        query: &LyricsQuery,
        mode: SearchMode,
    ) -> Result<Option<MatchedLyrics>> {
        let candidates = match mode {
            SearchMode::Structured => self.search(query).await?,
            SearchMode::WithFallbacks => self.search_with_fallbacks(query).await?,
        };

        let best = self.select_best(&candidates);
        match &best {
            Some(m) => info!(score = m.score, track = %m.track, "LRCLIB match accepted"),
            None => debug!(candidates = candidates.len(), "No acceptable LRCLIB match"),
        }
        Ok(best)
    }

    fn name(&self) -> &'static str {
        "lrclib"
    }
}
