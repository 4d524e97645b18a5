//! End-to-end resolution through the orchestrator with faked external
//! services and a real in-memory SQLite cache.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{DownloadStream, HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::Clock;
use chrono::{DateTime, TimeZone, Utc};
use core_library::db::create_test_pool;
use core_library::{LyricsCacheRepository, SqliteLyricsCacheRepository};
use core_lyrics::{
    AudioTags, ExtractionOrchestrator, ExtractionRequest, LrcLibClient, LyricsCache, LyricsSource,
    RemoteFetcher, TagReader, Transcriber, NO_LYRICS_DETECTED,
};
use core_runtime::config::{ExtractionStrategy, LrcLibConfig, LyricsConfig};
use mockall::mock;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mock! {
    Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn download_stream(&self, url: String) -> BridgeResult<DownloadStream>;
    }
}

struct FixedClock(AtomicI64);

impl FixedClock {
    fn at(ts: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(ts)))
    }

    fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.0.load(Ordering::SeqCst), 0)
            .single()
            .unwrap()
    }
}

/// Returns fixed tags and remembers which paths it was asked about and
/// whether they existed at the time.
struct FakeTags {
    tags: AudioTags,
    seen: Mutex<Vec<(PathBuf, bool)>>,
}

impl FakeTags {
    fn new(tags: AudioTags) -> Arc<Self> {
        Arc::new(Self {
            tags,
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TagReader for FakeTags {
    async fn read_tags(&self, path: &Path) -> AudioTags {
        self.seen
            .lock()
            .unwrap()
            .push((path.to_path_buf(), path.exists()));
        self.tags.clone()
    }
}

struct FakeTranscriber {
    text: Option<String>,
    calls: AtomicUsize,
}

impl FakeTranscriber {
    fn returning(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: Some(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(
        &self,
        _audio: &Path,
        _language: Option<&str>,
    ) -> core_lyrics::Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

const NOW: i64 = 1_750_000_000;

fn config(strategy: ExtractionStrategy) -> LyricsConfig {
    let mut config = LyricsConfig::default()
        .with_strategy(strategy)
        .with_lrclib(LrcLibConfig {
            base_url: "https://lrclib.test/api".to_string(),
            retry_base_delay: Duration::from_millis(1),
            ..LrcLibConfig::default()
        });
    config.transcription.api_key = Some("test-key".to_string());
    config
}

fn adele_tags() -> AudioTags {
    AudioTags {
        artist: Some("Adele".to_string()),
        title: Some("Hello".to_string()),
        album: Some("25".to_string()),
        duration_sec: Some(295.0),
        ..AudioTags::default()
    }
}

fn hello_response() -> HttpResponse {
    HttpResponse::new(
        200,
        json!([{
            "id": 42,
            "trackName": "Hello",
            "artistName": "Adele",
            "albumName": "25",
            "duration": 295.0,
            "instrumental": false,
            "plainLyrics": "Hello, it's me\nI was wondering",
            "syncedLyrics": null
        }])
        .to_string(),
    )
}

struct Harness {
    orchestrator: ExtractionOrchestrator,
    cache_repo: Arc<SqliteLyricsCacheRepository>,
    clock: Arc<FixedClock>,
}

async fn harness(
    config: LyricsConfig,
    tags: Arc<FakeTags>,
    http: MockHttp,
    transcriber: Option<Arc<FakeTranscriber>>,
) -> Harness {
    let pool = create_test_pool().await.unwrap();
    let cache_repo = Arc::new(SqliteLyricsCacheRepository::new(pool));
    let clock = FixedClock::at(NOW);
    let http: Arc<dyn HttpClient> = Arc::new(http);

    let cache = LyricsCache::new(cache_repo.clone(), clock.clone(), config.cache_ttl());
    let provider = LrcLibClient::new(http.clone(), config.lrclib.clone());
    let mut orchestrator = ExtractionOrchestrator::new(config, tags)
        .with_fetcher(RemoteFetcher::new(http))
        .with_cache(cache)
        .with_lyrics_provider(Arc::new(provider));
    if let Some(transcriber) = transcriber {
        orchestrator = orchestrator.with_transcriber(transcriber);
    }

    Harness {
        orchestrator,
        cache_repo,
        clock,
    }
}

fn local_request() -> ExtractionRequest {
    ExtractionRequest::from_path("/music/track.mp3")
}

#[tokio::test]
async fn test_embedded_lyrics_short_circuit() {
    let tags = FakeTags::new(AudioTags {
        embedded_lyrics: Some("Embedded words".to_string()),
        ..adele_tags()
    });
    // No expectations: any HTTP call fails the test
    let h = harness(config(ExtractionStrategy::Enhanced), tags, MockHttp::new(), None).await;

    let result = h.orchestrator.extract(local_request()).await;
    assert_eq!(result.lyrics.as_deref(), Some("Embedded words"));
    assert_eq!(result.source, Some(LyricsSource::Metadata));
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_database_hit_then_cache_hit() {
    let mut http = MockHttp::new();
    http.expect_execute()
        .withf(|req| req.url.contains("/search?track_name=Hello&artist_name=Adele&album_name=25"))
        .times(1)
        .returning(|_| Ok(hello_response()));

    let transcriber = FakeTranscriber::returning("should never be used");
    let h = harness(
        config(ExtractionStrategy::Enhanced),
        FakeTags::new(adele_tags()),
        http,
        Some(transcriber.clone()),
    )
    .await;

    let first = h.orchestrator.extract(local_request()).await;
    assert_eq!(first.source, Some(LyricsSource::Lrclib));
    assert_eq!(first.lyrics.as_deref(), Some("Hello, it's me\nI was wondering"));

    let second = h.orchestrator.extract(local_request()).await;
    assert_eq!(second.source, Some(LyricsSource::LrclibCache));
    assert_eq!(second.lyrics, first.lyrics);

    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.cache_repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_hallucination_only_transcript_is_not_detected() {
    let h = harness(
        config(ExtractionStrategy::Enhanced),
        FakeTags::new(AudioTags::default()),
        MockHttp::new(),
        Some(FakeTranscriber::returning(
            "Subscribe to my channel! Thanks for watching!",
        )),
    )
    .await;

    let result = h.orchestrator.extract(local_request()).await;
    assert_eq!(result.lyrics, None);
    assert_eq!(result.source, None);
    assert_eq!(result.error.as_deref(), Some(NO_LYRICS_DETECTED));
}

#[tokio::test]
async fn test_repetitive_transcript_is_not_detected() {
    let looped = vec!["love"; 50].join(" ");
    let h = harness(
        config(ExtractionStrategy::Enhanced),
        FakeTags::new(AudioTags::default()),
        MockHttp::new(),
        Some(FakeTranscriber::returning(&looped)),
    )
    .await;

    let result = h.orchestrator.extract(local_request()).await;
    assert_eq!(result.lyrics, None);
    assert_eq!(result.error.as_deref(), Some(NO_LYRICS_DETECTED));
}

#[tokio::test]
async fn test_database_failure_falls_through_to_transcription() {
    let mut http = MockHttp::new();
    // Structured, keyword and title-only each fail once
    http.expect_execute()
        .times(3)
        .returning(|_| Ok(HttpResponse::new(400, "bad request")));

    let transcript = "[Music] Ngày mai em đi, biển nhớ tên em gọi về. \
                      Đồi núi mấy lúc bâng khuâng. Sỏi đá cũng cần có nhau";
    let h = harness(
        config(ExtractionStrategy::Enhanced),
        FakeTags::new(adele_tags()),
        http,
        Some(FakeTranscriber::returning(transcript)),
    )
    .await;

    let request = local_request().with_language(Some("vi".to_string()));
    let result = h.orchestrator.extract(request).await;
    assert_eq!(result.source, Some(LyricsSource::Assemblyai));
    assert_eq!(
        result.lyrics.as_deref(),
        Some("Ngày mai em đi, biển nhớ tên em gọi về.\nĐồi núi mấy lúc bâng khuâng.\nSỏi đá cũng cần có nhau")
    );
    assert_eq!(h.cache_repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_transcription_skipped_without_api_key() {
    let mut cfg = config(ExtractionStrategy::Enhanced);
    cfg.transcription.api_key = None;
    let transcriber = FakeTranscriber::returning("la la la la la la la la la la");
    let h = harness(
        cfg,
        FakeTags::new(AudioTags::default()),
        MockHttp::new(),
        Some(transcriber.clone()),
    )
    .await;

    let result = h.orchestrator.extract(local_request()).await;
    assert_eq!(result.error.as_deref(), Some(NO_LYRICS_DETECTED));
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_legacy_strategy_never_uses_cache() {
    let mut http = MockHttp::new();
    http.expect_execute()
        .withf(|req| req.url.contains("artist_name=Adele"))
        .times(2)
        .returning(|_| Ok(hello_response()));

    let h = harness(
        config(ExtractionStrategy::Legacy),
        FakeTags::new(adele_tags()),
        http,
        None,
    )
    .await;

    for _ in 0..2 {
        let result = h.orchestrator.extract(local_request()).await;
        assert_eq!(result.source, Some(LyricsSource::Lrclib));
    }
    assert_eq!(h.cache_repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_legacy_structured_miss_does_not_fall_back() {
    let mut http = MockHttp::new();
    http.expect_execute()
        .times(1)
        .returning(|_| Ok(HttpResponse::new(200, "[]")));

    let h = harness(
        config(ExtractionStrategy::Legacy),
        FakeTags::new(adele_tags()),
        http,
        None,
    )
    .await;

    let result = h.orchestrator.extract(local_request()).await;
    assert_eq!(result.error.as_deref(), Some(NO_LYRICS_DETECTED));
}

#[tokio::test]
async fn test_expired_cache_entry_is_refetched() {
    let mut http = MockHttp::new();
    http.expect_execute()
        .times(2)
        .returning(|_| Ok(hello_response()));

    let cfg = config(ExtractionStrategy::Enhanced).with_cache_ttl_days(1);
    let h = harness(cfg, FakeTags::new(adele_tags()), http, None).await;

    assert_eq!(
        h.orchestrator.extract(local_request()).await.source,
        Some(LyricsSource::Lrclib)
    );

    h.clock.advance(60 * 60);
    assert_eq!(
        h.orchestrator.extract(local_request()).await.source,
        Some(LyricsSource::LrclibCache)
    );

    h.clock.advance(24 * 60 * 60);
    assert_eq!(
        h.orchestrator.extract(local_request()).await.source,
        Some(LyricsSource::Lrclib)
    );
}

#[tokio::test]
async fn test_extraction_disabled() {
    let mut cfg = config(ExtractionStrategy::Enhanced);
    cfg.features.extraction_enabled = false;
    let tags = FakeTags::new(AudioTags {
        embedded_lyrics: Some("ignored".to_string()),
        ..AudioTags::default()
    });
    let h = harness(cfg, tags.clone(), MockHttp::new(), None).await;

    let result = h.orchestrator.extract(local_request()).await;
    assert!(result.lyrics.is_none());
    assert!(result.error.is_some());
    assert!(tags.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_remote_audio_downloaded_and_removed() {
    let mut http = MockHttp::new();
    http.expect_download_stream()
        .withf(|url| url == "https://cdn.test/songs/track?id=9")
        .times(1)
        .returning(|_| {
            Ok(DownloadStream {
                status: 200,
                content_type: Some("audio/mpeg".to_string()),
                content_length: None,
                reader: Box::new(std::io::Cursor::new(b"ID3 not really audio".to_vec())),
            })
        });

    let tags = FakeTags::new(AudioTags {
        embedded_lyrics: Some("From the download".to_string()),
        ..AudioTags::default()
    });
    let h = harness(config(ExtractionStrategy::Enhanced), tags.clone(), http, None).await;

    let result = h
        .orchestrator
        .extract(ExtractionRequest::from_url("https://cdn.test/songs/track?id=9"))
        .await;
    assert_eq!(result.source, Some(LyricsSource::Metadata));

    let seen = tags.seen.lock().unwrap();
    let (path, existed) = &seen[0];
    assert!(*existed);
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp3"));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_oversized_download_fails() {
    let mut http = MockHttp::new();
    http.expect_download_stream().times(1).returning(|_| {
        Ok(DownloadStream {
            status: 200,
            content_type: None,
            content_length: None,
            reader: Box::new(std::io::Cursor::new(vec![0u8; 2 * 1024 * 1024 + 1])),
        })
    });

    let cfg = config(ExtractionStrategy::Enhanced).with_max_download_mb(2);
    let tags = FakeTags::new(AudioTags::default());
    let h = harness(cfg, tags.clone(), http, None).await;

    let result = h
        .orchestrator
        .extract(ExtractionRequest::from_url("https://cdn.test/huge.wav"))
        .await;
    assert!(result.lyrics.is_none());
    assert_eq!(result.error.as_deref(), Some("Download exceeds the 2 MB limit"));
    assert!(tags.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cache_key_variants_share_one_row() {
    let pool = create_test_pool().await.unwrap();
    let repo = Arc::new(SqliteLyricsCacheRepository::new(pool));
    let clock = FixedClock::at(NOW);
    let cache = LyricsCache::new(repo.clone(), clock.clone(), Duration::from_secs(3600));

    for (artist, title, text) in [("Adele", "Hello", "first"), ("  ADELE ", "hello  ", "second")] {
        cache
            .put(core_lyrics::CacheWrite {
                artist: artist.to_string(),
                title: title.to_string(),
                album: None,
                lyrics_text: text.to_string(),
                synced_lyrics: None,
                external_id: None,
                duration_sec: None,
                match_score: Some(90.0),
            })
            .await;
    }

    assert_eq!(repo.count().await.unwrap(), 1);
    let entry = cache.get("adele", "HELLO").await.unwrap();
    assert_eq!(entry.lyrics_text, "second");

    clock.advance(3601);
    assert_eq!(cache.purge_expired().await, 1);
    assert!(cache.get("Adele", "Hello").await.is_none());
}
