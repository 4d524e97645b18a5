//! Lyrics service façade and bootstrap helpers.
//!
//! Wires host bridges (HTTP, clock) and the SQLite pool into the extraction
//! orchestrator and the background job service. Desktop hosts enable the
//! default `desktop-shims` feature and call [`bootstrap_desktop`]; other hosts
//! build a [`LyricsService`] from their own bridge implementations.
//!
//! ```ignore
//! let service = lyrics_workspace::bootstrap_desktop(LyricsConfig::from_env()?).await?;
//! let id = service.items().insert("https://cdn.example.com/song.mp3").await?;
//! service.enqueue(id, Some("vi".to_string())).await;
//! ```

pub mod error;

pub use error::{Result, ServiceError};

pub use bridge_traits;
pub use core_library;
pub use core_lyrics;
pub use core_runtime;

use std::sync::Arc;

use bridge_traits::{Clock, HttpClient};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{LibraryItemRepository, SqliteLibraryItemRepository};
use core_lyrics::{AsyncJobService, ExtractionOrchestrator, ExtractionRequest, ExtractionResult};
use core_runtime::events::{EventBus, LyricsEvent};
use core_runtime::LyricsConfig;
use sqlx::SqlitePool;
use tokio::sync::broadcast::Receiver;
use tracing::info;

const EVENT_CAPACITY: usize = 256;

/// Primary handle exposed to host applications.
#[derive(Clone)]
pub struct LyricsService {
    orchestrator: Arc<ExtractionOrchestrator>,
    jobs: AsyncJobService,
    items: Arc<SqliteLibraryItemRepository>,
    events: EventBus,
}

impl LyricsService {
    /// Build the service from explicit bridge handles and an open pool.
    pub fn new(
        config: LyricsConfig,
        http: Arc<dyn HttpClient>,
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let worker_pool_size = config.worker_pool_size;
        let items = Arc::new(SqliteLibraryItemRepository::new(pool.clone()));
        let orchestrator = Arc::new(ExtractionOrchestrator::with_defaults(config, http, pool, clock));
        let events = EventBus::new(EVENT_CAPACITY);
        let jobs = AsyncJobService::new(orchestrator.clone(), items.clone(), worker_pool_size)
            .with_events(events.clone());

        info!(
            strategy = ?orchestrator.strategy(),
            worker_pool_size,
            "Lyrics service ready"
        );

        Ok(Self {
            orchestrator,
            jobs,
            items,
            events,
        })
    }

    /// Resolve lyrics inline, without touching any library item.
    pub async fn extract(&self, request: ExtractionRequest) -> ExtractionResult {
        self.orchestrator.extract(request).await
    }

    /// Resolve lyrics for a library item in the background.
    pub async fn enqueue(&self, item_id: i64, language: Option<String>) -> bool {
        self.jobs.enqueue(item_id, language).await
    }

    pub fn jobs(&self) -> &AsyncJobService {
        &self.jobs
    }

    pub fn items(&self) -> Arc<dyn LibraryItemRepository> {
        self.items.clone()
    }

    pub fn subscribe(&self) -> Receiver<LyricsEvent> {
        self.events.subscribe()
    }

    /// Delete cache rows past their TTL. Returns the number removed.
    pub async fn purge_expired_cache(&self) -> u64 {
        match self.orchestrator.cache() {
            Some(cache) => cache.purge_expired().await,
            None => 0,
        }
    }
}

/// Open the database named by `config` (in memory when unset) and run migrations.
pub async fn open_database(config: &LyricsConfig) -> Result<SqlitePool> {
    let db = match &config.database_path {
        Some(path) => DatabaseConfig::new(path),
        None => DatabaseConfig::in_memory(),
    };
    Ok(create_pool(db).await?)
}

/// Convenience bootstrapper for desktop hosts: reqwest HTTP, system clock,
/// SQLite at `database_path`.
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(config: LyricsConfig) -> Result<LyricsService> {
    use bridge_desktop::ReqwestHttpClient;
    use bridge_traits::SystemClock;

    // API calls set per-request timeouts; downloads use an idle timeout
    let http = ReqwestHttpClient::new()
        .map_err(|e| ServiceError::InitializationFailed(e.to_string()))?;
    let pool = open_database(&config).await?;
    LyricsService::new(config, Arc::new(http), pool, Arc::new(SystemClock))
}

#[cfg(all(test, feature = "desktop-shims"))]
mod tests {
    use super::*;
    use core_library::ExtractionStatus;
    use core_runtime::config::FeatureFlags;

    fn offline_config() -> LyricsConfig {
        LyricsConfig::default().with_features(FeatureFlags {
            lrclib_enabled: false,
            transcription_enabled: false,
            ..FeatureFlags::default()
        })
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let err = bootstrap_desktop(offline_config().with_worker_pool_size(0))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[tokio::test]
    async fn test_untagged_file_resolves_to_nothing() {
        let service = bootstrap_desktop(offline_config()).await.unwrap();
        let result = service
            .extract(ExtractionRequest::from_path("/nonexistent/song.mp3"))
            .await;
        assert!(!result.is_found());
        assert_eq!(result.error.as_deref(), Some(core_lyrics::NO_LYRICS_DETECTED));
        assert_eq!(service.purge_expired_cache().await, 0);
    }

    #[tokio::test]
    async fn test_enqueued_item_is_marked_failed() {
        let service = bootstrap_desktop(offline_config()).await.unwrap();
        let mut events = service.subscribe();
        let id = service.items().insert("/nonexistent/song.mp3").await.unwrap();

        assert!(service.enqueue(id, None).await);
        service.jobs().wait_idle().await;

        let item = service.items().find_by_id(id).await.unwrap().unwrap();
        assert_eq!(item.lyrics_extraction_status, ExtractionStatus::Failed);
        assert!(matches!(
            events.recv().await.unwrap(),
            LyricsEvent::JobQueued { .. }
        ));
    }
}
