//! # Background Extraction Jobs
//!
//! Runs extractions for library items on tokio tasks and records the outcome
//! on the item row. At most one job per item is active at a time; a second
//! request for an active item is refused rather than queued. Concurrency is
//! bounded by a semaphore sized from `worker_pool_size`.
//!
//! Status lifecycle: `queued` when accepted, `processing` once a worker slot
//! is free, then `completed` (lyrics and source stored) or `failed` (error
//! stored, truncated). The terminal write always re-reads the item first so
//! it never works from a stale copy.

use crate::orchestrator::LyricsExtractor;
use crate::types::{ExtractionRequest, ExtractionResult};
use core_library::{ExtractionStatus, LibraryItemRepository};
use core_runtime::events::{EventBus, LyricsEvent};
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn, Instrument};

/// Stored error messages are cut to this many characters.
pub const MAX_ERROR_CHARS: usize = 500;

struct Inner {
    extractor: Arc<dyn LyricsExtractor>,
    items: Arc<dyn LibraryItemRepository>,
    events: Option<EventBus>,
    active: Mutex<HashSet<i64>>,
    permits: Arc<Semaphore>,
    idle: Notify,
}

impl Inner {
    fn active(&self) -> MutexGuard<'_, HashSet<i64>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: LyricsEvent) {
        if let Some(bus) = &self.events {
            // No subscribers is fine
            bus.emit(event).ok();
        }
    }
}

/// Clears the item's active mark when the job ends, however it ends.
struct ActiveGuard {
    inner: Arc<Inner>,
    item_id: i64,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut active = self.inner.active();
        active.remove(&self.item_id);
        if active.is_empty() {
            self.inner.idle.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct AsyncJobService {
    inner: Arc<Inner>,
}

impl AsyncJobService {
    pub fn new(
        extractor: Arc<dyn LyricsExtractor>,
        items: Arc<dyn LibraryItemRepository>,
        worker_pool_size: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                extractor,
                items,
                events: None,
                active: Mutex::new(HashSet::new()),
                permits: Arc::new(Semaphore::new(worker_pool_size.max(1))),
                idle: Notify::new(),
            }),
        }
    }

    /// Publish job lifecycle events on `bus`. Call before enqueueing.
    pub fn with_events(self, bus: EventBus) -> Self {
        let inner = match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.events = Some(bus);
                inner
            }
            Err(shared) => {
                warn!("Job service already shared, events not attached");
                return Self { inner: shared };
            }
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Start extraction for `item_id` in the background.
    ///
    /// Returns `false` without doing anything if a job for the item is
    /// already active.
    pub async fn enqueue(&self, item_id: i64, language: Option<String>) -> bool {
        {
            let mut active = self.inner.active();
            if !active.insert(item_id) {
                debug!(item_id, "Extraction already active, not enqueueing");
                return false;
            }
        }
        let guard = ActiveGuard {
            inner: Arc::clone(&self.inner),
            item_id,
        };

        match self
            .inner
            .items
            .update_status(item_id, ExtractionStatus::Queued, None)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(item_id, "Library item missing when queueing extraction"),
            Err(e) => warn!(item_id, error = %e, "Failed to mark item queued"),
        }
        self.inner.emit(LyricsEvent::JobQueued {
            item_id,
            language: language.clone(),
        });

        let inner = Arc::clone(&self.inner);
        let span = tracing::info_span!("lyrics_job", item_id);
        tokio::spawn(
            async move {
                let _guard = guard;
                let _permit = match Arc::clone(&inner.permits).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        error!("Worker pool closed, dropping job");
                        return;
                    }
                };

                let outcome = AssertUnwindSafe(run_job(&inner, item_id, language))
                    .catch_unwind()
                    .await;
                if let Err(panic) = outcome {
                    let message = panic_message(panic.as_ref());
                    error!(error = %message, "Extraction job panicked");
                    record_outcome(&inner, item_id, ExtractionResult::failure(message)).await;
                }
            }
            .instrument(span),
        );

        true
    }

    pub fn is_active(&self, item_id: i64) -> bool {
        self.inner.active().contains(&item_id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.active().len()
    }

    /// Wait until no job is active.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.active().is_empty() {
                return;
            }
            notified.await;
        }
    }
}

async fn run_job(inner: &Inner, item_id: i64, language: Option<String>) {
    match inner
        .items
        .update_status(item_id, ExtractionStatus::Processing, None)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            warn!("Library item disappeared before extraction");
            return;
        }
        Err(e) => {
            error!(error = %e, "Failed to mark item processing");
            record_outcome(inner, item_id, ExtractionResult::failure(e.to_string())).await;
            return;
        }
    }
    inner.emit(LyricsEvent::JobStarted { item_id });

    let item = match inner.items.find_by_id(item_id).await {
        Ok(Some(item)) => item,
        Ok(None) => {
            warn!("Library item disappeared before extraction");
            return;
        }
        Err(e) => {
            error!(error = %e, "Failed to load library item");
            record_outcome(inner, item_id, ExtractionResult::failure(e.to_string())).await;
            return;
        }
    };

    let request = ExtractionRequest::for_library_item(&item.audio_url).with_language(language);
    let result = inner.extractor.extract(request).await;
    record_outcome(inner, item_id, result).await;
}

/// Write the terminal status against a freshly read item.
async fn record_outcome(inner: &Inner, item_id: i64, result: ExtractionResult) {
    match inner.items.find_by_id(item_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!("Library item deleted during extraction, discarding result");
            return;
        }
        Err(e) => {
            error!(error = %e, "Failed to reload library item, result not stored");
            return;
        }
    }

    let write = match (&result.lyrics, result.source) {
        (Some(lyrics), Some(source)) => {
            let write = inner
                .items
                .complete_extraction(item_id, lyrics, source.as_str())
                .await;
            if write.is_ok() {
                info!(source = %source, "Lyrics stored");
                inner.emit(LyricsEvent::JobCompleted {
                    item_id,
                    source: source.as_str().to_string(),
                });
            }
            write
        }
        _ => {
            let message = truncate_error(result.error.as_deref().unwrap_or("Unknown error"));
            let write = inner
                .items
                .update_status(item_id, ExtractionStatus::Failed, Some(&message))
                .await;
            if write.is_ok() {
                info!(error = %message, "Lyrics extraction failed");
                inner.emit(LyricsEvent::JobFailed {
                    item_id,
                    error: message,
                });
            }
            write
        }
    };

    if let Err(e) = write {
        error!(error = %e, "Failed to store extraction outcome");
    }
}

pub fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_CHARS).collect()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("Extraction panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("Extraction panicked: {}", s)
    } else {
        "Extraction panicked".to_string()
    }
}
