//! # Lyrics Cache
//!
//! TTL cache of lyrics database hits, keyed by a digest of the normalized
//! `artist:title`. Entries older than the TTL are treated as absent and
//! deleted when read. Storage failures are logged and reported as misses;
//! they never fail an extraction.

use bridge_traits::time::Clock;
use core_library::{LyricsCacheEntry, LyricsCacheRepository};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Stable cache key: SHA-256 hex of `artist:title`, each trimmed,
/// whitespace-collapsed and lowercased.
pub fn cache_key(artist: &str, title: &str) -> String {
    let normalized = format!("{}:{}", normalize_key_part(artist), normalize_key_part(title));
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

fn normalize_key_part(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A lyrics database hit to store.
#[derive(Debug, Clone)]
pub struct CacheWrite {
    pub artist: String,
    pub title: String,
    pub album: Option<String>,
    pub lyrics_text: String,
    pub synced_lyrics: Option<String>,
    pub external_id: Option<i64>,
    pub duration_sec: Option<f64>,
    pub match_score: Option<f64>,
}

pub struct LyricsCache {
    repo: Arc<dyn LyricsCacheRepository>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl LyricsCache {
    pub fn new(repo: Arc<dyn LyricsCacheRepository>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { repo, clock, ttl }
    }

    fn ttl_secs(&self) -> i64 {
        i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)
    }

    /// Fresh entry for `artist`/`title`, if any.
    pub async fn get(&self, artist: &str, title: &str) -> Option<LyricsCacheEntry> {
        let key = cache_key(artist, title);
        let entry = match self.repo.find_by_key(&key).await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!(error = %e, "Lyrics cache read failed");
                return None;
            }
        };

        let now = self.clock.unix_timestamp();
        if entry.age_secs(now) > self.ttl_secs() {
            debug!(cache_key = %key, "Lyrics cache entry expired");
            if let Err(e) = self.repo.delete_by_key(&key).await {
                warn!(error = %e, "Failed to delete expired lyrics cache entry");
            }
            return None;
        }

        debug!(cache_key = %key, "Lyrics cache hit");
        Some(entry)
    }

    /// Store or replace the entry for the write's `artist`/`title`.
    pub async fn put(&self, write: CacheWrite) {
        let entry = LyricsCacheEntry {
            cache_key: cache_key(&write.artist, &write.title),
            artist: write.artist,
            title: write.title,
            album: write.album,
            lyrics_text: write.lyrics_text,
            synced_lyrics: write.synced_lyrics,
            external_id: write.external_id,
            duration_sec: write.duration_sec,
            match_score: write.match_score,
            created_at: self.clock.unix_timestamp(),
        };

        if let Err(e) = self.repo.upsert(&entry).await {
            warn!(error = %e, "Lyrics cache write failed");
        }
    }

    /// Delete every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> u64 {
        let cutoff = self.clock.unix_timestamp().saturating_sub(self.ttl_secs());
        match self.repo.delete_created_before(cutoff).await {
            Ok(removed) => {
                if removed > 0 {
                    debug!(removed, "Purged expired lyrics cache entries");
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, "Lyrics cache purge failed");
                0
            }
        }
    }
}
