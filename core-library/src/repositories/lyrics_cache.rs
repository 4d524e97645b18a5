//! Lyrics cache repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::LyricsCacheEntry;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Storage for cached lyrics. Expiry policy lives with the caller.
#[async_trait]
pub trait LyricsCacheRepository: Send + Sync {
    /// Find an entry by cache key
    async fn find_by_key(&self, cache_key: &str) -> Result<Option<LyricsCacheEntry>>;

    /// Insert or replace the entry with the same cache key
    async fn upsert(&self, entry: &LyricsCacheEntry) -> Result<()>;

    /// Returns `true` if a row was deleted
    async fn delete_by_key(&self, cache_key: &str) -> Result<bool>;

    /// Delete entries created before `cutoff` (unix seconds), returning how many
    async fn delete_created_before(&self, cutoff: i64) -> Result<u64>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqliteLyricsCacheRepository {
    pool: SqlitePool,
}

impl SqliteLyricsCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LyricsCacheRepository for SqliteLyricsCacheRepository {
    async fn find_by_key(&self, cache_key: &str) -> Result<Option<LyricsCacheEntry>> {
        let entry = sqlx::query_as::<_, LyricsCacheEntry>(
            r#"
            SELECT cache_key, artist, title, album, lyrics_text, synced_lyrics,
                   external_id, duration_sec, match_score, created_at
            FROM lyrics_cache
            WHERE cache_key = ?
            "#,
        )
        .bind(cache_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn upsert(&self, entry: &LyricsCacheEntry) -> Result<()> {
        entry
            .validate()
            .map_err(|message| LibraryError::InvalidInput {
                field: "lyrics_cache".to_string(),
                message,
            })?;

        sqlx::query(
            r#"
            INSERT INTO lyrics_cache (
                cache_key, artist, title, album, lyrics_text, synced_lyrics,
                external_id, duration_sec, match_score, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                artist = excluded.artist,
                title = excluded.title,
                album = excluded.album,
                lyrics_text = excluded.lyrics_text,
                synced_lyrics = excluded.synced_lyrics,
                external_id = excluded.external_id,
                duration_sec = excluded.duration_sec,
                match_score = excluded.match_score,
                created_at = excluded.created_at
            "#,
        )
        .bind(&entry.cache_key)
        .bind(&entry.artist)
        .bind(&entry.title)
        .bind(&entry.album)
        .bind(&entry.lyrics_text)
        .bind(&entry.synced_lyrics)
        .bind(entry.external_id)
        .bind(entry.duration_sec)
        .bind(entry.match_score)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_by_key(&self, cache_key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM lyrics_cache WHERE cache_key = ?")
            .bind(cache_key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_created_before(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM lyrics_cache WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM lyrics_cache")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
