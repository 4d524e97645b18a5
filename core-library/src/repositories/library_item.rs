//! Library item repository trait and implementation
//!
//! Each method is one auto-committed statement; callers never hold a
//! transaction across the slow parts of an extraction job.

use crate::error::{LibraryError, Result};
use crate::models::{ExtractionStatus, LibraryItem};
use async_trait::async_trait;
use sqlx::SqlitePool;

#[async_trait]
pub trait LibraryItemRepository: Send + Sync {
    /// Create an item for the given audio location, returning its id
    async fn insert(&self, audio_url: &str) -> Result<i64>;

    /// Read the current row. Never served from a cache.
    async fn find_by_id(&self, id: i64) -> Result<Option<LibraryItem>>;

    /// Set the extraction status and error message.
    ///
    /// Returns `false` when the item does not exist.
    async fn update_status(
        &self,
        id: i64,
        status: ExtractionStatus,
        error: Option<&str>,
    ) -> Result<bool>;

    /// Store resolved lyrics and mark the item `completed`.
    async fn complete_extraction(&self, id: i64, lyrics: &str, source: &str) -> Result<bool>;
}

pub struct SqliteLibraryItemRepository {
    pool: SqlitePool,
}

impl SqliteLibraryItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[async_trait]
impl LibraryItemRepository for SqliteLibraryItemRepository {
    async fn insert(&self, audio_url: &str) -> Result<i64> {
        if audio_url.trim().is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "audio_url".to_string(),
                message: "Audio location cannot be empty".to_string(),
            });
        }

        let result = sqlx::query("INSERT INTO library_items (audio_url, updated_at) VALUES (?, ?)")
            .bind(audio_url)
            .bind(Self::now())
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<LibraryItem>> {
        let item = sqlx::query_as::<_, LibraryItem>(
            r#"
            SELECT id, audio_url, lyrics, lyrics_source, lyrics_extraction_status,
                   lyrics_extraction_error, updated_at
            FROM library_items
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    async fn update_status(
        &self,
        id: i64,
        status: ExtractionStatus,
        error: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE library_items
            SET lyrics_extraction_status = ?, lyrics_extraction_error = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(error)
        .bind(Self::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete_extraction(&self, id: i64, lyrics: &str, source: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE library_items
            SET lyrics = ?, lyrics_source = ?, lyrics_extraction_status = ?,
                lyrics_extraction_error = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(lyrics)
        .bind(source)
        .bind(ExtractionStatus::Completed)
        .bind(Self::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn repo() -> SqliteLibraryItemRepository {
        SqliteLibraryItemRepository::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_insert_defaults_to_not_requested() {
        let repo = repo().await;
        let id = repo.insert("https://cdn.example.com/a.mp3").await.unwrap();

        let item = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(item.audio_url, "https://cdn.example.com/a.mp3");
        assert_eq!(item.lyrics_extraction_status, ExtractionStatus::NotRequested);
        assert!(item.lyrics.is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_empty_location() {
        let repo = repo().await;
        assert!(matches!(
            repo.insert("  ").await,
            Err(LibraryError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let repo = repo().await;
        let id = repo.insert("/music/a.flac").await.unwrap();

        assert!(repo
            .update_status(id, ExtractionStatus::Processing, None)
            .await
            .unwrap());
        assert!(repo
            .update_status(id, ExtractionStatus::Failed, Some("No lyrics detected in audio"))
            .await
            .unwrap());

        let item = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(item.lyrics_extraction_status, ExtractionStatus::Failed);
        assert_eq!(
            item.lyrics_extraction_error.as_deref(),
            Some("No lyrics detected in audio")
        );
    }

    #[tokio::test]
    async fn test_complete_extraction_clears_error() {
        let repo = repo().await;
        let id = repo.insert("/music/a.flac").await.unwrap();
        repo.update_status(id, ExtractionStatus::Failed, Some("boom"))
            .await
            .unwrap();

        assert!(repo.complete_extraction(id, "la la la", "lrclib").await.unwrap());

        let item = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(item.lyrics.as_deref(), Some("la la la"));
        assert_eq!(item.lyrics_source.as_deref(), Some("lrclib"));
        assert_eq!(item.lyrics_extraction_status, ExtractionStatus::Completed);
        assert!(item.lyrics_extraction_error.is_none());
    }

    #[tokio::test]
    async fn test_missing_item() {
        let repo = repo().await;
        assert!(repo.find_by_id(404).await.unwrap().is_none());
        assert!(!repo
            .update_status(404, ExtractionStatus::Queued, None)
            .await
            .unwrap());
    }
}
