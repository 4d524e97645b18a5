//! # Repositories
//!
//! Async repository traits with SQLite implementations backed by `sqlx`.
//!
//! - `LyricsCacheRepository` - TTL lyrics cache rows keyed by digest
//! - `LibraryItemRepository` - extraction status and results of library items

pub mod library_item;
pub mod lyrics_cache;

pub use library_item::{LibraryItemRepository, SqliteLibraryItemRepository};
pub use lyrics_cache::{LyricsCacheRepository, SqliteLyricsCacheRepository};
