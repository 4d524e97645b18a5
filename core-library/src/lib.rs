//! # Library Persistence
//!
//! SQLite storage for the lyrics subsystem:
//! - Connection pooling and embedded migrations ([`db`])
//! - The TTL lyrics cache table and the library items whose lyrics are
//!   resolved in the background ([`models`], [`repositories`])

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{ExtractionStatus, LibraryItem, LyricsCacheEntry};
pub use repositories::{
    LibraryItemRepository, LyricsCacheRepository, SqliteLibraryItemRepository,
    SqliteLyricsCacheRepository,
};
