//! # Core Runtime
//!
//! Foundational infrastructure shared by the lyrics crates:
//! - Logging and tracing setup ([`logging`])
//! - Environment-driven configuration ([`config`])
//! - Job lifecycle event bus ([`events`])

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{ExtractionStrategy, LyricsConfig};
pub use error::{Error, Result};
pub use events::{EventBus, LyricsEvent};
