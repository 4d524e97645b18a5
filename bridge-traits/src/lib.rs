//! # Host Bridge Traits
//!
//! Capabilities the lyrics core needs from its host but does not implement
//! itself.
//!
//! - [`HttpClient`](http::HttpClient) - single-attempt HTTP and streaming downloads
//! - [`Clock`](time::Clock) - time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - forward structured logs to host logging
//!
//! Desktop implementations live in `bridge-desktop`. All traits require
//! `Send + Sync` so adapters can be shared across tokio tasks behind an `Arc`.
//!
//! ## Error Handling
//!
//! Every bridge call returns [`BridgeError`](error::BridgeError). Adapters map
//! transport failures onto `Timeout` / `ConnectionFailed`; callers use
//! [`BridgeError::is_transient`] to decide on retries.

pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

pub use http::{DownloadStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
