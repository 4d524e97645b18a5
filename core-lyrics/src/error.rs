use bridge_traits::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LyricsError {
    #[error("Download exceeds the {limit_mb} MB limit")]
    DownloadSizeExceeded { limit_mb: u64 },

    #[error("Transient network failure: {0}")]
    TransientNetwork(String),

    #[error("HTTP {status}: {message}")]
    NonRetryableHttp { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Invalid extraction request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LyricsError {
    /// Failures contained to a single resolution tier; the next tier still runs.
    pub fn is_tier_local(&self) -> bool {
        match self {
            LyricsError::TransientNetwork(_)
            | LyricsError::NonRetryableHttp { .. }
            | LyricsError::InvalidResponse(_)
            | LyricsError::Transcription(_) => true,
            LyricsError::Bridge(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LyricsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_local_classification() {
        assert!(LyricsError::TransientNetwork("reset".into()).is_tier_local());
        assert!(LyricsError::NonRetryableHttp {
            status: 400,
            message: "bad".into()
        }
        .is_tier_local());
        assert!(LyricsError::Bridge(BridgeError::Timeout("slow".into())).is_tier_local());
        assert!(!LyricsError::DownloadSizeExceeded { limit_mb: 50 }.is_tier_local());
        assert!(!LyricsError::Internal("boom".into()).is_tier_local());
    }
}
