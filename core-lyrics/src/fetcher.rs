//! Remote audio download into a self-deleting temporary file.
//!
//! The size limit is enforced while streaming, not from `Content-Length`,
//! so a server that lies about the length cannot fill the disk. There is no
//! overall deadline; a download fails only when it stalls for longer than the
//! idle timeout. Dropping the returned [`DownloadedAudio`] removes the file.

use crate::error::{LyricsError, Result};
use bridge_traits::http::HttpClient;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

const CHUNK_SIZE: usize = 64 * 1024;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_EXTENSION: &str = "audio";
const URL_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a"];

#[derive(Debug)]
pub struct DownloadedAudio {
    path: TempPath,
    pub bytes: u64,
    pub extension: String,
}

impl DownloadedAudio {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub struct RemoteFetcher {
    http: Arc<dyn HttpClient>,
    idle_timeout: Duration,
}

impl RemoteFetcher {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Abandon a download once no bytes arrive for `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub async fn download(&self, url: &str, max_size_mb: u64) -> Result<DownloadedAudio> {
        let limit = max_size_mb.saturating_mul(1024 * 1024);
        let mut stream = self.http.download_stream(url.to_string()).await?;

        if !(200..300).contains(&stream.status) {
            let status = stream.status;
            return Err(if status == 429 || status >= 500 {
                LyricsError::TransientNetwork(format!("Audio download returned HTTP {}", status))
            } else {
                LyricsError::NonRetryableHttp {
                    status,
                    message: "Audio download failed".to_string(),
                }
            });
        }

        if stream.content_length.is_some_and(|len| len > limit) {
            return Err(LyricsError::DownloadSizeExceeded {
                limit_mb: max_size_mb,
            });
        }

        let extension = infer_extension(stream.content_type.as_deref(), url);
        let (file, path) = tempfile::Builder::new()
            .prefix("lyrics-")
            .suffix(&format!(".{}", extension))
            .tempfile()?
            .into_parts();
        let mut file = File::from_std(file);

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut written: u64 = 0;
        loop {
            let read = tokio::time::timeout(self.idle_timeout, stream.reader.read(&mut buffer))
                .await
                .map_err(|_| {
                    warn!(bytes = written, "Audio download stalled");
                    LyricsError::TransientNetwork(format!(
                        "Audio download stalled for {}s",
                        self.idle_timeout.as_secs()
                    ))
                })??;
            if read == 0 {
                break;
            }
            written += read as u64;
            if written > limit {
                warn!(limit_mb = max_size_mb, "Audio download exceeded size limit");
                // `path` drops here and removes the partial file
                return Err(LyricsError::DownloadSizeExceeded {
                    limit_mb: max_size_mb,
                });
            }
            file.write_all(&buffer[..read]).await?;
        }
        file.flush().await?;

        debug!(bytes = written, extension = %extension, "Audio downloaded");
        Ok(DownloadedAudio {
            path,
            bytes: written,
            extension,
        })
    }
}

/// File extension from the content type, else the URL path, else `audio`.
pub fn infer_extension(content_type: Option<&str>, url: &str) -> String {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());

    let from_mime = match mime.as_deref() {
        Some("audio/mpeg") | Some("audio/mp3") => Some("mp3"),
        Some("audio/wav") | Some("audio/x-wav") | Some("audio/wave") => Some("wav"),
        Some("audio/flac") | Some("audio/x-flac") => Some("flac"),
        Some("audio/ogg") | Some("application/ogg") => Some("ogg"),
        Some("audio/mp4") | Some("audio/x-m4a") | Some("audio/m4a") => Some("m4a"),
        _ => None,
    };
    if let Some(ext) = from_mime {
        return ext.to_string();
    }

    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let without_scheme = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| rest);
    let path = without_scheme.split_once('/').map_or("", |(_, path)| path);
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    last_segment
        .rsplit_once('.')
        .filter(|(stem, _)| !stem.is_empty())
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| URL_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{DownloadStream, HttpRequest, HttpResponse};
    use mockall::mock;
    use tokio::io::DuplexStream;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn download_stream(&self, url: String) -> BridgeResult<DownloadStream>;
        }
    }

    fn serving(status: u16, reader: DuplexStream) -> MockHttp {
        let reader = std::sync::Mutex::new(Some(reader));
        let mut http = MockHttp::new();
        http.expect_download_stream().times(1).returning(move |_| {
            Ok(DownloadStream {
                status,
                content_type: Some("audio/flac".to_string()),
                content_length: None,
                reader: Box::new(reader.lock().unwrap().take().unwrap()),
            })
        });
        http
    }

    #[tokio::test]
    async fn test_error_status_is_classified_without_url() {
        for (status, transient) in [(503, true), (429, true), (404, false), (403, false)] {
            let (_writer, reader) = tokio::io::duplex(64);
            let fetcher = RemoteFetcher::new(Arc::new(serving(status, reader)));

            let err = fetcher
                .download("https://cdn.test/a.flac?sig=secret", 10)
                .await
                .unwrap_err();
            assert_eq!(
                matches!(err, LyricsError::TransientNetwork(_)),
                transient,
                "status {status}: {err}"
            );
            assert!(err.is_tier_local());
            assert!(!err.to_string().contains("secret"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_body_completes() {
        let (mut writer, reader) = tokio::io::duplex(64);
        tokio::spawn(async move {
            for byte in b"fLaC body" {
                tokio::time::sleep(Duration::from_secs(10)).await;
                writer.write_all(&[*byte]).await.unwrap();
            }
        });

        let fetcher = RemoteFetcher::new(Arc::new(serving(200, reader)))
            .with_idle_timeout(Duration::from_secs(15));
        let audio = fetcher.download("https://cdn.test/a", 10).await.unwrap();

        assert_eq!(audio.bytes, 9);
        assert_eq!(audio.extension, "flac");
        assert_eq!(std::fs::read(audio.path()).unwrap(), b"fLaC body");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_body_is_abandoned() {
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"fLaC").await.unwrap();

        let fetcher = RemoteFetcher::new(Arc::new(serving(200, reader)))
            .with_idle_timeout(Duration::from_secs(15));
        let err = fetcher.download("https://cdn.test/a", 10).await.unwrap_err();

        assert!(matches!(err, LyricsError::TransientNetwork(_)), "{err}");
        drop(writer);
    }

    #[test]
    fn test_extension_from_content_type() {
        assert_eq!(infer_extension(Some("audio/mpeg"), "https://x/y"), "mp3");
        assert_eq!(infer_extension(Some("audio/x-wav; charset=binary"), "https://x/y"), "wav");
        assert_eq!(infer_extension(Some("audio/x-m4a"), "https://x/y.mp3"), "m4a");
    }

    #[test]
    fn test_extension_from_url() {
        assert_eq!(
            infer_extension(Some("application/octet-stream"), "https://cdn.example.com/a/Song.FLAC?sig=1"),
            "flac"
        );
        assert_eq!(infer_extension(None, "https://cdn.example.com/stream"), "audio");
        assert_eq!(infer_extension(None, "https://cdn.example.com"), "audio");
    }

    #[test]
    fn test_non_audio_url_suffix_is_ignored() {
        assert_eq!(infer_extension(None, "https://cdn.example.com/play.php?id=4"), "audio");
        assert_eq!(infer_extension(None, "https://cdn.example.com/track.html"), "audio");
        assert_eq!(infer_extension(None, "https://cdn.example.com/v1.2/track"), "audio");
        assert_eq!(infer_extension(None, "https://cdn.example.com/a/b.Ogg"), "ogg");
    }
}
