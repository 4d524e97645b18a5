//! Speech-to-text through AssemblyAI.
//!
//! Flow: upload the audio bytes, create a transcript job, poll it until it
//! completes, errors, or the poll deadline passes.

use crate::error::{LyricsError, Result};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_runtime::config::TranscriptionConfig;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Raw transcript text, or `Ok(None)` when the service produced nothing.
    async fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    id: String,
    status: String,
    text: Option<String>,
    error: Option<String>,
}

pub struct AssemblyAiTranscriber {
    http: Arc<dyn HttpClient>,
    config: TranscriptionConfig,
}

impl AssemblyAiTranscriber {
    /// `None` when no API key is configured.
    pub fn new(http: Arc<dyn HttpClient>, config: TranscriptionConfig) -> Option<Self> {
        config
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
            .then(|| Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        request
            .header(
                "authorization",
                self.config.api_key.clone().unwrap_or_default(),
            )
            .timeout(self.config.request_timeout)
    }

    async fn send(&self, request: HttpRequest, what: &str) -> Result<HttpResponse> {
        let response = self
            .http
            .execute(self.authorized(request))
            .await
            .map_err(|e| LyricsError::Transcription(format!("{}: {}", what, e)))?;

        if !response.is_success() {
            return Err(LyricsError::Transcription(format!(
                "{} returned HTTP {}",
                what, response.status
            )));
        }
        Ok(response)
    }

    async fn upload(&self, audio: &Path) -> Result<String> {
        let data = tokio::fs::read(audio)
            .await
            .map_err(|e| LyricsError::Transcription(format!("Reading audio: {}", e)))?;
        debug!(bytes = data.len(), "Uploading audio for transcription");

        let request = HttpRequest::post(self.endpoint("/v2/upload"))
            .header("Content-Type", "application/octet-stream")
            .body(Bytes::from(data));
        let response = self.send(request, "Upload").await?;
        let upload: UploadResponse = parse(&response)?;
        Ok(upload.upload_url)
    }

    async fn create_transcript(&self, audio_url: &str, language: Option<&str>) -> Result<String> {
        let body = match language {
            Some(code) => json!({ "audio_url": audio_url, "language_code": code, "punctuate": true }),
            None => json!({ "audio_url": audio_url, "language_detection": true, "punctuate": true }),
        };
        let request = HttpRequest::post(self.endpoint("/v2/transcript")).json(&body)?;
        let response = self.send(request, "Transcript request").await?;
        let transcript: TranscriptResponse = parse(&response)?;
        Ok(transcript.id)
    }

    async fn poll(&self, id: &str) -> Result<Option<String>> {
        let deadline = Instant::now() + self.config.poll_timeout;
        let url = self.endpoint(&format!("/v2/transcript/{}", id));

        loop {
            let response = self.send(HttpRequest::get(url.as_str()), "Transcript poll").await?;
            let transcript: TranscriptResponse = parse(&response)?;

            match transcript.status.as_str() {
                "completed" => {
                    let text = transcript.text.map(|t| t.trim().to_string());
                    return Ok(text.filter(|t| !t.is_empty()));
                }
                "error" => {
                    warn!(
                        transcript_id = %transcript.id,
                        error = transcript.error.as_deref().unwrap_or("unknown"),
                        "Transcription failed"
                    );
                    return Ok(None);
                }
                status => debug!(transcript_id = %transcript.id, status, "Transcript pending"),
            }

            if Instant::now() + self.config.poll_interval > deadline {
                return Err(LyricsError::Transcription(format!(
                    "Transcript {} not ready after {}s",
                    id,
                    self.config.poll_timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    response
        .json()
        .map_err(|e| LyricsError::Transcription(format!("Unexpected response: {}", e)))
}

#[async_trait]
impl Transcriber for AssemblyAiTranscriber {
    async fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<Option<String>> {
        let upload_url = self.upload(audio).await?;
        let id = self.create_transcript(&upload_url, language).await?;
        info!(transcript_id = %id, language = language.unwrap_or("auto"), "Transcription started");
        self.poll(&id).await
    }
}
