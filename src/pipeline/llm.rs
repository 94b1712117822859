//! Model interaction: build the generate request, call the endpoint, retry once
//! with shorter text, and validate the answer.
//!
//! The network call sits behind the [`Transport`] trait so the retry sequence
//! and validation can be exercised without a server. [`OllamaTransport`] is the
//! real implementation for the `/api/generate` protocol.
//!
//! ## Retry sequence
//!
//! ```text
//! Pending ──ok──────────────────────────────────▶ Done
//!    │
//!    └─fail─▶ (short retry enabled and text > threshold?)
//!                 │ no ──────────────────────────▶ Done (fallback body)
//!                 └ yes ─▶ ShortTextAttempt ─ok──▶ Done
//!                                  └──────fail──▶ Done (fallback body)
//! ```
//!
//! At most two network attempts per chunk, no backoff. A failed chunk is never
//! an error: it yields an empty [`ExtractionResult`] whose `raw_response`
//! carries the failure diagnostic.

use super::encode::encode_image_file;
use super::repair;
use crate::config::ExtractionConfig;
use crate::error::{KgError, TransportError};
use crate::model::{Chunk, ExtractionResult};
use crate::prompts::{build_prompt, DEFAULT_EXTRACTION_PROMPT};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Body of a `/api/generate` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub format: String,
    /// Base64 images; omitted from the body when `None`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub images: Option<Vec<String>>,
}

/// One network attempt against the extraction endpoint.
pub trait Transport: Send + Sync {
    /// Send `request` and return the model's output text.
    fn generate(
        &self,
        request: &GenerateRequest,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

#[derive(Deserialize)]
struct GenerateEnvelope {
    #[serde(default = "empty_object")]
    response: String,
}

fn empty_object() -> String {
    "{}".to_string()
}

/// reqwest-backed transport for an Ollama-compatible server.
#[derive(Debug, Clone)]
pub struct OllamaTransport {
    client: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl OllamaTransport {
    pub fn new(config: &ExtractionConfig) -> Result<Self, KgError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KgError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: config.generate_url(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn request_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

impl Transport for OllamaTransport {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.request_error(e))?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: GenerateEnvelope =
            serde_json::from_str(&body).map_err(|e| TransportError::Envelope(e.to_string()))?;
        Ok(envelope.response)
    }
}

/// How a chunk's extraction went on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutcome {
    /// Network attempts made (1 or 2).
    pub attempts: u8,
    /// Last failure when no attempt succeeded.
    pub failure: Option<TransportError>,
}

impl ExtractionOutcome {
    pub fn is_degraded(&self) -> bool {
        self.failure.is_some()
    }
}

/// Sends chunks to the model and validates what comes back.
#[derive(Debug, Clone)]
pub struct ExtractionClient<T = OllamaTransport> {
    transport: T,
    config: ExtractionConfig,
}

impl ExtractionClient<OllamaTransport> {
    /// Client talking to the endpoint named in `config`.
    pub fn from_config(config: ExtractionConfig) -> Result<Self, KgError> {
        let transport = OllamaTransport::new(&config)?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> ExtractionClient<T> {
    pub fn new(transport: T, config: ExtractionConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract entities and relations from one chunk's content.
    pub async fn extract(
        &self,
        chunk_id: &str,
        text: &str,
        image_refs: &[String],
        formula_candidates: &[String],
    ) -> ExtractionResult {
        self.extract_detailed(chunk_id, text, image_refs, formula_candidates)
            .await
            .0
    }

    pub async fn extract_chunk(&self, chunk: &Chunk) -> ExtractionResult {
        self.extract(
            &chunk.chunk_id,
            &chunk.text,
            &chunk.image_refs,
            &chunk.formula_candidates,
        )
        .await
    }

    /// [`extract`](Self::extract) plus the attempt count and final failure.
    pub async fn extract_detailed(
        &self,
        chunk_id: &str,
        text: &str,
        image_refs: &[String],
        formula_candidates: &[String],
    ) -> (ExtractionResult, ExtractionOutcome) {
        let (images, formulas) = if self.config.include_images_and_formulas {
            let limit = formula_candidates.len().min(self.config.max_formulas);
            (self.encode_images(chunk_id, image_refs), &formula_candidates[..limit])
        } else {
            (None, &formula_candidates[..0])
        };

        let mut outcome = ExtractionOutcome {
            attempts: 1,
            failure: None,
        };
        let request = self.build_request(text, formulas, images.clone());
        let raw = match self.transport.generate(&request).await {
            Ok(raw) => raw,
            Err(first) => {
                warn!("{}: attempt 1 failed: {}", chunk_id, first);
                let threshold = self.config.short_text_threshold;
                if self.config.retry_with_short_text && text.chars().count() > threshold {
                    let short: String = text.chars().take(threshold).collect();
                    let retry = self.build_request(&short, formulas, images);
                    outcome.attempts = 2;
                    match self.transport.generate(&retry).await {
                        Ok(raw) => raw,
                        Err(second) => {
                            warn!("{}: attempt 2 failed: {}", chunk_id, second);
                            let body = second.fallback_body();
                            outcome.failure = Some(second);
                            body
                        }
                    }
                } else {
                    let body = first.fallback_body();
                    outcome.failure = Some(first);
                    body
                }
            }
        };

        let (entities, relations) = repair::validate(&raw, chunk_id);
        debug!(
            "{}: {} entities, {} relations after validation",
            chunk_id,
            entities.len(),
            relations.len()
        );

        let result = ExtractionResult {
            chunk_id: chunk_id.to_string(),
            entities,
            relations,
            raw_response: Some(raw),
        };
        (result, outcome)
    }

    fn build_request(
        &self,
        text: &str,
        formulas: &[String],
        images: Option<Vec<String>>,
    ) -> GenerateRequest {
        let template = self
            .config
            .prompt_template
            .as_deref()
            .unwrap_or(DEFAULT_EXTRACTION_PROMPT);
        GenerateRequest {
            model: self.config.model.clone(),
            prompt: build_prompt(template, text, formulas),
            stream: false,
            format: "json".to_string(),
            images,
        }
    }

    /// Base64 of the first `max_images` artifacts. Unreadable files are
    /// skipped; `None` when nothing is left to send.
    fn encode_images(&self, chunk_id: &str, image_refs: &[String]) -> Option<Vec<String>> {
        let encoded: Vec<String> = image_refs
            .iter()
            .take(self.config.max_images)
            .filter_map(|path| match encode_image_file(Path::new(path)) {
                Ok(b64) => Some(b64),
                Err(e) => {
                    warn!("{}: skipping image '{}': {}", chunk_id, path, e);
                    None
                }
            })
            .collect();
        (!encoded.is_empty()).then_some(encoded)
    }
}
