//! Gemini REST client and generation error taxonomy.
//!
//! The client talks to the `generateContent` endpoint directly over HTTP so
//! every failure keeps its status code. That is what the candidate-fallback
//! loop in [`crate::synthesis`] needs: a 404 means "this model does not exist
//! for this project, move on", a 429 means "same model, try again later", and
//! a 401 means the whole run is misconfigured.
//!
//! # Architecture
//!
//! - [`Generate`]: trait for submitting one instruction to one model
//! - [`GeminiClient`]: the production implementation over `reqwest`
//! - [`GenerateError`] / [`classify`]: error taxonomy and the pure decision
//!   function mapping each error to a recovery strategy
//!
//! Keeping `classify` pure and separate from the transport makes the retry
//! policy testable without a network.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::config::Settings;

/// Upper bound for any single generation request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Sampling temperature for syntheses; low, the output should stay factual.
const TEMPERATURE: f32 = 0.35;

/// Output token cap; a title, 2–3 sentences, and short sections fit well under.
const MAX_OUTPUT_TOKENS: u32 = 512;

/// One failed generation request, classified by recovery strategy.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The endpoint does not serve this model (404/403-class).
    #[error("model {model} not usable ({status})")]
    Unsupported { model: String, status: u16 },

    /// Rate limited or temporarily unavailable (429/503-class).
    #[error("transient error {status} on {model}")]
    Transient {
        model: String,
        status: u16,
        /// Server-supplied delay from a `Retry-After` header, if any.
        retry_after: Option<Duration>,
    },

    /// Connection failure or timeout before a status was received.
    #[error("network error on {model}: {source}")]
    Network {
        model: String,
        source: reqwest::Error,
    },

    /// HTTP success but no usable text in the response body.
    #[error("empty response from {model}")]
    Empty { model: String },

    /// The response text never yielded the expected JSON object, even after
    /// the repair pass. Constructed by the synthesis loop, not the client.
    #[error("malformed output from {model}")]
    Malformed { model: String },

    /// Anything else: bad credential, malformed request, unexpected status.
    /// This is a configuration or programming error, not an operational one.
    #[error("generation API error {status}: {message}")]
    Fatal { status: u16, message: String },
}

/// What the candidate loop should do with a [`GenerateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Discard this candidate and move to the next, without delay.
    Skip,
    /// Retry the same candidate after a backoff delay.
    Retry,
    /// Abort the whole candidate loop and propagate.
    Abort,
}

/// Map an error to its recovery strategy. Pure; the whole retry policy
/// hangs off this table.
pub fn classify(err: &GenerateError) -> Disposition {
    match err {
        GenerateError::Unsupported { .. }
        | GenerateError::Empty { .. }
        | GenerateError::Malformed { .. } => Disposition::Skip,
        GenerateError::Transient { .. } | GenerateError::Network { .. } => Disposition::Retry,
        GenerateError::Fatal { .. } => Disposition::Abort,
    }
}

/// Submit one instruction to one model and return the raw response text.
///
/// Implemented by [`GeminiClient`] in production and by scripted fakes in
/// tests; the synthesis loop is generic over this trait.
pub trait Generate {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerateError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Production client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    api_version: String,
}

impl GeminiClient {
    pub fn new(settings: &Settings) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("flash-info-bot/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_key: settings.api_key.clone(),
            api_version: settings.api_version.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "https://generativelanguage.googleapis.com/{}/models/{}:generateContent?key={}",
            self.api_version,
            model,
            urlencoding::encode(&self.api_key)
        )
    }
}

impl Generate for GeminiClient {
    #[instrument(level = "info", skip_all, fields(%model))]
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerateError> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let response = self
            .http
            .post(self.endpoint(model))
            .json(&body)
            .send()
            .await
            .map_err(|source| GenerateError::Network {
                model: model.to_string(),
                source,
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = parse_retry_after(response.headers());
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&raw)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("HTTP {status}"));
            warn!(status, %message, "generation request failed");

            return Err(match status {
                404 | 403 => GenerateError::Unsupported {
                    model: model.to_string(),
                    status,
                },
                429 | 503 => GenerateError::Transient {
                    model: model.to_string(),
                    status,
                    retry_after,
                },
                _ => GenerateError::Fatal { status, message },
            });
        }

        let payload: GenerateResponse =
            response
                .json()
                .await
                .map_err(|source| GenerateError::Network {
                    model: model.to_string(),
                    source,
                })?;

        let text = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerateError::Empty {
                model: model.to_string(),
            });
        }
        Ok(text.to_string())
    }
}

/// Read a `Retry-After` header as a whole-second delay. The HTTP-date form
/// is rare on this endpoint and is ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
