use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::InferenceError;
use crate::utils::{retry_async, RetryPolicy};

use super::encode::ModelImage;

/// Sends images plus a textual prompt and returns the model's text answer.
#[allow(async_fn_in_trait)]
pub trait VisionModel {
    async fn infer(&self, images: &[ModelImage], prompt: &str) -> Result<String, InferenceError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub api_base: String,
    pub model: String,
    /// File holding the API key.
    pub key_path: PathBuf,
    /// Cameras whose frames are sent to the model.
    pub primary_cameras: Vec<String>,
    pub max_frames_per_camera: usize,
    pub resize_width: u32,
    pub jpeg_quality: u8,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_secs: Vec<u64>,
    /// Journal lines fed back into the prompt as context.
    pub recent_entries: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com".into(),
            model: "gemini-2.5-pro".into(),
            key_path: crate::settings::home_dir().join(".gemini_key"),
            primary_cameras: vec!["bedroom".into(), "living".into()],
            max_frames_per_camera: 5,
            resize_width: 800,
            jpeg_quality: 85,
            timeout_secs: 120,
            max_attempts: 2,
            backoff_secs: vec![5, 15],
            recent_entries: 6,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Gemini `generateContent` client with bounded retries.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(
        api_base: &str,
        model: &str,
        api_key: String,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build vision model HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                api_base.trim_end_matches('/'),
                model
            ),
            api_key,
            retry,
        })
    }

    pub fn from_config(config: &InferenceConfig) -> Result<Self> {
        let api_key = read_key(&config.key_path)?;
        Self::new(
            &config.api_base,
            &config.model,
            api_key,
            Duration::from_secs(config.timeout_secs),
            RetryPolicy::new(config.max_attempts, &config.backoff_secs),
        )
    }

    /// Same endpoint and key with a different timeout and retry policy.
    pub fn with_limits(&self, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build vision model HTTP client")?;
        Ok(Self {
            client,
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            retry,
        })
    }

    async fn generate_once(&self, body: &GenerateRequest<'_>) -> Result<String, InferenceError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|err| InferenceError::Transient {
                reason: err.without_url().to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let detail: String = resp.text().await.unwrap_or_default().chars().take(500).collect();
            return Err(InferenceError::Transient {
                reason: format!("HTTP {status}: {detail}"),
            });
        }

        let parsed: GenerateResponse = resp.json().await.map_err(|err| InferenceError::Malformed {
            reason: err.without_url().to_string(),
        })?;
        extract_text(parsed)
    }
}

impl VisionModel for GeminiClient {
    async fn infer(&self, images: &[ModelImage], prompt: &str) -> Result<String, InferenceError> {
        let mut parts = Vec::with_capacity(images.len() * 2 + 1);
        for image in images {
            parts.push(Part::Text { text: &image.label });
            parts.push(Part::Inline {
                inline_data: InlineData {
                    mime_type: "image/jpeg",
                    data: STANDARD.encode(&image.jpeg),
                },
            });
        }
        parts.push(Part::Text { text: prompt });

        let body = GenerateRequest {
            contents: vec![Content { parts }],
        };

        retry_async(
            &self.retry,
            "vision model",
            || self.generate_once(&body),
            InferenceError::is_retryable,
        )
        .await
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, InferenceError> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().find_map(|part| part.text))
        .map(|text| text.trim().to_string())
        .ok_or_else(|| InferenceError::Malformed {
            reason: "response has no candidate text".into(),
        })
}

pub fn read_key(path: &std::path::Path) -> Result<String> {
    let key = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    Ok(key.trim().to_string())
}
