//! Client side of the generative text API used by the downstream review worker.
//!
//! Prompt text is built by the caller; the access token is acquired elsewhere.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Generation request failed with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 256,
            top_p: 0.8,
            top_k: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestContent {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: RequestContent,
    pub generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    pub fn user_prompt(prompt: impl Into<String>, generation_config: GenerationConfig) -> Self {
        Self {
            contents: RequestContent {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.into(),
                }],
            },
            generation_config,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate.
    pub fn first_text(&self) -> Result<&str, EnrichmentError> {
        let candidate = self
            .candidates
            .first()
            .ok_or_else(|| EnrichmentError::MalformedResponse("no candidates".to_string()))?;
        let content = candidate.content.as_ref().ok_or_else(|| {
            EnrichmentError::MalformedResponse("candidate has no content".to_string())
        })?;
        let part = content
            .parts
            .first()
            .ok_or_else(|| EnrichmentError::MalformedResponse("content has no parts".to_string()))?;
        part.text
            .as_deref()
            .ok_or_else(|| EnrichmentError::MalformedResponse("part has no text".to_string()))
    }
}

/// Decode a raw response body and pull out the generated text.
pub fn parse_response(body: &str) -> Result<String, EnrichmentError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| EnrichmentError::MalformedResponse(e.to_string()))?;
    response.first_text().map(str::to_string)
}

pub fn vertex_endpoint(location: &str, project_id: &str, model_id: &str) -> String {
    format!(
        "https://{location}-aiplatform.googleapis.com/v1/projects/{project_id}/locations/{location}/publishers/google/models/{model_id}:generateContent"
    )
}

pub struct GenerativeClient {
    client: Client,
    endpoint: String,
    access_token: String,
    generation_config: GenerationConfig,
}

impl GenerativeClient {
    pub fn new(
        endpoint: String,
        access_token: String,
        timeout_seconds: u64,
    ) -> Result<Self, EnrichmentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            access_token,
            generation_config: GenerationConfig::default(),
        })
    }

    pub fn with_generation_config(mut self, generation_config: GenerationConfig) -> Self {
        self.generation_config = generation_config;
        self
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, EnrichmentError> {
        let request = GenerateContentRequest::user_prompt(prompt, self.generation_config.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(EnrichmentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Generation response: {} bytes", body.len());
        parse_response(&body)
    }
}
