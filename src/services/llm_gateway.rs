//! Gemini `generateContent` client that turns model output into a [`Summary`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error};

use crate::models::internal::Summary;

/// Outcome of one completion: a parsed summary or a tagged failure.
pub type SummaryResult = Result<Summary, LlmError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("Error calling Gemini API: {details}")]
    Transport { details: String },
    #[error("Could not extract text from Gemini response")]
    MissingText { raw_response: Value },
    #[error("An unexpected error occurred: {details}")]
    Unexpected { details: String },
}

impl LlmError {
    /// Stable tag identifying the failure class.
    pub fn tag(&self) -> &'static str {
        match self {
            LlmError::Transport { .. } => "Error calling Gemini API",
            LlmError::MissingText { .. } => "Could not extract text from Gemini response",
            LlmError::Unexpected { .. } => "An unexpected error occurred",
        }
    }

    /// `{error, details}` or `{error, raw_response}`, for logs and diagnostics.
    pub fn to_json(&self) -> Value {
        match self {
            LlmError::Transport { details } | LlmError::Unexpected { details } => {
                json!({ "error": self.tag(), "details": details })
            }
            LlmError::MissingText { raw_response } => {
                json!({ "error": self.tag(), "raw_response": raw_response })
            }
        }
    }
}

/// Caller-supplied changes to the default generation config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOverrides {
    pub temperature: Option<f32>,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub response_mime_type: Option<String>,
}

impl GenerationOverrides {
    /// Ask the model for a bare JSON document.
    pub fn json_response() -> Self {
        Self {
            response_mime_type: Some("application/json".to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(&self, prompt: &str, overrides: GenerationOverrides) -> SummaryResult;
}

#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    // applied per request
    timeout: Duration,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(base_url: String, model: String, api_key: String) -> Self {
        Self::with_timeout(base_url, model, api_key, Duration::from_secs(120))
    }

    pub fn with_timeout(
        base_url: String,
        model: String,
        api_key: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn send(&self, request: &GenerateRequest) -> Result<Value, LlmError> {
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::Transport {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Transport {
                details: format!("{} - {}", status.as_u16(), body),
            });
        }

        response.json::<Value>().await.map_err(|e| LlmError::Unexpected {
            details: e.to_string(),
        })
    }
}

#[async_trait]
impl LlmGateway for GeminiClient {
    async fn complete(&self, prompt: &str, overrides: GenerationOverrides) -> SummaryResult {
        let request = GenerateRequest::new(prompt, &overrides);

        let result = match self.send(&request).await {
            Ok(body) => parse_generate_response(body),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            error!("Gemini call failed: {}", e);
        }
        result
    }
}

/// Pull the first candidate's text out of a `generateContent` body and parse it.
///
/// Any well-formed JSON document is accepted as-is.
pub fn parse_generate_response(body: Value) -> SummaryResult {
    let text = body
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .map(str::to_owned);

    let Some(text) = text else {
        return Err(LlmError::MissingText { raw_response: body });
    };

    debug!("Gemini returned {} chars", text.len());

    extract_json(&text)
        .map(Summary::new)
        .ok_or_else(|| LlmError::Unexpected {
            details: "no JSON value found in model output".to_string(),
        })
}

/// First syntactically valid JSON object or array in `text`.
///
/// Handles ```` ```json ```` fences, a bare `json` prefix and trailing chatter.
pub fn extract_json(text: &str) -> Option<Value> {
    for (start, ch) in text.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            return Some(value);
        }
    }
    None
}

// Request Models
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
    stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_k: 1,
            top_p: 1.0,
            max_output_tokens: 8192,
            stop_sequences: Vec::new(),
            response_mime_type: None,
        }
    }
}

impl GenerationConfig {
    fn merged(overrides: &GenerationOverrides) -> Self {
        let base = Self::default();
        Self {
            temperature: overrides.temperature.unwrap_or(base.temperature),
            top_k: overrides.top_k.unwrap_or(base.top_k),
            top_p: overrides.top_p.unwrap_or(base.top_p),
            max_output_tokens: overrides.max_output_tokens.unwrap_or(base.max_output_tokens),
            stop_sequences: base.stop_sequences,
            response_mime_type: overrides.response_mime_type.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

impl GenerateRequest {
    fn new(prompt: &str, overrides: &GenerationOverrides) -> Self {
        Self {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig::merged(overrides),
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_MEDIUM_AND_ABOVE",
                })
                .collect(),
        }
    }
}

/// Scripted gateway for tests: replays queued results in order and records
/// every prompt it was given.
#[derive(Clone, Default)]
pub struct MockGateway {
    responses: Arc<Mutex<VecDeque<SummaryResult>>>,
    calls: Arc<Mutex<Vec<(String, GenerationOverrides)>>>,
}

impl MockGateway {
    pub fn new(responses: Vec<SummaryResult>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<(String, GenerationOverrides)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmGateway for MockGateway {
    async fn complete(&self, prompt: &str, overrides: GenerationOverrides) -> SummaryResult {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((prompt.to_string(), overrides));
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| {
                Err(LlmError::Unexpected {
                    details: "mock gateway has no scripted response left".to_string(),
                })
            })
    }
}
