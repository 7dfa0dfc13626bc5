//! LLM backend abstraction and implementations.
//!
//! Enum dispatch instead of trait objects (async methods are not
//! dyn-compatible). Concrete backends exist for OpenAI-compatible chat
//! completions and the Anthropic Messages API, plus a deterministic
//! scripted stub for tests. Transport failures retry with capped
//! exponential backoff and jitter (max 3 attempts) before surfacing.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::EngineError;
use crate::prompt::RenderedPrompt;

/// Maximum transport attempts per call.
const MAX_ATTEMPTS: u32 = 3;

/// Base backoff delay in milliseconds.
const BACKOFF_BASE_MS: u64 = 250;

/// Which API dialect a configured backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// OpenAI-compatible chat completions.
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
}

/// Configuration for an HTTP LLM backend.
#[derive(Debug, Clone)]
pub struct LlmBackendConfig {
    /// Which dialect to speak.
    pub backend_type: BackendType,
    /// Base API URL (e.g. `https://api.openai.com/v1`).
    pub api_url: String,
    /// API key.
    pub api_key: String,
    /// Model name sent with every request.
    pub model: String,
    /// Per-call timeout. Model calls are capped at 4 s.
    pub call_timeout: Duration,
}

/// One completed LLM call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The raw response text (expected to contain JSON).
    pub text: String,
    /// Input tokens reported by the provider (0 when absent).
    pub input_tokens: u64,
    /// Output tokens reported by the provider (0 when absent).
    pub output_tokens: u64,
}

/// An LLM backend that can process a prompt and return a response.
pub enum LlmBackend {
    /// OpenAI-compatible chat completions API.
    OpenAi(OpenAiBackend),
    /// Anthropic Messages API.
    Anthropic(AnthropicBackend),
    /// Deterministic scripted stub for tests.
    Stub(StubBackend),
}

impl LlmBackend {
    /// Send a prompt and return the response text, retrying transport
    /// failures with capped exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::LlmBackend`] after the final attempt fails.
    pub async fn complete(&self, prompt: &RenderedPrompt) -> Result<LlmResponse, EngineError> {
        let mut last_error = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let seed = u64::try_from(prompt.user.len()).unwrap_or(0);
                tokio::time::sleep(backoff_delay(attempt, seed)).await;
            }
            match self.complete_once(prompt).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    tracing::warn!(%error, attempt, backend = self.name(), "llm call failed");
                    last_error = Some(error);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| EngineError::LlmBackend(String::from("no attempts made"))))
    }

    async fn complete_once(&self, prompt: &RenderedPrompt) -> Result<LlmResponse, EngineError> {
        match self {
            Self::OpenAi(backend) => backend.complete(prompt).await,
            Self::Anthropic(backend) => backend.complete(prompt).await,
            Self::Stub(backend) => backend.complete(prompt),
        }
    }

    /// Human-readable name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenAi(_) => "openai-compatible",
            Self::Anthropic(_) => "anthropic",
            Self::Stub(_) => "stub",
        }
    }

    /// The model identifier this backend reports.
    pub fn model(&self) -> &str {
        match self {
            Self::OpenAi(backend) => &backend.model,
            Self::Anthropic(backend) => &backend.model,
            Self::Stub(backend) => &backend.model,
        }
    }
}

/// Deterministic jittered exponential backoff.
///
/// Jitter is seeded from the attempt and a caller-supplied value so
/// behavior is reproducible in tests.
fn backoff_delay(attempt: u32, seed: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(4);
    let base = BACKOFF_BASE_MS.saturating_mul(1_u64 << exponent);
    let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(u64::from(attempt)));
    let jitter = rng.random_range(0..=(base / 4).max(1));
    Duration::from_millis(base.saturating_add(jitter))
}

// ---------------------------------------------------------------------------
// OpenAI-compatible backend
// ---------------------------------------------------------------------------

/// Backend for OpenAI-compatible chat completions APIs.
///
/// Sends requests to `{api_url}/chat/completions`.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    call_timeout: Duration,
}

impl OpenAiBackend {
    /// Create a new OpenAI-compatible backend.
    pub fn new(config: &LlmBackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            call_timeout: config.call_timeout,
        }
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<LlmResponse, EngineError> {
        let url = format!("{}/chat/completions", self.api_url);

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user}
            ],
            "temperature": 0.7,
            "max_tokens": 4096,
            "response_format": {"type": "json_object"}
        });

        let response = self
            .client
            .post(&url)
            .timeout(self.call_timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::LlmBackend(format!("openai request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unable to read error body"));
            return Err(EngineError::LlmBackend(format!(
                "openai returned {status}: {error_body}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::LlmBackend(format!("openai response parse failed: {e}")))?;

        let text = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(serde_json::Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                EngineError::LlmBackend(String::from(
                    "openai response missing choices[0].message.content",
                ))
            })?;

        Ok(LlmResponse {
            text,
            input_tokens: usage_field(&json, "prompt_tokens"),
            output_tokens: usage_field(&json, "completion_tokens"),
        })
    }
}

// ---------------------------------------------------------------------------
// Anthropic Messages API backend
// ---------------------------------------------------------------------------

/// Backend for the Anthropic Messages API.
///
/// Differences from OpenAI: `x-api-key` header, top-level `system` field,
/// and `content[0].text` in the response.
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    call_timeout: Duration,
}

impl AnthropicBackend {
    /// Create a new Anthropic Messages API backend.
    pub fn new(config: &LlmBackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            call_timeout: config.call_timeout,
        }
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<LlmResponse, EngineError> {
        let url = format!("{}/messages", self.api_url);

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 4096,
            "system": prompt.system,
            "messages": [
                {"role": "user", "content": prompt.user}
            ]
        });

        let response = self
            .client
            .post(&url)
            .timeout(self.call_timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::LlmBackend(format!("anthropic request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unable to read error body"));
            return Err(EngineError::LlmBackend(format!(
                "anthropic returned {status}: {error_body}"
            )));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            EngineError::LlmBackend(format!("anthropic response parse failed: {e}"))
        })?;

        let text = json
            .get("content")
            .and_then(|c| c.get(0))
            .and_then(|b| b.get("text"))
            .and_then(serde_json::Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                EngineError::LlmBackend(String::from("anthropic response missing content[0].text"))
            })?;

        Ok(LlmResponse {
            text,
            input_tokens: usage_field(&json, "input_tokens"),
            output_tokens: usage_field(&json, "output_tokens"),
        })
    }
}

fn usage_field(json: &serde_json::Value, field: &str) -> u64 {
    json.get("usage")
        .and_then(|u| u.get(field))
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Deterministic scripted stub
// ---------------------------------------------------------------------------

/// Test backend returning scripted responses in order.
///
/// When the script runs dry, the last response repeats, which makes
/// "the model keeps producing the same flaw" scenarios trivial to write.
pub struct StubBackend {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    model: String,
}

impl StubBackend {
    /// Create a stub that replays `responses` in order.
    pub fn scripted(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(None),
            model: String::from("stub-model"),
        }
    }

    fn complete(&self, _prompt: &RenderedPrompt) -> Result<LlmResponse, EngineError> {
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());

        let text = match next {
            Some(text) => {
                if let Ok(mut last) = self.last.lock() {
                    *last = Some(text.clone());
                }
                text
            }
            None => self
                .last
                .lock()
                .ok()
                .and_then(|last| last.clone())
                .ok_or_else(|| EngineError::LlmBackend(String::from("stub script empty")))?,
        };

        Ok(LlmResponse {
            text,
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}

/// Create an LLM backend from configuration.
pub fn create_backend(config: &LlmBackendConfig) -> LlmBackend {
    match config.backend_type {
        BackendType::OpenAi => LlmBackend::OpenAi(OpenAiBackend::new(config)),
        BackendType::Anthropic => LlmBackend::Anthropic(AnthropicBackend::new(config)),
    }
}
