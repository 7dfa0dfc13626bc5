//! Embedding backend abstraction.
//!
//! Same enum-dispatch shape as the LLM backends: an OpenAI-compatible
//! HTTP implementation plus a deterministic stub. The stub hashes the
//! input text into a repeatable 1536-dimensional vector, which gives
//! tests real similarity structure (identical text embeds identically)
//! without a network.

use std::time::Duration;

use gridcast_types::EMBEDDING_DIM;

use crate::error::EngineError;

/// Maximum transport attempts per embed call.
const MAX_ATTEMPTS: u32 = 3;

/// An embedding backend: text in, 1536-dimensional vector out.
pub enum EmbeddingBackend {
    /// OpenAI-compatible `/embeddings` endpoint.
    OpenAi(OpenAiEmbedder),
    /// Deterministic hash-based stub for tests.
    Stub(StubEmbedder),
}

impl EmbeddingBackend {
    /// Embed one text, retrying transport failures.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Embedding`] after the final attempt fails.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        match self {
            Self::Stub(stub) => Ok(stub.embed(text)),
            Self::OpenAi(embedder) => {
                let mut last_error = None;
                for attempt in 0..MAX_ATTEMPTS {
                    if attempt > 0 {
                        let delay = 200_u64.saturating_mul(1 << attempt.min(4));
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    match embedder.embed(text).await {
                        Ok(vector) => return Ok(vector),
                        Err(error) => {
                            tracing::warn!(%error, attempt, "embedding call failed");
                            last_error = Some(error);
                        }
                    }
                }
                Err(last_error
                    .unwrap_or_else(|| EngineError::Embedding(String::from("no attempts"))))
            }
        }
    }

    /// A deterministic stub backend.
    pub const fn stub() -> Self {
        Self::Stub(StubEmbedder)
    }
}

/// OpenAI-compatible embedding client.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    call_timeout: Duration,
}

impl OpenAiEmbedder {
    /// Create an embedder against `{api_url}/embeddings`.
    pub fn new(api_url: &str, api_key: &str, model: &str, call_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.to_owned(),
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            call_timeout,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        let url = format!("{}/embeddings", self.api_url);
        let body = serde_json::json!({ "model": self.model, "input": text });

        let response = self
            .client
            .post(&url)
            .timeout(self.call_timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Embedding(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Embedding(format!("provider returned {status}")));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::Embedding(format!("response parse failed: {e}")))?;

        let vector: Vec<f32> = json
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|d| d.get("embedding"))
            .and_then(serde_json::Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(serde_json::Value::as_f64)
                    .map(|v| v as f32)
                    .collect()
            })
            .ok_or_else(|| {
                EngineError::Embedding(String::from("response missing data[0].embedding"))
            })?;

        if vector.len() != EMBEDDING_DIM {
            return Err(EngineError::Embedding(format!(
                "expected {EMBEDDING_DIM} dimensions, got {}",
                vector.len()
            )));
        }
        Ok(vector)
    }
}

/// Deterministic hash-based embedder for tests.
///
/// Tokenizes on whitespace, hashes each token into a handful of
/// dimensions, and L2-normalizes. Shared tokens between two texts
/// produce genuinely higher cosine similarity.
pub struct StubEmbedder;

impl StubEmbedder {
    /// Embed text deterministically.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; EMBEDDING_DIM];

        for token in text.to_lowercase().split_whitespace() {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in token.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            }
            // Spread each token over four dimensions.
            for spread in 0..4_u64 {
                let mixed = hash.wrapping_mul(spread.wrapping_add(1));
                let index = usize::try_from(mixed % (EMBEDDING_DIM as u64)).unwrap_or(0);
                let sign = if mixed & 1 == 0 { 1.0 } else { -1.0 };
                if let Some(slot) = vector.get_mut(index) {
                    *slot += sign;
                }
            }
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[cfg(test)]
mod tests {
    use gridcast_store::cosine_similarity;

    use super::*;

    #[tokio::test]
    async fn stub_is_deterministic() {
        let backend = EmbeddingBackend::stub();
        let a = backend.embed("KC hosts BUF in week five").await.ok();
        let b = backend.embed("KC hosts BUF in week five").await.ok();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn stub_produces_full_dimension() {
        let backend = EmbeddingBackend::stub();
        let vector = backend.embed("anything").await.unwrap_or_default();
        assert_eq!(vector.len(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn shared_tokens_raise_similarity() {
        let backend = EmbeddingBackend::stub();
        let base = backend.embed("cold windy kansas city game").await.unwrap_or_default();
        let near = backend.embed("cold windy buffalo game").await.unwrap_or_default();
        let far = backend.embed("sunny dome sprint").await.unwrap_or_default();

        let near_sim = cosine_similarity(&base, &near);
        let far_sim = cosine_similarity(&base, &far);
        assert!(near_sim > far_sim);
    }

    #[tokio::test]
    async fn empty_text_embeds_to_zero_vector() {
        let backend = EmbeddingBackend::stub();
        let vector = backend.embed("").await.unwrap_or_default();
        assert!(vector.iter().all(|v| v.abs() < f32::EPSILON));
    }
}
