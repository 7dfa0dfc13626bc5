//! Environment configuration for the API binary.
//!
//! Only the options listed here are recognized; everything else the core
//! understands lives in the run playbook. Backends default to the
//! deterministic stubs so the service runs end-to-end with no external
//! dependencies beyond `PostgreSQL`.

use std::time::Duration;

use gridcast_engine::{BackendType, LlmBackendConfig};

/// Configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` connection URL (`DATABASE_URL`).
    pub database_url: String,
    /// Optional Redis-scheme cache URL for live briefs (`CACHE_URL`).
    pub cache_url: Option<String>,
    /// Bind address (`BIND_ADDR`, default `0.0.0.0:8090`).
    pub bind_addr: String,
    /// Run this service instance boots for (`RUN_ID`, default `pilot`).
    pub run_id: String,
    /// Optional draft LLM backend; `None` means the stub.
    pub draft_backend: Option<LlmBackendConfig>,
    /// Optional prompt templates directory (`TEMPLATES_DIR`).
    pub templates_dir: Option<String>,
}

impl ApiConfig {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when `DATABASE_URL` is missing.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| String::from("DATABASE_URL is required"))?;

        let draft_backend = std::env::var("LLM_API_URL").ok().map(|api_url| {
            let backend_type = match std::env::var("LLM_BACKEND").as_deref() {
                Ok("anthropic") => BackendType::Anthropic,
                _ => BackendType::OpenAi,
            };
            LlmBackendConfig {
                backend_type,
                api_url,
                api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
                model: std::env::var("LLM_MODEL")
                    .unwrap_or_else(|_| String::from("gpt-4o-mini")),
                call_timeout: Duration::from_secs(4),
            }
        });

        Ok(Self {
            database_url,
            cache_url: std::env::var("CACHE_URL").ok(),
            bind_addr: std::env::var("BIND_ADDR")
                .unwrap_or_else(|_| String::from("0.0.0.0:8090")),
            run_id: std::env::var("RUN_ID").unwrap_or_else(|_| String::from("pilot")),
            draft_backend,
            templates_dir: std::env::var("TEMPLATES_DIR").ok(),
        })
    }
}
