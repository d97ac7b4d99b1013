//! # LLM Module
//!
//! A narrow text-completion seam over rig-core. The workflow steps only ever
//! need "system prompt + user prompt in, text out", so that is all the
//! [`TextModel`] trait exposes. Tests swap in scripted models.

use anyhow::Result;
use async_trait::async_trait;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::{groq, ollama};
use tracing::debug;

use crate::config::{Config, LlmProvider};

// =============================================================================
// TEXT MODEL TRAIT
// =============================================================================
/// Something that turns a preamble and a prompt into text.
///
/// # Rust Concept: Trait Objects
///
/// Steps hold an `Arc<dyn TextModel>`, so the same step code runs against
/// Groq, Ollama or a test double.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, preamble: &str, prompt: &str) -> Result<String>;

    /// Model identifier for logs
    fn name(&self) -> &str;
}

// =============================================================================
// RIG-BACKED MODEL
// =============================================================================
enum Backend {
    Groq(groq::Client),
    Ollama(ollama::Client),
}

/// [`TextModel`] backed by a rig-core provider client
pub struct RigModel {
    backend: Backend,
    model: String,
    temperature: f64,
}

impl std::fmt::Debug for RigModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let provider = match self.backend {
            Backend::Groq(_) => "groq",
            Backend::Ollama(_) => "ollama",
        };
        f.debug_struct("RigModel")
            .field("provider", &provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl RigModel {
    /// Create the client for the configured provider.
    ///
    /// The rig clients read their settings from the environment, so the
    /// validated values are exported first.
    pub fn from_config(config: &Config) -> Self {
        let backend = match config.provider {
            LlmProvider::Groq => {
                if let Some(key) = &config.groq_api_key {
                    std::env::set_var("GROQ_API_KEY", key);
                }
                Backend::Groq(groq::Client::from_env())
            }
            LlmProvider::Ollama => {
                std::env::set_var("OLLAMA_API_BASE_URL", &config.ollama_host);
                Backend::Ollama(ollama::Client::from_env())
            }
        };

        debug!(
            provider = %config.provider,
            model = %config.model,
            "LLM client created"
        );

        Self {
            backend,
            model: config.model.clone(),
            temperature: f64::from(config.temperature),
        }
    }
}

#[async_trait]
impl TextModel for RigModel {
    async fn complete(&self, preamble: &str, prompt: &str) -> Result<String> {
        let response = match &self.backend {
            Backend::Groq(client) => {
                client
                    .agent(&self.model)
                    .preamble(preamble)
                    .temperature(self.temperature)
                    .build()
                    .prompt(prompt)
                    .await
            }
            Backend::Ollama(client) => {
                client
                    .agent(&self.model)
                    .preamble(preamble)
                    .temperature(self.temperature)
                    .build()
                    .prompt(prompt)
                    .await
            }
        };

        response.map_err(|e| anyhow::anyhow!("Completion with {} failed: {}", self.model, e))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
