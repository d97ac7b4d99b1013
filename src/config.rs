//! # Configuration Module
//!
//! Loads the assistant's settings from the environment (and a `.env` file).
//! Both API keys are checked before any request is served: a missing key is a
//! configuration error, never a failed run.

use anyhow::{Context, Result};
use lara_graph::GraphError;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// =============================================================================
// LLM PROVIDER
// =============================================================================
/// Which rig-core client backs the text model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Hosted inference through Groq (needs `GROQ_API_KEY`)
    #[default]
    Groq,
    /// Local inference through an Ollama server
    Ollama,
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(LlmProvider::Groq),
            "ollama" => Ok(LlmProvider::Ollama),
            other => anyhow::bail!("LLM_PROVIDER must be 'groq' or 'ollama', got: {other}"),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::Groq => write!(f, "groq"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Main configuration for the assistant.
///
/// # Rust Concept: Option for "maybe configured"
///
/// Secrets and the local index directory are `Option`s: `None` means "not
/// set", which `validate` turns into a clear error where it matters.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: LlmProvider,

    /// Model name passed to the provider (e.g., "llama-3.3-70b-versatile")
    pub model: String,

    pub groq_api_key: Option<String>,

    /// Ollama server URL (default: http://localhost:11434)
    pub ollama_host: String,

    pub tavily_api_key: Option<String>,

    /// Temperature for LLM responses. Legal answers want low values.
    pub temperature: f32,

    /// Web results fetched per research pass
    pub max_search_results: usize,

    /// Research passes per run before the final analysis is forced
    pub max_research_iterations: usize,

    /// Directory of `.txt` / `.md` documents for the local index
    pub local_index_dir: Option<PathBuf>,

    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Groq,
            model: "llama-3.3-70b-versatile".to_string(),
            groq_api_key: None,
            ollama_host: "http://localhost:11434".to_string(),
            tavily_api_key: None,
            temperature: 0.2,
            max_search_results: 5,
            max_research_iterations: 3,
            local_index_dir: None,
            log_level: "info".to_string(),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from a `.env` file (if present) and the environment.
    ///
    /// # Example
    /// ```ignore
    /// let config = Config::from_env()?;
    /// config.validate()?;
    /// ```
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (silently ignore if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key lookup.
    ///
    /// # Rust Concept: Closures as Parameters
    ///
    /// Taking `impl Fn(&str) -> Option<String>` lets tests feed a plain map
    /// instead of mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        // Blank values count as unset
        let get = |key: &str| lookup(key).filter(|val| !val.trim().is_empty());

        if let Some(val) = get("LLM_PROVIDER") {
            config.provider = val.parse()?;
        }

        if let Some(val) = get("LLM_MODEL") {
            config.model = val;
        }

        config.groq_api_key = get("GROQ_API_KEY");
        config.tavily_api_key = get("TAVILY_API_KEY");

        if let Some(val) = get("OLLAMA_API_BASE_URL") {
            config.ollama_host = val;
        }

        if let Some(val) = get("TEMPERATURE") {
            config.temperature = val
                .trim()
                .parse()
                .context("TEMPERATURE must be a valid floating-point number (e.g., 0.2)")?;
        }

        if let Some(val) = get("MAX_SEARCH_RESULTS") {
            config.max_search_results = val
                .trim()
                .parse()
                .context("MAX_SEARCH_RESULTS must be a valid positive integer")?;
        }

        if let Some(val) = get("MAX_RESEARCH_ITERATIONS") {
            config.max_research_iterations = val
                .trim()
                .parse()
                .context("MAX_RESEARCH_ITERATIONS must be a valid positive integer")?;
        }

        if let Some(val) = get("LOCAL_INDEX_DIR") {
            config.local_index_dir = Some(PathBuf::from(val));
        }

        if let Some(val) = get("RUST_LOG") {
            config.log_level = val;
        }

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Fails fast: the assistant refuses to start rather than failing on the
    /// first request.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.tavily_api_key.is_none() {
            return Err(GraphError::configuration(
                "TAVILY_API_KEY is not set. Add it to your .env file.",
            ));
        }

        if self.provider == LlmProvider::Groq && self.groq_api_key.is_none() {
            return Err(GraphError::configuration(
                "GROQ_API_KEY is not set. Add it to your .env file or use LLM_PROVIDER=ollama.",
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(GraphError::configuration(format!(
                "Temperature must be between 0.0 and 2.0, got: {}",
                self.temperature
            )));
        }

        if self.max_search_results == 0 {
            return Err(GraphError::configuration(
                "MAX_SEARCH_RESULTS must be at least 1",
            ));
        }

        if self.max_research_iterations == 0 {
            return Err(GraphError::configuration(
                "MAX_RESEARCH_ITERATIONS must be at least 1",
            ));
        }

        if self.model.trim().is_empty() {
            return Err(GraphError::configuration("LLM_MODEL cannot be empty"));
        }

        Ok(())
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn with_keys() -> Config {
        Config {
            groq_api_key: Some("gsk-test".to_string()),
            tavily_api_key: Some("tvly-test".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.provider, LlmProvider::Groq);
        assert_eq!(config.model, "llama-3.3-70b-versatile");
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.max_search_results, 5);
        assert_eq!(config.max_research_iterations, 3);
        assert!(config.local_index_dir.is_none());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("LLM_PROVIDER", "Ollama"),
            ("LLM_MODEL", "llama3.2"),
            ("TAVILY_API_KEY", "tvly-test"),
            ("TEMPERATURE", "0.5"),
            ("MAX_RESEARCH_ITERATIONS", "4"),
            ("LOCAL_INDEX_DIR", "./statutes"),
        ]))
        .unwrap();

        assert_eq!(config.provider, LlmProvider::Ollama);
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.tavily_api_key.as_deref(), Some("tvly-test"));
        assert!((config.temperature - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.max_research_iterations, 4);
        assert_eq!(config.local_index_dir, Some(PathBuf::from("./statutes")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        assert!(Config::from_lookup(lookup(&[("TEMPERATURE", "warm")])).is_err());
        assert!(Config::from_lookup(lookup(&[("LLM_PROVIDER", "openai")])).is_err());
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let config = Config::from_lookup(lookup(&[
            ("GROQ_API_KEY", "gsk-test"),
            ("TAVILY_API_KEY", "   "),
        ]))
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, GraphError::Configuration(ref msg) if msg.contains("TAVILY_API_KEY"))
        );
    }

    #[test]
    fn test_missing_groq_key_fails_fast() {
        let config = Config {
            groq_api_key: None,
            ..with_keys()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, GraphError::Configuration(ref msg) if msg.contains("GROQ_API_KEY")));

        // Ollama needs no hosted key
        let config = Config {
            provider: LlmProvider::Ollama,
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(with_keys().validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_ranges() {
        let mut config = with_keys();
        config.temperature = 3.0;
        assert!(config.validate().is_err());

        let mut config = with_keys();
        config.max_search_results = 0;
        assert!(config.validate().is_err());

        let mut config = with_keys();
        config.max_research_iterations = 0;
        assert!(config.validate().is_err());
    }
}
