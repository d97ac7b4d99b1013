//! # Agent Module
//!
//! Wires the concrete collaborators (LLM, web search, local index) into the
//! persona step bindings and hands them to the graph router. Everything is
//! constructed explicitly at startup and owned by [`LegalAssistant`].

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use lara_graph::{
    ChatMessage, GraphError, MemoryCheckpointer, Persona, ResearchState, Router, RunOutcome,
    RunRequest, RunnerConfig,
};

use crate::config::Config;
use crate::index::DocumentIndex;
use crate::llm::{RigModel, TextModel};
use crate::steps::persona_steps;
use crate::tools::{TavilySearch, WebSearch};

/// Shown when a run finishes without producing any analysis
pub const NO_ANALYSIS_FALLBACK: &str = "Sorry, I couldn't generate a final analysis.";

// =============================================================================
// LEGAL ASSISTANT
// =============================================================================
/// The assistant: one router over both personas, one in-memory checkpoint
/// store shared by every thread.
#[derive(Debug, Clone)]
pub struct LegalAssistant {
    router: Router,
}

impl LegalAssistant {
    /// Build the production assistant from a validated configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let tavily_key = config
            .tavily_api_key
            .clone()
            .context("TAVILY_API_KEY is not set")?;

        let model: Arc<dyn TextModel> = Arc::new(RigModel::from_config(config));
        let search: Arc<dyn WebSearch> =
            Arc::new(TavilySearch::new(tavily_key, config.max_search_results));

        let index = match &config.local_index_dir {
            Some(dir) => Some(Arc::new(DocumentIndex::from_dir(dir)?)),
            None => None,
        };

        Ok(Self::with_collaborators(config, model, search, index)?)
    }

    /// Build from explicit collaborators.
    pub fn with_collaborators(
        config: &Config,
        model: Arc<dyn TextModel>,
        search: Arc<dyn WebSearch>,
        index: Option<Arc<DocumentIndex>>,
    ) -> Result<Self, GraphError> {
        let checkpointer = Arc::new(MemoryCheckpointer::<ResearchState>::new());

        let mut builder = Router::builder(checkpointer)
            .config(RunnerConfig::default())
            .max_research_iterations(config.max_research_iterations);

        for persona in Persona::ALL {
            builder = builder.persona(
                persona,
                persona_steps(
                    persona,
                    Arc::clone(&model),
                    Arc::clone(&search),
                    index.clone(),
                ),
            );
        }

        let router = builder.build()?;
        info!(
            model = %model.name(),
            local_index = index.is_some(),
            max_research_iterations = config.max_research_iterations,
            "Legal assistant ready"
        );

        Ok(Self { router })
    }

    /// Answer one question on a thread. Prior turns on the same thread are
    /// picked up from its checkpoint.
    pub async fn ask(
        &self,
        role: &str,
        query: &str,
        thread_id: &str,
    ) -> Result<RunOutcome, GraphError> {
        self.router
            .run(RunRequest::new(role, query, thread_id))
            .await
    }

    /// Thread ids seen in this process
    pub async fn threads(&self) -> Result<Vec<String>, GraphError> {
        self.router.threads().await
    }

    /// Continue a thread whose last run failed part-way
    pub async fn resume(&self, thread_id: &str) -> Result<RunOutcome, GraphError> {
        self.router.resume(thread_id).await
    }

    /// Conversation on a thread so far; empty for an unknown thread
    pub async fn history(&self, thread_id: &str) -> Result<Vec<ChatMessage>, GraphError> {
        match self.router.snapshot(thread_id).await {
            Ok(checkpoint) => Ok(checkpoint.state.conversation()),
            Err(e) if e.is_fresh_start() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Text to show for an outcome
pub fn analysis_text(outcome: &RunOutcome) -> &str {
    if outcome.final_analysis.trim().is_empty() {
        NO_ANALYSIS_FALLBACK
    } else {
        &outcome.final_analysis
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts;
    use crate::tools::{SearchHit, SearchResults, TavilyError};
    use async_trait::async_trait;

    /// Answers by preamble: rewrites echo, reflection is satisfied on the
    /// first pass, the final answer names the persona.
    struct EchoModel;

    #[async_trait]
    impl TextModel for EchoModel {
        async fn complete(&self, preamble: &str, prompt: &str) -> anyhow::Result<String> {
            if preamble == prompts::REWRITE_PREAMBLE {
                let question = prompt.rsplit("Question: ").next().unwrap_or_default();
                return Ok(format!("{question} statute"));
            }
            for persona in Persona::ALL {
                if preamble == prompts::reflect_preamble(persona) {
                    return Ok(r#"{"research_complete": true, "summary": "ok"}"#.to_string());
                }
                if preamble == prompts::final_preamble(persona) {
                    return Ok(format!("{persona} answer"));
                }
            }
            anyhow::bail!("unexpected preamble")
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct OneHit;

    #[async_trait]
    impl WebSearch for OneHit {
        async fn search(&self, query: &str) -> Result<SearchResults, TavilyError> {
            Ok(SearchResults {
                answer: None,
                hits: vec![SearchHit {
                    title: query.to_string(),
                    url: "https://courts.ca.gov/selfhelp".to_string(),
                    content: "Self-help guide".to_string(),
                    score: 0.9,
                }],
            })
        }
    }

    fn assistant() -> LegalAssistant {
        LegalAssistant::with_collaborators(
            &Config::default(),
            Arc::new(EchoModel),
            Arc::new(OneHit),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ask_routes_by_role() {
        let assistant = assistant();

        let citizen = assistant.ask("citizen", "Is at-will employment legal?", "t1").await.unwrap();
        assert_eq!(citizen.final_analysis, "citizen answer");
        assert_eq!(citizen.thread_id, "t1");
        assert_eq!(citizen.sources.len(), 1);

        let lawyer = assistant.ask("LAWYER", "Same question", "t2").await.unwrap();
        assert_eq!(lawyer.final_analysis, "lawyer answer");

        assert_eq!(assistant.threads().await.unwrap(), vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn test_unknown_role_runs_nothing() {
        let assistant = assistant();
        let err = assistant.ask("judge", "q", "t1").await.unwrap_err();

        assert!(matches!(err, GraphError::UnknownRole(ref role) if role == "judge"));
        assert!(assistant.threads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_turn_sees_first() {
        let assistant = assistant();
        tokio_test::assert_ok!(assistant.ask("citizen", "first question", "t1").await);
        tokio_test::assert_ok!(assistant.ask("citizen", "and in Texas?", "t1").await);

        let history = assistant.history("t1").await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "first question");
        assert_eq!(history[1].content, "citizen answer");
        assert_eq!(history[2].content, "and in Texas?");
        assert!(assistant.history("unknown").await.unwrap().is_empty());
    }

    #[test]
    fn test_fallback_text() {
        let outcome = RunOutcome {
            final_analysis: "  ".to_string(),
            sources: vec![],
            thread_id: "t".to_string(),
            persona: Persona::Citizen,
            research_iterations: 3,
            best_effort: true,
        };
        assert_eq!(analysis_text(&outcome), NO_ANALYSIS_FALLBACK);
    }

    #[test]
    fn test_from_config_requires_keys() {
        assert!(LegalAssistant::from_config(&Config::default()).is_err());
    }
}
