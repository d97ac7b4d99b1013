//! Research workflow state definition
//!
//! One `ResearchState` per run. Scalars are overwritten by later steps;
//! `intermediate_steps` and `sources` are append-only logs for the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

use crate::declare_state;
use crate::research::persona::Persona;
use crate::research::workflow::nodes;
use crate::state::{Append, Overwrite, WorkflowState};

/// Record of one step's contribution, kept for inspection and reflection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Node that produced the record
    pub step: String,
    /// Human-readable summary
    pub content: String,
    /// Structured payload (verdicts, queries, counts)
    #[serde(default)]
    pub details: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl StepRecord {
    /// Create a new record stamped with the current time
    pub fn new(step: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            content: content.into(),
            details: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }

    /// Attach a structured payload
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Where a citation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationOrigin {
    Web,
    LocalIndex,
}

/// A source backing the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Source URL (or `file://` path for local documents)
    pub url: String,
    /// Source title
    pub title: String,
    /// Optional snippet/summary from the source
    pub snippet: Option<String>,
    /// Relevance score reported by the backend
    pub score: Option<f32>,
    pub origin: CitationOrigin,
}

impl Citation {
    /// Create a new web citation
    pub fn web(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: None,
            score: None,
            origin: CitationOrigin::Web,
        }
    }

    /// Create a new local index citation
    pub fn local(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            origin: CitationOrigin::LocalIndex,
            ..Self::web(url, title)
        }
    }

    /// Add a snippet to the citation
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    /// Add a relevance score
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    /// URL key used for deduplication: trimmed, lowercased, no trailing slash
    pub fn normalized_url(&self) -> String {
        self.url.trim().trim_end_matches('/').to_lowercase()
    }
}

/// Speaker of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// One prior conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
}

declare_state! {
    /// The complete research workflow state
    pub struct ResearchState => ResearchUpdate {
        /// Query as the caller typed it
        user_query: String => Overwrite,
        /// Working query; replaced by the rewrite step
        query: String => Overwrite,
        /// Per-step log for this run
        intermediate_steps: Vec<StepRecord> => Append,
        /// Latest web findings, replaced each research pass
        web_search_results: String => Overwrite,
        /// Latest local index findings, replaced each research pass
        #[serde(alias = "faiss_search_results")]
        vector_search_results: String => Overwrite,
        /// Terminal answer; empty until the final step runs
        final_analysis: String => Overwrite,
        /// Set by reflection; latched once true
        research_complete: bool => Overwrite,
        /// Prior turns; read-only context for the run
        chat_history: Vec<ChatMessage> => Overwrite,
        /// Raw citation log across research passes
        sources: Vec<Citation> => Append,
        /// Persona selector, fixed for the run
        role: String => Overwrite,
    }
}

impl WorkflowState for ResearchState {
    type Update = ResearchUpdate;

    fn apply_update(&self, update: Self::Update) -> Self {
        let reopen = self.research_complete && update.research_complete == Some(false);

        let mut next = self.clone();
        next.merge(update);

        if reopen {
            warn!(
                query = %self.query,
                "Ignoring attempt to reset research_complete; it is latched once true"
            );
            next.research_complete = true;
        }

        next
    }
}

impl ResearchState {
    /// Initial state for a run
    pub fn new(persona: Persona, query: impl Into<String>, chat_history: Vec<ChatMessage>) -> Self {
        let query = query.into();
        Self {
            user_query: query.clone(),
            query,
            chat_history,
            role: persona.as_str().to_string(),
            ..Default::default()
        }
    }

    /// Citations deduplicated by normalized URL, first occurrence kept,
    /// original order preserved.
    pub fn unique_sources(&self) -> Vec<Citation> {
        let mut seen = HashSet::new();
        self.sources
            .iter()
            .filter(|citation| seen.insert(citation.normalized_url()))
            .cloned()
            .collect()
    }

    /// Prior turns followed by this run's question and, if produced, its answer
    pub fn conversation(&self) -> Vec<ChatMessage> {
        let mut turns = self.chat_history.clone();
        let asked = if self.user_query.is_empty() {
            &self.query
        } else {
            &self.user_query
        };
        if !asked.is_empty() {
            turns.push(ChatMessage::user(asked.clone()));
        }
        if !self.final_analysis.is_empty() {
            turns.push(ChatMessage::assistant(self.final_analysis.clone()));
        }
        turns
    }

    /// Follow-up query suggested by the most recent reflection pass
    pub fn latest_follow_up(&self) -> Option<&str> {
        self.intermediate_steps
            .iter()
            .rev()
            .find(|record| record.step == nodes::REFLECT)
            .and_then(|record| record.details.get("follow_up_query"))
            .and_then(|value| value.as_str())
            .map(str::trim)
            .filter(|query| !query.is_empty())
    }

    /// True once the terminal step has produced an answer
    pub fn has_final_analysis(&self) -> bool {
        !self.final_analysis.trim().is_empty()
    }

    /// Parsed persona, when the role field holds a known one
    pub fn persona(&self) -> Option<Persona> {
        self.role.parse().ok()
    }
}
