//! # Workflow Steps
//!
//! The concrete implementations bound to the research graph's four nodes.
//! Each step reads the current state and returns a partial update; the graph
//! runner merges it.
//!
//! | node             | implementation        | persona-specific |
//! |------------------|-----------------------|------------------|
//! | rewrite_query    | [`QueryRewriter`]     | no               |
//! | perform_research | [`ResearchStep`]      | no               |
//! | reflect          | [`ReflectStep`]       | yes              |
//! | final_analysis   | [`FinalAnalysisStep`] | yes              |

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use lara_graph::research::nodes;
use lara_graph::{
    Citation, Persona, PersonaSteps, ResearchState, ResearchUpdate, Step, StepError, StepRecord,
};

use crate::index::{hits_to_markdown, DocumentIndex};
use crate::llm::TextModel;
use crate::prompts;
use crate::tools::WebSearch;

/// Passages taken from the local index per research pass
const LOCAL_HITS: usize = 3;

// =============================================================================
// QUERY REWRITER
// =============================================================================
/// Turns the user's wording into a search-ready query
pub struct QueryRewriter {
    model: Arc<dyn TextModel>,
}

impl QueryRewriter {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Step<ResearchState> for QueryRewriter {
    async fn run(&self, state: &ResearchState) -> Result<ResearchUpdate, StepError> {
        let raw = self
            .model
            .complete(prompts::REWRITE_PREAMBLE, &prompts::rewrite_prompt(state))
            .await
            .map_err(|e| StepError::llm(e.to_string()))?;

        // First non-empty line, stripped of quotes the model likes to add
        let rewritten = raw
            .lines()
            .map(|line| line.trim().trim_matches('"').trim())
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string();

        let query = if rewritten.is_empty() {
            warn!(model = %self.model.name(), "Empty rewrite, keeping the original query");
            state.query.clone()
        } else {
            rewritten
        };

        info!(original = %state.query, rewritten = %query, "Query rewritten");

        Ok(ResearchUpdate::default()
            .query(query.clone())
            .intermediate_steps(vec![StepRecord::new(nodes::REWRITE_QUERY, query.clone())
                .with_details(json!({ "original": state.query, "rewritten": query }))]))
    }
}

// =============================================================================
// RESEARCH
// =============================================================================
/// One research pass: web search plus, when configured, the local index.
///
/// The first pass searches for the rewritten query; later passes use the
/// follow-up query suggested by the latest reflection, if any.
pub struct ResearchStep {
    search: Arc<dyn WebSearch>,
    index: Option<Arc<DocumentIndex>>,
}

impl ResearchStep {
    pub fn new(search: Arc<dyn WebSearch>, index: Option<Arc<DocumentIndex>>) -> Self {
        Self { search, index }
    }
}

#[async_trait]
impl Step<ResearchState> for ResearchStep {
    async fn run(&self, state: &ResearchState) -> Result<ResearchUpdate, StepError> {
        let query = state.latest_follow_up().unwrap_or(&state.query).to_string();
        debug!(query = %query, "Research pass");

        let results = self
            .search
            .search(&query)
            .await
            .map_err(|e| StepError::search(e.to_string()))?;

        let local_hits = self
            .index
            .as_ref()
            .map(|index| index.search(&query, LOCAL_HITS))
            .unwrap_or_default();

        let mut sources: Vec<Citation> = results
            .hits
            .iter()
            .map(|hit| {
                Citation::web(&hit.url, &hit.title)
                    .with_snippet(&hit.content)
                    .with_score(hit.score as f32)
            })
            .collect();
        sources.extend(local_hits.iter().map(|hit| {
            Citation::local(hit.url(), &hit.title)
                .with_snippet(&hit.text)
                .with_score(hit.score)
        }));

        let vector_results = if self.index.is_some() {
            hits_to_markdown(&local_hits)
        } else {
            "Local document index not configured.".to_string()
        };

        info!(
            query = %query,
            web = results.hits.len(),
            local = local_hits.len(),
            "Research pass complete"
        );

        let record = StepRecord::new(
            nodes::PERFORM_RESEARCH,
            format!(
                "Searched '{}': {} web results, {} local passages",
                query,
                results.hits.len(),
                local_hits.len()
            ),
        )
        .with_details(json!({
            "query": query,
            "web_results": results.hits.len(),
            "local_results": local_hits.len(),
        }));

        Ok(ResearchUpdate::default()
            .web_search_results(results.to_markdown())
            .vector_search_results(vector_results)
            .sources(sources)
            .intermediate_steps(vec![record]))
    }
}

// =============================================================================
// REFLECTION
// =============================================================================
/// Verdict the reflection prompt asks the model for
#[derive(Debug, Default, Deserialize, PartialEq)]
struct Verdict {
    #[serde(default)]
    research_complete: bool,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    follow_up_query: Option<String>,
}

impl Verdict {
    /// Parse the first JSON object in the model output. Anything that does
    /// not parse counts as "not complete", keeping the raw text as summary.
    fn parse(raw: &str) -> Self {
        let object = match (raw.find('{'), raw.rfind('}')) {
            (Some(start), Some(end)) if start < end => &raw[start..=end],
            _ => "",
        };

        match serde_json::from_str::<Verdict>(object) {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(error = %e, "Reflection output was not a JSON verdict");
                Verdict {
                    summary: raw.trim().to_string(),
                    ..Verdict::default()
                }
            }
        }
    }
}

/// Persona-specific sufficiency check
pub struct ReflectStep {
    model: Arc<dyn TextModel>,
    persona: Persona,
}

impl ReflectStep {
    pub fn new(model: Arc<dyn TextModel>, persona: Persona) -> Self {
        Self { model, persona }
    }
}

#[async_trait]
impl Step<ResearchState> for ReflectStep {
    async fn run(&self, state: &ResearchState) -> Result<ResearchUpdate, StepError> {
        let raw = self
            .model
            .complete(
                prompts::reflect_preamble(self.persona),
                &prompts::reflect_prompt(state),
            )
            .await
            .map_err(|e| StepError::llm(e.to_string()))?;

        let verdict = Verdict::parse(&raw);
        let follow_up = verdict
            .follow_up_query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        info!(
            persona = %self.persona,
            complete = verdict.research_complete,
            follow_up = ?follow_up,
            "Reflection verdict"
        );

        let record = StepRecord::new(nodes::REFLECT, verdict.summary).with_details(json!({
            "persona": self.persona.as_str(),
            "research_complete": verdict.research_complete,
            "follow_up_query": follow_up,
        }));

        Ok(ResearchUpdate::default()
            .research_complete(verdict.research_complete)
            .intermediate_steps(vec![record]))
    }
}

// =============================================================================
// FINAL ANALYSIS
// =============================================================================
/// Persona-specific answer writer
pub struct FinalAnalysisStep {
    model: Arc<dyn TextModel>,
    persona: Persona,
}

impl FinalAnalysisStep {
    pub fn new(model: Arc<dyn TextModel>, persona: Persona) -> Self {
        Self { model, persona }
    }
}

#[async_trait]
impl Step<ResearchState> for FinalAnalysisStep {
    async fn run(&self, state: &ResearchState) -> Result<ResearchUpdate, StepError> {
        let analysis = self
            .model
            .complete(
                prompts::final_preamble(self.persona),
                &prompts::final_prompt(state),
            )
            .await
            .map_err(|e| StepError::llm(e.to_string()))?;

        let analysis = analysis.trim();
        if analysis.is_empty() {
            return Err(StepError::invalid_output("model returned an empty analysis"));
        }

        info!(persona = %self.persona, chars = analysis.len(), "Final analysis written");

        Ok(ResearchUpdate::default()
            .final_analysis(analysis)
            .intermediate_steps(vec![StepRecord::new(
                nodes::FINAL_ANALYSIS,
                format!("{} analysis written", self.persona),
            )]))
    }
}

// =============================================================================
// PERSONA BINDINGS
// =============================================================================
/// Bind the four steps for one persona. Rewrite and research are shared.
pub fn persona_steps(
    persona: Persona,
    model: Arc<dyn TextModel>,
    search: Arc<dyn WebSearch>,
    index: Option<Arc<DocumentIndex>>,
) -> PersonaSteps {
    PersonaSteps::new(
        Arc::new(QueryRewriter::new(Arc::clone(&model))),
        Arc::new(ResearchStep::new(search, index)),
        Arc::new(ReflectStep::new(Arc::clone(&model), persona)),
        Arc::new(FinalAnalysisStep::new(model, persona)),
    )
}
