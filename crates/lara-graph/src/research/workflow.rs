//! Pre-built research workflow
//!
//! The same four-node graph serves every persona; only the step bindings
//! differ.
//!
//! ```text
//!   rewrite_query
//!        │
//!        ▼
//!   perform_research ◀──────┐
//!        │                  │ continue
//!        ▼                  │ (research_complete == false)
//!     reflect ──────────────┘
//!        │ complete
//!        ▼
//!   final_analysis ──▶ END
//! ```
//!
//! `perform_research` carries a loop limit: after `max_research_iterations`
//! passes the runner stops looping and goes to `final_analysis`.

use std::sync::Arc;

use crate::workflow::{BuiltWorkflowGraph, Step, WorkflowBuildError, WorkflowGraph, END};

use super::state::ResearchState;

/// Node names of the research graph
pub mod nodes {
    pub const REWRITE_QUERY: &str = "rewrite_query";
    pub const PERFORM_RESEARCH: &str = "perform_research";
    pub const REFLECT: &str = "reflect";
    pub const FINAL_ANALYSIS: &str = "final_analysis";
}

/// Branch keys produced after `reflect`
pub mod decisions {
    pub const COMPLETE: &str = "complete";
    pub const CONTINUE: &str = "continue";
}

type ResearchStep = Arc<dyn Step<ResearchState>>;

/// The four step bindings that make up one persona
#[derive(Clone)]
pub struct PersonaSteps {
    pub rewrite_query: ResearchStep,
    pub perform_research: ResearchStep,
    pub reflect: ResearchStep,
    pub final_analysis: ResearchStep,
}

impl PersonaSteps {
    pub fn new(
        rewrite_query: ResearchStep,
        perform_research: ResearchStep,
        reflect: ResearchStep,
        final_analysis: ResearchStep,
    ) -> Self {
        Self {
            rewrite_query,
            perform_research,
            reflect,
            final_analysis,
        }
    }
}

impl std::fmt::Debug for PersonaSteps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersonaSteps").finish_non_exhaustive()
    }
}

/// Route after reflection on the merged state
fn after_reflect(state: &ResearchState) -> String {
    if state.research_complete {
        decisions::COMPLETE.to_string()
    } else {
        decisions::CONTINUE.to_string()
    }
}

/// Builder for the research graph of one persona.
#[derive(Debug, Clone)]
pub struct ResearchWorkflowBuilder {
    /// Name of the workflow
    name: String,

    /// Research passes allowed before the loop guard triggers
    max_research_iterations: usize,

    steps: PersonaSteps,
}

impl ResearchWorkflowBuilder {
    /// Default cap on research passes per run
    pub const DEFAULT_MAX_RESEARCH_ITERATIONS: usize = 3;

    pub fn new(steps: PersonaSteps) -> Self {
        Self {
            name: "research_workflow".to_string(),
            max_research_iterations: Self::DEFAULT_MAX_RESEARCH_ITERATIONS,
            steps,
        }
    }

    /// Set the workflow name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the maximum number of research passes.
    ///
    /// Default: 3
    pub fn max_research_iterations(mut self, max: usize) -> Self {
        self.max_research_iterations = max.max(1);
        self
    }

    /// Build the workflow graph.
    pub fn build(self) -> Result<BuiltWorkflowGraph<ResearchState>, WorkflowBuildError> {
        let PersonaSteps {
            rewrite_query,
            perform_research,
            reflect,
            final_analysis,
        } = self.steps;

        WorkflowGraph::new()
            .name(self.name)
            .node(nodes::REWRITE_QUERY, rewrite_query)
            .node(nodes::PERFORM_RESEARCH, perform_research)
            .node(nodes::REFLECT, reflect)
            .node(nodes::FINAL_ANALYSIS, final_analysis)
            .entry(nodes::REWRITE_QUERY)
            .edge(nodes::REWRITE_QUERY, nodes::PERFORM_RESEARCH)
            .edge(nodes::PERFORM_RESEARCH, nodes::REFLECT)
            .conditional_edges(
                nodes::REFLECT,
                after_reflect,
                vec![
                    (decisions::COMPLETE, nodes::FINAL_ANALYSIS),
                    (decisions::CONTINUE, nodes::PERFORM_RESEARCH),
                ],
            )
            .edge(nodes::FINAL_ANALYSIS, END)
            .loop_limit(
                nodes::PERFORM_RESEARCH,
                self.max_research_iterations,
                nodes::FINAL_ANALYSIS,
            )
            .build()
    }
}
