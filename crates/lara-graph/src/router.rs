//! Role router
//!
//! Owns one [`GraphRunner`] per persona, all sharing one checkpoint store.
//! A request's role is parsed before anything else happens: an unknown role
//! runs no step and writes no checkpoint.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::checkpoint::{Checkpoint, Checkpointer};
use crate::config::RunnerConfig;
use crate::error::GraphError;
use crate::research::{
    nodes, ChatMessage, Citation, Persona, PersonaSteps, ResearchState, ResearchWorkflowBuilder,
};
use crate::workflow::{GraphRunner, RunResult};

/// Inbound request
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub role: String,
    pub query: String,
    pub thread_id: String,
    /// Prior turns. When empty, the thread's last checkpoint supplies them.
    pub chat_history: Vec<ChatMessage>,
}

impl RunRequest {
    pub fn new(
        role: impl Into<String>,
        query: impl Into<String>,
        thread_id: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            query: query.into(),
            thread_id: thread_id.into(),
            chat_history: Vec::new(),
        }
    }

    pub fn with_chat_history(mut self, chat_history: Vec<ChatMessage>) -> Self {
        self.chat_history = chat_history;
        self
    }
}

/// What the caller gets back from a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub final_analysis: String,
    /// Citations deduplicated by URL, in first-seen order
    pub sources: Vec<Citation>,
    /// Echo of the request's thread id
    pub thread_id: String,
    pub persona: Persona,
    /// Research passes performed
    pub research_iterations: usize,
    /// True when the iteration cap ended research before reflection was satisfied
    pub best_effort: bool,
}

impl RunOutcome {
    fn from_result(persona: Persona, result: RunResult<ResearchState>) -> Self {
        Self {
            final_analysis: result.state.final_analysis.clone(),
            sources: result.state.unique_sources(),
            research_iterations: result.visits_of(nodes::PERFORM_RESEARCH),
            best_effort: result.loop_limited,
            thread_id: result.thread_id,
            persona,
        }
    }
}

/// Builder for [`Router`]
pub struct RouterBuilder {
    checkpointer: Arc<dyn Checkpointer<ResearchState>>,
    config: RunnerConfig,
    max_research_iterations: usize,
    personas: HashMap<Persona, PersonaSteps>,
}

impl RouterBuilder {
    /// Runner configuration shared by both personas
    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Research passes per run before falling back to the final analysis
    pub fn max_research_iterations(mut self, max: usize) -> Self {
        self.max_research_iterations = max;
        self
    }

    /// Bind the steps for one persona
    pub fn persona(mut self, persona: Persona, steps: PersonaSteps) -> Self {
        self.personas.insert(persona, steps);
        self
    }

    /// Build one runner per persona. Every persona must be bound.
    pub fn build(mut self) -> Result<Router, GraphError> {
        // rewrite + (research, reflect) per pass + final must fit the backstop
        let needed = self.max_research_iterations.max(1).saturating_mul(2).saturating_add(2);
        if self.config.max_steps < needed {
            debug!(
                max_steps = self.config.max_steps,
                needed,
                "Raising step limit to fit the research iteration cap"
            );
            self.config.max_steps = needed;
        }

        let mut runners = HashMap::new();
        for persona in Persona::ALL {
            let steps = self.personas.remove(&persona).ok_or_else(|| {
                GraphError::configuration(format!("no steps bound for persona '{persona}'"))
            })?;

            let graph = ResearchWorkflowBuilder::new(steps)
                .name(persona.as_str())
                .max_research_iterations(self.max_research_iterations)
                .build()?;

            runners.insert(
                persona,
                GraphRunner::new(graph, Arc::clone(&self.checkpointer), self.config.clone()),
            );
        }

        Ok(Router {
            runners,
            checkpointer: self.checkpointer,
        })
    }
}

/// Dispatches requests to the persona runners
#[derive(Clone)]
pub struct Router {
    runners: HashMap<Persona, GraphRunner<ResearchState>>,
    checkpointer: Arc<dyn Checkpointer<ResearchState>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut personas: Vec<&Persona> = self.runners.keys().collect();
        personas.sort();
        f.debug_struct("Router")
            .field("personas", &personas)
            .finish_non_exhaustive()
    }
}

impl Router {
    pub fn builder(checkpointer: Arc<dyn Checkpointer<ResearchState>>) -> RouterBuilder {
        RouterBuilder {
            checkpointer,
            config: RunnerConfig::default(),
            max_research_iterations: ResearchWorkflowBuilder::DEFAULT_MAX_RESEARCH_ITERATIONS,
            personas: HashMap::new(),
        }
    }

    fn runner(&self, persona: Persona) -> Result<&GraphRunner<ResearchState>, GraphError> {
        self.runners.get(&persona).ok_or_else(|| {
            GraphError::configuration(format!("no runner for persona '{persona}'"))
        })
    }

    /// Run the persona graph selected by `role` and return its final state.
    pub async fn route(
        &self,
        role: &str,
        query: &str,
        thread_id: &str,
    ) -> Result<RunResult<ResearchState>, GraphError> {
        let persona: Persona = role.parse()?;
        info!(persona = %persona, thread_id = %thread_id, "Routing request");

        let state = ResearchState::new(persona, query, Vec::new());
        self.runner(persona)?.run(thread_id, state).await
    }

    /// Full request/response cycle, including multi-turn history.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome, GraphError> {
        let persona: Persona = request.role.parse()?;
        info!(persona = %persona, thread_id = %request.thread_id, "Routing request");

        let chat_history = if request.chat_history.is_empty() {
            self.history_for(&request.thread_id).await?
        } else {
            request.chat_history
        };

        let state = ResearchState::new(persona, request.query, chat_history);
        let result = self
            .runner(persona)?
            .run(request.thread_id, state)
            .await?;

        Ok(RunOutcome::from_result(persona, result))
    }

    /// Continue an interrupted run from its latest checkpoint.
    pub async fn resume(&self, thread_id: &str) -> Result<RunOutcome, GraphError> {
        let checkpoint = self.snapshot(thread_id).await?;
        let persona: Persona = checkpoint.state.role.parse()?;

        let result = self.runner(persona)?.resume(thread_id).await?;
        Ok(RunOutcome::from_result(persona, result))
    }

    /// Latest checkpoint of a thread
    pub async fn snapshot(&self, thread_id: &str) -> Result<Checkpoint<ResearchState>, GraphError> {
        self.checkpointer
            .load(thread_id)
            .await?
            .ok_or_else(|| GraphError::ThreadNotFound(thread_id.to_string()))
    }

    /// Thread ids with a checkpoint, sorted
    pub async fn threads(&self) -> Result<Vec<String>, GraphError> {
        let mut ids = self.checkpointer.list_thread_ids().await?;
        ids.sort();
        Ok(ids)
    }

    /// Conversation so far on a thread; empty for a new thread
    async fn history_for(&self, thread_id: &str) -> Result<Vec<ChatMessage>, GraphError> {
        match self.snapshot(thread_id).await {
            Ok(checkpoint) if checkpoint.is_complete() => {
                debug!(thread_id = %thread_id, "Continuing conversation from checkpoint");
                Ok(checkpoint.state.conversation())
            }
            Ok(checkpoint) => Ok(checkpoint.state.chat_history),
            Err(err) if err.is_fresh_start() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointer;
    use crate::error::StepError;
    use crate::research::ResearchUpdate;
    use crate::workflow::{FnStep, Step};

    fn answer(text: &'static str) -> Arc<dyn Step<ResearchState>> {
        Arc::new(FnStep::new(move |_state: ResearchState| async move {
            Ok::<_, StepError>(
                ResearchUpdate::default()
                    .research_complete(true)
                    .final_analysis(text),
            )
        }))
    }

    fn steps(text: &'static str) -> PersonaSteps {
        PersonaSteps::new(answer(text), answer(text), answer(text), answer(text))
    }

    #[test]
    fn test_build_requires_both_personas() {
        let checkpointer = Arc::new(MemoryCheckpointer::<ResearchState>::new());
        let err = Router::builder(checkpointer)
            .persona(Persona::Citizen, steps("plain"))
            .build()
            .unwrap_err();

        assert!(matches!(err, GraphError::Configuration(ref msg) if msg.contains("lawyer")));
    }

    #[tokio::test]
    async fn test_run_request_echoes_thread_id() {
        let checkpointer = Arc::new(MemoryCheckpointer::<ResearchState>::new());
        let router = Router::builder(checkpointer)
            .persona(Persona::Citizen, steps("plain"))
            .persona(Persona::Lawyer, steps("technical"))
            .build()
            .unwrap();

        let outcome = router
            .run(RunRequest::new("Lawyer", "q", "thread-42"))
            .await
            .unwrap();

        assert_eq!(outcome.thread_id, "thread-42");
        assert_eq!(outcome.persona, Persona::Lawyer);
        assert_eq!(outcome.final_analysis, "technical");
        assert_eq!(outcome.research_iterations, 1);
        assert!(!outcome.best_effort);
        assert_eq!(router.threads().await.unwrap(), vec!["thread-42"]);
    }

    #[tokio::test]
    async fn test_large_iteration_cap_ends_best_effort() {
        let unsatisfied: Arc<dyn Step<ResearchState>> =
            Arc::new(FnStep::new(|_state: ResearchState| async move {
                Ok::<_, StepError>(ResearchUpdate::default())
            }));
        let steps = || {
            PersonaSteps::new(
                unsatisfied.clone(),
                unsatisfied.clone(),
                unsatisfied.clone(),
                answer("partial"),
            )
        };

        let router = Router::builder(Arc::new(MemoryCheckpointer::<ResearchState>::new()))
            .max_research_iterations(60)
            .persona(Persona::Citizen, steps())
            .persona(Persona::Lawyer, steps())
            .build()
            .unwrap();

        let outcome = router
            .run(RunRequest::new("citizen", "q", "t1"))
            .await
            .unwrap();

        assert!(outcome.best_effort);
        assert_eq!(outcome.research_iterations, 60);
        assert_eq!(outcome.final_analysis, "partial");
    }

    #[tokio::test]
    async fn test_snapshot_unknown_thread() {
        let router = Router::builder(Arc::new(MemoryCheckpointer::<ResearchState>::new()))
            .persona(Persona::Citizen, steps("a"))
            .persona(Persona::Lawyer, steps("b"))
            .build()
            .unwrap();

        let err = router.snapshot("nope").await.unwrap_err();
        assert!(err.is_fresh_start());
    }
}
