//! Sequential graph runner with checkpointing
//!
//! Executes one node at a time from the entry point until END:
//!
//! 1. Loop guard: a loop-limited node that used up its visits is replaced by
//!    its fallback (best effort) or aborts the run (fail)
//! 2. Backstop: total node executions are bounded by `max_steps`
//! 3. The bound step runs against the current state; its update is merged
//! 4. The outgoing edge is resolved against the merged state
//! 5. A checkpoint records the state and the next node
//!
//! A failing step aborts the run. The last checkpoint still points at the
//! failed node, so [`GraphRunner::resume`] can retry from there.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, Checkpointer, META_LOOP_LIMITED};
use crate::config::{LoopLimitPolicy, RunnerConfig};
use crate::error::GraphError;
use crate::state::WorkflowState;
use crate::workflow::graph::{BuiltWorkflowGraph, Target};
use crate::workflow::node::NodeId;

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunResult<S> {
    /// Thread the run was keyed by, echoed unchanged
    pub thread_id: String,
    /// Final merged state
    pub state: S,
    /// Node executions performed
    pub steps: usize,
    /// Completed executions per node
    pub visits: HashMap<String, usize>,
    /// True when the loop guard cut a loop short
    pub loop_limited: bool,
}

impl<S> RunResult<S> {
    /// Completed executions of one node
    pub fn visits_of(&self, node: &str) -> usize {
        self.visits.get(node).copied().unwrap_or(0)
    }
}

/// Mutable bookkeeping for one run
struct Progress<S> {
    run_id: String,
    state: S,
    steps: usize,
    visits: HashMap<String, usize>,
    loop_limited: bool,
}

/// Runs a built graph for any number of threads.
///
/// Runs on different threads are independent; the runner itself holds no
/// per-run state.
pub struct GraphRunner<S: WorkflowState> {
    graph: Arc<BuiltWorkflowGraph<S>>,
    checkpointer: Arc<dyn Checkpointer<S>>,
    config: RunnerConfig,
}

impl<S: WorkflowState> Clone for GraphRunner<S> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            checkpointer: Arc::clone(&self.checkpointer),
            config: self.config.clone(),
        }
    }
}

impl<S: WorkflowState> std::fmt::Debug for GraphRunner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphRunner")
            .field("graph", &self.graph)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: WorkflowState> GraphRunner<S> {
    pub fn new(
        graph: BuiltWorkflowGraph<S>,
        checkpointer: Arc<dyn Checkpointer<S>>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            checkpointer,
            config,
        }
    }

    pub fn graph(&self) -> &BuiltWorkflowGraph<S> {
        &self.graph
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn checkpointer(&self) -> &Arc<dyn Checkpointer<S>> {
        &self.checkpointer
    }

    /// Run the graph from its entry point.
    pub async fn run(
        &self,
        thread_id: impl Into<String>,
        initial_state: S,
    ) -> Result<RunResult<S>, GraphError> {
        let thread_id = thread_id.into();
        let progress = Progress {
            run_id: Uuid::new_v4().to_string(),
            state: initial_state,
            steps: 0,
            visits: HashMap::new(),
            loop_limited: false,
        };

        info!(
            thread_id = %thread_id,
            run_id = %progress.run_id,
            workflow = %self.graph.name(),
            "Starting workflow run"
        );

        let entry = Target::Node(self.graph.entry_point().clone());
        if self.config.checkpoint_each_step {
            self.save(&thread_id, &progress, &entry).await?;
        }

        self.execute(thread_id, progress, entry).await
    }

    /// Continue a thread from its latest checkpoint.
    ///
    /// A thread whose run already reached END returns the stored result
    /// without executing anything.
    pub async fn resume(&self, thread_id: &str) -> Result<RunResult<S>, GraphError> {
        let checkpoint = self
            .checkpointer
            .load(thread_id)
            .await?
            .ok_or_else(|| GraphError::ThreadNotFound(thread_id.to_string()))?;

        let loop_limited = checkpoint.loop_limited();
        let Checkpoint {
            thread_id,
            run_id,
            step,
            state,
            next_node,
            visits,
            ..
        } = checkpoint;

        let progress = Progress {
            run_id,
            state,
            steps: step,
            visits,
            loop_limited,
        };

        match next_node {
            None => {
                debug!(thread_id = %thread_id, "Thread already complete; returning stored state");
                Ok(self.finish(thread_id, progress))
            }
            Some(node) => {
                info!(
                    thread_id = %thread_id,
                    run_id = %progress.run_id,
                    node = %node,
                    step = progress.steps,
                    "Resuming workflow run"
                );
                self.execute(thread_id, progress, Target::Node(node)).await
            }
        }
    }

    async fn execute(
        &self,
        thread_id: String,
        mut progress: Progress<S>,
        start: Target,
    ) -> Result<RunResult<S>, GraphError> {
        let mut current = start;
        let mut closed = false;

        while let Target::Node(requested) = current {
            let Some(node) = self.guard(&thread_id, requested, &mut progress)? else {
                break;
            };

            if progress.steps >= self.config.max_steps {
                return Err(GraphError::StepLimitExceeded {
                    thread_id,
                    limit: self.config.max_steps,
                });
            }

            let step = self
                .graph
                .step(&node)
                .ok_or_else(|| GraphError::routing(node.clone(), "unbound node"))?;

            if self.config.tracing_enabled {
                debug!(
                    thread_id = %thread_id,
                    node = %node,
                    step = progress.steps,
                    "Executing node"
                );
            }

            let update = step.run(&progress.state).await.map_err(|source| {
                GraphError::step_execution(thread_id.clone(), node.clone(), source)
            })?;

            progress.state = progress.state.apply_update(update);
            progress.steps += 1;
            *progress.visits.entry(node.to_string()).or_insert(0) += 1;

            let next = self.graph.next(&node, &progress.state)?;

            if self.config.tracing_enabled {
                debug!(thread_id = %thread_id, from = %node, to = %next, "Routed");
            }

            if self.config.checkpoint_each_step {
                self.save(&thread_id, &progress, &next).await?;
                closed = next == Target::End;
            }

            current = next;
        }

        // Reached END by routing (already saved) or through a loop guard
        // whose fallback is END (not yet saved)
        if !closed {
            self.save(&thread_id, &progress, &Target::End).await?;
        }

        info!(
            thread_id = %thread_id,
            run_id = %progress.run_id,
            steps = progress.steps,
            loop_limited = progress.loop_limited,
            "Workflow run complete"
        );

        Ok(self.finish(thread_id, progress))
    }

    /// Apply the loop limit of `node`, returning the node to execute, or
    /// `None` when the fallback is END.
    fn guard(
        &self,
        thread_id: &str,
        node: NodeId,
        progress: &mut Progress<S>,
    ) -> Result<Option<NodeId>, GraphError> {
        let Some(limit) = self.graph.loop_limit(&node) else {
            return Ok(Some(node));
        };

        let visits = progress.visits.get(node.as_str()).copied().unwrap_or(0);
        if visits < limit.max_visits {
            return Ok(Some(node));
        }

        let exceeded = || GraphError::LoopLimitExceeded {
            thread_id: thread_id.to_string(),
            node: node.clone(),
            visits,
        };

        if self.config.loop_limit_policy == LoopLimitPolicy::Fail {
            warn!(thread_id = %thread_id, node = %node, visits, "Loop limit reached; failing run");
            return Err(exceeded());
        }

        warn!(
            thread_id = %thread_id,
            node = %node,
            visits,
            fallback = %limit.fallback,
            "Loop limit reached; continuing with best effort"
        );
        progress.loop_limited = true;

        match &limit.fallback {
            Target::End => Ok(None),
            Target::Node(fallback) => {
                // A fallback that is itself exhausted cannot make progress
                let fallback_exhausted = self.graph.loop_limit(fallback).is_some_and(|l| {
                    progress.visits.get(fallback.as_str()).copied().unwrap_or(0) >= l.max_visits
                });
                if fallback_exhausted {
                    return Err(exceeded());
                }
                Ok(Some(fallback.clone()))
            }
        }
    }

    async fn save(
        &self,
        thread_id: &str,
        progress: &Progress<S>,
        next: &Target,
    ) -> Result<(), GraphError> {
        let mut checkpoint = Checkpoint::new(
            thread_id,
            progress.run_id.clone(),
            progress.steps,
            progress.state.clone(),
            next.node().cloned(),
            progress.visits.clone(),
        );
        if progress.loop_limited {
            checkpoint = checkpoint.with_metadata(META_LOOP_LIMITED, "true");
        }
        self.checkpointer.save(&checkpoint).await
    }

    fn finish(&self, thread_id: String, progress: Progress<S>) -> RunResult<S> {
        RunResult {
            thread_id,
            state: progress.state,
            steps: progress.steps,
            visits: progress.visits,
            loop_limited: progress.loop_limited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointer;
    use crate::error::StepError;
    use crate::research::{ResearchState, ResearchUpdate, StepRecord};
    use crate::workflow::graph::{WorkflowGraph, END};
    use crate::workflow::node::{FnStep, Step};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(name: &'static str) -> Arc<dyn Step<ResearchState>> {
        Arc::new(FnStep::new(move |_state: ResearchState| async move {
            Ok::<_, StepError>(
                ResearchUpdate::default().intermediate_steps(vec![StepRecord::new(name, "ran")]),
            )
        }))
    }

    fn looping_graph(max_visits: usize) -> BuiltWorkflowGraph<ResearchState> {
        WorkflowGraph::new()
            .name("loop")
            .node("work", record("work"))
            .node("done", record("done"))
            .entry("work")
            .edge("work", "work")
            .edge("done", END)
            .loop_limit("work", max_visits, "done")
            .build()
            .unwrap()
    }

    fn runner(
        graph: BuiltWorkflowGraph<ResearchState>,
        config: RunnerConfig,
    ) -> (GraphRunner<ResearchState>, Arc<MemoryCheckpointer<ResearchState>>) {
        let checkpointer = Arc::new(MemoryCheckpointer::new());
        let runner = GraphRunner::new(graph, checkpointer.clone(), config);
        (runner, checkpointer)
    }

    #[tokio::test]
    async fn test_linear_run_writes_completed_checkpoint() {
        let graph = WorkflowGraph::new()
            .node("a", record("a"))
            .node("b", record("b"))
            .entry("a")
            .edge("a", "b")
            .edge("b", END)
            .build()
            .unwrap();
        let (runner, checkpointer) = runner(graph, RunnerConfig::default());

        let result = runner.run("t1", ResearchState::default()).await.unwrap();

        assert_eq!(result.thread_id, "t1");
        assert_eq!(result.steps, 2);
        let names: Vec<&str> = result
            .state
            .intermediate_steps
            .iter()
            .map(|s| s.step.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        let checkpoint = checkpointer.load("t1").await.unwrap().unwrap();
        assert!(checkpoint.is_complete());
        assert_eq!(checkpoint.state, result.state);
    }

    #[tokio::test]
    async fn test_loop_limit_best_effort_routes_to_fallback() {
        let (runner, _) = runner(looping_graph(3), RunnerConfig::default());

        let result = runner.run("t1", ResearchState::default()).await.unwrap();

        assert!(result.loop_limited);
        assert_eq!(result.visits_of("work"), 3);
        assert_eq!(result.visits_of("done"), 1);
    }

    #[tokio::test]
    async fn test_loop_limit_to_end_saves_completed_checkpoint() {
        let graph = WorkflowGraph::new()
            .node("work", record("work"))
            .entry("work")
            .edge("work", "work")
            .loop_limit("work", 2, END)
            .build()
            .unwrap();
        let (runner, checkpointer) = runner(graph, RunnerConfig::default());

        let result = runner.run("t1", ResearchState::default()).await.unwrap();
        assert!(result.loop_limited);
        assert_eq!(result.visits_of("work"), 2);

        let checkpoint = checkpointer.load("t1").await.unwrap().unwrap();
        assert!(checkpoint.is_complete());
        assert!(checkpoint.loop_limited());
        assert_eq!(checkpoint.step, 2);

        let resumed = runner.resume("t1").await.unwrap();
        assert_eq!(resumed.steps, 2);
        assert!(resumed.loop_limited);
    }

    #[tokio::test]
    async fn test_loop_limit_fail_policy() {
        let config = RunnerConfig::default().with_loop_limit_policy(LoopLimitPolicy::Fail);
        let (runner, _) = runner(looping_graph(2), config);

        let err = runner.run("t1", ResearchState::default()).await.unwrap_err();

        match err {
            GraphError::LoopLimitExceeded { thread_id, node, visits } => {
                assert_eq!(thread_id, "t1");
                assert_eq!(node.as_str(), "work");
                assert_eq!(visits, 2);
            }
            other => panic!("Wrong error type: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_step_limit_backstop() {
        let graph = WorkflowGraph::new()
            .node("spin", record("spin"))
            .entry("spin")
            .edge("spin", "spin")
            .build()
            .unwrap();
        let (runner, _) = runner(graph, RunnerConfig::default().with_max_steps(5));

        let err = runner.run("t1", ResearchState::default()).await.unwrap_err();
        assert!(matches!(err, GraphError::StepLimitExceeded { limit: 5, .. }));
    }

    #[tokio::test]
    async fn test_failed_step_can_be_resumed() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let flaky: Arc<dyn Step<ResearchState>> =
            Arc::new(FnStep::new(move |_state: ResearchState| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(StepError::search("connection reset"))
                    } else {
                        Ok(ResearchUpdate::default().final_analysis("ok"))
                    }
                }
            }));

        let graph = WorkflowGraph::new()
            .node("first", record("first"))
            .node("flaky", flaky)
            .entry("first")
            .edge("first", "flaky")
            .edge("flaky", END)
            .build()
            .unwrap();
        let (runner, checkpointer) = runner(graph, RunnerConfig::default());

        let err = runner.run("t1", ResearchState::default()).await.unwrap_err();
        assert_eq!(err.thread_id(), Some("t1"));
        assert_eq!(err.failed_node().map(NodeId::as_str), Some("flaky"));

        let pending = checkpointer.load("t1").await.unwrap().unwrap();
        assert_eq!(pending.next_node, Some(NodeId::from("flaky")));

        let result = runner.resume("t1").await.unwrap();
        assert_eq!(result.state.final_analysis, "ok");
        assert_eq!(result.visits_of("first"), 1);
        assert_eq!(result.steps, 2);
    }

    #[tokio::test]
    async fn test_resume_unknown_thread() {
        let (runner, _) = runner(looping_graph(1), RunnerConfig::default());
        let err = runner.resume("missing").await.unwrap_err();
        assert!(err.is_fresh_start());
    }

    #[tokio::test]
    async fn test_resume_completed_thread_returns_stored_state() {
        let (runner, _) = runner(looping_graph(1), RunnerConfig::default());
        let first = runner.run("t1", ResearchState::default()).await.unwrap();

        let resumed = runner.resume("t1").await.unwrap();
        assert_eq!(resumed.state, first.state);
        assert_eq!(resumed.steps, first.steps);
        assert!(resumed.loop_limited);
    }

    #[tokio::test]
    async fn test_final_checkpoint_only_mode() {
        let config = RunnerConfig::default().with_checkpoint_each_step(false);
        let (runner, checkpointer) = runner(looping_graph(2), config);

        runner.run("t1", ResearchState::default()).await.unwrap();

        let checkpoint = checkpointer.load("t1").await.unwrap().unwrap();
        assert!(checkpoint.is_complete());
        assert_eq!(checkpoint.step, 3);
    }
}
