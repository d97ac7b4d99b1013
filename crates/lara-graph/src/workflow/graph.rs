//! WorkflowGraph builder DSL.
//!
//! Provides a fluent API for binding steps to nodes, wiring direct and
//! conditional edges and marking loop-limited nodes, then validates the
//! definition into a [`BuiltWorkflowGraph`].

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::error::GraphError;
use crate::state::WorkflowState;
use crate::workflow::node::{NodeId, Step};

/// Sentinel target for terminal edges.
pub const END: &str = "END";

/// Where control goes after a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Node(NodeId),
    End,
}

impl Target {
    fn parse(name: &str) -> Self {
        if name == END {
            Target::End
        } else {
            Target::Node(NodeId::from(name))
        }
    }

    /// The node id, or `None` for END
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            Target::Node(id) => Some(id),
            Target::End => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Target::End)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Node(id) => write!(f, "{id}"),
            Target::End => f.write_str(END),
        }
    }
}

/// Errors that can occur while building a workflow graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowBuildError {
    #[error("workflow entry point not set")]
    NoEntryPoint,
    #[error("unknown node id: {0}")]
    UnknownNode(String),
    #[error("node has no outgoing edge: {0}")]
    MissingEdge(String),
    #[error("node has more than one outgoing edge definition: {0}")]
    DuplicateEdge(String),
}

type RouterFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

enum EdgeSpec<S> {
    Direct(Target),
    Conditional {
        router: RouterFn<S>,
        branches: HashMap<String, Target>,
    },
}

impl<S> Clone for EdgeSpec<S> {
    fn clone(&self) -> Self {
        match self {
            EdgeSpec::Direct(target) => EdgeSpec::Direct(target.clone()),
            EdgeSpec::Conditional { router, branches } => EdgeSpec::Conditional {
                router: Arc::clone(router),
                branches: branches.clone(),
            },
        }
    }
}

impl<S> std::fmt::Debug for EdgeSpec<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeSpec::Direct(target) => write!(f, "Direct({target})"),
            EdgeSpec::Conditional { branches, .. } => {
                f.debug_map().entries(branches.iter()).finish()
            }
        }
    }
}

/// Cap on how often a node may be entered in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopLimit {
    /// Completed executions allowed before the guard triggers
    pub max_visits: usize,
    /// Where a best-effort run goes instead
    pub fallback: Target,
}

/// Builder for constructing workflow graphs with fluent API.
pub struct WorkflowGraph<S: WorkflowState> {
    name: String,
    nodes: HashMap<NodeId, Arc<dyn Step<S>>>,
    edges: Vec<(String, EdgeSpec<S>)>,
    entry_point: Option<String>,
    loop_limits: Vec<(String, usize, String)>,
}

impl<S: WorkflowState> Default for WorkflowGraph<S> {
    fn default() -> Self {
        Self {
            name: String::new(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            entry_point: None,
            loop_limits: Vec::new(),
        }
    }
}

impl<S: WorkflowState> std::fmt::Debug for WorkflowGraph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut nodes: Vec<&NodeId> = self.nodes.keys().collect();
        nodes.sort();
        f.debug_struct("WorkflowGraph")
            .field("name", &self.name)
            .field("nodes", &nodes)
            .field("edges", &self.edges)
            .field("entry_point", &self.entry_point)
            .finish()
    }
}

impl<S: WorkflowState> WorkflowGraph<S> {
    /// Create a new workflow graph builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the workflow name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Bind a step to a node.
    pub fn node(mut self, id: impl Into<NodeId>, step: Arc<dyn Step<S>>) -> Self {
        self.nodes.insert(id.into(), step);
        self
    }

    /// Set the entry point node.
    pub fn entry(mut self, id: impl Into<String>) -> Self {
        self.entry_point = Some(id.into());
        self
    }

    /// Add a direct edge between nodes.
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let to = to.into();
        self.edges.push((from.into(), EdgeSpec::Direct(Target::parse(&to))));
        self
    }

    /// Add conditional edges from a node.
    ///
    /// After `from` runs, `router` maps the merged state to a decision key
    /// which selects one of `branches` (`(decision, target)` pairs).
    pub fn conditional_edges<F>(
        mut self,
        from: impl Into<String>,
        router: F,
        branches: Vec<(&str, &str)>,
    ) -> Self
    where
        F: Fn(&S) -> String + Send + Sync + 'static,
    {
        let branches = branches
            .into_iter()
            .map(|(decision, target)| (decision.to_string(), Target::parse(target)))
            .collect();
        self.edges.push((
            from.into(),
            EdgeSpec::Conditional {
                router: Arc::new(router),
                branches,
            },
        ));
        self
    }

    /// Allow `node` at most `max_visits` completed executions per run;
    /// afterwards the runner applies its loop limit policy, routing to
    /// `fallback` under best effort.
    pub fn loop_limit(
        mut self,
        node: impl Into<String>,
        max_visits: usize,
        fallback: impl Into<String>,
    ) -> Self {
        self.loop_limits
            .push((node.into(), max_visits.max(1), fallback.into()));
        self
    }

    /// Validate and build the workflow graph.
    pub fn build(self) -> Result<BuiltWorkflowGraph<S>, WorkflowBuildError> {
        let entry_point = self.entry_point.ok_or(WorkflowBuildError::NoEntryPoint)?;
        let entry_point = NodeId::from(entry_point);

        if !self.nodes.contains_key(&entry_point) {
            return Err(WorkflowBuildError::UnknownNode(entry_point.0));
        }

        let known = |target: &Target| match target {
            Target::End => true,
            Target::Node(id) => self.nodes.contains_key(id),
        };

        let mut edges: HashMap<NodeId, EdgeSpec<S>> = HashMap::new();
        for (from, spec) in self.edges {
            let from = NodeId::from(from);
            if !self.nodes.contains_key(&from) {
                return Err(WorkflowBuildError::UnknownNode(from.0));
            }
            let targets: Vec<&Target> = match &spec {
                EdgeSpec::Direct(target) => vec![target],
                EdgeSpec::Conditional { branches, .. } => branches.values().collect(),
            };
            if let Some(unknown) = targets.into_iter().find(|target| !known(*target)) {
                return Err(WorkflowBuildError::UnknownNode(unknown.to_string()));
            }
            if edges.contains_key(&from) {
                return Err(WorkflowBuildError::DuplicateEdge(from.0));
            }
            edges.insert(from, spec);
        }

        let mut sorted: Vec<&NodeId> = self.nodes.keys().collect();
        sorted.sort();
        if let Some(dangling) = sorted.into_iter().find(|id| !edges.contains_key(*id)) {
            return Err(WorkflowBuildError::MissingEdge(dangling.0.clone()));
        }

        let mut loop_limits = HashMap::new();
        for (node, max_visits, fallback) in self.loop_limits {
            let node = NodeId::from(node);
            if !self.nodes.contains_key(&node) {
                return Err(WorkflowBuildError::UnknownNode(node.0));
            }
            let fallback = Target::parse(&fallback);
            if !known(&fallback) || fallback.node() == Some(&node) {
                return Err(WorkflowBuildError::UnknownNode(fallback.to_string()));
            }
            loop_limits.insert(node, LoopLimit { max_visits, fallback });
        }

        Ok(BuiltWorkflowGraph {
            name: self.name,
            nodes: self.nodes,
            edges,
            entry_point,
            loop_limits,
        })
    }
}

/// Built workflow graph representation.
pub struct BuiltWorkflowGraph<S: WorkflowState> {
    name: String,
    nodes: HashMap<NodeId, Arc<dyn Step<S>>>,
    edges: HashMap<NodeId, EdgeSpec<S>>,
    entry_point: NodeId,
    loop_limits: HashMap<NodeId, LoopLimit>,
}

impl<S: WorkflowState> Clone for BuiltWorkflowGraph<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            entry_point: self.entry_point.clone(),
            loop_limits: self.loop_limits.clone(),
        }
    }
}

impl<S: WorkflowState> std::fmt::Debug for BuiltWorkflowGraph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltWorkflowGraph")
            .field("name", &self.name)
            .field("entry_point", &self.entry_point)
            .field("edges", &self.edges)
            .field("loop_limits", &self.loop_limits)
            .finish()
    }
}

impl<S: WorkflowState> BuiltWorkflowGraph<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_point(&self) -> &NodeId {
        &self.entry_point
    }

    /// Node ids, sorted
    pub fn node_ids(&self) -> Vec<&NodeId> {
        let mut ids: Vec<&NodeId> = self.nodes.keys().collect();
        ids.sort();
        ids
    }

    /// Step bound to a node
    pub fn step(&self, id: &NodeId) -> Option<&Arc<dyn Step<S>>> {
        self.nodes.get(id)
    }

    pub fn loop_limit(&self, id: &NodeId) -> Option<&LoopLimit> {
        self.loop_limits.get(id)
    }

    /// Resolve the successor of `node` given the state after it ran.
    pub fn next(&self, node: &NodeId, state: &S) -> Result<Target, GraphError> {
        match self.edges.get(node) {
            Some(EdgeSpec::Direct(target)) => Ok(target.clone()),
            Some(EdgeSpec::Conditional { router, branches }) => {
                let decision = router(state);
                branches
                    .get(&decision)
                    .cloned()
                    .ok_or_else(|| GraphError::routing(node.clone(), decision))
            }
            None => Err(GraphError::routing(node.clone(), "no outgoing edge")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;
    use crate::research::{ResearchState, ResearchUpdate};
    use crate::workflow::node::FnStep;

    fn noop() -> Arc<dyn Step<ResearchState>> {
        Arc::new(FnStep::new(|_state: ResearchState| async move {
            Ok::<_, StepError>(ResearchUpdate::default())
        }))
    }

    fn decide(state: &ResearchState) -> String {
        if state.research_complete {
            "done".into()
        } else {
            "again".into()
        }
    }

    #[test]
    fn test_workflow_builder_basic() {
        let workflow = WorkflowGraph::<ResearchState>::new()
            .name("basic")
            .node("start", noop())
            .node("next", noop())
            .entry("start")
            .edge("start", "next")
            .edge("next", END)
            .build()
            .unwrap();

        assert_eq!(workflow.name(), "basic");
        assert_eq!(workflow.entry_point().as_str(), "start");
        assert_eq!(workflow.node_ids().len(), 2);

        let state = ResearchState::default();
        assert_eq!(
            workflow.next(&NodeId::from("start"), &state).unwrap(),
            Target::Node(NodeId::from("next"))
        );
        assert!(workflow.next(&NodeId::from("next"), &state).unwrap().is_end());
    }

    #[test]
    fn test_workflow_builder_missing_entry() {
        let result = WorkflowGraph::<ResearchState>::new()
            .node("start", noop())
            .edge("start", END)
            .build();

        assert_eq!(result.unwrap_err(), WorkflowBuildError::NoEntryPoint);
    }

    #[test]
    fn test_workflow_builder_invalid_edge() {
        let result = WorkflowGraph::<ResearchState>::new()
            .node("start", noop())
            .entry("start")
            .edge("start", "missing")
            .build();

        assert_eq!(
            result.unwrap_err(),
            WorkflowBuildError::UnknownNode("missing".to_string())
        );
    }

    #[test]
    fn test_workflow_builder_missing_edge() {
        let result = WorkflowGraph::<ResearchState>::new()
            .node("start", noop())
            .node("orphan", noop())
            .entry("start")
            .edge("start", END)
            .build();

        assert_eq!(
            result.unwrap_err(),
            WorkflowBuildError::MissingEdge("orphan".to_string())
        );
    }

    #[test]
    fn test_workflow_builder_duplicate_edge() {
        let result = WorkflowGraph::<ResearchState>::new()
            .node("start", noop())
            .node("next", noop())
            .entry("start")
            .edge("start", "next")
            .edge("start", END)
            .edge("next", END)
            .build();

        assert_eq!(
            result.unwrap_err(),
            WorkflowBuildError::DuplicateEdge("start".to_string())
        );
    }

    #[test]
    fn test_workflow_conditional_edges() {
        let workflow = WorkflowGraph::<ResearchState>::new()
            .node("check", noop())
            .node("finish", noop())
            .entry("check")
            .conditional_edges("check", decide, vec![("done", "finish"), ("again", "check")])
            .edge("finish", END)
            .build()
            .unwrap();

        let check = NodeId::from("check");
        let pending = ResearchState::default();
        let complete = ResearchState {
            research_complete: true,
            ..Default::default()
        };

        assert_eq!(workflow.next(&check, &pending).unwrap(), Target::Node(check.clone()));
        assert_eq!(
            workflow.next(&check, &complete).unwrap(),
            Target::Node(NodeId::from("finish"))
        );
    }

    #[test]
    fn test_unknown_decision_is_routing_error() {
        let workflow = WorkflowGraph::<ResearchState>::new()
            .node("check", noop())
            .entry("check")
            .conditional_edges(
                "check",
                |_: &ResearchState| "sideways".to_string(),
                vec![("done", END)],
            )
            .build()
            .unwrap();

        let err = workflow
            .next(&NodeId::from("check"), &ResearchState::default())
            .unwrap_err();
        assert!(matches!(err, GraphError::Routing { ref decision, .. } if decision == "sideways"));
    }

    #[test]
    fn test_loop_limit_validation() {
        let result = WorkflowGraph::<ResearchState>::new()
            .node("loop", noop())
            .entry("loop")
            .edge("loop", "loop")
            .loop_limit("loop", 3, "loop")
            .build();

        assert_eq!(
            result.unwrap_err(),
            WorkflowBuildError::UnknownNode("loop".to_string())
        );

        let workflow = WorkflowGraph::<ResearchState>::new()
            .node("loop", noop())
            .entry("loop")
            .edge("loop", "loop")
            .loop_limit("loop", 0, END)
            .build()
            .unwrap();

        let limit = workflow.loop_limit(&NodeId::from("loop")).unwrap();
        assert_eq!(limit.max_visits, 1);
        assert_eq!(limit.fallback, Target::End);
    }
}
