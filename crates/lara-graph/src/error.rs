//! Error types for the research graph
//!
//! `GraphError` is what callers of the runner and router see. `StepError` is
//! what a bound step implementation returns; the runner wraps it together
//! with the thread id and the failing node.

use thiserror::Error;

use crate::workflow::{NodeId, WorkflowBuildError};

/// Errors raised by the graph runner, the checkpoint store and the router
#[derive(Debug, Error)]
pub enum GraphError {
    /// Required configuration missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Router was given a role it does not recognize
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// A bound step failed; the run was aborted
    #[error("Step '{node}' failed on thread {thread_id}: {source}")]
    StepExecution {
        thread_id: String,
        node: NodeId,
        #[source]
        source: StepError,
    },

    /// No checkpoint exists for the thread
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    /// A conditional edge produced a decision with no matching branch
    #[error("Routing error in {node}: no branch for decision '{decision}'")]
    Routing { node: NodeId, decision: String },

    /// Total node executions exceeded the configured backstop
    #[error("Step limit of {limit} exceeded on thread {thread_id}")]
    StepLimitExceeded { thread_id: String, limit: usize },

    /// A loop-limited node was entered too often under the `Fail` policy
    #[error("Loop limit reached at {node} on thread {thread_id} after {visits} visits")]
    LoopLimitExceeded {
        thread_id: String,
        node: NodeId,
        visits: usize,
    },

    /// Checkpoint store failure
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Graph definition rejected at build time
    #[error(transparent)]
    Build(#[from] WorkflowBuildError),
}

impl GraphError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a step execution error
    pub fn step_execution(
        thread_id: impl Into<String>,
        node: impl Into<NodeId>,
        source: StepError,
    ) -> Self {
        Self::StepExecution {
            thread_id: thread_id.into(),
            node: node.into(),
            source,
        }
    }

    /// Create a routing error
    pub fn routing(node: impl Into<NodeId>, decision: impl Into<String>) -> Self {
        Self::Routing {
            node: node.into(),
            decision: decision.into(),
        }
    }

    /// Create a checkpoint error
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint(message.into())
    }

    /// Thread the error belongs to, when known
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            GraphError::StepExecution { thread_id, .. }
            | GraphError::StepLimitExceeded { thread_id, .. }
            | GraphError::LoopLimitExceeded { thread_id, .. } => Some(thread_id),
            GraphError::ThreadNotFound(thread_id) => Some(thread_id),
            _ => None,
        }
    }

    /// Node whose step implementation failed
    pub fn failed_node(&self) -> Option<&NodeId> {
        match self {
            GraphError::StepExecution { node, .. } => Some(node),
            _ => None,
        }
    }

    /// `ThreadNotFound` means "start fresh", not a failure of the run
    pub fn is_fresh_start(&self) -> bool {
        matches!(self, GraphError::ThreadNotFound(_))
    }

    /// Message safe to show an end user. Never includes state contents.
    pub fn user_message(&self) -> String {
        match self {
            GraphError::Configuration(_) => {
                "The assistant is not configured correctly. Please contact the operator.".into()
            }
            GraphError::UnknownRole(role) => {
                format!("Unknown role '{role}'. Use 'citizen' or 'lawyer'.")
            }
            GraphError::StepExecution {
                thread_id, node, ..
            } => format!(
                "The research step '{node}' failed. You can retry thread '{thread_id}'."
            ),
            GraphError::ThreadNotFound(thread_id) => {
                format!("No conversation found for thread '{thread_id}'.")
            }
            GraphError::StepLimitExceeded { .. } | GraphError::LoopLimitExceeded { .. } => {
                "Research did not converge. Please rephrase your question.".into()
            }
            GraphError::Routing { .. } | GraphError::Checkpoint(_) | GraphError::Build(_) => {
                "An internal error occurred while processing your request.".into()
            }
        }
    }
}

/// Errors returned by step implementations
#[derive(Debug, Error)]
pub enum StepError {
    /// Language model call failed
    #[error("LLM error: {0}")]
    Llm(String),

    /// Web or local search failed
    #[error("Search error: {0}")]
    Search(String),

    /// The step produced output that cannot be used
    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StepError {
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    pub fn search(message: impl Into<String>) -> Self {
        Self::Search(message.into())
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }
}

#[cfg(test)]
mod tests {
    static_assertions::assert_impl_all!(super::GraphError: Send, Sync);
    static_assertions::assert_impl_all!(super::StepError: Send, Sync);
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_step_execution_carries_context() {
        let err =
            GraphError::step_execution("t1", "perform_research", StepError::search("timeout"));

        assert_eq!(err.thread_id(), Some("t1"));
        assert_eq!(err.failed_node().map(NodeId::as_str), Some("perform_research"));
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "Step 'perform_research' failed on thread t1: Search error: timeout"
        );
    }

    #[test]
    fn test_thread_not_found_is_fresh_start() {
        let err = GraphError::ThreadNotFound("t9".into());
        assert!(err.is_fresh_start());
        assert_eq!(err.thread_id(), Some("t9"));
        assert!(!GraphError::UnknownRole("judge".into()).is_fresh_start());
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = GraphError::step_execution(
            "t1",
            "final_analysis",
            StepError::invalid_output("secret prompt text"),
        );
        let message = err.user_message();
        assert!(message.contains("final_analysis"));
        assert!(!message.contains("secret"));

        let err = GraphError::checkpoint("lock poisoned at 0xdeadbeef");
        assert!(!err.user_message().contains("0xdeadbeef"));
    }

    #[test]
    fn test_routing_error() {
        let err = GraphError::routing("reflect", "maybe");
        match err {
            GraphError::Routing { node, decision } => {
                assert_eq!(node.as_str(), "reflect");
                assert_eq!(decision, "maybe");
            }
            _ => panic!("Wrong error type"),
        }
    }

    #[test]
    fn test_step_error_from_anyhow() {
        let err: StepError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, StepError::Other(_)));
        assert_eq!(err.to_string(), "boom");
    }
}
