//! Node identifiers and the step abstraction bound to each node

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::marker::PhantomData;

use crate::error::StepError;
use crate::state::WorkflowState;

/// Unique identifier for a node in a workflow graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a new NodeId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Work bound to a graph node.
///
/// A step reads the current state and returns a partial update; it never
/// mutates the state itself. The runner merges the update before routing.
#[async_trait]
pub trait Step<S: WorkflowState>: Send + Sync {
    async fn run(&self, state: &S) -> Result<S::Update, StepError>;
}

/// Adapter turning an async closure into a [`Step`].
///
/// The closure receives an owned clone of the state.
///
/// ```ignore
/// let step = FnStep::new(|state: ResearchState| async move {
///     Ok(ResearchUpdate::default().query(state.user_query.trim()))
/// });
/// ```
pub struct FnStep<S, F> {
    func: F,
    _state: PhantomData<fn() -> S>,
}

impl<S, F> FnStep<S, F> {
    pub fn new(func: F) -> Self {
        Self {
            func,
            _state: PhantomData,
        }
    }
}

#[async_trait]
impl<S, F, Fut> Step<S> for FnStep<S, F>
where
    S: WorkflowState,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S::Update, StepError>> + Send,
{
    async fn run(&self, state: &S) -> Result<S::Update, StepError> {
        (self.func)(state.clone()).await
    }
}

impl<S, F> std::fmt::Debug for FnStep<S, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::{ResearchState, ResearchUpdate};

    #[test]
    fn test_node_id() {
        let id = NodeId::new("reflect");
        assert_eq!(id.as_str(), "reflect");
        assert_eq!(id, NodeId::from("reflect"));
        assert_eq!(id.to_string(), "reflect");
    }

    #[tokio::test]
    async fn test_fn_step_runs_closure() {
        let step = FnStep::new(|state: ResearchState| async move {
            Ok::<_, StepError>(ResearchUpdate::default().query(state.user_query.to_uppercase()))
        });

        let state = ResearchState {
            user_query: "tenant rights".into(),
            ..Default::default()
        };
        let update = step.run(&state).await.unwrap();

        assert_eq!(update.query.as_deref(), Some("TENANT RIGHTS"));
    }

    #[tokio::test]
    async fn test_fn_step_propagates_error() {
        let step = FnStep::new(|_state: ResearchState| async move {
            Err::<ResearchUpdate, _>(StepError::llm("rate limited"))
        });

        let err = step.run(&ResearchState::default()).await.unwrap_err();
        assert!(matches!(err, StepError::Llm(_)));
    }
}
