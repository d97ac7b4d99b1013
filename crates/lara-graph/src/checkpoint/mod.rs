//! Thread-keyed checkpoint store
//!
//! Each thread id maps to the latest snapshot of its run. Snapshots are taken
//! at node boundaries, so an aborted run can be resumed from the node that
//! failed, and a finished run can seed the next turn of the conversation.
//!
//! ```text
//! thread_id ──▶ Checkpoint { state, next_node, visits, step, ... }
//! ```
//!
//! Only [`MemoryCheckpointer`] ships with the crate. It lives as long as the
//! process does; a durable store plugs in behind the same [`Checkpointer`]
//! trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::GraphError;
use crate::state::WorkflowState;
use crate::workflow::NodeId;

/// Metadata key set when the loop guard redirected the run
pub const META_LOOP_LIMITED: &str = "loop_limited";

/// Snapshot of one thread's run at a node boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<S>
where
    S: WorkflowState,
{
    /// Conversation / run key supplied by the caller
    pub thread_id: String,

    /// Identifier of the run that wrote this snapshot
    pub run_id: String,

    /// Node executions completed so far in this run
    pub step: usize,

    /// State after the last completed node
    pub state: S,

    /// Node to execute next; `None` once the run reached END
    pub next_node: Option<NodeId>,

    /// Completed executions per node
    #[serde(default)]
    pub visits: HashMap<String, usize>,

    /// When this checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Optional metadata for debugging or external tools
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl<S> Checkpoint<S>
where
    S: WorkflowState,
{
    /// Create a new checkpoint
    pub fn new(
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
        step: usize,
        state: S,
        next_node: Option<NodeId>,
        visits: HashMap<String, usize>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            step,
            state,
            next_node,
            visits,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Add metadata to this checkpoint
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// True when the run that wrote this snapshot reached END
    pub fn is_complete(&self) -> bool {
        self.next_node.is_none()
    }

    /// True when the loop guard cut the research loop short
    pub fn loop_limited(&self) -> bool {
        self.metadata
            .get(META_LOOP_LIMITED)
            .is_some_and(|value| value == "true")
    }
}

/// Storage for per-thread checkpoints.
///
/// `save` overwrites the thread's previous snapshot unconditionally. `load`
/// returning `Ok(None)` means the thread was never seen.
#[async_trait]
pub trait Checkpointer<S>: Send + Sync
where
    S: WorkflowState,
{
    /// Save (replace) the snapshot for `checkpoint.thread_id`
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), GraphError>;

    /// Load the latest snapshot for a thread
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, GraphError>;

    /// All thread ids holding a snapshot, in no particular order
    async fn list_thread_ids(&self) -> Result<Vec<String>, GraphError>;

    /// Drop a thread's snapshot. Returns whether one existed.
    async fn delete(&self, thread_id: &str) -> Result<bool, GraphError>;
}

/// In-memory checkpointer.
///
/// Not durable: snapshots vanish with the process. Concurrent calls on
/// different thread ids never observe each other's snapshots.
#[derive(Debug)]
pub struct MemoryCheckpointer<S>
where
    S: WorkflowState,
{
    checkpoints: tokio::sync::RwLock<HashMap<String, Checkpoint<S>>>,
}

impl<S> Default for MemoryCheckpointer<S>
where
    S: WorkflowState,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> MemoryCheckpointer<S>
where
    S: WorkflowState,
{
    /// Create a new in-memory checkpointer
    pub fn new() -> Self {
        Self {
            checkpoints: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Number of threads with a snapshot
    pub async fn len(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkpoints.read().await.is_empty()
    }
}

#[async_trait]
impl<S> Checkpointer<S> for MemoryCheckpointer<S>
where
    S: WorkflowState,
{
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), GraphError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(checkpoint.thread_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, GraphError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(thread_id).cloned())
    }

    async fn list_thread_ids(&self) -> Result<Vec<String>, GraphError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.keys().cloned().collect())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, GraphError> {
        let mut checkpoints = self.checkpoints.write().await;
        Ok(checkpoints.remove(thread_id).is_some())
    }
}
