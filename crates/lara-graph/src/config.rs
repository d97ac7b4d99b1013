//! Graph runner configuration

use serde::{Deserialize, Serialize};

/// What the runner does when a loop-limited node has used up its visits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopLimitPolicy {
    /// Route to the node's fallback target and flag the result as best effort
    #[default]
    BestEffort,
    /// Abort the run with `GraphError::LoopLimitExceeded`
    Fail,
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Maximum node executions per run, across all nodes
    pub max_steps: usize,

    /// Save a checkpoint after every node, not only at completion
    pub checkpoint_each_step: bool,

    /// Behaviour when a loop limit is reached
    pub loop_limit_policy: LoopLimitPolicy,

    /// Emit per-node debug events
    pub tracing_enabled: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            checkpoint_each_step: true,
            loop_limit_policy: LoopLimitPolicy::default(),
            tracing_enabled: true,
        }
    }
}

impl RunnerConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the step backstop
    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max.max(1);
        self
    }

    /// Enable or disable per-step checkpoints
    pub fn with_checkpoint_each_step(mut self, enabled: bool) -> Self {
        self.checkpoint_each_step = enabled;
        self
    }

    /// Set the loop limit policy
    pub fn with_loop_limit_policy(mut self, policy: LoopLimitPolicy) -> Self {
        self.loop_limit_policy = policy;
        self
    }

    /// Enable or disable tracing
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.tracing_enabled = enabled;
        self
    }
}
