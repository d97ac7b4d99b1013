//! Workflow graph and runner
//!
//! A graph binds one [`Step`] to each node and wires nodes with direct or
//! conditional edges. The [`GraphRunner`] executes it sequentially, merging
//! each step's update into the shared state and checkpointing per thread.
//!
//! # Usage
//!
//! ```ignore
//! use lara_graph::workflow::{GraphRunner, WorkflowGraph, END};
//!
//! let graph = WorkflowGraph::<ResearchState>::new()
//!     .name("research")
//!     .node("research", research_step)
//!     .node("reflect", reflect_step)
//!     .node("answer", answer_step)
//!     .entry("research")
//!     .edge("research", "reflect")
//!     .conditional_edges("reflect", decide, vec![("complete", "answer"), ("continue", "research")])
//!     .loop_limit("research", 3, "answer")
//!     .edge("answer", END)
//!     .build()?;
//!
//! let runner = GraphRunner::new(graph, checkpointer, RunnerConfig::default());
//! let result = runner.run("thread-1", initial_state).await?;
//! ```

pub mod graph;
pub mod node;
pub mod runner;

pub use graph::{BuiltWorkflowGraph, LoopLimit, Target, WorkflowBuildError, WorkflowGraph, END};
pub use node::{FnStep, NodeId, Step};
pub use runner::{GraphRunner, RunResult};
