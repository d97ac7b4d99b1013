//! lara-graph: persona-aware research workflow graph
//!
//! The core of the legal research assistant. A query flows through a small
//! directed graph with one conditional loop:
//!
//! ```text
//! rewrite_query ──▶ perform_research ──▶ reflect ──┬──▶ final_analysis ──▶ END
//!                         ▲                        │ complete
//!                         └────────────────────────┘ continue
//! ```
//!
//! - [`state`]: `WorkflowState` trait and the `declare_state!` schema macro
//!   (per-field Overwrite / Append merge strategies)
//! - [`research`]: the research state record, personas and the graph builder
//! - [`workflow`]: generic graph builder and the sequential [`GraphRunner`]
//! - [`checkpoint`]: thread-keyed snapshots, in memory
//! - [`router`]: role dispatch to the two persona runners
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lara_graph::{MemoryCheckpointer, Persona, Router, RunRequest};
//!
//! let checkpointer = Arc::new(MemoryCheckpointer::new());
//! let router = Router::builder(checkpointer)
//!     .persona(Persona::Citizen, citizen_steps)
//!     .persona(Persona::Lawyer, lawyer_steps)
//!     .build()?;
//!
//! let outcome = router
//!     .run(RunRequest::new("citizen", "Is at-will employment legal in California?", "t1"))
//!     .await?;
//! println!("{}", outcome.final_analysis);
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod research;
pub mod router;
pub mod state;
pub mod workflow;

pub use checkpoint::{Checkpoint, Checkpointer, MemoryCheckpointer};
pub use config::{LoopLimitPolicy, RunnerConfig};
pub use error::{GraphError, StepError};
pub use research::{
    ChatMessage, ChatRole, Citation, CitationOrigin, Persona, PersonaSteps, ResearchState,
    ResearchUpdate, ResearchWorkflowBuilder, StepRecord,
};
pub use router::{Router, RouterBuilder, RunOutcome, RunRequest};
pub use state::{Append, FieldSpec, MergeStrategy, Overwrite, Reducer, StateUpdate, WorkflowState};
pub use workflow::{
    BuiltWorkflowGraph, FnStep, GraphRunner, NodeId, RunResult, Step, Target, WorkflowBuildError,
    WorkflowGraph, END,
};
