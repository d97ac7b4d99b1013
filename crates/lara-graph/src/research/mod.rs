//! Research workflow module
//!
//! The legal research pipeline on top of the generic graph:
//!
//! - `state` - `ResearchState` / `ResearchUpdate`, citations, chat turns
//! - `persona` - the two analysis personas
//! - `workflow` - persona step bindings and the graph builder

pub mod persona;
pub mod state;
pub mod workflow;

pub use persona::Persona;
pub use state::{
    ChatMessage, ChatRole, Citation, CitationOrigin, ResearchState, ResearchUpdate, StepRecord,
};
pub use workflow::{decisions, nodes, PersonaSteps, ResearchWorkflowBuilder};
