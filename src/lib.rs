//! # lara-agent
//!
//! The application half of L.A.R.A.: everything that talks to the outside
//! world. The research graph itself lives in the `lara-graph` crate; this
//! crate supplies the step implementations it runs.
//!
//! - [`config`]: environment / `.env` settings and fail-fast validation
//! - [`llm`]: the [`llm::TextModel`] seam over rig-core (Groq, Ollama)
//! - [`tools`]: Tavily web search with retry and typed errors
//! - [`index`]: local TF-IDF index over a folder of documents
//! - [`prompts`]: preambles and prompt assembly per persona
//! - [`steps`]: the four graph steps and their persona bindings
//! - [`agent`]: [`agent::LegalAssistant`], which wires it all together

pub mod agent;
pub mod config;
pub mod index;
pub mod llm;
pub mod prompts;
pub mod steps;
pub mod tools;
