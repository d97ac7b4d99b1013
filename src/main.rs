//! # L.A.R.A.
//!
//! Legal Analysis & Research Assistant.
//!
//! Answers legal questions for two audiences: citizens get plain-language
//! guidance, lawyers get a structured memo. Each question is rewritten,
//! researched on the web (Tavily) and optionally in a local document folder,
//! reflected on until the evidence is sufficient, then analysed.
//!
//! ## Quick Start
//! ```bash
//! lara ask --role citizen "Is at-will employment legal in California?"
//! lara chat --role lawyer
//! ```

// =============================================================================
// IMPORTS
// =============================================================================
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lara_graph::{GraphError, Persona, RunOutcome};

use lara_agent::agent::{analysis_text, LegalAssistant};
use lara_agent::config::Config;

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "lara",
    version,
    about = "L.A.R.A. - legal analysis and research assistant for citizens and lawyers",
    long_about = r#"
L.A.R.A. researches a legal question on the web (and optionally in a local
folder of statutes or memos), checks whether the evidence is sufficient,
and writes an answer for the chosen audience.

REQUIRED ENVIRONMENT (or .env):
  TAVILY_API_KEY    web search
  GROQ_API_KEY      hosted LLM (or set LLM_PROVIDER=ollama)

EXAMPLES:
  lara ask "Is at-will employment legal in California?"
  lara ask --role lawyer --thread-id case-17 "Exceptions to at-will employment"
  lara chat --role citizen
"#
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Model to use (overrides LLM_MODEL env var)
    #[arg(short = 'm', long = "model", global = true, env = "LLM_MODEL")]
    model: Option<String>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Answer a single question
    Ask {
        /// Audience: citizen or lawyer
        #[arg(short = 'r', long = "role", default_value = "citizen")]
        role: String,

        /// Conversation thread (a new one is created when omitted)
        #[arg(short = 't', long = "thread-id")]
        thread_id: Option<String>,

        /// The legal question
        #[arg(value_name = "QUERY")]
        query: String,
    },

    /// Interactive session on one thread
    Chat {
        /// Audience: citizen or lawyer
        #[arg(short = 'r', long = "role", default_value = "citizen")]
        role: String,

        /// Conversation thread (a new one is created when omitted)
        #[arg(short = 't', long = "thread-id")]
        thread_id: Option<String>,
    },
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration from environment/.env file
    let mut config = Config::from_env()?;

    init_logging(args.verbose, &config.log_level)?;

    info!("L.A.R.A. starting up...");

    if let Some(model) = args.model {
        info!(model = %model, "Using model from command line");
        config.model = model;
    }

    // Missing keys stop us here, before any question is taken
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        eprintln!("\n❌ {e}");
        return Err(e.into());
    }

    info!(
        provider = %config.provider,
        model = %config.model,
        "Configuration loaded"
    );

    let assistant = LegalAssistant::from_config(&config)?;

    match args.command {
        Command::Ask {
            role,
            thread_id,
            query,
        } => {
            let thread_id = thread_id.unwrap_or_else(new_thread_id);
            match assistant.ask(&role, &query, &thread_id).await {
                Ok(outcome) => present(&outcome),
                Err(e) => {
                    report(&e);
                    return Err(e.into());
                }
            }
        }
        Command::Chat { role, thread_id } => {
            let thread_id = thread_id.unwrap_or_else(new_thread_id);
            chat(&assistant, role, thread_id).await?;
        }
    }

    info!("L.A.R.A. finished");
    Ok(())
}

fn new_thread_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// =============================================================================
// INTERACTIVE SESSION
// =============================================================================
/// One line of chat input
#[derive(Debug, PartialEq)]
enum ChatInput {
    Question(String),
    SwitchRole(String),
    NewThread,
    ListThreads,
    History,
    Retry,
    Quit,
    Empty,
}

fn parse_chat_input(line: &str) -> ChatInput {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }

    match line.split_once(' ').unwrap_or((line, "")) {
        ("/quit" | "/exit", _) => ChatInput::Quit,
        ("/new", _) => ChatInput::NewThread,
        ("/threads", _) => ChatInput::ListThreads,
        ("/history", _) => ChatInput::History,
        ("/retry", _) => ChatInput::Retry,
        ("/role", role) => ChatInput::SwitchRole(role.trim().to_string()),
        _ => ChatInput::Question(line.to_string()),
    }
}

async fn chat(assistant: &LegalAssistant, mut role: String, mut thread_id: String) -> Result<()> {
    println!("L.A.R.A. chat ({role}) on thread {thread_id}");
    println!("Commands: /role <citizen|lawyer>, /new, /threads, /history, /retry, /quit\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{role}> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_chat_input(&line) {
            ChatInput::Empty => continue,
            ChatInput::Quit => break,
            ChatInput::NewThread => {
                thread_id = new_thread_id();
                println!("Started thread {thread_id}");
            }
            ChatInput::ListThreads => {
                for id in assistant.threads().await? {
                    let marker = if id == thread_id { "*" } else { " " };
                    println!("{marker} {id}");
                }
            }
            ChatInput::History => {
                for message in assistant.history(&thread_id).await? {
                    println!("[{:?}] {}", message.role, message.content);
                }
            }
            ChatInput::Retry => match assistant.resume(&thread_id).await {
                Ok(outcome) => present(&outcome),
                Err(e) => report(&e),
            },
            ChatInput::SwitchRole(next) => match next.parse::<Persona>() {
                Ok(persona) => {
                    role = persona.to_string();
                    println!("Role set to {role}");
                }
                Err(e) => eprintln!("❌ {}", e.user_message()),
            },
            ChatInput::Question(query) => match assistant.ask(&role, &query, &thread_id).await {
                Ok(outcome) => present(&outcome),
                Err(e) => report(&e),
            },
        }
    }

    Ok(())
}

// =============================================================================
// OUTPUT
// =============================================================================
fn present(outcome: &RunOutcome) {
    println!("\n{}", "=".repeat(60));
    println!("LEGAL ANALYSIS ({})", outcome.persona);
    println!("{}\n", "=".repeat(60));
    println!("{}", analysis_text(outcome));

    if !outcome.sources.is_empty() {
        println!("\nSources:");
        for (i, source) in outcome.sources.iter().enumerate() {
            println!("  {}. {} - {}", i + 1, source.title, source.url);
        }
    }

    if outcome.best_effort {
        println!(
            "\nNote: research stopped after {} passes; this is a best-effort answer.",
            outcome.research_iterations
        );
    }

    println!("\nThread: {}", outcome.thread_id);
    println!("{}", "=".repeat(60));
}

fn report(e: &GraphError) {
    error!(error = %e, thread_id = ?e.thread_id(), "Request failed");
    eprintln!("\n❌ {}", e.user_message());
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// `--verbose` forces debug; otherwise `RUST_LOG` (or "info") applies.
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
