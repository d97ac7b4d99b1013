//! # Prompts
//!
//! System prompts (preambles) for the LLM-backed steps and the helpers that
//! assemble their user prompts from the research state. Rewriting is shared;
//! reflection and the final analysis have one variant per persona.

use lara_graph::{ChatMessage, ChatRole, Persona, ResearchState};

/// Turns of prior conversation included in a prompt
const HISTORY_TURNS: usize = 6;

// =============================================================================
// SYSTEM PROMPTS
// =============================================================================
pub const REWRITE_PREAMBLE: &str = r#"
You rewrite legal questions into precise web search queries.

Rules:
- Keep the jurisdiction if one is named (state, country, court).
- Replace colloquial wording with the legal terms of art.
- Resolve pronouns using the conversation so far.
- Output ONLY the rewritten query on a single line. No quotes, no commentary.
"#;

const CITIZEN_REFLECT_PREAMBLE: &str = r#"
You review research gathered to answer a member of the public's legal question.
Decide whether the findings are enough to give a clear, practical answer:
what the law says, whether it applies to them, and what they can do next.

Respond with a single JSON object and nothing else:
{"research_complete": true|false, "summary": "<what we know so far>", "follow_up_query": "<next search, or empty>"}
"#;

const LAWYER_REFLECT_PREAMBLE: &str = r#"
You review research gathered for a practising lawyer.
Decide whether the findings cover the governing statutes, the leading case law,
the relevant exceptions and any procedural requirements.

Respond with a single JSON object and nothing else:
{"research_complete": true|false, "summary": "<findings with citations>", "follow_up_query": "<next search, or empty>"}
"#;

const CITIZEN_FINAL_PREAMBLE: &str = r#"
You are L.A.R.A., a legal research assistant speaking to a member of the public.
Write a clear answer in plain language:
- **Short answer** first, in one or two sentences.
- **What the law says**, without jargon.
- **What you can do**: practical next steps.
- **Sources**: the URLs you relied on.
Remind the reader that this is general information, not legal advice.
"#;

const LAWYER_FINAL_PREAMBLE: &str = r#"
You are L.A.R.A., a legal research assistant writing for a practising lawyer.
Produce a structured memo:
- **Issue**
- **Rule**: statutes and controlling case law, with citations.
- **Analysis**: application, exceptions, open questions.
- **Conclusion**
- **Authorities**: the URLs and documents relied on.
Be precise and technical. Flag any authority you could not verify.
"#;

/// Reflection preamble for a persona
pub fn reflect_preamble(persona: Persona) -> &'static str {
    match persona {
        Persona::Citizen => CITIZEN_REFLECT_PREAMBLE,
        Persona::Lawyer => LAWYER_REFLECT_PREAMBLE,
    }
}

/// Final analysis preamble for a persona
pub fn final_preamble(persona: Persona) -> &'static str {
    match persona {
        Persona::Citizen => CITIZEN_FINAL_PREAMBLE,
        Persona::Lawyer => LAWYER_FINAL_PREAMBLE,
    }
}

// =============================================================================
// USER PROMPTS
// =============================================================================
fn history_block(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return "(none)".to_string();
    }

    let start = history.len().saturating_sub(HISTORY_TURNS);
    history[start..]
        .iter()
        .map(|message| {
            let speaker = match message.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
                ChatRole::System => "System",
            };
            format!("{speaker}: {}", message.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn findings_block(state: &ResearchState) -> String {
    let notes: Vec<&str> = state
        .intermediate_steps
        .iter()
        .filter(|record| record.step == lara_graph::research::nodes::REFLECT)
        .map(|record| record.content.as_str())
        .collect();

    let notes = if notes.is_empty() {
        "(none)".to_string()
    } else {
        notes.join("\n- ")
    };

    format!(
        "## Web results\n{}\n\n## Local documents\n{}\n\n## Notes from earlier passes\n- {}",
        state.web_search_results, state.vector_search_results, notes
    )
}

pub fn rewrite_prompt(state: &ResearchState) -> String {
    format!(
        "Conversation so far:\n{}\n\nQuestion: {}",
        history_block(&state.chat_history),
        state.query
    )
}

pub fn reflect_prompt(state: &ResearchState) -> String {
    format!(
        "Question: {}\n\n{}",
        state.user_query,
        findings_block(state)
    )
}

pub fn final_prompt(state: &ResearchState) -> String {
    let caveat = if state.research_complete {
        ""
    } else {
        "\n\nResearch was cut short before it was judged sufficient. Say which points remain uncertain."
    };

    format!(
        "Conversation so far:\n{}\n\nQuestion: {}\nSearch query used: {}\n\n{}{}",
        history_block(&state.chat_history),
        state.user_query,
        state.query,
        findings_block(state),
        caveat
    )
}
