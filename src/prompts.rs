//! Prompt templates for the research pipeline
//!
//! One template per LLM-backed stage: query writing, reflection, and
//! answer synthesis. Structured stages spell out the exact JSON shape the
//! schema-constrained completion must produce.

use chrono::Utc;

use crate::state::{Message, Role, Source};

/// Prompt templates for the research pipeline stages
pub struct AgentPrompts;

impl AgentPrompts {
    /// Get the current date formatted for prompts
    fn current_date() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    /// Query-writer prompt: produce up to `count` diversified queries
    pub fn query_writer(messages: &[Message], count: usize) -> String {
        format!(
            r#"# Search Query Writer

For context, today's date is {date}.

You generate web search queries for a research assistant. Given the
conversation below, write up to {count} search queries that together cover
the distinct facets of the user's latest question.

## Rules

- Each query targets a different facet; no near-duplicates
- Prefer specific, self-contained queries over vague ones
- Use the conversation to resolve pronouns and implicit context

## Conversation

{conversation}

## Output

Respond with a JSON object: {{"queries": ["...", "..."]}}
"#,
            date = Self::current_date(),
            count = count,
            conversation = Self::transcript(messages),
        )
    }

    /// Reflection prompt: judge sufficiency of accumulated sources
    pub fn reflection(question: &str, sources: &[&Source], issued_queries: &[String]) -> String {
        format!(
            r#"# Research Sufficiency Check

For context, today's date is {date}.

You evaluate whether the sources gathered so far adequately answer a
research question. If they do not, propose follow-up search queries that
close the specific gaps.

## Question

{question}

## Queries already issued

{queries}

## Gathered sources

{digest}

## Rules

- Mark sufficient only if the sources can support a complete, grounded answer
- Follow-up queries must target missing information, not repeat issued queries
- Propose at most 3 follow-up queries

## Output

Respond with a JSON object:
{{"sufficient": true|false, "follow_up_queries": ["...", "..."]}}
"#,
            date = Self::current_date(),
            question = question,
            queries = Self::query_list(issued_queries),
            digest = Self::source_digest(sources),
        )
    }

    /// Answer prompt: synthesize a cited answer from the gathered sources
    pub fn answer(messages: &[Message], sources: &[&Source]) -> String {
        format!(
            r#"# Research Answer Writer

For context, today's date is {date}.

Write the final answer to the user's latest question using only the
sources below.

## Conversation

{conversation}

## Sources

{digest}

## Rules

- Cite inline with the source id in square brackets, e.g. [src-1]
- Only cite ids that appear in the source list; never invent ids
- Write in paragraph form as a professional report, no meta-commentary
- If the sources conflict, say so and cite both sides
"#,
            date = Self::current_date(),
            conversation = Self::transcript(messages),
            digest = Self::source_digest(sources),
        )
    }

    /// Render sources as an id-labeled digest for prompts
    pub fn source_digest(sources: &[&Source]) -> String {
        if sources.is_empty() {
            return "(no sources gathered yet)".to_string();
        }
        sources
            .iter()
            .map(|s| format!("[{}] {} ({})\n{}", s.id, s.title, s.url, s.snippet))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn transcript(messages: &[Message]) -> String {
        if messages.is_empty() {
            return "(empty)".to_string();
        }
        messages
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                format!("{}: {}", speaker, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn query_list(queries: &[String]) -> String {
        if queries.is_empty() {
            return "(none)".to_string();
        }
        queries
            .iter()
            .map(|q| format!("- {}", q))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// JSON schema for the query-writer structured completion
pub fn query_writer_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "queries": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["queries"]
    })
}

/// JSON schema for the reflection structured completion
pub fn reflection_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "sufficient": { "type": "boolean" },
            "follow_up_queries": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["sufficient", "follow_up_queries"]
    })
}
