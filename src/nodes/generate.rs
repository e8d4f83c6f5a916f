//! Query Generator node
//!
//! Turns the conversation into 1..`queries_per_round` distinct search
//! queries via a structured completion. Produced queries are appended to
//! the run's query history; an empty or unparsable result aborts the run.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::timeout;
use tracing::debug;

use crate::error::AgentError;
use crate::events::node;
use crate::llm::LlmClient;
use crate::prompts::{query_writer_schema, AgentPrompts};
use crate::state::{normalize_query, OverallState};

#[derive(Debug, Deserialize)]
struct GeneratedQueries {
    queries: Vec<String>,
}

/// Generate this round's search queries and record them in state
pub async fn generate_queries(
    llm: Arc<dyn LlmClient>,
    state: &mut OverallState,
    queries_per_round: usize,
    node_timeout: Duration,
) -> Result<Vec<String>, AgentError> {
    let prompt = AgentPrompts::query_writer(&state.messages, queries_per_round);
    let schema = query_writer_schema();

    let value = timeout(node_timeout, llm.complete_structured(&prompt, &schema))
        .await
        .map_err(|_| AgentError::NodeTimeout {
            node: node::GENERATE,
            timeout: node_timeout,
        })?
        .map_err(|e| AgentError::provider(node::GENERATE, e))?;

    let generated: GeneratedQueries = serde_json::from_value(value)
        .map_err(|e| AgentError::generation(format!("unparsable query list: {}", e)))?;

    let queries = sanitize_queries(generated.queries, queries_per_round);
    if queries.is_empty() {
        return Err(AgentError::generation("model returned no usable queries"));
    }

    debug!(count = queries.len(), "Generated search queries");
    state.record_queries(&queries);
    Ok(queries)
}

/// Trim, drop blanks, dedup by normalized text, truncate to the round cap
fn sanitize_queries(raw: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen = Vec::new();
    let mut queries = Vec::new();
    for query in raw {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = normalize_query(trimmed);
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        queries.push(trimmed.to_string());
        if queries.len() == cap {
            break;
        }
    }
    queries
}
