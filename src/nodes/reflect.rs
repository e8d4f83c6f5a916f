//! Reflector node
//!
//! Judges whether the accumulated sources answer the question and decides
//! between another research round and finalization. Increments the loop
//! counter by exactly one per invocation; once the counter reaches the
//! bound, sufficiency is forced without consulting the model.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::AgentError;
use crate::events::node;
use crate::llm::LlmClient;
use crate::prompts::{reflection_schema, AgentPrompts};
use crate::state::{normalize_query, OverallState};

/// The reflector's loop decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reflection {
    pub sufficient: bool,
    /// Deduped follow-up queries; empty when sufficient
    pub follow_up_queries: Vec<String>,
    /// True when the loop bound forced the decision
    pub forced: bool,
}

#[derive(Debug, Deserialize)]
struct ReflectionVerdict {
    sufficient: bool,
    #[serde(default)]
    follow_up_queries: Vec<String>,
}

/// Run one reflection pass over the accumulated research
pub async fn reflect(
    llm: Arc<dyn LlmClient>,
    state: &mut OverallState,
    queries_per_round: usize,
    node_timeout: Duration,
) -> Result<Reflection, AgentError> {
    // One increment per invocation, before any outcome is known.
    state.research_loop_count += 1;

    if state.loop_bound_reached() {
        info!(
            loop_count = state.research_loop_count,
            max_loops = state.max_research_loops,
            "Loop bound reached, forcing sufficiency"
        );
        return Ok(Reflection {
            sufficient: true,
            follow_up_queries: Vec::new(),
            forced: true,
        });
    }

    let sources = state.sources_ordered();
    let prompt = AgentPrompts::reflection(state.question(), &sources, &state.search_queries);
    let schema = reflection_schema();

    let value = timeout(node_timeout, llm.complete_structured(&prompt, &schema))
        .await
        .map_err(|_| AgentError::NodeTimeout {
            node: node::REFLECT,
            timeout: node_timeout,
        })?
        .map_err(|e| AgentError::provider(node::REFLECT, e))?;

    let verdict: ReflectionVerdict = serde_json::from_value(value)
        .map_err(|e| AgentError::generation(format!("unparsable reflection: {}", e)))?;

    if verdict.sufficient {
        debug!(loop_count = state.research_loop_count, "Research judged sufficient");
        return Ok(Reflection {
            sufficient: true,
            follow_up_queries: Vec::new(),
            forced: false,
        });
    }

    let follow_ups = dedup_follow_ups(
        verdict.follow_up_queries,
        &state.search_queries,
        queries_per_round,
    );

    if follow_ups.is_empty() {
        // Best-effort dedup left nothing new to search; re-running
        // identical queries cannot close the gap, so proceed to finalize.
        info!(
            loop_count = state.research_loop_count,
            "All follow-up queries duplicate issued queries, proceeding to finalize"
        );
        return Ok(Reflection {
            sufficient: true,
            follow_up_queries: Vec::new(),
            forced: false,
        });
    }

    debug!(
        loop_count = state.research_loop_count,
        follow_ups = follow_ups.len(),
        "Research judged insufficient"
    );
    state.record_queries(&follow_ups);
    Ok(Reflection {
        sufficient: false,
        follow_up_queries: follow_ups,
        forced: false,
    })
}

/// Drop blanks and queries already issued this run (normalized text), and
/// truncate to the round cap
fn dedup_follow_ups(raw: Vec<String>, issued: &[String], cap: usize) -> Vec<String> {
    let mut seen: Vec<String> = issued.iter().map(|q| normalize_query(q)).collect();
    let mut follow_ups = Vec::new();
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
        follow_ups.push(trimmed.to_string());
        if follow_ups.len() == cap {
            break;
        }
    }
    follow_ups
}
