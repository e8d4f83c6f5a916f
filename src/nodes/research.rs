//! Web Researcher node
//!
//! Fans out one search-provider call per query, each bounded by the
//! per-query timeout. A failed or timed-out query contributes zero
//! sources and never aborts the round; results are merged into state
//! between suspension points (single writer).

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::search::{SearchHit, SearchProvider};
use crate::state::OverallState;

/// Outcome of one research round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    /// Citation ids added to the sources map this round
    pub new_source_ids: Vec<String>,
    /// Queries that timed out or errored (degraded to zero sources)
    pub failed_queries: usize,
}

/// Execute one round of parallel web research and merge the results
pub async fn research_round(
    search: Arc<dyn SearchProvider>,
    state: &mut OverallState,
    queries: &[String],
    query_timeout: Duration,
) -> RoundSummary {
    let tasks = queries.iter().map(|query| {
        let search = Arc::clone(&search);
        let query = query.clone();
        async move {
            match timeout(query_timeout, search.search(&query)).await {
                Ok(Ok(hits)) => {
                    debug!(query = %query, hits = hits.len(), "Search resolved");
                    Some(hits)
                }
                Ok(Err(e)) => {
                    warn!(query = %query, error = %e, "Search failed, contributing zero sources");
                    None
                }
                Err(_) => {
                    warn!(query = %query, timeout_ms = query_timeout.as_millis() as u64,
                        "Search timed out, contributing zero sources");
                    None
                }
            }
        }
    });

    // Join-all semantics: the node does not advance until every query of
    // the round has resolved or timed out.
    let outcomes: Vec<Option<Vec<SearchHit>>> = join_all(tasks).await;

    let mut new_source_ids = Vec::new();
    let mut failed_queries = 0;
    for outcome in outcomes {
        match outcome {
            Some(hits) => new_source_ids.extend(state.merge_hits(hits)),
            None => failed_queries += 1,
        }
    }

    RoundSummary {
        new_source_ids,
        failed_queries,
    }
}
