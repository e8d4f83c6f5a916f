//! Answer Finalizer node
//!
//! Synthesizes the final cited answer from the accumulated sources.
//! Citation markers that do not resolve to a known source are stripped
//! (with a warning) rather than failing the run; the surviving text is
//! written once into `final_answer`.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::time::timeout;
use tracing::warn;

use crate::error::AgentError;
use crate::events::node;
use crate::llm::LlmClient;
use crate::prompts::AgentPrompts;
use crate::state::OverallState;

/// Synthesize, verify citations, and write the final answer
pub async fn finalize_answer(
    llm: Arc<dyn LlmClient>,
    state: &mut OverallState,
    node_timeout: Duration,
) -> Result<String, AgentError> {
    let sources = state.sources_ordered();
    let prompt = AgentPrompts::answer(&state.messages, &sources);

    let raw = timeout(node_timeout, llm.complete(&prompt))
        .await
        .map_err(|_| AgentError::NodeTimeout {
            node: node::FINALIZE,
            timeout: node_timeout,
        })?
        .map_err(|e| AgentError::provider(node::FINALIZE, e))?;

    if raw.trim().is_empty() {
        return Err(AgentError::generation("model returned an empty answer"));
    }

    let answer = scrub_citations(&raw, state);

    if !state.set_final_answer(answer.clone()) {
        warn!("Final answer was already set, keeping the first write");
    }
    Ok(answer)
}

/// Strip citation markers that do not resolve to a known source id
///
/// Each dangling marker is a recoverable `CitationIntegrityError`: the
/// answer is emitted without it instead of failing the run.
fn scrub_citations(answer: &str, state: &OverallState) -> String {
    // Leading whitespace is swallowed with the marker so stripping does
    // not leave a double space before punctuation.
    let citation = Regex::new(r"\s?\[(src-\d+)\]").expect("citation pattern is valid");

    citation
        .replace_all(answer, |caps: &regex::Captures| {
            let id = &caps[1];
            if state.sources.contains_key(id) {
                caps[0].to_string()
            } else {
                let err = AgentError::CitationIntegrity(id.to_string());
                warn!(citation = id, error = %err, "Stripping dangling citation");
                String::new()
            }
        })
        .into_owned()
}
