//! Error types for the research agent
//!
//! Two layers: `ProviderError` for the leaf collaborators (LLM client and
//! search provider) and `AgentError` for stage and run failures surfaced
//! by the orchestrator.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the leaf collaborators (LLM client, search provider)
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request exceeded its deadline
    #[error("request timed out")]
    Timeout,

    /// Could not reach the backend at all
    #[error("connection failed: {0}")]
    Connection(String),

    /// Backend rejected the request for quota reasons
    #[error("rate limited - too many requests")]
    RateLimited,

    /// Credentials missing or rejected
    #[error("unauthorized - check API key")]
    Unauthorized,

    /// Backend returned a non-success status
    #[error("backend error ({0}): {1}")]
    Backend(u16, String),

    /// Response body did not match the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Check if this error is transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout
                | ProviderError::Connection(_)
                | ProviderError::RateLimited
                | ProviderError::Backend(500..=599, _)
        )
    }

    /// Map a reqwest transport error into the taxonomy
    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Connection(e.to_string())
        }
    }

    /// Map a non-success HTTP status into the taxonomy
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ProviderError::Unauthorized,
            429 => ProviderError::RateLimited,
            _ => ProviderError::Backend(status, body),
        }
    }
}

/// Errors that terminate a run or degrade a stage
#[derive(Debug, Error)]
pub enum AgentError {
    /// Query or answer synthesis produced nothing usable
    #[error("generation failed: {0}")]
    Generation(String),

    /// A collaborator call failed inside a non-isolated stage
    #[error("provider failure in {stage}: {source}")]
    Provider {
        stage: &'static str,
        #[source]
        source: ProviderError,
    },

    /// A citation in the final answer does not resolve to a known source.
    /// Recoverable: the finalizer strips the marker instead of failing.
    #[error("citation does not resolve to a known source: {0}")]
    CitationIntegrity(String),

    /// A stage exceeded its per-node deadline
    #[error("node {node} timed out after {timeout:?}")]
    NodeTimeout {
        node: &'static str,
        timeout: Duration,
    },

    /// The whole run exceeded its deadline
    #[error("run timed out after {0:?}")]
    RunTimeout(Duration),

    /// The run was cancelled at a node boundary
    #[error("run cancelled")]
    Cancelled,
}

impl AgentError {
    /// Create a generation error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    /// Wrap a provider error with the stage it occurred in
    pub fn provider(stage: &'static str, source: ProviderError) -> Self {
        Self::Provider { stage, source }
    }

    /// Stable error kind carried in `failed` event payloads
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Generation(_) => "generation",
            AgentError::Provider { .. } => "provider",
            AgentError::CitationIntegrity(_) => "citation_integrity",
            AgentError::NodeTimeout { .. } => "node_timeout",
            AgentError::RunTimeout(_) => "run_timeout",
            AgentError::Cancelled => "cancelled",
        }
    }

    /// Check if the error is recoverable within its stage
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AgentError::CitationIntegrity(_))
    }
}
