//! Web search abstraction and the Tavily backend
//!
//! `SearchProvider` executes one query string and returns grounded source
//! snippets with citation metadata. `TavilySearch` implements it against
//! the Tavily Search API with typed errors and retry with exponential
//! backoff on transient failures.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Default timeout for search API requests
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum retry attempts for transient failures
const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 500;

/// One grounded result from a web search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Stateless web search capability
///
/// Safe to call concurrently across threads and within a round's fan-out.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Execute one query and return its grounded hits
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Search depth requested from the Tavily API
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    /// Fast search with basic results
    #[default]
    Basic,
    /// More thorough search with detailed results
    Advanced,
}

impl SearchDepth {
    fn as_str(&self) -> &'static str {
        match self {
            SearchDepth::Basic => "basic",
            SearchDepth::Advanced => "advanced",
        }
    }
}

/// Tavily search client
///
/// # Example
/// ```ignore
/// let search = TavilySearch::new("tvly-...").with_max_results(5);
/// let hits = search.search("rust async runtime").await?;
/// ```
pub struct TavilySearch {
    api_key: String,
    client: Client,
    timeout: Duration,
    max_retries: u32,
    max_results: u32,
    depth: SearchDepth,
    endpoint: String,
}

impl TavilySearch {
    /// Create a client with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: MAX_RETRIES,
            max_results: 5,
            depth: SearchDepth::Basic,
            endpoint: "https://api.tavily.com/search".to_string(),
        }
    }

    /// Create from the `TAVILY_API_KEY` environment variable
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("TAVILY_API_KEY").map_err(|_| {
            ProviderError::Unauthorized
        })?;
        Ok(Self::new(api_key))
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set custom max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set maximum results per query
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.clamp(1, 20);
        self
    }

    /// Set search depth
    pub fn with_depth(mut self, depth: SearchDepth) -> Self {
        self.depth = depth;
        self
    }

    /// Override the API endpoint (used by HTTP tests)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Execute the request with retry and backoff on transient errors
    async fn execute_with_retry(
        &self,
        request: &TavilyRequest<'_>,
    ) -> Result<TavilyResponse, ProviderError> {
        let mut last_error = ProviderError::Connection("no attempts made".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1));
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying search request");
                tokio::time::sleep(delay).await;
            }

            match self.execute_single_request(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    warn!(attempt, error = %e, "Search request failed, will retry");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn execute_single_request(
        &self,
        request: &TavilyRequest<'_>,
    ) -> Result<TavilyResponse, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ProviderError::Malformed(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status(status.as_u16(), body))
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError> {
        let request = TavilyRequest {
            query,
            max_results: self.max_results,
            search_depth: self.depth.as_str(),
        };

        let response = self.execute_with_retry(&request).await?;

        Ok(response
            .results
            .into_iter()
            .map(|r| SearchHit {
                url: r.url,
                title: r.title,
                snippet: r.content,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

/// Request body for the Tavily API
#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: u32,
    search_depth: &'a str,
}

/// Response from the Tavily API
#[derive(Debug, Deserialize)]
struct TavilyResponse {
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    content: String,
}
