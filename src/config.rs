//! Agent configuration
//!
//! Effort levels bound research depth and breadth; `AgentConfig` carries
//! the timeout budget for nodes and individual search queries.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Research effort level supplied at submit time
///
/// Each level maps to a fixed `(max_research_loops, queries_per_round)`
/// pair; the mapping is immutable for the life of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    /// One loop, one query per round
    Low,
    /// Three loops, three queries per round
    #[default]
    Medium,
    /// Five loops, five queries per round
    High,
}

impl Effort {
    /// Numeric bounds for this effort level
    pub fn profile(&self) -> EffortProfile {
        match self {
            Effort::Low => EffortProfile {
                max_research_loops: 1,
                queries_per_round: 1,
            },
            Effort::Medium => EffortProfile {
                max_research_loops: 3,
                queries_per_round: 3,
            },
            Effort::High => EffortProfile {
                max_research_loops: 5,
                queries_per_round: 5,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Effort::Low => "low",
            Effort::Medium => "medium",
            Effort::High => "high",
        }
    }
}

impl std::str::FromStr for Effort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Effort::Low),
            "medium" => Ok(Effort::Medium),
            "high" => Ok(Effort::High),
            other => Err(format!("unknown effort level: {}", other)),
        }
    }
}

/// Numeric bounds derived from an effort level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffortProfile {
    /// Hard bound on reflection passes in one run
    pub max_research_loops: u32,
    /// Upper bound on queries generated per round
    pub queries_per_round: usize,
}

/// Runtime configuration for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Timeout for one search-provider call inside the research fan-out
    #[serde(with = "humantime_serde")]
    pub query_timeout: Duration,

    /// Timeout for one generate/reflect/finalize node
    #[serde(with = "humantime_serde")]
    pub node_timeout: Duration,

    /// Maximum search results requested per query
    pub max_results_per_query: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(30),
            node_timeout: Duration::from_secs(120),
            max_results_per_query: 5,
        }
    }
}

impl AgentConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-query search timeout
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Set the per-node timeout
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    /// Set the maximum results requested per search query
    pub fn with_max_results_per_query(mut self, max: u32) -> Self {
        self.max_results_per_query = max.max(1);
        self
    }

    /// Run-level deadline for a given effort level
    ///
    /// Covers every research loop plus generation and finalization, so a
    /// run can never outlive `(max_research_loops + 2) * node_timeout`.
    pub fn run_timeout(&self, effort: Effort) -> Duration {
        let rounds = effort.profile().max_research_loops + 2;
        self.node_timeout.saturating_mul(rounds)
    }
}
