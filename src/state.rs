//! Conversation and run state
//!
//! `OverallState` is owned by exactly one in-flight run and passed by
//! mutable reference between pipeline stages. The sources map only grows
//! within a run and the final answer is write-once.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::search::SearchHit;

/// Identifier for one independent conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation message, immutable once appended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// One grounded web source accumulated during research
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Stable citation id (`src-1`, `src-2`, ... in first-seen order)
    pub id: String,
    pub url: String,
    pub title: String,
    /// First snippet seen for this URL (first-write-wins)
    pub snippet: String,
    /// How many search results resolved to this URL
    pub used_count: u32,
}

/// Mutable state for one run of the research state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallState {
    /// Conversation history including prior turns, append-only
    pub messages: Vec<Message>,

    /// Every query issued so far this run, across all rounds
    pub search_queries: Vec<String>,

    /// Accumulated sources keyed by citation id; never shrinks mid-run
    pub sources: HashMap<String, Source>,

    /// Reflection passes completed so far
    pub research_loop_count: u32,

    /// Hard loop bound fixed at run start from the effort level
    pub max_research_loops: u32,

    /// Set exactly once by the finalizer on the terminal transition
    pub final_answer: Option<String>,

    /// Normalized URL -> citation id, for merge dedup
    url_index: HashMap<String, String>,

    next_source_index: u32,
}

impl OverallState {
    /// Create run state from conversation history and the loop bound
    pub fn new(messages: Vec<Message>, max_research_loops: u32) -> Self {
        Self {
            messages,
            search_queries: Vec::new(),
            sources: HashMap::new(),
            research_loop_count: 0,
            max_research_loops,
            final_answer: None,
            url_index: HashMap::new(),
            next_source_index: 0,
        }
    }

    /// The question driving this run (content of the last user message)
    pub fn question(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    /// Append this round's queries to the run history (additive, never
    /// overwrites prior rounds)
    pub fn record_queries(&mut self, queries: &[String]) {
        self.search_queries.extend(queries.iter().cloned());
    }

    /// Merge search hits into the sources map
    ///
    /// Dedup is by normalized URL: a known URL increments `used_count` and
    /// keeps its original snippet; a new URL gets the next citation id.
    /// Returns the ids newly added by this call.
    pub fn merge_hits(&mut self, hits: Vec<SearchHit>) -> Vec<String> {
        let mut new_ids = Vec::new();
        for hit in hits {
            let key = normalize_url(&hit.url);
            if key.is_empty() {
                continue;
            }
            match self.url_index.get(&key) {
                Some(id) => {
                    if let Some(source) = self.sources.get_mut(id) {
                        source.used_count += 1;
                    }
                }
                None => {
                    self.next_source_index += 1;
                    let id = format!("src-{}", self.next_source_index);
                    self.url_index.insert(key, id.clone());
                    self.sources.insert(
                        id.clone(),
                        Source {
                            id: id.clone(),
                            url: hit.url,
                            title: hit.title,
                            snippet: hit.snippet,
                            used_count: 1,
                        },
                    );
                    new_ids.push(id);
                }
            }
        }
        new_ids
    }

    /// Sources in citation-id order, for prompt digests and reports
    pub fn sources_ordered(&self) -> Vec<&Source> {
        let mut ordered: Vec<&Source> = self.sources.values().collect();
        ordered.sort_by_key(|s| {
            s.id.strip_prefix("src-")
                .and_then(|n| n.parse::<u32>().ok())
                .unwrap_or(u32::MAX)
        });
        ordered
    }

    /// Write the final answer; first write wins
    ///
    /// Returns false if an answer was already present (the write is
    /// rejected, not overwritten).
    pub fn set_final_answer(&mut self, answer: String) -> bool {
        if self.final_answer.is_some() {
            return false;
        }
        self.final_answer = Some(answer);
        true
    }

    /// Whether the loop bound has been reached
    pub fn loop_bound_reached(&self) -> bool {
        self.research_loop_count >= self.max_research_loops
    }
}

/// Normalize a URL for dedup: trim, strip the fragment and any trailing
/// slash, lowercase scheme and host
pub(crate) fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
    let stripped = without_fragment.trim_end_matches('/');

    match stripped.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = match rest.split_once('/') {
                Some((h, p)) => (h, Some(p)),
                None => (rest, None),
            };
            let mut normalized = format!("{}://{}", scheme.to_lowercase(), host.to_lowercase());
            if let Some(path) = path {
                normalized.push('/');
                normalized.push_str(path);
            }
            normalized
        }
        None => stripped.to_string(),
    }
}

/// Normalize a query string for dedup: trim, lowercase, collapse runs of
/// whitespace
pub(crate) fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
