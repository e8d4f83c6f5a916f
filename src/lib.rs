//! delver: an iterative web-research agent
//!
//! Given a user question, the agent generates diversified search queries,
//! gathers web evidence in parallel, reflects on whether the evidence is
//! sufficient, loops within a bounded budget, and synthesizes a final
//! answer with inline citations - streaming progress events per
//! conversation thread the whole way.
//!
//! # Architecture
//!
//! ```text
//! submit(thread_id, message, effort)
//!        |
//!        v
//!  ThreadManager ── one worker task + inbox per thread (serialized runs)
//!        |
//!        v
//!  Orchestrator ── GENERATING -> RESEARCHING -> REFLECTING ─┐
//!        |                ^                                 │
//!        |                └──── insufficient & under bound ─┘
//!        v
//!    FINALIZING ── cited answer, terminal event
//! ```
//!
//! The LLM and web-search backends sit behind the narrow [`LlmClient`]
//! and [`SearchProvider`] traits; `OllamaClient` and `TavilySearch` are
//! the bundled implementations.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use delver::{AgentConfig, Effort, OllamaClient, TavilySearch, ThreadManager};
//!
//! let manager = ThreadManager::new(
//!     Arc::new(OllamaClient::from_env()),
//!     Arc::new(TavilySearch::from_env()?),
//!     AgentConfig::default(),
//! );
//!
//! let mut events = manager.submit("thread-1", "What is WASI?", Effort::Medium).await;
//! while let Some(event) = events.recv().await {
//!     println!("{} #{}", event.node_name, event.sequence_number);
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod nodes;
pub mod orchestrator;
pub mod prompts;
pub mod search;
pub mod state;
pub mod threads;

// Re-exports for convenience
pub use config::{AgentConfig, Effort, EffortProfile};
pub use error::{AgentError, ProviderError};
pub use events::{EventEmitter, EventPayload, EventStream, ProgressEvent};
pub use llm::{LlmClient, OllamaClient};
pub use orchestrator::{CancelHandle, Orchestrator, RunOutcome, RunPhase};
pub use search::{SearchDepth, SearchHit, SearchProvider, TavilySearch};
pub use state::{Message, OverallState, Role, Source, ThreadId};
pub use threads::ThreadManager;
