//! Run orchestration - the research state machine
//!
//! Drives one run through the closed phase sequence
//! `GENERATING -> RESEARCHING -> REFLECTING -> {RESEARCHING | FINALIZING}`,
//! emitting exactly one progress event per completed node and exactly one
//! terminal event per run. Cancellation is cooperative and observed only
//! at node boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::timeout;
use tracing::{error, info};

use crate::config::{AgentConfig, Effort, EffortProfile};
use crate::error::AgentError;
use crate::events::{node, EventEmitter, EventPayload};
use crate::llm::LlmClient;
use crate::nodes::{finalize_answer, generate_queries, reflect, research_round};
use crate::search::SearchProvider;
use crate::state::OverallState;

/// Phases of one run
///
/// A closed set with an explicit transition function; `Finalizing` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Generating,
    Researching,
    Reflecting,
    Finalizing,
}

/// How a run ended; mirrors the terminal event that was emitted
#[derive(Debug)]
pub enum RunOutcome {
    Completed { final_answer: String },
    Failed(AgentError),
    Cancelled,
}

/// Cooperative cancellation flag, checked at node boundaries only
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect after the in-flight node
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Drives runs of the research state machine
///
/// Holds the shared, stateless collaborators; all per-run state lives in
/// the `OverallState` passed into [`Orchestrator::run`].
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchProvider>,
    config: AgentConfig,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn SearchProvider>,
        config: AgentConfig,
    ) -> Self {
        Self { llm, search, config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Execute one run to its terminal event
    ///
    /// Every run ends in exactly one of `completed`, `failed`, or
    /// `cancelled`; a failed or cancelled run never carries a partial
    /// answer.
    pub async fn run(
        &self,
        state: &mut OverallState,
        effort: Effort,
        emitter: &mut EventEmitter,
        cancel: &CancelHandle,
    ) -> RunOutcome {
        let deadline = self.config.run_timeout(effort);
        let profile = effort.profile();

        info!(
            thread_id = %emitter.thread_id(),
            effort = effort.as_str(),
            max_loops = profile.max_research_loops,
            "Starting research run"
        );

        let result = match timeout(deadline, self.drive(state, profile, emitter, cancel)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::RunTimeout(deadline)),
        };

        match result {
            Ok(final_answer) => {
                info!(
                    thread_id = %emitter.thread_id(),
                    loops = state.research_loop_count,
                    sources = state.sources.len(),
                    "Run completed"
                );
                emitter.emit(
                    node::FINALIZE,
                    EventPayload::Completed {
                        final_answer: final_answer.clone(),
                    },
                );
                RunOutcome::Completed { final_answer }
            }
            Err(AgentError::Cancelled) => {
                info!(thread_id = %emitter.thread_id(), "Run cancelled");
                emitter.emit(node::ORCHESTRATOR, EventPayload::Cancelled);
                RunOutcome::Cancelled
            }
            Err(e) => {
                error!(thread_id = %emitter.thread_id(), error = %e, "Run failed");
                emitter.emit(
                    node::ORCHESTRATOR,
                    EventPayload::Failed {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    },
                );
                RunOutcome::Failed(e)
            }
        }
    }

    /// The phase loop; returns the final answer or the error that ends
    /// the run (`AgentError::Cancelled` for a boundary cancellation)
    async fn drive(
        &self,
        state: &mut OverallState,
        profile: EffortProfile,
        emitter: &mut EventEmitter,
        cancel: &CancelHandle,
    ) -> Result<String, AgentError> {
        let mut phase = RunPhase::Generating;
        let mut round_queries: Vec<String> = Vec::new();

        loop {
            match phase {
                RunPhase::Generating => {
                    round_queries = generate_queries(
                        Arc::clone(&self.llm),
                        state,
                        profile.queries_per_round,
                        self.config.node_timeout,
                    )
                    .await?;
                    emitter.emit(
                        node::GENERATE,
                        EventPayload::QueriesGenerated {
                            queries: round_queries.clone(),
                        },
                    );
                    phase = RunPhase::Researching;
                }
                RunPhase::Researching => {
                    let summary = research_round(
                        Arc::clone(&self.search),
                        state,
                        &round_queries,
                        self.config.query_timeout,
                    )
                    .await;
                    emitter.emit(
                        node::RESEARCH,
                        EventPayload::SourcesGathered {
                            new_sources: summary.new_source_ids.len(),
                            total_sources: state.sources.len(),
                            failed_queries: summary.failed_queries,
                        },
                    );
                    phase = RunPhase::Reflecting;
                }
                RunPhase::Reflecting => {
                    let reflection = reflect(
                        Arc::clone(&self.llm),
                        state,
                        profile.queries_per_round,
                        self.config.node_timeout,
                    )
                    .await?;
                    emitter.emit(
                        node::REFLECT,
                        EventPayload::Reflection {
                            sufficient: reflection.sufficient,
                            follow_up_queries: reflection.follow_up_queries.clone(),
                            loop_count: state.research_loop_count,
                        },
                    );
                    if reflection.sufficient {
                        phase = RunPhase::Finalizing;
                    } else {
                        round_queries = reflection.follow_up_queries;
                        phase = RunPhase::Researching;
                    }
                }
                RunPhase::Finalizing => {
                    return finalize_answer(
                        Arc::clone(&self.llm),
                        state,
                        self.config.node_timeout,
                    )
                    .await;
                }
            }

            // Node boundary: the only place cancellation (explicit or via
            // a disconnected sink) is observed.
            if cancel.is_cancelled() || emitter.is_disconnected() {
                return Err(AgentError::Cancelled);
            }
        }
    }
}
