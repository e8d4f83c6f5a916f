//! Integration tests for the research state machine
//!
//! Exercises full runs against scripted LLM and search providers:
//! loop bounds, failure isolation, cancellation, per-thread event
//! ordering, and terminal-event totality.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use delver::events::{node, EventPayload};
use delver::{
    AgentConfig, CancelHandle, Effort, EventStream, LlmClient, Message, Orchestrator,
    OverallState, ProgressEvent, ProviderError, RunOutcome, SearchHit, SearchProvider, ThreadId,
    ThreadManager,
};

/// LLM scripted per stage: fixed first-round queries, a queue of
/// reflection verdicts (empty queue = sufficient), and a fixed answer
struct ScriptedLlm {
    first_queries: Vec<String>,
    reflections: Mutex<VecDeque<Value>>,
    reflection_calls: AtomicUsize,
    answer: String,
}

impl ScriptedLlm {
    fn new(first_queries: &[&str], reflections: Vec<Value>, answer: &str) -> Self {
        Self {
            first_queries: first_queries.iter().map(|q| q.to_string()).collect(),
            reflections: Mutex::new(reflections.into()),
            reflection_calls: AtomicUsize::new(0),
            answer: answer.to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Ok(self.answer.clone())
    }

    async fn complete_structured(
        &self,
        prompt: &str,
        _schema: &Value,
    ) -> Result<Value, ProviderError> {
        if prompt.contains("Search Query Writer") {
            Ok(serde_json::json!({ "queries": self.first_queries }))
        } else {
            self.reflection_calls.fetch_add(1, Ordering::SeqCst);
            let verdict = self.reflections.lock().unwrap().pop_front();
            Ok(verdict.unwrap_or_else(
                || serde_json::json!({ "sufficient": true, "follow_up_queries": [] }),
            ))
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Search provider yielding `hits_per_query` unique URLs per query;
/// queries listed in `hang` sleep far past any test timeout
struct ScriptedSearch {
    hits_per_query: usize,
    hang: Vec<String>,
}

impl ScriptedSearch {
    fn new(hits_per_query: usize) -> Self {
        Self {
            hits_per_query,
            hang: Vec::new(),
        }
    }

    fn with_hanging(mut self, queries: &[&str]) -> Self {
        self.hang = queries.iter().map(|q| q.to_string()).collect();
        self
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError> {
        if self.hang.iter().any(|q| q == query) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok((0..self.hits_per_query)
            .map(|i| SearchHit {
                url: format!("https://example.com/{}/{}", query.replace(' ', "-"), i),
                title: format!("{} #{}", query, i),
                snippet: format!("evidence about {}", query),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn insufficient(follow_ups: &[&str]) -> Value {
    serde_json::json!({ "sufficient": false, "follow_up_queries": follow_ups })
}

fn orchestrator(llm: Arc<ScriptedLlm>, search: ScriptedSearch) -> Orchestrator {
    Orchestrator::new(llm, Arc::new(search), AgentConfig::default())
}

fn run_state(effort: Effort) -> OverallState {
    OverallState::new(
        vec![Message::user("What is the question?")],
        effort.profile().max_research_loops,
    )
}

async fn collect(mut stream: EventStream) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.recv().await {
        events.push(event);
    }
    events
}

fn assert_single_trailing_terminal(events: &[ProgressEvent]) {
    let terminals: Vec<_> = events.iter().filter(|e| e.payload.is_terminal()).collect();
    assert_eq!(terminals.len(), 1, "exactly one terminal event per run");
    assert!(
        events.last().unwrap().payload.is_terminal(),
        "terminal event must be last"
    );
}

/// Scenario A: low effort, immediately sufficient - one research loop.
#[tokio::test]
async fn low_effort_completes_after_one_loop() {
    let llm = Arc::new(ScriptedLlm::new(&["single query"], vec![], "Done [src-1]."));
    let orchestrator = orchestrator(Arc::clone(&llm), ScriptedSearch::new(2));

    let (mut emitter, rx) = delver::events::EventEmitter::channel(ThreadId::from("a"));
    let mut state = run_state(Effort::Low);

    let outcome = orchestrator
        .run(&mut state, Effort::Low, &mut emitter, &CancelHandle::new())
        .await;
    drop(emitter);

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(state.research_loop_count, 1);
    assert_eq!(state.sources.len(), 2);
    assert!(state.final_answer.is_some());

    let events = collect(rx).await;
    assert_single_trailing_terminal(&events);
    assert!(matches!(
        events.last().unwrap().payload,
        EventPayload::Completed { .. }
    ));
}

/// Scenario B: medium effort, model insists on more research - the loop
/// bound forces sufficiency on pass 3 without consulting the model.
#[tokio::test]
async fn loop_exhaustion_forces_finalize() {
    let llm = Arc::new(ScriptedLlm::new(
        &["round one"],
        vec![
            insufficient(&["round two"]),
            insufficient(&["round three"]),
            // A third verdict would say insufficient again, but the bound
            // must win before the model is ever asked.
            insufficient(&["round four"]),
        ],
        "Exhausted [src-1].",
    ));
    let orchestrator = orchestrator(Arc::clone(&llm), ScriptedSearch::new(1));

    let (mut emitter, rx) = delver::events::EventEmitter::channel(ThreadId::from("b"));
    let mut state = run_state(Effort::Medium);

    let outcome = orchestrator
        .run(&mut state, Effort::Medium, &mut emitter, &CancelHandle::new())
        .await;
    drop(emitter);

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(state.research_loop_count, 3);
    // Pass 3 was forced: only two reflection verdicts were requested.
    assert_eq!(llm.reflection_calls.load(Ordering::SeqCst), 2);

    let events = collect(rx).await;
    assert_single_trailing_terminal(&events);

    let reflections: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Reflection {
                sufficient,
                loop_count,
                ..
            } => Some((*sufficient, *loop_count)),
            _ => None,
        })
        .collect();
    assert_eq!(reflections, vec![(false, 1), (false, 2), (true, 3)]);
}

/// Scenario C: one of three queries times out - the round completes with
/// the other two queries' sources and the run does not fail.
#[tokio::test(start_paused = true)]
async fn provider_failure_is_isolated() {
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm::new(
        &["fast one", "stuck", "fast two"],
        vec![],
        "Partial evidence [src-1].",
    ));
    let search = ScriptedSearch::new(1).with_hanging(&["stuck"]);
    let config = AgentConfig::default().with_query_timeout(Duration::from_millis(200));
    let orchestrator = Orchestrator::new(Arc::clone(&llm), Arc::new(search), config);

    let (mut emitter, rx) = delver::events::EventEmitter::channel(ThreadId::from("c"));
    let mut state = run_state(Effort::Medium);

    let outcome = orchestrator
        .run(&mut state, Effort::Medium, &mut emitter, &CancelHandle::new())
        .await;
    drop(emitter);

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(state.sources.len(), 2);

    let events = collect(rx).await;
    let research = events
        .iter()
        .find_map(|e| match &e.payload {
            EventPayload::SourcesGathered {
                new_sources,
                failed_queries,
                ..
            } => Some((*new_sources, *failed_queries)),
            _ => None,
        })
        .unwrap();
    assert_eq!(research, (2, 1));
}

/// Scenario D: cancel while RESEARCHING is in flight - the node finishes,
/// the run emits `cancelled`, and FINALIZING is never reached.
#[tokio::test]
async fn cancel_mid_research_stops_before_finalize() {
    /// Search that reports when it is entered, then takes a while
    struct SignallingSearch {
        started: tokio::sync::mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl SearchProvider for SignallingSearch {
        async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError> {
            let _ = self.started.send(());
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(vec![SearchHit {
                url: format!("https://example.com/{}", query.replace(' ', "-")),
                title: query.to_string(),
                snippet: "late evidence".to_string(),
            }])
        }

        fn name(&self) -> &str {
            "signalling"
        }
    }

    let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
    let llm = Arc::new(ScriptedLlm::new(&["only query"], vec![], "Never [src-1]."));
    let manager = ThreadManager::new(
        llm,
        Arc::new(SignallingSearch { started: started_tx }),
        AgentConfig::default(),
    );

    let stream = manager.submit("thread-d", "question?", Effort::Low).await;

    // Wait until the research node is actually in flight, then cancel.
    started_rx.recv().await.unwrap();
    assert!(manager.cancel(&ThreadId::from("thread-d")).await);

    let events = collect(stream).await;
    assert_single_trailing_terminal(&events);

    let nodes: Vec<_> = events.iter().map(|e| e.node_name.as_str()).collect();
    assert!(nodes.contains(&node::RESEARCH), "in-flight node completed");
    assert!(!nodes.contains(&node::FINALIZE));
    assert!(matches!(
        events.last().unwrap().payload,
        EventPayload::Cancelled
    ));
}

/// Scenario E: two threads run concurrently - sequence numbers are
/// independently monotonic and events are attributed to the right thread.
#[tokio::test]
async fn concurrent_threads_have_independent_event_streams() {
    let llm = Arc::new(ScriptedLlm::new(&["shared query"], vec![], "Fine [src-1]."));
    let manager = ThreadManager::new(
        llm,
        Arc::new(ScriptedSearch::new(1)),
        AgentConfig::default(),
    );

    let stream_a = manager.submit("thread-a", "question a?", Effort::Low).await;
    let stream_b = manager.submit("thread-b", "question b?", Effort::Low).await;

    let (events_a, events_b) = tokio::join!(collect(stream_a), collect(stream_b));

    for (events, thread) in [(&events_a, "thread-a"), (&events_b, "thread-b")] {
        assert_single_trailing_terminal(events);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.thread_id.as_str(), thread);
            assert_eq!(event.sequence_number, i as u64, "no gaps or duplicates");
        }
    }
}

/// A failed stage produces a `failed` terminal event and no partial
/// answer.
#[tokio::test]
async fn generation_failure_ends_run_without_answer() {
    struct BrokenLlm;

    #[async_trait]
    impl LlmClient for BrokenLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Connection("down".to_string()))
        }

        async fn complete_structured(
            &self,
            _prompt: &str,
            _schema: &Value,
        ) -> Result<Value, ProviderError> {
            Err(ProviderError::Connection("down".to_string()))
        }

        fn model(&self) -> &str {
            "broken"
        }
    }

    let manager = ThreadManager::new(
        Arc::new(BrokenLlm),
        Arc::new(ScriptedSearch::new(1)),
        AgentConfig::default(),
    );

    let stream = manager.submit("thread-f", "question?", Effort::Low).await;
    let events = collect(stream).await;

    assert_single_trailing_terminal(&events);
    match &events.last().unwrap().payload {
        EventPayload::Failed { kind, message } => {
            assert_eq!(kind, "provider");
            assert!(message.contains("down"));
        }
        other => panic!("expected failed terminal, got {:?}", other),
    }
}

/// Open-question behavior: when every follow-up duplicates an issued
/// query, the run finalizes instead of re-searching identical queries.
#[tokio::test]
async fn reflection_duplicate_followups_finalize() {
    let llm = Arc::new(ScriptedLlm::new(
        &["the only angle"],
        vec![insufficient(&["The Only Angle", "  the only   angle "])],
        "Settled [src-1].",
    ));
    let orchestrator = orchestrator(Arc::clone(&llm), ScriptedSearch::new(1));

    let (mut emitter, rx) = delver::events::EventEmitter::channel(ThreadId::from("g"));
    let mut state = run_state(Effort::Medium);

    let outcome = orchestrator
        .run(&mut state, Effort::Medium, &mut emitter, &CancelHandle::new())
        .await;
    drop(emitter);

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    // Finalized after the first loop; the bound was not exhausted.
    assert_eq!(state.research_loop_count, 1);
    assert_eq!(state.search_queries, vec!["the only angle"]);

    let events = collect(rx).await;
    assert_single_trailing_terminal(&events);
}

/// Every citation surviving finalization resolves to a known source, and
/// the sources map never shrinks across rounds.
#[tokio::test]
async fn citations_resolve_and_sources_grow() {
    let llm = Arc::new(ScriptedLlm::new(
        &["first angle"],
        vec![insufficient(&["second angle"])],
        "First [src-1], second [src-2], fabricated [src-99].",
    ));
    let orchestrator = orchestrator(Arc::clone(&llm), ScriptedSearch::new(1));

    let (mut emitter, rx) = delver::events::EventEmitter::channel(ThreadId::from("h"));
    let mut state = run_state(Effort::Medium);

    let outcome = orchestrator
        .run(&mut state, Effort::Medium, &mut emitter, &CancelHandle::new())
        .await;
    drop(emitter);

    let RunOutcome::Completed { final_answer } = outcome else {
        panic!("expected completion");
    };

    // The fabricated citation was scrubbed; the real ones survived.
    assert!(final_answer.contains("[src-1]"));
    assert!(final_answer.contains("[src-2]"));
    assert!(!final_answer.contains("src-99"));

    // Source totals reported per round never decrease.
    let events = collect(rx).await;
    let mut last_total = 0;
    for event in &events {
        if let EventPayload::SourcesGathered { total_sources, .. } = event.payload {
            assert!(total_sources >= last_total);
            last_total = total_sources;
        }
    }
    assert_eq!(last_total, 2);
}
