//! Per-thread run serialization
//!
//! One lightweight worker task per conversation thread, fed by an inbox
//! queue: submissions on the same thread run strictly one at a time while
//! different threads run concurrently. No locks are held around
//! `OverallState` because only the owning worker ever touches it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::config::{AgentConfig, Effort};
use crate::events::{EventEmitter, EventStream};
use crate::llm::LlmClient;
use crate::orchestrator::{CancelHandle, Orchestrator, RunOutcome};
use crate::search::SearchProvider;
use crate::state::{Message, OverallState, ThreadId};

/// Entry point for clients: submit user turns, receive event streams
pub struct ThreadManager {
    orchestrator: Arc<Orchestrator>,
    threads: Mutex<HashMap<ThreadId, ThreadHandle>>,
}

struct ThreadHandle {
    inbox: mpsc::UnboundedSender<Submission>,
    /// Cancel handle of the in-flight run, if any; installed by the
    /// worker at run start so cancellation bypasses the inbox queue
    active_cancel: Arc<StdMutex<Option<CancelHandle>>>,
}

struct Submission {
    user_message: String,
    effort: Effort,
    emitter: EventEmitter,
}

impl ThreadManager {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn SearchProvider>,
        config: AgentConfig,
    ) -> Self {
        Self {
            orchestrator: Arc::new(Orchestrator::new(llm, search, config)),
            threads: Mutex::new(HashMap::new()),
        }
    }

    /// Start or continue a run on the given thread
    ///
    /// Returns the run's event stream, terminated by exactly one terminal
    /// event. A submission arriving while the thread has a run in flight
    /// is queued behind it, never interleaved.
    pub async fn submit(
        &self,
        thread_id: impl Into<ThreadId>,
        user_message: &str,
        effort: Effort,
    ) -> EventStream {
        let thread_id = thread_id.into();
        let (emitter, stream) = EventEmitter::channel(thread_id.clone());
        let submission = Submission {
            user_message: user_message.to_string(),
            effort,
            emitter,
        };

        let mut threads = self.threads.lock().await;
        let handle = threads
            .entry(thread_id.clone())
            .or_insert_with(|| spawn_worker(thread_id.clone(), Arc::clone(&self.orchestrator)));

        if let Err(rejected) = handle.inbox.send(submission) {
            // Worker died (e.g. panicked); replace it and retry once.
            debug!(thread_id = %thread_id, "Respawning dead thread worker");
            let fresh = spawn_worker(thread_id.clone(), Arc::clone(&self.orchestrator));
            let _ = fresh.inbox.send(rejected.0);
            threads.insert(thread_id, fresh);
        }

        stream
    }

    /// Request cooperative cancellation of the thread's in-flight run
    ///
    /// Returns true if a run was in flight. Takes effect at the next node
    /// boundary; queued submissions are unaffected.
    pub async fn cancel(&self, thread_id: &ThreadId) -> bool {
        let threads = self.threads.lock().await;
        let Some(handle) = threads.get(thread_id) else {
            return false;
        };
        let active = handle.active_cancel.lock().expect("cancel lock poisoned");
        match active.as_ref() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }
}

fn spawn_worker(thread_id: ThreadId, orchestrator: Arc<Orchestrator>) -> ThreadHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let active_cancel: Arc<StdMutex<Option<CancelHandle>>> = Arc::new(StdMutex::new(None));

    tokio::spawn(worker_loop(
        thread_id,
        orchestrator,
        rx,
        Arc::clone(&active_cancel),
    ));

    ThreadHandle {
        inbox: tx,
        active_cancel,
    }
}

/// Drains the thread's inbox, one run at a time
async fn worker_loop(
    thread_id: ThreadId,
    orchestrator: Arc<Orchestrator>,
    mut inbox: mpsc::UnboundedReceiver<Submission>,
    active_cancel: Arc<StdMutex<Option<CancelHandle>>>,
) {
    let mut history: Vec<Message> = Vec::new();

    while let Some(submission) = inbox.recv().await {
        let run_id = Uuid::new_v4();
        let cancel = CancelHandle::new();
        *active_cancel.lock().expect("cancel lock poisoned") = Some(cancel.clone());

        let mut messages = history.clone();
        messages.push(Message::user(&submission.user_message));
        let mut state = OverallState::new(
            messages,
            submission.effort.profile().max_research_loops,
        );
        let mut emitter = submission.emitter;

        let span = tracing::info_span!("run", thread_id = %thread_id, run_id = %run_id);
        let outcome = orchestrator
            .run(&mut state, submission.effort, &mut emitter, &cancel)
            .instrument(span)
            .await;

        *active_cancel.lock().expect("cancel lock poisoned") = None;

        match outcome {
            RunOutcome::Completed { final_answer } => {
                history.push(Message::user(&submission.user_message));
                history.push(Message::assistant(&final_answer));
            }
            RunOutcome::Failed(_) | RunOutcome::Cancelled => {
                // Run state is discarded wholesale; the turn does not
                // enter the durable conversation history.
                debug!(thread_id = %thread_id, "Discarding state of unfinished run");
            }
        }
    }

    info!(thread_id = %thread_id, "Thread worker shutting down");
}
