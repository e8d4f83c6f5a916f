//! Progress events and the per-run event channel
//!
//! Each run owns an append-only event stream with strictly increasing
//! sequence numbers. The sink side is a plain mpsc receiver; a dropped
//! receiver never fails the core (events are discarded) but is visible to
//! the orchestrator as a client disconnect.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::state::ThreadId;

/// Node names carried in progress events
pub mod node {
    pub const GENERATE: &str = "generate_queries";
    pub const RESEARCH: &str = "web_research";
    pub const REFLECT: &str = "reflect";
    pub const FINALIZE: &str = "finalize";
    pub const ORCHESTRATOR: &str = "orchestrator";
}

/// Summary payload attached to each progress event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Queries produced for the next research round
    QueriesGenerated { queries: Vec<String> },

    /// One research round resolved (including isolated failures)
    SourcesGathered {
        new_sources: usize,
        total_sources: usize,
        failed_queries: usize,
    },

    /// The reflector's loop decision
    Reflection {
        sufficient: bool,
        follow_up_queries: Vec<String>,
        loop_count: u32,
    },

    /// Terminal: the run produced a cited answer
    Completed { final_answer: String },

    /// Terminal: the run failed; no partial answer was produced
    Failed { kind: String, message: String },

    /// Terminal: the run was cancelled at a node boundary
    Cancelled,
}

impl EventPayload {
    /// Whether this payload ends the run's event stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventPayload::Completed { .. } | EventPayload::Failed { .. } | EventPayload::Cancelled
        )
    }
}

/// One ordered notification of run advancement
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub thread_id: ThreadId,
    pub node_name: String,
    pub payload: EventPayload,
    /// Strictly increasing within one run
    pub sequence_number: u64,
}

/// Producer half of a run's event stream
///
/// Sequence numbers are assigned here, so ordering is a property of the
/// core and not of the sink.
pub struct EventEmitter {
    thread_id: ThreadId,
    tx: mpsc::UnboundedSender<ProgressEvent>,
    next_seq: u64,
}

/// Consumer half of a run's event stream
pub type EventStream = mpsc::UnboundedReceiver<ProgressEvent>;

impl EventEmitter {
    /// Create an emitter/stream pair for one run
    pub fn channel(thread_id: ThreadId) -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                thread_id,
                tx,
                next_seq: 0,
            },
            rx,
        )
    }

    /// Emit one event; silently discarded if the sink has disconnected
    pub fn emit(&mut self, node_name: &str, payload: EventPayload) {
        let event = ProgressEvent {
            thread_id: self.thread_id.clone(),
            node_name: node_name.to_string(),
            payload,
            sequence_number: self.next_seq,
        };
        self.next_seq += 1;
        // Delivery is the sink's concern; a dropped receiver must not
        // fail the run here (disconnect is handled at node boundaries).
        let _ = self.tx.send(event);
    }

    /// Whether the consumer has dropped its end of the stream
    pub fn is_disconnected(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }
}
