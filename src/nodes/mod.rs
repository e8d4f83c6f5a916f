//! Pipeline nodes for the research state machine
//!
//! One module per stage: query generation, web research fan-out,
//! reflection, and answer finalization. Nodes mutate `OverallState` by
//! reference and report summaries the orchestrator turns into progress
//! events.

pub mod finalize;
pub mod generate;
pub mod reflect;
pub mod research;

pub use finalize::finalize_answer;
pub use generate::generate_queries;
pub use reflect::{reflect, Reflection};
pub use research::{research_round, RoundSummary};
