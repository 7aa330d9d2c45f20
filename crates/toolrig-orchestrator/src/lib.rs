//! The orchestrator (L5): schedules a plan's DAG across a bounded worker
//! pool and emits the event stream external callers drain (§4.5, §6).

pub mod events;
pub mod scheduler;

pub use events::{Event, EventPayload};
pub use scheduler::{RunOutcome, default_parallelism_limit, run_plan};
