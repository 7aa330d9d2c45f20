//! Plan state storage (§4.6): the persisted record of a plan's lifecycle,
//! independent of whatever is currently executing it.

pub mod store;

pub use store::{
    PlanSummary, StateError, archive_stale_plans, list_pending_plans, load_plan_state, pause_warning, save_plan_state,
};
