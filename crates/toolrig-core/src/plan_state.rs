//! Persisted plan lifecycle record (§3.5). One document per plan, owned by
//! `toolrig-state`; the type lives here so the orchestrator, executor, and
//! CLI can all speak about it without depending on the storage crate.

use crate::plan::Plan;
use crate::profile::SystemProfile;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanState {
    #[serde(flatten)]
    pub plan: Plan,
    #[serde(default)]
    pub pause_reason: Option<String>,
    #[serde(default)]
    pub paused_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub system_profile_snapshot: Option<SystemProfile>,
}

impl PlanState {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            pause_reason: None,
            paused_at: None,
            system_profile_snapshot: None,
        }
    }
}
