//! Orchestrator event stream (§4.5, §6): the line-delimited events a
//! CLI or RPC consumer drains until a terminal event arrives.

use chrono::{DateTime, Utc};
use serde::Serialize;
use toolrig_core::{ErrorAnalysis, PlanStatus, StepStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    PlanStarted,
    StepStarted { step_id: String, label: String },
    StepProgress { step_id: String, percent: Option<u32>, line: String },
    StepFinished { step_id: String, status: StepStatus, analysis: Option<ErrorAnalysis> },
    PlanPaused { reason: String },
    PlanFinished { status: PlanStatus },
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub ts: DateTime<Utc>,
    pub plan_id: String,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn new(plan_id: impl Into<String>, payload: EventPayload, now: DateTime<Utc>) -> Self {
        Self { ts: now, plan_id: plan_id.into(), payload }
    }
}
