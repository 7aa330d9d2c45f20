//! Drains an orchestrator event stream, printing one JSON line per event
//! to stdout (§6) and a short human-readable trace via `tracing`.

use tokio::sync::mpsc;
use toolrig_orchestrator::{Event, EventPayload};

pub async fn drain(mut rx: mpsc::UnboundedReceiver<Event>) -> Option<toolrig_core::PlanStatus> {
    let mut final_status = None;
    while let Some(event) = rx.recv().await {
        if let Ok(line) = serde_json::to_string(&event) {
            println!("{line}");
        }
        match &event.payload {
            EventPayload::StepStarted { label, .. } => tracing::info!(%label, "step started"),
            EventPayload::StepFinished { step_id, status, .. } => {
                tracing::info!(%step_id, ?status, "step finished")
            }
            EventPayload::PlanPaused { reason } => tracing::warn!(%reason, "plan paused"),
            EventPayload::PlanFinished { status } => {
                tracing::info!(?status, "plan finished");
                final_status = Some(*status);
            }
            _ => {}
        }
    }
    final_status
}
