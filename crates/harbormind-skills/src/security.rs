use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::warn;

use harbormind_core::error::Result;
use harbormind_core::traits::Handler;
use harbormind_core::types::{
    Action, HandlerOutput, MemoryLane, Observation, SessionContext,
};

/// Triages a gate/sensor event by severity.
///
/// Branching node: on `payload.severity` of "high" or "critical" the
/// handler selects the `incident` successor; otherwise the node's default
/// `next[0]` (routine logging) applies.
pub struct GateTriage;

impl Handler for GateTriage {
    fn name(&self) -> &str {
        "security.gate.triage"
    }

    fn describe(&self) -> &str {
        "Route a gate event to routine logging or incident handling"
    }

    fn execute<'a>(
        &'a self,
        _ctx: &'a SessionContext,
        observation: &'a Observation,
    ) -> BoxFuture<'a, Result<HandlerOutput>> {
        Box::pin(async move {
            let severity = observation.payload["severity"]
                .as_str()
                .unwrap_or("routine")
                .to_string();
            let escalate = matches!(severity.as_str(), "high" | "critical");

            if escalate {
                warn!(severity = %severity, "Gate event escalated");
            }

            let output = HandlerOutput::actions(vec![Action::internal(
                "security.gate.triaged",
                serde_json::json!({ "severity": severity, "escalated": escalate }),
            )]);

            Ok(if escalate {
                output.with_branch("incident")
            } else {
                output
            })
        })
    }
}

/// Files an incident report and alerts the duty officer.
pub struct IncidentReport;

impl Handler for IncidentReport {
    fn name(&self) -> &str {
        "security.incident.report"
    }

    fn describe(&self) -> &str {
        "File an incident report and alert the duty officer"
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a SessionContext,
        observation: &'a Observation,
    ) -> BoxFuture<'a, Result<HandlerOutput>> {
        Box::pin(async move {
            let entry = ctx
                .remember(
                    MemoryLane::Episodic,
                    vec!["incident".into()],
                    observation.payload.clone(),
                )
                .await?;

            Ok(HandlerOutput::actions(vec![Action::external(
                "security.incident.reported",
                serde_json::json!({
                    "entry_id": entry.id,
                    "severity": observation.payload["severity"],
                }),
            )]))
        })
    }
}

/// Routine gate event: append to working memory, no escalation.
pub struct PatrolLog;

impl Handler for PatrolLog {
    fn name(&self) -> &str {
        "security.patrol.log"
    }

    fn describe(&self) -> &str {
        "Record a routine gate event"
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a SessionContext,
        observation: &'a Observation,
    ) -> BoxFuture<'a, Result<HandlerOutput>> {
        Box::pin(async move {
            ctx.remember(
                MemoryLane::Working,
                vec!["patrol".into()],
                observation.payload.clone(),
            )
            .await?;

            Ok(HandlerOutput::actions(vec![Action::internal(
                "security.patrol.logged",
                serde_json::json!({ "source": observation.source }),
            )]))
        })
    }
}

pub fn handlers() -> Vec<Arc<dyn Handler>> {
    vec![
        Arc::new(GateTriage),
        Arc::new(IncidentReport),
        Arc::new(PatrolLog),
    ]
}
