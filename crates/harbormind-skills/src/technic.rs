use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use uuid::Uuid;

use harbormind_core::error::Result;
use harbormind_core::traits::Handler;
use harbormind_core::types::{Action, HandlerOutput, Observation, SessionContext};

/// Counts open work orders in the `work_orders` collection.
pub struct MaintenanceTriage;

impl Handler for MaintenanceTriage {
    fn name(&self) -> &str {
        "technic.maintenance.triage"
    }

    fn describe(&self) -> &str {
        "Summarize the open maintenance backlog"
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a SessionContext,
        _observation: &'a Observation,
    ) -> BoxFuture<'a, Result<HandlerOutput>> {
        Box::pin(async move {
            let orders = match ctx.documents {
                Some(ref docs) => docs.list("work_orders").await?,
                None => Vec::new(),
            };

            let open = orders
                .iter()
                .filter(|(_, doc)| doc["status"].as_str() != Some("closed"))
                .count();

            Ok(HandlerOutput::actions(vec![Action::internal(
                "technic.maintenance.triaged",
                serde_json::json!({ "open_orders": open, "total_orders": orders.len() }),
            )]))
        })
    }
}

/// Creates a work order and dispatches it to the yard crew.
pub struct WorkOrderDispatch;

impl Handler for WorkOrderDispatch {
    fn name(&self) -> &str {
        "technic.workorder.dispatch"
    }

    fn describe(&self) -> &str {
        "Create and dispatch a work order"
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a SessionContext,
        observation: &'a Observation,
    ) -> BoxFuture<'a, Result<HandlerOutput>> {
        Box::pin(async move {
            let order_id = Uuid::new_v4().to_string();
            let summary = observation.payload["summary"]
                .as_str()
                .unwrap_or("unspecified")
                .to_string();

            if let Some(ref docs) = ctx.documents {
                docs.put(
                    "work_orders",
                    &order_id,
                    serde_json::json!({
                        "summary": summary,
                        "status": "dispatched",
                        "session_id": ctx.session_id.0,
                    }),
                )
                .await?;
            }

            Ok(HandlerOutput::actions(vec![Action::external(
                "technic.workorder.dispatched",
                serde_json::json!({ "order_id": order_id, "summary": summary }),
            )]))
        })
    }
}

/// Simulated pontoon sensor sweep: short latency, jittered readings.
pub struct SensorDiagnostics;

impl Handler for SensorDiagnostics {
    fn name(&self) -> &str {
        "technic.sensor.diagnose"
    }

    fn describe(&self) -> &str {
        "Poll the pontoon sensors and report readings"
    }

    fn execute<'a>(
        &'a self,
        _ctx: &'a SessionContext,
        _observation: &'a Observation,
    ) -> BoxFuture<'a, Result<HandlerOutput>> {
        Box::pin(async move {
            // ThreadRng is not Send; draw before suspending.
            let (delay_ms, battery_v, bilge_mm) = {
                let mut rng = rand::thread_rng();
                (
                    rng.gen_range(10..50u64),
                    rng.gen_range(11.8..12.9f64),
                    rng.gen_range(0..40u32),
                )
            };
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;

            Ok(HandlerOutput::actions(vec![Action::internal(
                "technic.sensor.report",
                serde_json::json!({
                    "battery_v": (battery_v * 10.0).round() / 10.0,
                    "bilge_mm": bilge_mm,
                }),
            )]))
        })
    }

    fn timeout_secs(&self) -> u64 {
        5
    }
}

pub fn handlers() -> Vec<Arc<dyn Handler>> {
    vec![
        Arc::new(MaintenanceTriage),
        Arc::new(WorkOrderDispatch),
        Arc::new(SensorDiagnostics),
    ]
}
