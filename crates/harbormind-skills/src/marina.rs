use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;
use uuid::Uuid;

use harbormind_core::error::Result;
use harbormind_core::traits::Handler;
use harbormind_core::types::{
    Action, HandlerOutput, MemoryLane, Observation, SessionContext,
};

/// Checks berth availability against the `berths` collection.
///
/// Expects `payload.loa_m` (vessel length overall). Emits
/// `marina.berth.available` with the first fitting free berth, or
/// `marina.berth.unavailable` when nothing fits.
pub struct BerthCheck;

impl Handler for BerthCheck {
    fn name(&self) -> &str {
        "marina.berth.check"
    }

    fn describe(&self) -> &str {
        "Find a free berth fitting the vessel's length"
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a SessionContext,
        observation: &'a Observation,
    ) -> BoxFuture<'a, Result<HandlerOutput>> {
        Box::pin(async move {
            let loa = observation.payload["loa_m"].as_f64().unwrap_or(10.0);

            let berths = match ctx.documents {
                Some(ref docs) => docs.list("berths").await?,
                None => Vec::new(),
            };

            let fitting = berths.iter().find(|(_, doc)| {
                !doc["occupied"].as_bool().unwrap_or(true)
                    && doc["max_loa_m"].as_f64().unwrap_or(0.0) >= loa
            });

            let action = match fitting {
                Some((berth_id, doc)) => {
                    debug!(berth = %berth_id, loa, "Berth available");
                    Action::internal(
                        "marina.berth.available",
                        serde_json::json!({
                            "berth_id": berth_id,
                            "pontoon": doc["pontoon"],
                            "loa_m": loa,
                        }),
                    )
                }
                None => Action::internal(
                    "marina.berth.unavailable",
                    serde_json::json!({ "loa_m": loa }),
                ),
            };

            Ok(HandlerOutput::actions(vec![action]))
        })
    }
}

/// Writes a reservation document and marks the berth occupied.
///
/// Expects `payload.vessel_id` and `payload.berth_id` (or picks the berth
/// found by the preceding check via the observation). Emits the external
/// `marina.berth.assigned` action for the booking system.
pub struct BerthAssign;

impl Handler for BerthAssign {
    fn name(&self) -> &str {
        "marina.berth.assign"
    }

    fn describe(&self) -> &str {
        "Reserve a berth for a vessel and notify the booking system"
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a SessionContext,
        observation: &'a Observation,
    ) -> BoxFuture<'a, Result<HandlerOutput>> {
        Box::pin(async move {
            let vessel_id = observation.payload["vessel_id"]
                .as_str()
                .unwrap_or("unknown")
                .to_string();
            let berth_id = observation.payload["berth_id"]
                .as_str()
                .unwrap_or("A-01")
                .to_string();
            let reservation_id = Uuid::new_v4().to_string();

            if let Some(ref docs) = ctx.documents {
                docs.put(
                    "reservations",
                    &reservation_id,
                    serde_json::json!({
                        "vessel_id": vessel_id,
                        "berth_id": berth_id,
                        "session_id": ctx.session_id.0,
                    }),
                )
                .await?;

                if let Ok(mut berth) = docs.get("berths", &berth_id).await {
                    berth["occupied"] = serde_json::json!(true);
                    docs.put("berths", &berth_id, berth).await?;
                }
            }

            Ok(HandlerOutput::actions(vec![Action::external(
                "marina.berth.assigned",
                serde_json::json!({
                    "reservation_id": reservation_id,
                    "vessel_id": vessel_id,
                    "berth_id": berth_id,
                }),
            )]))
        })
    }
}

/// Records the arrival in episodic memory.
pub struct ArrivalLog;

impl Handler for ArrivalLog {
    fn name(&self) -> &str {
        "marina.arrival.log"
    }

    fn describe(&self) -> &str {
        "Append the arrival to the session's episodic memory"
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
                    vec!["arrival".into()],
                    observation.payload.clone(),
                )
                .await?;

            Ok(HandlerOutput::actions(vec![Action::internal(
                "marina.arrival.logged",
                serde_json::json!({ "entry_id": entry.id }),
            )]))
        })
    }
}

pub fn handlers() -> Vec<Arc<dyn Handler>> {
    vec![Arc::new(BerthCheck), Arc::new(BerthAssign), Arc::new(ArrivalLog)]
}
