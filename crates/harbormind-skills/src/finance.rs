use std::sync::Arc;

use futures::future::BoxFuture;
use uuid::Uuid;

use harbormind_core::error::Result;
use harbormind_core::traits::Handler;
use harbormind_core::types::{
    Action, HandlerOutput, MemoryLane, Observation, SessionContext,
};

/// Nightly mooring rate per metre LOA, in euro cents.
fn nightly_rate_cents(loa_m: f64) -> u64 {
    match loa_m {
        l if l <= 8.0 => 180,
        l if l <= 12.0 => 240,
        l if l <= 18.0 => 320,
        _ => 450,
    }
}

/// Quotes a mooring fee from the tariff table.
///
/// Expects `payload.loa_m` and `payload.nights`. Deterministic: same input,
/// same quote.
pub struct MooringQuote;

impl Handler for MooringQuote {
    fn name(&self) -> &str {
        "finance.mooring.quote"
    }

    fn describe(&self) -> &str {
        "Quote a mooring fee from the tariff table"
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a SessionContext,
        observation: &'a Observation,
    ) -> BoxFuture<'a, Result<HandlerOutput>> {
        Box::pin(async move {
            let loa = observation.payload["loa_m"].as_f64().unwrap_or(10.0);
            let nights = observation.payload["nights"].as_u64().unwrap_or(1);
            let total_cents =
                (loa.ceil() as u64) * nightly_rate_cents(loa) * nights;

            ctx.remember(
                MemoryLane::Working,
                vec!["quote".into()],
                serde_json::json!({ "total_cents": total_cents, "nights": nights }),
            )
            .await?;

            Ok(HandlerOutput::actions(vec![Action::internal(
                "finance.mooring.quoted",
                serde_json::json!({
                    "loa_m": loa,
                    "nights": nights,
                    "total_cents": total_cents,
                }),
            )]))
        })
    }
}

/// Drafts an invoice document and hands it to the billing system.
pub struct InvoiceDraft;

impl Handler for InvoiceDraft {
    fn name(&self) -> &str {
        "finance.invoice.draft"
    }

    fn describe(&self) -> &str {
        "Draft an invoice for the most recent quote"
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a SessionContext,
        observation: &'a Observation,
    ) -> BoxFuture<'a, Result<HandlerOutput>> {
        Box::pin(async move {
            // Prefer the quote from working memory; fall back to the payload.
            let total_cents = ctx
                .recall(MemoryLane::Working, 8)
                .into_iter()
                .find(|e| e.tags.iter().any(|t| t == "quote"))
                .and_then(|e| e.content["total_cents"].as_u64())
                .or_else(|| observation.payload["total_cents"].as_u64())
                .unwrap_or(0);

            let invoice_id = Uuid::new_v4().to_string();
            if let Some(ref docs) = ctx.documents {
                docs.put(
                    "invoices",
                    &invoice_id,
                    serde_json::json!({
                        "total_cents": total_cents,
                        "status": "draft",
                        "session_id": ctx.session_id.0,
                    }),
                )
                .await?;
            }

            Ok(HandlerOutput::actions(vec![Action::external(
                "finance.invoice.drafted",
                serde_json::json!({
                    "invoice_id": invoice_id,
                    "total_cents": total_cents,
                }),
            )]))
        })
    }
}

/// Marks a payment as reconciled. Business failures (no matching invoice)
/// are encoded as an action, not an error.
pub struct PaymentReconcile;

impl Handler for PaymentReconcile {
    fn name(&self) -> &str {
        "finance.payment.reconcile"
    }

    fn describe(&self) -> &str {
        "Match a payment against its invoice"
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a SessionContext,
        observation: &'a Observation,
    ) -> BoxFuture<'a, Result<HandlerOutput>> {
        Box::pin(async move {
            let invoice_id = observation.payload["invoice_id"].as_str();

            let matched = match (invoice_id, &ctx.documents) {
                (Some(id), Some(docs)) => docs.get("invoices", id).await.is_ok(),
                _ => false,
            };

            let action = if matched {
                Action::internal(
                    "finance.payment.reconciled",
                    serde_json::json!({ "invoice_id": invoice_id }),
                )
            } else {
                Action::internal(
                    "finance.payment.unmatched",
                    serde_json::json!({ "invoice_id": invoice_id }),
                )
            };

            Ok(HandlerOutput::actions(vec![action]))
        })
    }
}

pub fn handlers() -> Vec<Arc<dyn Handler>> {
    vec![
        Arc::new(MooringQuote),
        Arc::new(InvoiceDraft),
        Arc::new(PaymentReconcile),
    ]
}
