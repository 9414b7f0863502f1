use std::sync::Arc;

use harbormind_core::error::Result;
use harbormind_core::traits::Handler;
use harbormind_plan::{GraphCatalog, HandlerRegistry, TaskGraph, TaskNode};

fn node(id: &str, description: &str, module: &str, handler: &str, next: &[&str]) -> TaskNode {
    TaskNode {
        id: id.into(),
        description: description.into(),
        module: module.into(),
        handler: handler.into(),
        next: next.iter().map(|s| s.to_string()).collect(),
    }
}

/// All built-in domain handlers, merged in registration order
/// (marina, finance, security, technic — later domains win on key clashes).
pub fn builtin_handlers() -> Vec<Arc<dyn Handler>> {
    let mut handlers = Vec::new();
    handlers.extend(crate::marina::handlers());
    handlers.extend(crate::finance::handlers());
    handlers.extend(crate::security::handlers());
    handlers.extend(crate::technic::handlers());
    handlers
}

/// Registry preloaded with every built-in handler.
pub fn builtin_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.merge(builtin_handlers());
    registry
}

/// The built-in plans. Every graph validates on insert.
pub fn builtin_catalog() -> Result<GraphCatalog> {
    let mut catalog = GraphCatalog::new();

    catalog.insert(TaskGraph {
        id: "berth-request".into(),
        name: "Berth request".into(),
        entry: "check".into(),
        nodes: vec![
            node(
                "check",
                "Find a free berth fitting the vessel",
                "marina",
                "marina.berth.check",
                &["assign"],
            ),
            node(
                "assign",
                "Reserve the berth and notify booking",
                "marina",
                "marina.berth.assign",
                &["log"],
            ),
            node(
                "log",
                "Record the arrival",
                "marina",
                "marina.arrival.log",
                &[],
            ),
        ],
    })?;

    catalog.insert(TaskGraph {
        id: "invoice-run".into(),
        name: "Mooring invoice run".into(),
        entry: "quote".into(),
        nodes: vec![
            node(
                "quote",
                "Quote the mooring fee",
                "finance",
                "finance.mooring.quote",
                &["draft"],
            ),
            node(
                "draft",
                "Draft the invoice",
                "finance",
                "finance.invoice.draft",
                &["reconcile"],
            ),
            node(
                "reconcile",
                "Reconcile any pending payment",
                "finance",
                "finance.payment.reconcile",
                &[],
            ),
        ],
    })?;

    catalog.insert(TaskGraph {
        id: "gate-alert".into(),
        name: "Gate alert".into(),
        entry: "triage".into(),
        nodes: vec![
            node(
                "triage",
                "Route by severity",
                "security",
                "security.gate.triage",
                &["log", "incident"],
            ),
            node(
                "log",
                "Routine patrol log",
                "security",
                "security.patrol.log",
                &[],
            ),
            node(
                "incident",
                "File and escalate an incident",
                "security",
                "security.incident.report",
                &[],
            ),
        ],
    })?;

    catalog.insert(TaskGraph {
        id: "maintenance-triage".into(),
        name: "Maintenance triage".into(),
        entry: "triage".into(),
        nodes: vec![
            node(
                "triage",
                "Summarize the backlog",
                "technic",
                "technic.maintenance.triage",
                &["dispatch"],
            ),
            node(
                "dispatch",
                "Dispatch a work order",
                "technic",
                "technic.workorder.dispatch",
                &["diagnose"],
            ),
            node(
                "diagnose",
                "Sweep the pontoon sensors",
                "technic",
                "technic.sensor.diagnose",
                &[],
            ),
        ],
    })?;

    Ok(catalog)
}
