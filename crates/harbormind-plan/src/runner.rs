use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use harbormind_core::config::ExecutorConfig;
use harbormind_core::error::{HarbormindError, Result};
use harbormind_core::event::{EventBus, PlanEvent};
use harbormind_core::traits::Handler;
use harbormind_core::types::{Action, Observation, SessionContext};

use crate::graph::GraphCatalog;
use crate::registry::HandlerRegistry;

/// Executes one named graph against one observation and context, producing
/// the full ordered action list.
///
/// Traversal is a strict sequential walk: entry node first, then either the
/// handler's chosen branch or `next[0]` at each step, terminating at the
/// first node with an empty `next` list. Actions accumulate in visitation
/// order; node-local ordering is preserved. A handler error fails the whole
/// run with no partial results.
pub struct PlanRunner {
    catalog: GraphCatalog,
    registry: HandlerRegistry,
    events: Arc<EventBus>,
    cancel: CancellationToken,
    limits: ExecutorConfig,
}

impl PlanRunner {
    pub fn new(catalog: GraphCatalog, registry: HandlerRegistry) -> Self {
        Self {
            catalog,
            registry,
            events: Arc::new(EventBus::default()),
            cancel: CancellationToken::new(),
            limits: ExecutorConfig::default(),
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_limits(mut self, limits: ExecutorConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Get a cancellation token for this runner.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn catalog(&self) -> &GraphCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Resolve a handler name the way the runner does. Exposed for
    /// diagnostics.
    pub fn resolve_handler(&self, name: &str) -> Arc<dyn Handler> {
        self.registry.resolve(name)
    }

    /// Run a graph from its entry node to a terminal node.
    pub async fn run_graph(
        &self,
        graph_id: &str,
        ctx: &SessionContext,
        observation: &Observation,
    ) -> Result<Vec<Action>> {
        let graph = self
            .catalog
            .get(graph_id)
            .ok_or_else(|| HarbormindError::GraphNotFound(graph_id.to_string()))?;

        self.events.publish(PlanEvent::RunStarted {
            session_id: ctx.session_id.clone(),
            graph_id: graph.id.clone(),
        });

        let mut actions: Vec<Action> = Vec::new();
        let mut visited = 0usize;
        let mut current = Some(graph.entry.clone());

        while let Some(node_id) = current {
            if visited >= self.limits.max_steps {
                return Err(self.fail(&graph.id, HarbormindError::StepBudgetExceeded(visited)));
            }

            // Catalog graphs cannot dangle (validated at load), but guard
            // the lookup anyway rather than truncating silently.
            let node = graph.node(&node_id).ok_or_else(|| {
                self.fail(
                    &graph.id,
                    HarbormindError::DanglingNodeReference {
                        graph: graph.id.clone(),
                        node: node_id.clone(),
                        target: node_id.clone(),
                    },
                )
            })?;

            let handler = self.registry.resolve(&node.handler);
            let timeout_secs = handler.timeout_secs().min(self.limits.max_handler_secs);

            self.events.publish(PlanEvent::NodeStart {
                graph_id: graph.id.clone(),
                node_id: node.id.clone(),
                handler: node.handler.clone(),
            });
            debug!(graph = %graph.id, node = %node.id, handler = %node.handler, "Executing node");

            let invocation =
                tokio::time::timeout(Duration::from_secs(timeout_secs), handler.execute(ctx, observation));

            let output = tokio::select! {
                result = invocation => match result {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => return Err(self.fail(&graph.id, e)),
                    Err(_) => {
                        return Err(self.fail(
                            &graph.id,
                            HarbormindError::HandlerTimeout {
                                handler: node.handler.clone(),
                                timeout_secs,
                            },
                        ))
                    }
                },
                _ = self.cancel.cancelled() => {
                    return Err(self.fail(&graph.id, HarbormindError::Cancelled))
                }
            };

            self.events.publish(PlanEvent::NodeComplete {
                graph_id: graph.id.clone(),
                node_id: node.id.clone(),
                actions: output.actions.len(),
            });

            actions.extend(output.actions);
            visited += 1;

            current = match output.branch {
                Some(label) => {
                    if node.next.iter().any(|n| n == &label) {
                        Some(label)
                    } else {
                        return Err(self.fail(
                            &graph.id,
                            HarbormindError::BranchNotDeclared {
                                node: node.id.clone(),
                                label,
                            },
                        ));
                    }
                }
                None => node.next.first().cloned(),
            };
        }

        info!(
            graph = %graph.id,
            nodes = visited,
            actions = actions.len(),
            "Run complete"
        );
        self.events.publish(PlanEvent::RunComplete {
            graph_id: graph.id.clone(),
            nodes_visited: visited,
            actions: actions.len(),
        });

        Ok(actions)
    }

    fn fail(&self, graph_id: &str, error: HarbormindError) -> HarbormindError {
        self.events.publish(PlanEvent::RunFailed {
            graph_id: graph_id.to_string(),
            error: error.to_string(),
        });
        error
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::future::BoxFuture;

    use super::*;
    use crate::graph::{TaskGraph, TaskNode};
    use crate::registry::FnHandler;
    use harbormind_core::types::{HandlerOutput, SessionId};

    fn node(id: &str, handler: &str, next: &[&str]) -> TaskNode {
        TaskNode {
            id: id.into(),
            description: String::new(),
            module: "test".into(),
            handler: handler.into(),
            next: next.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn graph(id: &str, entry: &str, nodes: Vec<TaskNode>) -> TaskGraph {
        TaskGraph {
            id: id.into(),
            name: id.into(),
            entry: entry.into(),
            nodes,
        }
    }

    fn emitting(name: &str, action: &'static str) -> FnHandler<impl Fn(&SessionContext, &Observation) -> BoxFuture<'static, Result<HandlerOutput>> + Send + Sync + 'static> {
        FnHandler::new(name, move |_ctx: &SessionContext, _obs: &Observation| -> BoxFuture<'static, Result<HandlerOutput>> {
            Box::pin(async move {
                Ok(HandlerOutput::actions(vec![Action::internal(
                    action,
                    serde_json::json!({}),
                )]))
            })
        })
    }

    fn recording(
        name: &str,
        log: Arc<Mutex<Vec<String>>>,
    ) -> FnHandler<impl Fn(&SessionContext, &Observation) -> BoxFuture<'static, Result<HandlerOutput>> + Send + Sync + 'static> {
        let tag = name.to_string();
        FnHandler::new(name, move |_ctx: &SessionContext, _obs: &Observation| -> BoxFuture<'static, Result<HandlerOutput>> {
            let log = Arc::clone(&log);
            let tag = tag.clone();
            Box::pin(async move {
                log.lock().unwrap().push(tag);
                Ok(HandlerOutput::empty())
            })
        })
    }

    fn runner(graphs: Vec<TaskGraph>, registry: HandlerRegistry) -> PlanRunner {
        let mut catalog = GraphCatalog::new();
        for g in graphs {
            catalog.insert(g).unwrap();
        }
        PlanRunner::new(catalog, registry)
    }

    fn obs() -> Observation {
        Observation::user_input(serde_json::json!({"text": "hello"}))
    }

    #[tokio::test]
    async fn two_node_chain_accumulates_in_order() {
        // End-to-end scenario A
        let mut registry = HandlerRegistry::new();
        registry.register(emitting("h1", "x"));
        registry.register(emitting("h2", "y"));
        let runner = runner(
            vec![graph(
                "g",
                "n1",
                vec![node("n1", "h1", &["n2"]), node("n2", "h2", &[])],
            )],
            registry,
        );

        let ctx = SessionContext::new(SessionId::new());
        let actions = runner.run_graph("g", &ctx, &obs()).await.unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].name, "x");
        assert_eq!(actions[1].name, "y");
    }

    #[tokio::test]
    async fn run_starts_at_entry_and_takes_first_successor() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register(recording("ha", Arc::clone(&log)));
        registry.register(recording("hb", Arc::clone(&log)));
        registry.register(recording("hc", Arc::clone(&log)));

        // n2 declares two successors; only the first may be taken.
        let runner = runner(
            vec![graph(
                "g",
                "n2",
                vec![
                    node("n1", "ha", &[]),
                    node("n2", "hb", &["n3", "n1"]),
                    node("n3", "hc", &[]),
                ],
            )],
            registry,
        );

        let ctx = SessionContext::new(SessionId::new());
        runner.run_graph("g", &ctx, &obs()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["hb", "hc"]);
    }

    #[tokio::test]
    async fn empty_next_terminates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register(recording("h1", Arc::clone(&log)));
        let runner = runner(vec![graph("g", "n1", vec![node("n1", "h1", &[])])], registry);

        let ctx = SessionContext::new(SessionId::new());
        let actions = runner.run_graph("g", &ctx, &obs()).await.unwrap();
        assert!(actions.is_empty());
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unregistered_handler_falls_back_and_run_completes() {
        // End-to-end scenario B
        let mut registry = HandlerRegistry::new();
        registry.register(emitting("h2", "y"));
        let runner = runner(
            vec![graph(
                "g",
                "n1",
                vec![node("n1", "h1", &["n2"]), node("n2", "h2", &[])],
            )],
            registry,
        );

        let ctx = SessionContext::new(SessionId::new());
        let actions = runner.run_graph("g", &ctx, &obs()).await.unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].name, "unknown.handler.executed");
        assert_eq!(actions[0].params["handler_name"], "h1");
        assert_eq!(actions[1].name, "y");
    }

    #[tokio::test]
    async fn handler_error_fails_whole_run() {
        // End-to-end scenario C
        let mut registry = HandlerRegistry::new();
        registry.register(FnHandler::new(
            "h1",
            |_ctx: &SessionContext, _obs: &Observation| -> BoxFuture<'static, Result<HandlerOutput>> {
                Box::pin(async {
                    Err(HarbormindError::HandlerExecution {
                        handler: "h1".into(),
                        message: "boom".into(),
                    })
                })
            },
        ));
        registry.register(emitting("h2", "y"));
        let runner = runner(
            vec![graph(
                "g",
                "n1",
                vec![node("n1", "h1", &["n2"]), node("n2", "h2", &[])],
            )],
            registry,
        );

        let ctx = SessionContext::new(SessionId::new());
        let err = runner.run_graph("g", &ctx, &obs()).await.unwrap_err();
        assert!(matches!(err, HarbormindError::HandlerExecution { .. }));
    }

    #[tokio::test]
    async fn unknown_graph_id_rejects() {
        let runner = runner(vec![], HandlerRegistry::new());
        let ctx = SessionContext::new(SessionId::new());
        let err = runner.run_graph("missing", &ctx, &obs()).await.unwrap_err();
        assert!(matches!(err, HarbormindError::GraphNotFound(_)));
    }

    #[tokio::test]
    async fn identical_runs_yield_identical_action_names() {
        let mut registry = HandlerRegistry::new();
        registry.register(emitting("h1", "x"));
        registry.register(emitting("h2", "y"));
        let runner = runner(
            vec![graph(
                "g",
                "n1",
                vec![node("n1", "h1", &["n2"]), node("n2", "h2", &[])],
            )],
            registry,
        );

        let ctx = SessionContext::new(SessionId::new());
        let first: Vec<String> = runner
            .run_graph("g", &ctx, &obs())
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        let second: Vec<String> = runner
            .run_graph("g", &ctx, &obs())
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn branch_label_overrides_first_successor() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register(FnHandler::new(
            "chooser",
            |_ctx: &SessionContext, _obs: &Observation| -> BoxFuture<'static, Result<HandlerOutput>> {
                Box::pin(async { Ok(HandlerOutput::empty().with_branch("n3")) })
            },
        ));
        registry.register(recording("hb", Arc::clone(&log)));
        registry.register(recording("hc", Arc::clone(&log)));

        let runner = runner(
            vec![graph(
                "g",
                "n1",
                vec![
                    node("n1", "chooser", &["n2", "n3"]),
                    node("n2", "hb", &[]),
                    node("n3", "hc", &[]),
                ],
            )],
            registry,
        );

        let ctx = SessionContext::new(SessionId::new());
        runner.run_graph("g", &ctx, &obs()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["hc"]);
    }

    #[tokio::test]
    async fn undeclared_branch_label_is_an_error() {
        let mut registry = HandlerRegistry::new();
        registry.register(FnHandler::new(
            "chooser",
            |_ctx: &SessionContext, _obs: &Observation| -> BoxFuture<'static, Result<HandlerOutput>> {
                Box::pin(async { Ok(HandlerOutput::empty().with_branch("ghost")) })
            },
        ));
        registry.register(emitting("h2", "y"));

        let runner = runner(
            vec![graph(
                "g",
                "n1",
                vec![node("n1", "chooser", &["n2"]), node("n2", "h2", &[])],
            )],
            registry,
        );

        let ctx = SessionContext::new(SessionId::new());
        let err = runner.run_graph("g", &ctx, &obs()).await.unwrap_err();
        assert!(matches!(err, HarbormindError::BranchNotDeclared { .. }));
    }

    #[tokio::test]
    async fn cyclic_graph_hits_step_budget() {
        let mut registry = HandlerRegistry::new();
        registry.register(emitting("h1", "x"));
        let mut catalog = GraphCatalog::new();
        catalog
            .insert(graph("loop", "n1", vec![node("n1", "h1", &["n1"])]))
            .unwrap();
        let runner = PlanRunner::new(catalog, registry).with_limits(ExecutorConfig {
            max_steps: 5,
            max_handler_secs: 60,
        });

        let ctx = SessionContext::new(SessionId::new());
        let err = runner.run_graph("loop", &ctx, &obs()).await.unwrap_err();
        assert!(matches!(err, HarbormindError::StepBudgetExceeded(5)));
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        struct SlowHandler;
        impl Handler for SlowHandler {
            fn name(&self) -> &str {
                "slow"
            }
            fn execute<'a>(
                &'a self,
                _ctx: &'a SessionContext,
                _observation: &'a Observation,
            ) -> BoxFuture<'a, Result<HandlerOutput>> {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(HandlerOutput::empty())
                })
            }
            fn timeout_secs(&self) -> u64 {
                3600
            }
        }

        let mut registry = HandlerRegistry::new();
        registry.register(SlowHandler);
        let mut catalog = GraphCatalog::new();
        catalog
            .insert(graph("g", "n1", vec![node("n1", "slow", &[])]))
            .unwrap();
        let runner = PlanRunner::new(catalog, registry).with_limits(ExecutorConfig {
            max_steps: 64,
            max_handler_secs: 1,
        });

        let ctx = SessionContext::new(SessionId::new());
        // Paused clock auto-advances to the earliest deadline, the 1s ceiling.
        tokio::time::pause();
        let err = runner.run_graph("g", &ctx, &obs()).await.unwrap_err();
        assert!(matches!(err, HarbormindError::HandlerTimeout { .. }));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_run() {
        struct SlowHandler;
        impl Handler for SlowHandler {
            fn name(&self) -> &str {
                "slow"
            }
            fn execute<'a>(
                &'a self,
                _ctx: &'a SessionContext,
                _observation: &'a Observation,
            ) -> BoxFuture<'a, Result<HandlerOutput>> {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(HandlerOutput::empty())
                })
            }
        }

        let mut registry = HandlerRegistry::new();
        registry.register(SlowHandler);
        let mut catalog = GraphCatalog::new();
        catalog
            .insert(graph("g", "n1", vec![node("n1", "slow", &[])]))
            .unwrap();
        let runner = PlanRunner::new(catalog, registry);
        let token = runner.cancel_token();

        let ctx = SessionContext::new(SessionId::new());
        let observation = obs();
        let run = runner.run_graph("g", &ctx, &observation);
        token.cancel();
        let err = run.await.unwrap_err();
        assert!(matches!(err, HarbormindError::Cancelled));
    }

    #[tokio::test]
    async fn events_are_published_in_stage_order() {
        let mut registry = HandlerRegistry::new();
        registry.register(emitting("h1", "x"));
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();

        let mut catalog = GraphCatalog::new();
        catalog
            .insert(graph("g", "n1", vec![node("n1", "h1", &[])]))
            .unwrap();
        let runner = PlanRunner::new(catalog, registry).with_events(events);

        let ctx = SessionContext::new(SessionId::new());
        runner.run_graph("g", &ctx, &obs()).await.unwrap();

        assert!(matches!(rx.try_recv().unwrap(), PlanEvent::RunStarted { .. }));
        assert!(matches!(rx.try_recv().unwrap(), PlanEvent::NodeStart { .. }));
        assert!(matches!(
            rx.try_recv().unwrap(),
            PlanEvent::NodeComplete { actions: 1, .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            PlanEvent::RunComplete { nodes_visited: 1, actions: 1, .. }
        ));
    }
}
