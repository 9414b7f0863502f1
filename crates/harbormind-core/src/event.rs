use crate::types::SessionId;

/// Plan execution event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum PlanEvent {
    /// A graph run started.
    RunStarted { session_id: SessionId, graph_id: String },
    /// A node's handler is about to execute.
    NodeStart { graph_id: String, node_id: String, handler: String },
    /// A node's handler finished.
    NodeComplete { graph_id: String, node_id: String, actions: usize },
    /// The run reached a terminal node.
    RunComplete { graph_id: String, nodes_visited: usize, actions: usize },
    /// The run failed.
    RunFailed { graph_id: String, error: String },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<PlanEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: PlanEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PlanEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
