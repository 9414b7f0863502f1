use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::traits::{DocumentStore, MemoryStore};

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Origin of an observation. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationSource {
    UserInput,
    ExternalApi,
    Sensor,
    Internal,
}

/// The input event driving one graph run.
///
/// The payload shape is handler-specific; the executor never inspects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub source: ObservationSource,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    pub fn new(source: ObservationSource, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn user_input(payload: serde_json::Value) -> Self {
        Self::new(ObservationSource::UserInput, payload)
    }

    pub fn sensor(payload: serde_json::Value) -> Self {
        Self::new(ObservationSource::Sensor, payload)
    }

    pub fn external_api(payload: serde_json::Value) -> Self {
        Self::new(ObservationSource::ExternalApi, payload)
    }

    pub fn internal(payload: serde_json::Value) -> Self {
        Self::new(ObservationSource::Internal, payload)
    }
}

/// Whether an action stays local or must be delivered to an outside system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Internal,
    External,
}

/// One unit of handler output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub kind: ActionKind,
    /// Namespaced event tag, e.g. `marina.berth.assigned`.
    pub name: String,
    pub params: serde_json::Value,
}

impl Action {
    pub fn internal(name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: ActionKind::Internal,
            name: name.into(),
            params,
        }
    }

    pub fn external(name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: ActionKind::External,
            name: name.into(),
            params,
        }
    }
}

/// Result of a single handler invocation: the actions it produced plus an
/// optional chosen successor for branching nodes.
#[derive(Debug, Clone, Default)]
pub struct HandlerOutput {
    pub actions: Vec<Action>,
    /// Successor node id to take instead of `next[0]`. Must be declared in
    /// the node's `next` list.
    pub branch: Option<String>,
}

impl HandlerOutput {
    pub fn actions(actions: Vec<Action>) -> Self {
        Self {
            actions,
            branch: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_branch(mut self, label: impl Into<String>) -> Self {
        self.branch = Some(label.into());
        self
    }
}

/// Memory lane within a session context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLane {
    Working,
    Episodic,
    Semantic,
    Procedural,
}

impl MemoryLane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
            Self::Procedural => "procedural",
        }
    }
}

/// A timestamped, tagged entry in one memory lane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub lane: MemoryLane,
    pub tags: Vec<String>,
    pub content: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(lane: MemoryLane, tags: Vec<String>, content: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            lane,
            tags,
            content,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryLanes {
    working: Vec<MemoryEntry>,
    episodic: Vec<MemoryEntry>,
    semantic: Vec<MemoryEntry>,
    procedural: Vec<MemoryEntry>,
}

impl MemoryLanes {
    fn lane(&self, lane: MemoryLane) -> &Vec<MemoryEntry> {
        match lane {
            MemoryLane::Working => &self.working,
            MemoryLane::Episodic => &self.episodic,
            MemoryLane::Semantic => &self.semantic,
            MemoryLane::Procedural => &self.procedural,
        }
    }

    fn lane_mut(&mut self, lane: MemoryLane) -> &mut Vec<MemoryEntry> {
        match lane {
            MemoryLane::Working => &mut self.working,
            MemoryLane::Episodic => &mut self.episodic,
            MemoryLane::Semantic => &mut self.semantic,
            MemoryLane::Procedural => &mut self.procedural,
        }
    }
}

/// Shared state passed to every handler in a run.
///
/// Owned by the caller (one per conversation session) and reused across
/// runs. The four lanes are append-only; the injected stores replace the
/// module-level mutable fleets/job lists of earlier prototypes so handlers
/// stay testable in isolation.
pub struct SessionContext {
    pub session_id: SessionId,
    lanes: RwLock<MemoryLanes>,
    pub memory: Option<Arc<dyn MemoryStore>>,
    pub documents: Option<Arc<dyn DocumentStore>>,
}

impl SessionContext {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            lanes: RwLock::new(MemoryLanes::default()),
            memory: None,
            documents: None,
        }
    }

    pub fn with_memory(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(store);
        self
    }

    pub fn with_documents(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(store);
        self
    }

    /// Append an entry to a lane, persisting it when a memory store is
    /// attached.
    pub async fn remember(
        &self,
        lane: MemoryLane,
        tags: Vec<String>,
        content: serde_json::Value,
    ) -> Result<MemoryEntry> {
        let entry = MemoryEntry::new(lane, tags, content);

        if let Some(ref store) = self.memory {
            store
                .append(&self.session_id, std::slice::from_ref(&entry))
                .await?;
        }

        let mut lanes = self.lanes.write().unwrap_or_else(|e| e.into_inner());
        lanes.lane_mut(lane).push(entry.clone());
        Ok(entry)
    }

    /// Most recent entries from a lane, newest first.
    pub fn recall(&self, lane: MemoryLane, limit: usize) -> Vec<MemoryEntry> {
        let lanes = self.lanes.read().unwrap_or_else(|e| e.into_inner());
        lanes.lane(lane).iter().rev().take(limit).cloned().collect()
    }

    pub fn lane_len(&self, lane: MemoryLane) -> usize {
        let lanes = self.lanes.read().unwrap_or_else(|e| e.into_inner());
        lanes.lane(lane).len()
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("memory", &self.memory.is_some())
            .field("documents", &self.documents.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remember_and_recall_newest_first() {
        let ctx = SessionContext::new(SessionId::new());
        ctx.remember(MemoryLane::Episodic, vec!["arrival".into()], serde_json::json!({"n": 1}))
            .await
            .unwrap();
        ctx.remember(MemoryLane::Episodic, vec!["arrival".into()], serde_json::json!({"n": 2}))
            .await
            .unwrap();

        let entries = ctx.recall(MemoryLane::Episodic, 10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content["n"], 2);
        assert_eq!(ctx.lane_len(MemoryLane::Working), 0);
    }

    #[test]
    fn action_constructors_set_kind() {
        let a = Action::internal("x", serde_json::json!({}));
        let b = Action::external("y", serde_json::json!({}));
        assert_eq!(a.kind, ActionKind::Internal);
        assert_eq!(b.kind, ActionKind::External);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn observation_source_serializes_snake_case() {
        let obs = Observation::user_input(serde_json::json!({"text": "hi"}));
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["source"], "user_input");
    }
}
