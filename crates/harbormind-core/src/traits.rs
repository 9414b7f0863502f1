use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// A plan task handler — one domain capability, producing actions.
///
/// Business-level failures must be encoded as actions with error-indicating
/// names; a returned `Err` aborts the entire run.
pub trait Handler: Send + Sync + 'static {
    /// Handler name (the key task nodes reference).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn describe(&self) -> &str {
        ""
    }

    /// Execute against the shared session context and the observation
    /// driving this run.
    fn execute<'a>(
        &'a self,
        ctx: &'a SessionContext,
        observation: &'a Observation,
    ) -> BoxFuture<'a, Result<HandlerOutput>>;

    /// Timeout in seconds for this handler.
    fn timeout_secs(&self) -> u64 {
        30
    }
}

/// Session memory persistence across the four lanes.
pub trait MemoryStore: Send + Sync + 'static {
    /// Append entries for a session.
    fn append(&self, sid: &SessionId, entries: &[MemoryEntry]) -> BoxFuture<'_, Result<()>>;

    /// Load entries from one lane, oldest first.
    fn load_lane(
        &self,
        sid: &SessionId,
        lane: MemoryLane,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<MemoryEntry>>>;

    /// Full-text search over entry content across all sessions.
    fn search(&self, query: &str, limit: usize) -> BoxFuture<'_, Result<Vec<MemoryEntry>>>;
}

/// JSON document repository, addressed by (collection, id).
///
/// Injected into handlers via [`SessionContext`]; there are no module-level
/// singletons.
pub trait DocumentStore: Send + Sync + 'static {
    fn put(
        &self,
        collection: &str,
        id: &str,
        doc: serde_json::Value,
    ) -> BoxFuture<'_, Result<()>>;

    fn get(&self, collection: &str, id: &str) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// All documents in a collection as (id, doc) pairs, ordered by id.
    fn list(&self, collection: &str) -> BoxFuture<'_, Result<Vec<(String, serde_json::Value)>>>;

    fn delete(&self, collection: &str, id: &str) -> BoxFuture<'_, Result<()>>;
}
