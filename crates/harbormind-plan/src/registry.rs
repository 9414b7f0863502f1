use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::warn;

use harbormind_core::error::Result;
use harbormind_core::traits::Handler;
use harbormind_core::types::{Action, HandlerOutput, Observation, SessionContext};

/// Substitute for an unwired handler key. Emits a single internal
/// `unknown.handler.executed` marker so the caller can detect the gap;
/// a run never fails merely because a node references an unregistered
/// capability.
pub struct FallbackHandler {
    requested: String,
}

impl FallbackHandler {
    pub fn new(requested: impl Into<String>) -> Self {
        Self {
            requested: requested.into(),
        }
    }
}

impl Handler for FallbackHandler {
    fn name(&self) -> &str {
        &self.requested
    }

    fn describe(&self) -> &str {
        "fallback for an unregistered handler"
    }

    fn execute<'a>(
        &'a self,
        _ctx: &'a SessionContext,
        _observation: &'a Observation,
    ) -> BoxFuture<'a, Result<HandlerOutput>> {
        Box::pin(async move {
            Ok(HandlerOutput::actions(vec![Action::internal(
                "unknown.handler.executed",
                serde_json::json!({ "handler_name": self.requested }),
            )]))
        })
    }
}

/// Adapter wrapping a closure as a [`Handler`]. The closure must clone
/// whatever it needs from the context/observation before building its
/// future. Used for tests and ad-hoc wiring.
pub struct FnHandler<F> {
    name: String,
    func: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&SessionContext, &Observation) -> BoxFuture<'static, Result<HandlerOutput>>
        + Send
        + Sync
        + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&SessionContext, &Observation) -> BoxFuture<'static, Result<HandlerOutput>>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a SessionContext,
        observation: &'a Observation,
    ) -> BoxFuture<'a, Result<HandlerOutput>> {
        (self.func)(ctx, observation)
    }
}

/// Flat table of handlers, merged from per-domain sets at startup.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler. Last registration for a name wins.
    pub fn register(&mut self, handler: impl Handler) {
        self.register_arc(Arc::new(handler));
    }

    pub fn register_arc(&mut self, handler: Arc<dyn Handler>) {
        let name = handler.name().to_string();
        self.handlers.insert(name, handler);
    }

    /// Merge a per-domain handler set into the table.
    pub fn merge(&mut self, handlers: Vec<Arc<dyn Handler>>) {
        for handler in handlers {
            self.register_arc(handler);
        }
    }

    /// Get a handler by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    /// Resolve a name to a handler, never failing: unknown names yield a
    /// [`FallbackHandler`].
    pub fn resolve(&self, name: &str) -> Arc<dyn Handler> {
        match self.handlers.get(name) {
            Some(handler) => handler.clone(),
            None => {
                warn!(handler = name, "No handler registered, using fallback");
                Arc::new(FallbackHandler::new(name))
            }
        }
    }

    /// Registered handler names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbormind_core::types::SessionId;

    fn constant_handler(name: &str, action_name: &'static str) -> Arc<dyn Handler> {
        Arc::new(FnHandler::new(
            name,
            move |_ctx: &SessionContext,
                  _obs: &Observation|
                  -> BoxFuture<'static, Result<HandlerOutput>> {
                Box::pin(async move {
                    Ok(HandlerOutput::actions(vec![Action::internal(
                        action_name,
                        serde_json::json!({}),
                    )]))
                })
            },
        ))
    }

    #[tokio::test]
    async fn resolve_known_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register_arc(constant_handler("h1", "x"));

        let ctx = SessionContext::new(SessionId::new());
        let obs = Observation::internal(serde_json::json!({}));
        let out = registry.resolve("h1").execute(&ctx, &obs).await.unwrap();
        assert_eq!(out.actions.len(), 1);
        assert_eq!(out.actions[0].name, "x");
    }

    #[tokio::test]
    async fn resolve_unknown_yields_fallback_marker() {
        let registry = HandlerRegistry::new();
        let ctx = SessionContext::new(SessionId::new());
        let obs = Observation::internal(serde_json::json!({}));

        let handler = registry.resolve("ghost.capability");
        let out = handler.execute(&ctx, &obs).await.unwrap();
        assert_eq!(out.actions.len(), 1);
        assert_eq!(out.actions[0].name, "unknown.handler.executed");
        assert_eq!(out.actions[0].params["handler_name"], "ghost.capability");
        assert!(out.branch.is_none());
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let mut registry = HandlerRegistry::new();
        registry.register_arc(constant_handler("h1", "first"));
        registry.register_arc(constant_handler("h1", "second"));
        assert_eq!(registry.len(), 1);

        let ctx = SessionContext::new(SessionId::new());
        let obs = Observation::internal(serde_json::json!({}));
        let out = registry.resolve("h1").execute(&ctx, &obs).await.unwrap();
        assert_eq!(out.actions[0].name, "second");
    }

    #[test]
    fn list_is_sorted() {
        let mut registry = HandlerRegistry::new();
        registry.register_arc(constant_handler("b", "x"));
        registry.register_arc(constant_handler("a", "y"));
        assert_eq!(registry.list(), vec!["a", "b"]);
    }
}
