use super::types::Handler;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// A handler reference that names nothing in the [`HandlerTable`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedHandler {
    pub reference: String,
}

impl fmt::Display for UnresolvedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no handler registered under '{}'", self.reference)
    }
}

impl std::error::Error for UnresolvedHandler {}

/// Dotted name → handler callable
///
/// The embedding application registers its handlers here before the
/// registry is built; the registry resolves every reference exactly once.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a dotted reference, replacing any previous one
    pub fn register<H>(&mut self, reference: &str, handler: H)
    where
        H: Handler + 'static,
    {
        self.register_arc(reference, Arc::new(handler));
    }

    pub fn register_arc(&mut self, reference: &str, handler: Arc<dyn Handler>) {
        if self.handlers.insert(reference.to_string(), handler).is_some() {
            warn!(
                handler_ref = %reference,
                total_handlers = self.handlers.len(),
                "Replaced existing handler"
            );
        } else {
            info!(
                handler_ref = %reference,
                total_handlers = self.handlers.len(),
                "Handler registered"
            );
        }
    }

    /// Look up a reference
    pub fn resolve(&self, reference: &str) -> Result<Arc<dyn Handler>, UnresolvedHandler> {
        self.handlers
            .get(reference)
            .map(Arc::clone)
            .ok_or_else(|| UnresolvedHandler {
                reference: reference.to_string(),
            })
    }

    #[must_use]
    pub fn contains(&self, reference: &str) -> bool {
        self.handlers.contains_key(reference)
    }

    /// Registered references, sorted
    #[must_use]
    pub fn references(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        refs.sort_unstable();
        refs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("references", &self.references())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{HandlerContext, HandlerError, HandlerOutcome};
    use serde_json::json;

    fn ping(_ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        Ok(HandlerOutcome::json(json!({"pong": true})))
    }

    #[test]
    fn test_resolve_registered() {
        let mut table = HandlerTable::new();
        table.register("app.ping", ping);
        assert!(table.resolve("app.ping").is_ok());
        assert_eq!(table.references(), vec!["app.ping"]);
    }

    #[test]
    fn test_resolve_missing() {
        let table = HandlerTable::new();
        let err = table.resolve("app.missing").err().unwrap();
        assert_eq!(err.reference, "app.missing");
        assert!(err.to_string().contains("app.missing"));
    }

    #[test]
    fn test_register_replaces() {
        let mut table = HandlerTable::new();
        table.register("app.ping", ping);
        table.register("app.ping", |_: &HandlerContext| {
            Err::<HandlerOutcome, _>(HandlerError::Internal("replaced".into()))
        });
        assert_eq!(table.len(), 1);
    }
}
