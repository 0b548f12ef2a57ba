//! Minimal, in-process local event emitter.
//!
//! The source this crate's specification was distilled from leans on a host
//! language's built-in emitter as a base class for every subsystem. We model
//! that capability set (`on`, `emit_local`) as a small composed primitive
//! instead, so the Container, `BaseModule` and Router can each *have* an
//! emitter rather than *be* one.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// A synchronous, in-process listener registry keyed by event name.
///
/// Handlers run in registration order and must not block; this primitive has
/// no queueing, history or pattern matching of its own. Components needing
/// those reach for [`crate::event_bus::EventBus`] instead.
#[derive(Default)]
pub struct LocalEmitter {
    listeners: RwLock<HashMap<String, Vec<Handler>>>,
}

impl LocalEmitter {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for `name`. Handlers accumulate; there is no
    /// unsubscribe path because local emitters are owner-private wiring, not
    /// a public subscription surface.
    pub fn on<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .entry(name.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Invoke every listener registered for `name`, in registration order.
    pub fn emit_local(&self, name: &str, payload: &Value) {
        let handlers = {
            let guard = self.listeners.read();
            guard.get(name).cloned()
        };
        if let Some(handlers) = handlers {
            for handler in handlers {
                handler(payload);
            }
        }
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }
}
