//! Error Router: kind → handler dispatch, a bounded recent-error ring, and
//! an optional framework integration hook.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::container::Component;
use super::taxonomy::{ErrorKind, FrameworkError};

/// Cap shared by every bounded error ring in the crate (§3 invariant vii, §7).
pub const ERROR_RING_CAPACITY: usize = 100;

/// Deployment environment, used to decide how much of an error to reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// A context map attached to an error at handling time, e.g. `{source:
/// "eventbus", module: "orders"}`.
pub type ErrorContext = HashMap<String, serde_json::Value>;

type Handler = Arc<dyn Fn(&FrameworkError, &ErrorContext) + Send + Sync>;

/// Translates an external framework's errors into the internal taxonomy and
/// renders internal errors back out, honoring the environment (§6, §9).
///
/// Kept as a trait rather than a hard dependency on any one HTTP framework so
/// `error::router` itself stays framework-agnostic; `ProblemIntegration`
/// below is the one shipped implementation.
pub trait FrameworkIntegration: Send + Sync {
    /// Best-effort mapping from an external error to one of our kinds.
    fn map_external(&self, message: &str) -> Option<ErrorKind>;

    /// Render an error for a response body, honoring `env` (full cause chain
    /// in development, scrubbed in production).
    fn serialize(&self, error: &FrameworkError, env: Environment) -> serde_json::Value;
}

/// RFC 9457-flavored integration: renders `{type, title, status, detail,
/// code}`, mirroring `modkit-errors::Problem` field-for-field.
pub struct ProblemIntegration;

impl FrameworkIntegration for ProblemIntegration {
    fn map_external(&self, _message: &str) -> Option<ErrorKind> {
        None
    }

    fn serialize(&self, error: &FrameworkError, env: Environment) -> serde_json::Value {
        let mut body = serde_json::json!({
            "type": "about:blank",
            "title": error.kind.as_str(),
            "status": error.status().as_u16(),
            "detail": error.message,
            "code": error.code,
            "trace_id": error.id,
        });
        if env == Environment::Development {
            if let Some(cause) = &error.cause {
                body["cause"] = cause.to_json();
            }
            body["details"] = serde_json::to_value(&error.details).unwrap_or_default();
        }
        body
    }
}

#[derive(Debug, Clone)]
struct RecentError {
    error: FrameworkError,
    context: ErrorContext,
}

/// Central error dispatcher: one handler per kind (falling back to `"*"`,
/// then a default logger), plus a bounded recent-error ring.
pub struct ErrorRouter {
    handlers: RwLock<HashMap<String, Handler>>,
    recent: RwLock<VecDeque<RecentError>>,
    integration: RwLock<Option<Arc<dyn FrameworkIntegration>>>,
    environment: Environment,
}

impl Default for ErrorRouter {
    fn default() -> Self {
        Self::new(Environment::Development)
    }
}

impl ErrorRouter {
    pub fn new(environment: Environment) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            recent: RwLock::new(VecDeque::new()),
            integration: RwLock::new(None),
            environment,
        }
    }

    /// Register a handler for `kind`, or `"*"` as the fallback. Replaces any
    /// previously registered handler for the same key.
    pub fn register_handler<F>(&self, kind: &str, handler: F)
    where
        F: Fn(&FrameworkError, &ErrorContext) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .insert(kind.to_string(), Arc::new(handler));
    }

    pub fn register_integration(&self, integration: Arc<dyn FrameworkIntegration>) {
        *self.integration.write() = Some(integration);
    }

    pub fn integration(&self) -> Option<Arc<dyn FrameworkIntegration>> {
        self.integration.read().clone()
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn create_error(
        &self,
        kind: ErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> FrameworkError {
        FrameworkError::new(kind, code, message)
    }

    /// Dispatch `error` to the handler registered for its kind, falling back
    /// to `"*"`, then to a default `tracing::error!` logger. Handlers must
    /// not throw; if a handler panics, the panic is caught, recorded as a
    /// `{phase: "error-handling"}` secondary entry, and swallowed — it never
    /// propagates out of `handle_error`.
    pub fn handle_error(&self, error: FrameworkError, context: ErrorContext) {
        self.push_recent(error.clone(), context.clone());

        let handler = {
            let guard = self.handlers.read();
            guard
                .get(error.kind.as_str())
                .or_else(|| guard.get("*"))
                .cloned()
        };

        match handler {
            Some(handler) => {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    handler(&error, &context);
                }));
                if outcome.is_err() {
                    let mut secondary_context = ErrorContext::new();
                    secondary_context.insert("phase".to_string(), serde_json::json!("error-handling"));
                    let secondary =
                        FrameworkError::new(ErrorKind::Module, "ERROR_HANDLER_PANICKED", "error handler panicked");
                    self.push_recent(secondary, secondary_context);
                }
            }
            None => {
                tracing::error!(kind = %error.kind, code = %error.code, message = %error.message, "unhandled error");
            }
        }
    }

    fn push_recent(&self, error: FrameworkError, context: ErrorContext) {
        let mut recent = self.recent.write();
        if recent.len() >= ERROR_RING_CAPACITY {
            recent.pop_front();
        }
        recent.push_back(RecentError { error, context });
    }

    /// Snapshot of the most recent errors, oldest first, capped at
    /// [`ERROR_RING_CAPACITY`].
    pub fn recent_errors(&self) -> Vec<FrameworkError> {
        self.recent.read().iter().map(|r| r.error.clone()).collect()
    }

    pub fn shutdown(&self) {
        self.handlers.write().clear();
        self.recent.write().clear();
        *self.integration.write() = None;
    }
}

/// Lets an `ErrorRouter` be registered directly with the
/// [`crate::container::DependencyContainer`]; it needs no setup of its own
/// beyond construction, so only `shutdown` does real work.
impl Component for ErrorRouter {
    fn shutdown(&self) -> Result<(), FrameworkError> {
        ErrorRouter::shutdown(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handler_registered_for_kind_is_preferred_over_wildcard() {
        let router = ErrorRouter::default();
        let specific = Arc::new(AtomicUsize::new(0));
        let wildcard = Arc::new(AtomicUsize::new(0));

        let s = specific.clone();
        router.register_handler("Validation", move |_, _| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        let w = wildcard.clone();
        router.register_handler("*", move |_, _| {
            w.fetch_add(1, Ordering::SeqCst);
        });

        router.handle_error(
            FrameworkError::new(ErrorKind::Validation, "X", "y"),
            ErrorContext::new(),
        );

        assert_eq!(specific.load(Ordering::SeqCst), 1);
        assert_eq!(wildcard.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn falls_back_to_wildcard_when_no_specific_handler() {
        let router = ErrorRouter::default();
        let hit = Arc::new(AtomicUsize::new(0));
        let h = hit.clone();
        router.register_handler("*", move |_, _| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        router.handle_error(FrameworkError::new(ErrorKind::Router, "X", "y"), ErrorContext::new());
        assert_eq!(hit.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_handler_is_swallowed_and_recorded_as_secondary() {
        let router = ErrorRouter::default();
        router.register_handler("Module", |_, _| panic!("boom"));

        router.handle_error(FrameworkError::new(ErrorKind::Module, "X", "y"), ErrorContext::new());

        let recent = router.recent_errors();
        // original + secondary
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].code, "ERROR_HANDLER_PANICKED");
    }

    #[test]
    fn ring_evicts_oldest_beyond_capacity() {
        let router = ErrorRouter::default();
        for i in 0..ERROR_RING_CAPACITY + 10 {
            router.handle_error(
                FrameworkError::new(ErrorKind::Event, format!("E{i}"), "x"),
                ErrorContext::new(),
            );
        }
        let recent = router.recent_errors();
        assert_eq!(recent.len(), ERROR_RING_CAPACITY);
        assert_eq!(recent[0].code, "E10");
    }

    #[test]
    fn problem_integration_scrubs_details_in_production() {
        let integration = ProblemIntegration;
        let err = FrameworkError::new(ErrorKind::Validation, "BAD", "bad input").with_detail("field", "x");

        let dev = integration.serialize(&err, Environment::Development);
        assert!(dev.get("details").is_some());

        let prod = integration.serialize(&err, Environment::Production);
        assert!(prod.get("details").is_none());
        assert_eq!(prod["status"], 400);
    }

    #[test]
    fn shutdown_clears_handlers_and_ring() {
        let router = ErrorRouter::default();
        router.register_handler("*", |_, _| {});
        router.handle_error(FrameworkError::new(ErrorKind::Event, "X", "y"), ErrorContext::new());
        router.shutdown();
        assert!(router.recent_errors().is_empty());
    }
}
