//! The module lifecycle contract and the state machine that drives it.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use crate::emitter::LocalEmitter;
use crate::error::{ErrorContext, ErrorKind, ErrorRouter, FrameworkError};
use crate::event_bus::EventBus;

/// Cap on a module's own recent-error ring, independent of the Error
/// Router's ring (`ERROR_RING_CAPACITY`), since a failing module should
/// still be introspectable after the router itself stops logging it.
pub const MODULE_ERROR_RING_CAPACITY: usize = 100;

/// Ordered lifecycle states. `Error` absorbs a failure from any state and is
/// terminal with respect to further lifecycle progression, though
/// `shutdown` is still attempted from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Created,
    Initializing,
    Configuring,
    Setup,
    InitializingModule,
    Running,
    ShuttingDown,
    ShutDown,
    Error,
}

/// Hooks a concrete module overrides; everything has a no-op default so a
/// simple module only implements what it needs, in the spirit of the
/// teacher's `Module`/`StatefulModule` trait split.
#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    /// Names of other modules that must be running before this one
    /// initializes. Declared as data, not inferred, so the Module Manager
    /// can topologically sort without instantiating anything.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Check `self.dependencies()` against `available`, the names already
    /// initialized ahead of this module in dependency order. The default
    /// implementation is what every module gets for free; a module only
    /// overrides this if it needs a check beyond plain presence.
    async fn validate_dependencies(&self, available: &[String]) -> Result<(), FrameworkError> {
        let missing: Vec<String> =
            self.dependencies().into_iter().filter(|d| !available.contains(d)).collect();
        if !missing.is_empty() {
            return Err(FrameworkError::new(
                ErrorKind::Module,
                "MISSING_DEPENDENCIES",
                format!("module '{}' is missing dependencies: {}", self.name(), missing.join(", ")),
            )
            .with_detail("missing", json!(missing)));
        }
        Ok(())
    }

    async fn validate_config(&self) -> Result<(), FrameworkError> {
        Ok(())
    }

    async fn on_configure(&self) -> Result<(), FrameworkError> {
        Ok(())
    }

    async fn setup_event_handlers(&self, _bus: &EventBus) -> Result<(), FrameworkError> {
        Ok(())
    }

    async fn setup_health_checks(&self) -> Result<Vec<(String, bool)>, FrameworkError> {
        Ok(Vec::new())
    }

    async fn on_initialize(&self) -> Result<(), FrameworkError> {
        Ok(())
    }

    async fn on_shutdown(&self) -> Result<(), FrameworkError> {
        Ok(())
    }
}

struct RecordedError {
    error: FrameworkError,
    context: ErrorContext,
}

/// Owns one module's runtime state: its lifecycle phase, a local emitter for
/// in-process listeners, and a bounded ring of its own recent errors.
pub struct ModuleHandle {
    module: Arc<dyn Module>,
    state: RwLock<ModuleState>,
    emitter: LocalEmitter,
    errors: RwLock<VecDeque<RecordedError>>,
    bus: OnceLock<Arc<EventBus>>,
}

impl ModuleHandle {
    pub fn new(module: Arc<dyn Module>) -> Self {
        Self {
            module,
            state: RwLock::new(ModuleState::Created),
            emitter: LocalEmitter::new(),
            errors: RwLock::new(VecDeque::new()),
            bus: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn dependencies(&self) -> Vec<String> {
        self.module.dependencies()
    }

    pub fn state(&self) -> ModuleState {
        *self.state.read()
    }

    pub fn on(&self, event: &str, handler: impl Fn(&Value) + Send + Sync + 'static) {
        self.emitter.on(event, handler);
    }

    pub fn attach_bus(&self, bus: Arc<EventBus>) {
        let _ = self.bus.set(bus);
    }

    /// Dual emission: local listeners fire first and their outcome is
    /// authoritative; a failure forwarding to the shared bus is routed
    /// through [`ModuleHandle::handle_error`] but never masks the local
    /// result, matching the "bus failures must not surface as local
    /// emission failures" rule.
    pub fn emit(&self, event: &str, payload: Value) {
        self.emitter.emit_local(event, &payload);
        if let Some(bus) = self.bus.get() {
            if let Err(err) = bus.emit(event, payload) {
                let mut ctx = ErrorContext::new();
                ctx.insert("module".to_string(), json!(self.name()));
                ctx.insert("phase".to_string(), json!("emit"));
                self.handle_error(err, ctx, None);
            }
        }
    }

    /// Record `error` in this module's ring and forward it to `router`. The
    /// router call is itself guarded: if it panics, a secondary
    /// `{phase: "error-handling"}` entry is recorded, and `handle_error`
    /// still returns normally.
    pub fn handle_error(&self, error: FrameworkError, mut context: ErrorContext, router: Option<&ErrorRouter>) {
        context.entry("module".to_string()).or_insert_with(|| json!(self.name()));
        self.push_error(error.clone(), context.clone());

        if let Some(router) = router {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                router.handle_error(error, context);
            }));
            if outcome.is_err() {
                let mut secondary_ctx = ErrorContext::new();
                secondary_ctx.insert("module".to_string(), json!(self.name()));
                secondary_ctx.insert("phase".to_string(), json!("error-handling"));
                self.push_error(
                    FrameworkError::new(ErrorKind::Module, "ERROR_HANDLER_PANICKED", "error router panicked"),
                    secondary_ctx,
                );
            }
        }
    }

    fn push_error(&self, error: FrameworkError, context: ErrorContext) {
        let mut errors = self.errors.write();
        if errors.len() >= MODULE_ERROR_RING_CAPACITY {
            errors.pop_front();
        }
        errors.push_back(RecordedError { error, context });
    }

    pub fn recent_errors(&self) -> Vec<FrameworkError> {
        self.errors.read().iter().map(|r| r.error.clone()).collect()
    }

    fn set_state(&self, state: ModuleState) {
        *self.state.write() = state;
    }

    /// Wrap any non-`Module`-kind failure into `MODULE_INITIALIZATION_FAILED`
    /// and flip this handle to `Error`, the uniform discipline every
    /// lifecycle hook failure goes through during `initialize`.
    fn wrap_failure(&self, err: FrameworkError) -> FrameworkError {
        self.set_state(ModuleState::Error);
        err.wrap_unless_same_kind(
            crate::error::ErrorKind::Module,
            "MODULE_INITIALIZATION_FAILED",
            &format!("module '{}' failed to initialize", self.name()),
        )
    }

    /// Drive the module through `validating dependencies → configuring →
    /// setup → initializing_module → running`, in that fixed order.
    /// `available` lists the names already initialized ahead of this one in
    /// dependency order, passed to [`Module::validate_dependencies`]. Any
    /// hook failing flips the module to `Error` and returns the failure
    /// wrapped as `MODULE_INITIALIZATION_FAILED` unless it is already a
    /// `Module`-kind error (e.g. `MISSING_DEPENDENCIES`).
    pub async fn initialize(&self, bus: &EventBus, available: &[String]) -> Result<(), FrameworkError> {
        self.set_state(ModuleState::Initializing);
        self.module.validate_dependencies(available).await.map_err(|e| self.wrap_failure(e))?;

        self.set_state(ModuleState::Configuring);
        self.module.validate_config().await.map_err(|e| self.wrap_failure(e))?;
        self.module.on_configure().await.map_err(|e| self.wrap_failure(e))?;

        self.set_state(ModuleState::Setup);
        self.module.setup_event_handlers(bus).await.map_err(|e| self.wrap_failure(e))?;
        let checks = self.module.setup_health_checks().await.map_err(|e| self.wrap_failure(e))?;
        for (name, ok) in checks {
            let name_for_bus = json!({ "module": self.name(), "check": name, "ok": ok });
            self.emitter.emit_local("health:registered", &name_for_bus);
        }

        self.set_state(ModuleState::InitializingModule);
        self.module.on_initialize().await.map_err(|e| self.wrap_failure(e))?;

        self.set_state(ModuleState::Running);
        Ok(())
    }

    /// `shutdown` is attempted regardless of current state (including
    /// `Error`), since a half-initialized module may still hold resources
    /// that must be released.
    pub async fn shutdown(&self) -> Result<(), FrameworkError> {
        self.set_state(ModuleState::ShuttingDown);
        let result = self.module.on_shutdown().await.map_err(|e| {
            e.wrap_unless_same_kind(
                crate::error::ErrorKind::Module,
                "MODULE_SHUTDOWN_FAILED",
                &format!("module '{}' failed to shut down", self.name()),
            )
        });
        self.set_state(ModuleState::ShutDown);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventBus;

    struct NoopModule {
        name: String,
        deps: Vec<String>,
    }

    #[async_trait]
    impl Module for NoopModule {
        fn name(&self) -> &str {
            &self.name
        }

        fn dependencies(&self) -> Vec<String> {
            self.deps.clone()
        }
    }

    struct FailingInitModule;

    #[async_trait]
    impl Module for FailingInitModule {
        fn name(&self) -> &str {
            "failing"
        }

        async fn on_initialize(&self) -> Result<(), FrameworkError> {
            Err(FrameworkError::new(ErrorKind::Validation, "BAD_CONFIG", "nope"))
        }
    }

    #[tokio::test]
    async fn lifecycle_reaches_running_on_success() {
        let handle = ModuleHandle::new(Arc::new(NoopModule { name: "orders".into(), deps: vec![] }));
        let bus = EventBus::new(10);
        handle.initialize(&bus, &[]).await.unwrap();
        assert!(matches!(handle.state(), ModuleState::Running));
    }

    #[tokio::test]
    async fn failing_initialize_flips_to_error_and_wraps() {
        let handle = ModuleHandle::new(Arc::new(FailingInitModule));
        let bus = EventBus::new(10);
        let err = handle.initialize(&bus, &[]).await.unwrap_err();
        assert!(matches!(handle.state(), ModuleState::Error));
        assert_eq!(err.code, "MODULE_INITIALIZATION_FAILED");
        assert_eq!(err.cause.unwrap().code, "BAD_CONFIG");
    }

    #[tokio::test]
    async fn missing_dependency_is_reported_before_other_hooks_run() {
        let handle =
            ModuleHandle::new(Arc::new(NoopModule { name: "orders".into(), deps: vec!["config".to_string()] }));
        let bus = EventBus::new(10);
        let err = handle.initialize(&bus, &[]).await.unwrap_err();
        assert_eq!(err.code, "MISSING_DEPENDENCIES");
        assert!(matches!(handle.state(), ModuleState::Error));
    }

    #[tokio::test]
    async fn present_dependency_passes_validation() {
        let handle =
            ModuleHandle::new(Arc::new(NoopModule { name: "orders".into(), deps: vec!["config".to_string()] }));
        let bus = EventBus::new(10);
        handle.initialize(&bus, &["config".to_string()]).await.unwrap();
        assert!(matches!(handle.state(), ModuleState::Running));
    }

    #[tokio::test]
    async fn shutdown_runs_even_from_error_state() {
        let handle = ModuleHandle::new(Arc::new(FailingInitModule));
        let bus = EventBus::new(10);
        let _ = handle.initialize(&bus, &[]).await;
        handle.shutdown().await.unwrap();
        assert!(matches!(handle.state(), ModuleState::ShutDown));
    }

    #[test]
    fn dual_emission_local_listener_runs_even_without_attached_bus() {
        let handle = ModuleHandle::new(Arc::new(NoopModule { name: "x".into(), deps: vec![] }));
        let seen = Arc::new(parking_lot::Mutex::new(false));
        let s = seen.clone();
        handle.on("ready", move |_| *s.lock() = true);
        handle.emit("ready", json!({}));
        assert!(*seen.lock());
    }

    #[test]
    fn handle_error_records_module_name_in_context() {
        let handle = ModuleHandle::new(Arc::new(NoopModule { name: "orders".into(), deps: vec![] }));
        handle.handle_error(FrameworkError::new(ErrorKind::Module, "X", "y"), ErrorContext::new(), None);
        let recent = handle.recent_errors();
        assert_eq!(recent.len(), 1);
    }
}
