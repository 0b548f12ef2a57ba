//! Dependency Container: the root registry every other subsystem is
//! resolved through.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::json;
use std::any::Any;
use std::sync::Arc;

use crate::emitter::LocalEmitter;
use crate::error::{ErrorKind, FrameworkError};
use crate::topo::{topological_order, TopoError};

/// Components the Container always wires first, in this order, when
/// present — mirrors the runtime's fixed phase ordering (system → config →
/// event bus → modules) rather than leaving it to registration order.
const LEADING_COMPONENTS: &[&str] = &["errorSystem", "config", "eventBusSystem", "moduleSystem"];

/// The optional lifecycle a registered component may participate in. Every
/// concrete type registered with [`DependencyContainer::register`] must
/// implement this — even as an empty `impl Component for T {}` picking up
/// the no-op defaults — so the container has one uniform thing to call
/// `initialize`/`shutdown` on regardless of what the component actually is,
/// the same way every module in `host_runtime.rs` is driven through one
/// `Module` trait no matter its concrete responsibilities.
pub trait Component: Any + Send + Sync {
    fn initialize(&self) -> Result<(), FrameworkError> {
        Ok(())
    }

    fn shutdown(&self) -> Result<(), FrameworkError> {
        Ok(())
    }
}

struct Registration {
    any: Arc<dyn Any + Send + Sync>,
    lifecycle: Arc<dyn Component>,
    dependencies: Vec<String>,
    singleton: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerState {
    Created,
    Initialized,
    ShutDown,
}

/// Options accepted by [`DependencyContainer::register`].
#[derive(Debug, Clone)]
pub struct RegisterOptions {
    pub dependencies: Vec<String>,
    pub singleton: bool,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self { dependencies: Vec::new(), singleton: true }
    }
}

/// Root component registry: registers named components with declared
/// dependencies, resolves them by name, and orders `initialize`/`shutdown`
/// via the shared topological sort with `errorSystem, config,
/// eventBusSystem, moduleSystem` preferred first.
pub struct DependencyContainer {
    components: DashMap<String, Registration>,
    state: RwLock<ContainerState>,
    emitter: LocalEmitter,
}

impl Default for DependencyContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyContainer {
    pub fn new() -> Self {
        Self {
            components: DashMap::new(),
            state: RwLock::new(ContainerState::Created),
            emitter: LocalEmitter::new(),
        }
    }

    pub fn on(&self, event: &str, handler: impl Fn(&serde_json::Value) + Send + Sync + 'static) {
        self.emitter.on(event, handler);
    }

    /// Register `component` under `name`. Re-registering an already present
    /// name is a `Config/DUPLICATE_COMPONENT` error; the container never
    /// silently replaces a component.
    pub fn register<T: Component>(
        &self,
        name: impl Into<String>,
        component: T,
        options: RegisterOptions,
    ) -> Result<(), FrameworkError> {
        let name = name.into();
        if self.components.contains_key(&name) {
            return Err(FrameworkError::new(
                ErrorKind::Config,
                "DUPLICATE_COMPONENT",
                format!("component '{name}' is already registered"),
            ));
        }
        let component = Arc::new(component);
        let lifecycle: Arc<dyn Component> = component.clone();
        let any: Arc<dyn Any + Send + Sync> = component;
        self.components.insert(
            name.clone(),
            Registration { any, lifecycle, dependencies: options.dependencies, singleton: options.singleton },
        );
        self.emitter.emit_local("component:registered", &json!({ "name": name }));
        Ok(())
    }

    /// Resolve a previously registered component by name and downcast it.
    /// Emits `component:resolved`, matching the event every direct call to
    /// `resolve` fires, in addition to the one `initialize()` fires per
    /// component as it walks the dependency order.
    pub fn resolve<T: Component>(&self, name: &str) -> Result<Arc<T>, FrameworkError> {
        let entry = self.components.get(name).ok_or_else(|| {
            FrameworkError::new(
                ErrorKind::Service,
                "UNKNOWN_COMPONENT",
                format!("no component registered under '{name}'"),
            )
        })?;
        let component = entry.any.clone().downcast::<T>().map_err(|_| {
            FrameworkError::new(
                ErrorKind::Service,
                "UNKNOWN_COMPONENT",
                format!("component '{name}' is not of the requested type"),
            )
        })?;
        self.emitter.emit_local("component:resolved", &json!({ "name": name }));
        Ok(component)
    }

    /// Whether `name` is a singleton (informational; the container always
    /// caches the `Arc` regardless, since cloning the handle is cheap).
    pub fn is_singleton(&self, name: &str) -> bool {
        self.components.get(name).map(|r| r.singleton).unwrap_or(false)
    }

    /// Best-effort component discovery hook. No-op by default: the Core
    /// Runtime has no filesystem/registry convention of its own to scan, so
    /// this exists purely as an extension point a host can override by
    /// registering components directly instead.
    pub fn discover(&self) {
        self.emitter.emit_local("discovery:completed", &json!({ "discovered": 0 }));
    }

    /// Compute the dependency-respecting init order over currently
    /// registered components, preferring [`LEADING_COMPONENTS`] first.
    fn resolve_order(&self) -> Result<Vec<String>, FrameworkError> {
        let names: Vec<String> = self.components.iter().map(|e| e.key().clone()).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        topological_order(
            &refs,
            |n| {
                self.components
                    .get(n)
                    .map(|r| r.dependencies.clone())
                    .unwrap_or_default()
            },
            LEADING_COMPONENTS,
        )
        .map_err(|e| match e {
            TopoError::Circular { path } => FrameworkError::new(
                ErrorKind::Config,
                "CIRCULAR_DEPENDENCY",
                format!("circular component dependency: {}", path.join(" -> ")),
            ),
            TopoError::MissingDependency { node, dependency } => FrameworkError::new(
                ErrorKind::Config,
                "MISSING_DEPENDENCY",
                format!("component '{node}' depends on unregistered component '{dependency}'"),
            ),
        })
    }

    /// Initialize the container: compute the dependency order, then for
    /// each name in turn resolve it and invoke `Component::initialize` on
    /// it, emitting `component:resolved` as each one completes. Idempotent
    /// calls after the first are a `Service/ALREADY_INITIALIZED` error,
    /// mirroring the Module Manager's own double-init guard.
    pub fn initialize(&self) -> Result<Vec<String>, FrameworkError> {
        {
            let mut state = self.state.write();
            if *state == ContainerState::Initialized {
                return Err(FrameworkError::new(
                    ErrorKind::Service,
                    "ALREADY_INITIALIZED",
                    "container is already initialized",
                ));
            }
            *state = ContainerState::Initialized;
        }
        let order = self.resolve_order()?;
        for name in &order {
            let lifecycle = self
                .components
                .get(name)
                .map(|r| r.lifecycle.clone())
                .expect("name came from resolve_order over the same map");
            lifecycle.initialize().map_err(|e| {
                e.wrap_unless_same_kind(
                    ErrorKind::Config,
                    "COMPONENT_INITIALIZATION_FAILED",
                    &format!("component '{name}' failed to initialize"),
                )
            })?;
            self.emitter.emit_local("component:resolved", &json!({ "name": name }));
        }
        self.emitter.emit_local("initialized", &json!({ "order": order }));
        Ok(order)
    }

    /// Shut down every registered component in reverse dependency order,
    /// logging and continuing past individual failures so one stuck
    /// component cannot block the rest from releasing their resources.
    pub fn shutdown(&self) -> Result<(), FrameworkError> {
        let mut order = self.resolve_order().unwrap_or_default();
        order.reverse();
        for name in &order {
            if let Some(lifecycle) = self.components.get(name).map(|r| r.lifecycle.clone()) {
                if let Err(err) = lifecycle.shutdown() {
                    tracing::warn!(component = %name, error = %err, "component shutdown failed, continuing");
                }
            }
        }
        *self.state.write() = ContainerState::ShutDown;
        self.emitter.emit_local("shutdown", &json!({}));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    impl Component for String {}
    impl Component for i32 {}
    impl Component for () {}

    struct CountingComponent {
        initialized: Arc<AtomicUsize>,
        shut_down: Arc<AtomicUsize>,
    }

    impl Component for CountingComponent {
        fn initialize(&self) -> Result<(), FrameworkError> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn shutdown(&self) -> Result<(), FrameworkError> {
            self.shut_down.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingComponent;

    impl Component for FailingComponent {
        fn initialize(&self) -> Result<(), FrameworkError> {
            Err(FrameworkError::new(ErrorKind::Validation, "BAD_SETUP", "nope"))
        }
    }

    #[test]
    fn register_then_resolve_round_trips_the_value() {
        let container = DependencyContainer::new();
        container.register("greeting", "hello".to_string(), RegisterOptions::default()).unwrap();
        let resolved: Arc<String> = container.resolve("greeting").unwrap();
        assert_eq!(*resolved, "hello");
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let container = DependencyContainer::new();
        container.register("x", 1i32, RegisterOptions::default()).unwrap();
        let err = container.register("x", 2i32, RegisterOptions::default()).unwrap_err();
        assert_eq!(err.code, "DUPLICATE_COMPONENT");
    }

    #[test]
    fn resolving_unknown_component_errors() {
        let container = DependencyContainer::new();
        let err = container.resolve::<i32>("ghost").unwrap_err();
        assert_eq!(err.code, "UNKNOWN_COMPONENT");
    }

    #[test]
    fn initialize_orders_leading_components_first() {
        let container = DependencyContainer::new();
        container.register("moduleSystem", (), RegisterOptions {
            dependencies: vec!["eventBusSystem".to_string()],
            singleton: true,
        }).unwrap();
        container.register("eventBusSystem", (), RegisterOptions {
            dependencies: vec!["config".to_string()],
            singleton: true,
        }).unwrap();
        container.register("config", (), RegisterOptions::default()).unwrap();
        container.register("errorSystem", (), RegisterOptions::default()).unwrap();

        let order = container.initialize().unwrap();
        assert_eq!(order, vec!["errorSystem", "config", "eventBusSystem", "moduleSystem"]);
    }

    #[test]
    fn initialize_invokes_each_component_and_emits_resolved_in_order() {
        let container = DependencyContainer::new();
        let initialized = Arc::new(AtomicUsize::new(0));
        let shut_down = Arc::new(AtomicUsize::new(0));
        container
            .register(
                "svc",
                CountingComponent { initialized: initialized.clone(), shut_down: shut_down.clone() },
                RegisterOptions::default(),
            )
            .unwrap();

        let resolved_names = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = resolved_names.clone();
        container.on("component:resolved", move |payload| {
            seen.lock().push(payload["name"].as_str().unwrap().to_string());
        });

        container.initialize().unwrap();
        assert_eq!(initialized.load(Ordering::SeqCst), 1);
        assert_eq!(*resolved_names.lock(), vec!["svc".to_string()]);

        container.shutdown().unwrap();
        assert_eq!(shut_down.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_component_initialize_is_wrapped() {
        let container = DependencyContainer::new();
        container.register("bad", FailingComponent, RegisterOptions::default()).unwrap();
        let err = container.initialize().unwrap_err();
        assert_eq!(err.code, "COMPONENT_INITIALIZATION_FAILED");
        assert_eq!(err.cause.unwrap().code, "BAD_SETUP");
    }

    #[test]
    fn second_initialize_call_is_rejected() {
        let container = DependencyContainer::new();
        container.initialize().unwrap();
        let err = container.initialize().unwrap_err();
        assert_eq!(err.code, "ALREADY_INITIALIZED");
    }

    #[test]
    fn circular_dependency_is_reported() {
        let container = DependencyContainer::new();
        container.register("a", (), RegisterOptions {
            dependencies: vec!["b".to_string()],
            singleton: true,
        }).unwrap();
        container.register("b", (), RegisterOptions {
            dependencies: vec!["a".to_string()],
            singleton: true,
        }).unwrap();
        let err = container.initialize().unwrap_err();
        assert_eq!(err.code, "CIRCULAR_DEPENDENCY");
    }

    #[test]
    fn missing_dependency_is_reported() {
        let container = DependencyContainer::new();
        container.register("a", (), RegisterOptions {
            dependencies: vec!["ghost".to_string()],
            singleton: true,
        }).unwrap();
        let err = container.initialize().unwrap_err();
        assert_eq!(err.code, "MISSING_DEPENDENCY");
    }

    #[test]
    fn registered_event_fires_with_component_name() {
        let container = DependencyContainer::new();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let s = seen.clone();
        container.on("component:registered", move |payload| {
            *s.lock() = Some(payload["name"].as_str().unwrap().to_string());
        });
        container.register("svc", 1i32, RegisterOptions::default()).unwrap();
        assert_eq!(seen.lock().as_deref(), Some("svc"));
    }
}
