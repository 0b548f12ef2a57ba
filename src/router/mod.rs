//! Router: a method+path route registry, middleware ordering, adapter-
//! mediated application to an external HTTP framework, and OpenAPI
//! synthesis over the registered routes.

pub mod openapi;

pub use openapi::{generate_openapi_doc, translate_path_params, OpenApiOptions};

use dashmap::DashMap;
use http::Method;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::emitter::LocalEmitter;
use crate::error::{ErrorKind, FrameworkError};
use crate::event_bus::EventBus;
use std::collections::HashMap;

/// Per-route options beyond method/path/owner.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    pub auth: bool,
    pub middleware: Vec<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub module: String,
    pub options: RouteOptions,
}

#[derive(Debug, Clone)]
struct MiddlewareEntry {
    name: String,
    order: i32,
    /// `None` means global; `Some(prefix)` applies to any path with that
    /// prefix, honoring a trailing `*` the way route registration does.
    path_scope: Option<String>,
}

impl MiddlewareEntry {
    fn applies_to(&self, path: &str) -> bool {
        match &self.path_scope {
            None => true,
            Some(scope) => match scope.strip_suffix('*') {
                Some(prefix) => path.starts_with(prefix),
                None => scope == path,
            },
        }
    }
}

/// Result of applying the route table to an external framework: how many
/// routes an adapter actually wired up.
#[derive(Debug, Clone, Copy)]
pub struct AppliedRoutes {
    pub count: usize,
}

/// Mediates between this crate's framework-agnostic route table and a
/// concrete HTTP framework. The Core Runtime ships no implementation; a
/// host application provides one (e.g. over `axum::Router`).
pub trait RouteAdapter: Send + Sync {
    fn apply_routes(&self, framework: axum::Router, routes: &[Route]) -> anyhow::Result<AppliedRoutes>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouterState {
    Created,
    Initialized,
    ShutDown,
}

/// Route registry, middleware pipeline and OpenAPI synthesizer.
pub struct Router {
    routes: DashMap<(Method, String), Route>,
    middleware: RwLock<Vec<MiddlewareEntry>>,
    adapters: DashMap<String, Arc<dyn RouteAdapter>>,
    state: RwLock<RouterState>,
    emitter: LocalEmitter,
    metrics: RwLock<HashMap<String, Value>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: DashMap::new(),
            middleware: RwLock::new(Vec::new()),
            adapters: DashMap::new(),
            state: RwLock::new(RouterState::Created),
            emitter: LocalEmitter::new(),
            metrics: RwLock::new(HashMap::new()),
        }
    }

    pub fn on(&self, event: &str, handler: impl Fn(&Value) + Send + Sync + 'static) {
        self.emitter.on(event, handler);
    }

    pub fn record_metric(&self, name: &str, value: Value) {
        self.metrics.write().insert(name.to_string(), value);
    }

    pub fn get_metrics(&self) -> HashMap<String, Value> {
        self.metrics.read().clone()
    }

    pub fn initialize(&self) {
        *self.state.write() = RouterState::Initialized;
        self.emitter.emit_local("router:initialized", &json!({}));
    }

    fn validate_path(path: &str) -> Result<(), FrameworkError> {
        if !path.starts_with('/') {
            return Err(FrameworkError::new(
                ErrorKind::Router,
                "INVALID_PATH",
                format!("route path '{path}' must start with '/'"),
            ));
        }
        Ok(())
    }

    pub fn register_route(
        &self,
        method: Method,
        path: &str,
        module: &str,
        options: RouteOptions,
    ) -> Result<(), FrameworkError> {
        Self::validate_path(path)?;
        let key = (method.clone(), path.to_string());
        if self.routes.contains_key(&key) {
            return Err(FrameworkError::new(
                ErrorKind::Router,
                "ROUTE_CONFLICT",
                format!("route {method} {path} is already registered"),
            ));
        }
        self.routes.insert(
            key,
            Route { method: method.clone(), path: path.to_string(), module: module.to_string(), options },
        );
        self.emitter.emit_local("router.route.register", &json!({ "method": method.as_str(), "path": path }));
        self.record_metric(
            "routes.registered",
            json!({ "method": method.as_str(), "path": path }),
        );
        Ok(())
    }

    /// Prefix `path` with `/api/v{version}` and register normally.
    pub fn register_versioned_route(
        &self,
        version: u32,
        method: Method,
        path: &str,
        module: &str,
        options: RouteOptions,
    ) -> Result<(), FrameworkError> {
        let versioned = format!("/api/v{version}{path}");
        self.register_route(method, &versioned, module, options)
    }

    pub fn unregister_route(&self, method: &Method, path: &str) -> Result<(), FrameworkError> {
        let key = (method.clone(), path.to_string());
        self.routes.remove(&key).ok_or_else(|| {
            FrameworkError::new(
                ErrorKind::Router,
                "UNKNOWN_ROUTE",
                format!("no route registered for {method} {path}"),
            )
        })?;
        self.emitter.emit_local("router.route.unregister", &json!({ "method": method.as_str(), "path": path }));
        Ok(())
    }

    pub fn unregister_module_routes(&self, module: &str) {
        self.routes.retain(|_, route| route.module != module);
        self.emitter.emit_local("router.module.unregister", &json!({ "module": module }));
    }

    pub fn clear_routes(&self) {
        self.routes.clear();
        self.emitter.emit_local("routes.clear", &json!({}));
        self.record_metric("routes.cleared", json!({ "value": true }));
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.iter().map(|e| e.value().clone()).collect()
    }

    pub fn register_adapter(&self, name: &str, adapter: Arc<dyn RouteAdapter>) -> Result<(), FrameworkError> {
        if name.is_empty() {
            return Err(FrameworkError::new(ErrorKind::Router, "INVALID_ADAPTER_NAME", "adapter name must not be empty"));
        }
        self.adapters.insert(name.to_string(), adapter);
        Ok(())
    }

    /// Apply the current route table through the adapter registered as
    /// `adapter_name`.
    pub fn apply_routes(&self, adapter_name: &str, framework: axum::Router) -> Result<AppliedRoutes, FrameworkError> {
        if *self.state.read() != RouterState::Initialized {
            return Err(FrameworkError::new(ErrorKind::Router, "NOT_INITIALIZED", "router has not been initialized"));
        }
        let adapter = self.adapters.get(adapter_name).ok_or_else(|| {
            FrameworkError::new(
                ErrorKind::Router,
                "ADAPTER_NOT_FOUND",
                format!("no adapter registered under '{adapter_name}'"),
            )
        })?;
        let routes = self.routes();
        let applied = adapter.apply_routes(framework, &routes).map_err(|e| {
            FrameworkError::new(ErrorKind::Router, "ROUTES_APPLICATION_FAILED", e.to_string())
        })?;
        self.record_metric("routes.applied", json!({ "value": applied.count }));
        Ok(applied)
    }

    pub fn register_middleware(&self, name: &str, order: i32, path_scope: Option<&str>) {
        self.middleware.write().push(MiddlewareEntry {
            name: name.to_string(),
            order,
            path_scope: path_scope.map(|s| s.to_string()),
        });
    }

    /// Middleware applicable to `path`, global entries and path-scoped ones
    /// merged, sorted ascending by declared order.
    pub fn middleware_for_route(&self, path: &str) -> Vec<String> {
        let mut applicable: Vec<MiddlewareEntry> =
            self.middleware.read().iter().filter(|m| m.applies_to(path)).cloned().collect();
        applicable.sort_by_key(|m| m.order);
        applicable.into_iter().map(|m| m.name).collect()
    }

    pub fn generate_openapi_doc(&self, options: &OpenApiOptions) -> Value {
        generate_openapi_doc(&self.routes(), options)
    }

    /// Wire this router to `bus`: route mutation events emitted elsewhere
    /// are mirrored here, so a module can drive the route table purely
    /// through the event bus instead of holding a `Router` handle.
    pub fn subscribe_to_bus(self: &Arc<Self>, bus: &EventBus) -> Result<(), FrameworkError> {
        let router = self.clone();
        bus.subscribe("routes.clear", move |_| router.clear_routes())?;
        let router = self.clone();
        bus.subscribe("router.module.unregister", move |event| {
            if let Some(module) = event.data["module"].as_str() {
                router.unregister_module_routes(module);
            }
        })?;
        Ok(())
    }

    pub fn shutdown(&self) {
        *self.state.write() = RouterState::ShutDown;
        self.clear_routes();
        self.emitter.emit_local("router:shutdown", &json!({}));
    }
}
