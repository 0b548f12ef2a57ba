//! Module Manager: registers modules, orders their init/shutdown by
//! declared dependency, and runs a periodic health probe while running.

use dashmap::DashMap;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::base::{Module, ModuleHandle, ModuleState};
use crate::error::{ErrorKind, ErrorRouter, FrameworkError};
use crate::event_bus::EventBus;
use crate::topo::{topological_order, TopoError};

/// Aggregate health snapshot returned by [`ModuleManager::system_health`].
#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub modules: HashMap<String, bool>,
}

impl SystemHealth {
    pub fn healthy(&self) -> bool {
        self.modules.values().all(|ok| *ok)
    }
}

/// Owns every registered module, drives their lifecycle in dependency
/// order, and polls each running module's health on a fixed cadence.
pub struct ModuleManager {
    modules: DashMap<String, Arc<ModuleHandle>>,
    bus: Arc<EventBus>,
    router: Arc<ErrorRouter>,
    health_check_interval: Duration,
    probe_cancel: CancellationToken,
}

impl ModuleManager {
    pub fn new(bus: Arc<EventBus>, router: Arc<ErrorRouter>, health_check_interval: Duration) -> Self {
        Self {
            modules: DashMap::new(),
            bus,
            router,
            health_check_interval,
            probe_cancel: CancellationToken::new(),
        }
    }

    pub fn register(&self, module: Arc<dyn Module>) -> Result<(), FrameworkError> {
        let name = module.name().to_string();
        if self.modules.contains_key(&name) {
            return Err(FrameworkError::new(
                ErrorKind::Config,
                "DUPLICATE_MODULE",
                format!("module '{name}' is already registered"),
            ));
        }
        let handle = Arc::new(ModuleHandle::new(module));
        handle.attach_bus(self.bus.clone());
        self.modules.insert(name, handle);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Result<(), FrameworkError> {
        self.modules.remove(name).map(|_| ()).ok_or_else(|| {
            FrameworkError::new(ErrorKind::Service, "UNKNOWN_MODULE", format!("no module named '{name}'"))
        })
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<ModuleHandle>, FrameworkError> {
        self.modules
            .get(name)
            .map(|m| m.clone())
            .ok_or_else(|| FrameworkError::new(ErrorKind::Service, "UNKNOWN_MODULE", format!("no module named '{name}'")))
    }

    /// Dependency-respecting init order over currently registered modules,
    /// with no leading preference (unlike the Container, modules have no
    /// fixed head-of-line components).
    pub fn resolve_dependency_order(&self) -> Result<Vec<String>, FrameworkError> {
        let names: Vec<String> = self.modules.iter().map(|e| e.key().clone()).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        topological_order(&refs, |n| self.modules.get(n).map(|m| m.dependencies()).unwrap_or_default(), &[])
            .map_err(|e| match e {
                TopoError::Circular { path } => FrameworkError::new(
                    ErrorKind::Config,
                    "CIRCULAR_DEPENDENCY",
                    format!("circular module dependency: {}", path.join(" -> ")),
                ),
                TopoError::MissingDependency { node, dependency } => FrameworkError::new(
                    ErrorKind::Config,
                    "MISSING_DEPENDENCY",
                    format!("module '{node}' depends on unregistered module '{dependency}'"),
                ),
            })
    }

    /// Initialize every registered module in dependency order. The first
    /// failure stops the sweep; modules already running are left running
    /// rather than rolled back, mirroring the runtime's log-and-continue
    /// shutdown discipline applied in reverse at init time is *not* done —
    /// init fails fast, only shutdown is best-effort.
    pub async fn initialize(&self) -> Result<Vec<String>, FrameworkError> {
        let order = self.resolve_dependency_order()?;
        let mut initialized_so_far: Vec<String> = Vec::with_capacity(order.len());
        for name in &order {
            let handle = self.resolve(name)?;
            if let Err(err) = handle.initialize(&self.bus, &initialized_so_far).await {
                let mut ctx = crate::error::ErrorContext::new();
                ctx.insert("module".to_string(), json!(name));
                ctx.insert("phase".to_string(), json!("initialize"));
                handle.handle_error(err.clone(), ctx, Some(&self.router));
                return Err(err);
            }
            self.bus.record_metric("module.initialized", json!({ "module": name }));
            initialized_so_far.push(name.clone());
        }
        self.spawn_health_probe();
        Ok(order)
    }

    fn spawn_health_probe(&self) {
        let modules: Vec<Arc<ModuleHandle>> = self.modules.iter().map(|e| e.value().clone()).collect();
        let bus = self.bus.clone();
        let interval = self.health_check_interval;
        let cancel = self.probe_cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        for handle in &modules {
                            if matches!(handle.state(), ModuleState::Running) {
                                continue;
                            }
                            bus.record_metric(
                                "module.health_check.failed",
                                json!({ "module": handle.name() }),
                            );
                        }
                    }
                }
            }
        });
    }

    /// Shut down every registered module in reverse dependency order,
    /// logging and continuing past individual failures so one stuck module
    /// cannot block the rest from releasing their resources.
    pub async fn shutdown(&self) -> Result<(), FrameworkError> {
        self.probe_cancel.cancel();
        let mut order = self.resolve_dependency_order().unwrap_or_default();
        order.reverse();
        for name in order {
            if let Ok(handle) = self.resolve(&name) {
                if let Err(err) = handle.shutdown().await {
                    tracing::warn!(module = %name, error = %err, "module shutdown failed, continuing");
                }
                self.bus.record_metric("module.shutdown", json!({ "module": name }));
            }
        }
        Ok(())
    }

    pub fn system_health(&self) -> SystemHealth {
        let modules = self
            .modules
            .iter()
            .map(|e| (e.key().clone(), matches!(e.value().state(), ModuleState::Running)))
            .collect();
        SystemHealth { modules }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Environment;
    use async_trait::async_trait;

    struct Leaf(&'static str);
    struct Dependent(&'static str, Vec<String>);

    #[async_trait]
    impl Module for Leaf {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[async_trait]
    impl Module for Dependent {
        fn name(&self) -> &str {
            self.0
        }
        fn dependencies(&self) -> Vec<String> {
            self.1.clone()
        }
    }

    fn manager() -> ModuleManager {
        let bus = Arc::new(EventBus::new(100));
        bus.start();
        let router = Arc::new(ErrorRouter::new(Environment::Development));
        ModuleManager::new(bus, router, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn initialize_runs_dependencies_before_dependents() {
        let manager = manager();
        manager.register(Arc::new(Leaf("config"))).unwrap();
        manager.register(Arc::new(Dependent("orders", vec!["config".to_string()]))).unwrap();

        let order = manager.initialize().await.unwrap();
        assert_eq!(order, vec!["config", "orders"]);
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let manager = manager();
        manager.register(Arc::new(Leaf("a"))).unwrap();
        let err = manager.register(Arc::new(Leaf("a"))).unwrap_err();
        assert_eq!(err.code, "DUPLICATE_MODULE");
    }

    #[tokio::test]
    async fn unregister_unknown_module_errors() {
        let manager = manager();
        let err = manager.unregister("ghost").unwrap_err();
        assert_eq!(err.code, "UNKNOWN_MODULE");
    }

    #[tokio::test]
    async fn system_health_reports_running_modules_as_healthy() {
        let manager = manager();
        manager.register(Arc::new(Leaf("a"))).unwrap();
        manager.initialize().await.unwrap();
        let health = manager.system_health();
        assert!(health.healthy());
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_runs_in_reverse_dependency_order() {
        let manager = manager();
        manager.register(Arc::new(Leaf("config"))).unwrap();
        manager.register(Arc::new(Dependent("orders", vec!["config".to_string()]))).unwrap();
        manager.initialize().await.unwrap();
        manager.shutdown().await.unwrap();
        // no panic and both reach ShutDown
        assert!(matches!(manager.resolve("config").unwrap().state(), ModuleState::ShutDown));
        assert!(matches!(manager.resolve("orders").unwrap().state(), ModuleState::ShutDown));
    }
}
