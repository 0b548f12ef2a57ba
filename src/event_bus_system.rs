//! Event Bus System: supervises one [`EventBus`], automatically forwarding
//! `system:*` events and every other event into a separate system-level
//! emitter, without looping back into the bus.

use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};

use crate::container::Component;
use crate::emitter::LocalEmitter;
use crate::error::{ErrorKind, FrameworkError};
use crate::event_bus::{Event, EventBus};

/// Wraps a single [`EventBus`] instance and installs the forwarding rules
/// and health checks the bus does not know about on its own: `system:*`
/// events are forwarded as-is to the system-level emitter, while every
/// other event is forwarded under its own name too — both rules feed the
/// same one-way [`LocalEmitter`], which never re-publishes into the bus, so
/// there is no feedback loop.
pub struct EventBusSystem {
    bus: OnceLock<Arc<EventBus>>,
    system_emitter: Arc<LocalEmitter>,
    max_history_size: usize,
}

impl EventBusSystem {
    pub fn new(max_history_size: usize) -> Self {
        Self { bus: OnceLock::new(), system_emitter: Arc::new(LocalEmitter::new()), max_history_size }
    }

    /// Listen for `name` at the system level — events forwarded here
    /// originated on the bus but do not loop back into it.
    pub fn on_system(&self, name: &str, handler: impl Fn(&Value) + Send + Sync + 'static) {
        self.system_emitter.on(name, handler);
    }

    /// Build the underlying bus, install the `state`/`eventBus` health
    /// checks, wire the automatic forwarding subscriptions, and emit
    /// `system:initialized`. Calling `event_bus()` before this returns
    /// `Event/NOT_INITIALIZED`.
    pub fn initialize(&self) -> Result<Arc<EventBus>, FrameworkError> {
        let bus = Arc::new(EventBus::new(self.max_history_size));
        bus.start();

        let bus_for_state = bus.clone();
        bus.register_health_check("state", move || bus_for_state.is_running());
        let bus_for_self = bus.clone();
        bus.register_health_check("eventBus", move || bus_for_self.is_running());

        let emitter = self.system_emitter.clone();
        bus.subscribe("system:*", move |event: &Event| {
            emitter.emit_local(&event.name, &event.data);
        })?;
        let emitter = self.system_emitter.clone();
        bus.subscribe("*", move |event: &Event| {
            if !event.name.starts_with("system:") {
                emitter.emit_local(&event.name, &event.data);
            }
        })?;

        bus.emit("system:initialized", json!({})).ok();

        self.bus
            .set(bus.clone())
            .map_err(|_| FrameworkError::new(ErrorKind::Service, "ALREADY_INITIALIZED", "event bus system is already initialized"))?;
        Ok(bus)
    }

    pub fn event_bus(&self) -> Result<Arc<EventBus>, FrameworkError> {
        self.bus
            .get()
            .cloned()
            .ok_or_else(|| FrameworkError::new(ErrorKind::Event, "NOT_INITIALIZED", "event bus system is not initialized"))
    }

    /// Forward `name`/`payload` into the underlying bus unchanged
    /// (single-hop, not recursive) — a manual alternative to emitting on
    /// the bus directly, for callers that only hold the system handle.
    pub fn forward(&self, name: &str, payload: Value) -> Result<(), FrameworkError> {
        let bus = self.event_bus()?;
        bus.emit(name, payload)
    }

    pub fn shutdown(&self) -> Result<(), FrameworkError> {
        if let Some(bus) = self.bus.get() {
            bus.shutdown();
        }
        Ok(())
    }
}

/// Lets an `EventBusSystem` be registered directly with the
/// [`crate::container::DependencyContainer`], so its `initialize`/
/// `shutdown` run as part of the container's own lifecycle sweep.
impl Component for EventBusSystem {
    fn initialize(&self) -> Result<(), FrameworkError> {
        EventBusSystem::initialize(self).map(|_| ())
    }

    fn shutdown(&self) -> Result<(), FrameworkError> {
        EventBusSystem::shutdown(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn event_bus_unavailable_before_initialize() {
        let system = EventBusSystem::new(10);
        let err = system.event_bus().unwrap_err();
        assert_eq!(err.code, "NOT_INITIALIZED");
    }

    #[test]
    fn initialize_installs_state_and_event_bus_health_checks() {
        let system = EventBusSystem::new(10);
        let bus = system.initialize().unwrap();
        let health = bus.check_health();
        assert_eq!(health["state"], true);
        assert_eq!(health["eventBus"], true);
    }

    #[test]
    fn initialize_records_system_initialized_in_history() {
        let system = EventBusSystem::new(10);
        let bus = system.initialize().unwrap();
        assert_eq!(bus.get_history("system:initialized").len(), 1);
    }

    #[test]
    fn forward_requires_prior_initialization() {
        let system = EventBusSystem::new(10);
        let err = system.forward("orders.created", json!({})).unwrap_err();
        assert_eq!(err.code, "NOT_INITIALIZED");
    }

    #[test]
    fn system_prefixed_events_forward_to_system_level() {
        let system = EventBusSystem::new(10);
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        system.on_system("system:ready", move |payload| {
            *s.lock().unwrap() = Some(payload.clone());
        });
        let bus = system.initialize().unwrap();
        bus.emit("system:ready", json!({ "ok": true })).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(json!({ "ok": true })));
    }

    #[test]
    fn non_system_events_also_forward_without_double_delivery() {
        let system = EventBusSystem::new(10);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        system.on_system("orders.created", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let bus = system.initialize().unwrap();
        bus.emit("orders.created", json!({})).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1, "forwarded exactly once, not via both subscriptions");
    }
}
