//! Event Bus: pub/sub with exact, wildcard and glob subscriptions, an
//! immediate-delivery default and an explicit queued mode, bounded
//! per-event history, metrics and health checks.

mod pattern;

pub use pattern::{Pattern, PatternError};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::error::{ErrorKind, FrameworkError};

pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;
pub type HealthCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// A delivered or queued occurrence: a stable identity (`id`) separate from
/// `name`, plus the caller's payload and any metadata attached at emit time.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl Event {
    fn new(name: &str, data: Value, metadata: HashMap<String, Value>) -> Self {
        Self { id: Uuid::now_v7(), name: name.to_string(), data, timestamp: Utc::now(), metadata }
    }
}

/// Options accepted by [`EventBus::emit_with_options`]. The default
/// (`queue: false`) delivers synchronously to every matching subscription
/// before `emit` returns; setting `queue: true` instead appends to `name`'s
/// queue for later draining via [`EventBus::process_queue`].
#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    pub queue: bool,
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusState {
    Created,
    Running,
    Error,
    ShutDown,
}

struct Subscription {
    pattern: Pattern,
    handler: Handler,
}

/// One process, one bus: immediate or queued emission, pattern
/// subscriptions, a bounded recent-history ring per event name, counters
/// and health probes.
pub struct EventBus {
    state: RwLock<BusState>,
    subscriptions: RwLock<HashMap<u64, Subscription>>,
    next_subscription_id: AtomicU64,
    queues: RwLock<HashMap<String, VecDeque<Event>>>,
    history: RwLock<HashMap<String, VecDeque<Event>>>,
    max_history_size: usize,
    health_checks: RwLock<HashMap<String, HealthCheck>>,
    metrics: RwLock<HashMap<String, Value>>,
}

impl EventBus {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            state: RwLock::new(BusState::Created),
            subscriptions: RwLock::new(HashMap::new()),
            next_subscription_id: AtomicU64::new(1),
            queues: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            max_history_size,
            health_checks: RwLock::new(HashMap::new()),
            metrics: RwLock::new(HashMap::new()),
        }
    }

    pub fn start(&self) {
        *self.state.write() = BusState::Running;
    }

    fn require_name(name: &str) -> Result<(), FrameworkError> {
        if name.is_empty() {
            return Err(FrameworkError::new(
                ErrorKind::Event,
                "INVALID_EVENT_NAME",
                "event name must not be empty",
            ));
        }
        Ok(())
    }

    /// Emit `name`/`payload` with default options: immediate, synchronous
    /// delivery to every matching subscription.
    pub fn emit(&self, name: &str, payload: Value) -> Result<(), FrameworkError> {
        self.emit_with_options(name, payload, EmitOptions::default())
    }

    /// Emit `name`/`payload`, delivering immediately unless
    /// `options.queue` is set, in which case the event is appended to
    /// `name`'s queue for later draining. Either way the event is appended
    /// to `name`'s bounded history first.
    pub fn emit_with_options(&self, name: &str, payload: Value, options: EmitOptions) -> Result<(), FrameworkError> {
        Self::require_name(name)?;
        let event = Event::new(name, payload, options.metadata);
        self.push_history(name, event.clone());

        if options.queue {
            let queue_size = {
                let mut queues = self.queues.write();
                let queue = queues.entry(name.to_string()).or_default();
                queue.push_back(event);
                queue.len()
            };
            self.record_metric("eventbus.events.emitted", json!({ "eventName": name, "queued": true }));
            self.record_metric("eventbus.queued", json!({ "eventName": name, "queueSize": queue_size }));
        } else {
            self.record_metric("eventbus.events.emitted", json!({ "eventName": name, "queued": false }));
            self.deliver(&event)?;
        }
        Ok(())
    }

    fn push_history(&self, name: &str, event: Event) {
        let mut history = self.history.write();
        let entries = history.entry(name.to_string()).or_default();
        if entries.len() >= self.max_history_size {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    /// Register a handler against `pattern` (exact, `"*"`, or a dot-segment
    /// glob). Returns a subscription id usable with [`EventBus::unsubscribe`].
    pub fn subscribe<F>(&self, pattern: &str, handler: F) -> Result<u64, FrameworkError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let compiled = Pattern::compile(pattern).map_err(|_| {
            FrameworkError::new(ErrorKind::Event, "INVALID_PATTERN", format!("invalid pattern '{pattern}'"))
        })?;
        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.write().insert(id, Subscription { pattern: compiled, handler: Arc::new(handler) });
        Ok(id)
    }

    pub fn unsubscribe(&self, id: u64) -> Result<(), FrameworkError> {
        let removed = self.subscriptions.write().remove(&id);
        match removed {
            Some(sub) => {
                self.record_metric("eventbus.unsubscriptions", json!({ "pattern": sub.pattern.source() }));
                Ok(())
            }
            None => Err(FrameworkError::new(
                ErrorKind::Event,
                "HANDLER_NOT_FOUND",
                format!("no subscription with id {id}"),
            )),
        }
    }

    /// Deliver `event` to every matching subscription, in subscription
    /// registration order. A handler panic aborts delivery to any
    /// remaining handlers for this event and is raised as an
    /// `Event/HANDLER_ERROR` carrying the offending event's id.
    fn deliver(&self, event: &Event) -> Result<(), FrameworkError> {
        let mut subs: Vec<(u64, Handler)> = {
            let guard = self.subscriptions.read();
            guard
                .iter()
                .filter(|(_, s)| s.pattern.matches(&event.name))
                .map(|(id, s)| (*id, s.handler.clone()))
                .collect()
        };
        // subscription ids are assigned in registration order, so sorting by
        // id delivers to earlier subscribers first regardless of the map's
        // internal iteration order.
        subs.sort_by_key(|(id, _)| *id);
        for (_, handler) in &subs {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler(event);
            }));
            if outcome.is_err() {
                self.record_metric("eventbus.handler.errors", json!({ "eventName": event.name }));
                return Err(FrameworkError::new(
                    ErrorKind::Event,
                    "HANDLER_ERROR",
                    format!("handler for event '{}' panicked", event.name),
                )
                .with_detail("eventId", event.id.to_string()));
            }
        }
        Ok(())
    }

    /// Drain `name`'s queue one event at a time, delivering each to every
    /// matching subscription. A handler failure aborts the drain; events not
    /// yet popped remain queued.
    pub fn process_queue(&self, name: &str) -> Result<usize, FrameworkError> {
        let started = Instant::now();
        let mut delivered = 0usize;
        loop {
            let next = {
                let mut queues = self.queues.write();
                queues.get_mut(name).and_then(|q| q.pop_front())
            };
            let Some(event) = next else { break };
            self.deliver(&event)?;
            delivered += 1;
        }
        self.record_metric(
            "eventbus.queue.processed",
            json!({ "queueName": name, "processingTime": started.elapsed().as_secs_f64() }),
        );
        Ok(delivered)
    }

    /// Process every queue currently holding events, by name. Stops at the
    /// first queue whose drain aborts.
    pub fn process_all_queues(&self) -> Result<usize, FrameworkError> {
        let names: Vec<String> = self.queues.read().keys().cloned().collect();
        let mut total = 0usize;
        for name in names {
            total += self.process_queue(&name)?;
        }
        Ok(total)
    }

    pub fn get_history(&self, name: &str) -> Vec<Event> {
        self.history.read().get(name).map(|h| h.iter().rev().cloned().collect()).unwrap_or_default()
    }

    pub fn get_all_history(&self) -> HashMap<String, Vec<Event>> {
        self.history
            .read()
            .iter()
            .map(|(name, entries)| (name.clone(), entries.iter().rev().cloned().collect()))
            .collect()
    }

    /// Clear queues and history, keeping the bus running and subscriptions
    /// intact — a subscriber does not need to re-subscribe after a reset.
    pub fn reset(&self) {
        self.queues.write().clear();
        self.history.write().clear();
    }

    pub fn register_health_check<F>(&self, name: impl Into<String>, check: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.health_checks.write().insert(name.into(), Arc::new(check));
    }

    pub fn check_health(&self) -> HashMap<String, bool> {
        self.health_checks.read().iter().map(|(name, check)| (name.clone(), check())).collect()
    }

    pub fn record_metric(&self, name: &str, value: Value) {
        self.metrics.write().insert(name.to_string(), value);
    }

    pub fn get_metrics(&self) -> HashMap<String, Value> {
        self.metrics.read().clone()
    }

    pub fn shutdown(&self) {
        *self.state.write() = BusState::ShutDown;
        self.reset();
        self.subscriptions.write().clear();
        self.health_checks.write().clear();
    }

    pub fn mark_error(&self) {
        *self.state.write() = BusState::Error;
    }

    pub fn is_running(&self) -> bool {
        *self.state.read() == BusState::Running
    }
}
