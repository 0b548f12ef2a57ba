//! Core Runtime: a Dependency Container, Error Taxonomy/Router, Event Bus
//! (and its supervising Event Bus System), Module Manager and Router,
//! composed the way a host application wires a modular service together.
//!
//! Modules are registered leaf-first: `errorSystem`, `config`,
//! `eventBusSystem`, `moduleSystem`, with the Router sitting alongside,
//! driven by the same shared event bus.

pub mod config;
pub mod container;
pub mod emitter;
pub mod error;
pub mod event_bus;
pub mod event_bus_system;
pub mod module;
pub mod router;
pub mod telemetry;
mod topo;

pub use topo::{topological_order, TopoError};

/// Common imports for a host application wiring up the runtime.
pub mod prelude {
    pub use crate::config::{ConfigError, ConfigProvider, EventBusConfig, ModuleManagerConfig};
    pub use crate::container::{Component, DependencyContainer, RegisterOptions};
    pub use crate::error::{
        Environment, ErrorContext, ErrorKind, ErrorRouter, FrameworkError, FrameworkIntegration,
        ProblemIntegration,
    };
    pub use crate::event_bus::{EmitOptions, Event, EventBus};
    pub use crate::event_bus_system::EventBusSystem;
    pub use crate::module::{Module, ModuleHandle, ModuleManager, ModuleState, SystemHealth};
    pub use crate::router::{AppliedRoutes, OpenApiOptions, Route, RouteAdapter, RouteOptions, Router};
}
