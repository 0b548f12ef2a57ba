//! Tagged error taxonomy shared by every subsystem.
//!
//! Mirrors `modkit-errors::Problem` in spirit (a flat, serializable error
//! shape with a status, a machine code and a human message) but keyed by an
//! [`ErrorKind`] tag rather than built ad hoc per call site, and carrying an
//! optional `cause` chain the way the specification's Error value does.

use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// One error kind per domain, each with a default HTTP-like status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorKind {
    Validation,
    Auth,
    Access,
    Config,
    Module,
    Event,
    Router,
    Service,
    Network,
}

impl ErrorKind {
    /// Default HTTP-like status for this kind, used by downstream mapping.
    #[must_use]
    pub fn default_status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Access => StatusCode::FORBIDDEN,
            ErrorKind::Module | ErrorKind::Config | ErrorKind::Event | ErrorKind::Router => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorKind::Service | ErrorKind::Network => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "Validation",
            ErrorKind::Auth => "Auth",
            ErrorKind::Access => "Access",
            ErrorKind::Config => "Config",
            ErrorKind::Module => "Module",
            ErrorKind::Event => "Event",
            ErrorKind::Router => "Router",
            ErrorKind::Service => "Service",
            ErrorKind::Network => "Network",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged, serializable error value carrying kind, code, message, details,
/// timestamp and an optional cause chain.
///
/// `cause` is boxed behind an `Arc` rather than `Box` so `FrameworkError`
/// stays `Clone`, which the bounded error rings (§7 propagation policy) and
/// `Error` trait impl both need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkError {
    /// Per-occurrence correlation id, independent of `code` (which names the
    /// error *type*, not this specific occurrence).
    pub id: Uuid,
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Arc<FrameworkError>>,
}

impl FrameworkError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            code: code.into(),
            message: message.into(),
            details: HashMap::new(),
            timestamp: Utc::now(),
            cause: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: HashMap<String, serde_json::Value>) -> Self {
        self.details = details;
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_cause(mut self, cause: FrameworkError) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.kind.default_status()
    }

    /// Serialize to a flat JSON map; round-trips through [`FrameworkError::from_json`].
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Deserialize from the shape produced by [`FrameworkError::to_json`].
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Wrap `self` as the cause of a new error of `kind`, used by the
    /// re-throw discipline in §7 (`*_INITIALIZATION_FAILED` /
    /// `*_SHUTDOWN_FAILED`). If `self` is already of `kind`, it is returned
    /// unchanged rather than double-wrapped.
    #[must_use]
    pub fn wrap_unless_same_kind(self, kind: ErrorKind, code: &str, message: &str) -> Self {
        if self.kind == kind {
            return self;
        }
        FrameworkError::new(kind, code, message).with_cause(self)
    }
}

impl fmt::Display for FrameworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.code, self.message)
    }
}

impl std::error::Error for FrameworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}
