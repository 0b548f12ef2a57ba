//! Typed configuration access for the Event Bus System and Module Manager.
//!
//! Mirrors the shape of the teacher's `ConfigProvider` / `module_config_or_default`
//! / `module_config_required` split: a host application owns one concrete
//! provider, and each subsystem pulls its own typed slice out of it, either
//! leniently (fall back to `Default`) or strictly (error if absent/invalid).

use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

/// Raised while loading or validating a module's configuration section.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration section found for module '{0}'")]
    SectionNotFound(String),
    #[error("configuration section for module '{module}' is invalid: {reason}")]
    InvalidConfig { module: String, reason: String },
}

/// Supplies raw configuration sections keyed by module name. A host
/// application implements this once over whatever format it loads
/// configuration from; the Core Runtime never parses a file itself.
pub trait ConfigProvider: Send + Sync {
    /// Raw JSON value for `module`'s configuration section, if any.
    fn get_module_config(&self, module: &str) -> Option<serde_json::Value>;
}

/// Load and deserialize `module`'s section, falling back to `T::default()`
/// when the section is absent. A malformed-but-present section is still an
/// error: leniency covers "nothing configured", not "configured badly".
pub fn module_config_or_default<T>(
    provider: &dyn ConfigProvider,
    module: &str,
) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    match provider.get_module_config(module) {
        None => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| ConfigError::InvalidConfig {
            module: module.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Load and deserialize `module`'s section, failing if it is absent.
pub fn module_config_required<T>(
    provider: &dyn ConfigProvider,
    module: &str,
) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    match provider.get_module_config(module) {
        None => Err(ConfigError::SectionNotFound(module.to_string())),
        Some(value) => serde_json::from_value(value).map_err(|e| ConfigError::InvalidConfig {
            module: module.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Event Bus tuning: currently just the bounded per-event history size.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    pub max_history_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { max_history_size: 1000 }
    }
}

/// Module Manager tuning: the default periodic health-probe cadence.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(default)]
pub struct ModuleManagerConfig {
    #[serde(with = "humantime_secs")]
    pub health_check_interval: Duration,
}

impl Default for ModuleManagerConfig {
    fn default() -> Self {
        Self { health_check_interval: Duration::from_secs(60) }
    }
}

/// Serializes a `Duration` as whole seconds, since configuration sections
/// are plain JSON with no native duration type.
mod humantime_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MockConfigProvider(HashMap<String, serde_json::Value>);

    impl ConfigProvider for MockConfigProvider {
        fn get_module_config(&self, module: &str) -> Option<serde_json::Value> {
            self.0.get(module).cloned()
        }
    }

    #[derive(Debug, Default, serde::Deserialize, PartialEq)]
    struct SampleConfig {
        enabled: bool,
    }

    #[test]
    fn or_default_falls_back_when_section_absent() {
        let provider = MockConfigProvider(HashMap::new());
        let cfg: SampleConfig = module_config_or_default(&provider, "orders").unwrap();
        assert_eq!(cfg, SampleConfig::default());
    }

    #[test]
    fn or_default_still_errors_on_malformed_present_section() {
        let mut map = HashMap::new();
        map.insert("orders".to_string(), serde_json::json!({"enabled": "not-a-bool"}));
        let provider = MockConfigProvider(map);
        let err = module_config_or_default::<SampleConfig>(&provider, "orders").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig { .. }));
    }

    #[test]
    fn required_errors_when_section_absent() {
        let provider = MockConfigProvider(HashMap::new());
        let err = module_config_required::<SampleConfig>(&provider, "orders").unwrap_err();
        assert!(matches!(err, ConfigError::SectionNotFound(_)));
    }

    #[test]
    fn required_succeeds_when_section_present_and_valid() {
        let mut map = HashMap::new();
        map.insert("orders".to_string(), serde_json::json!({"enabled": true}));
        let provider = MockConfigProvider(map);
        let cfg: SampleConfig = module_config_required(&provider, "orders").unwrap();
        assert!(cfg.enabled);
    }

    #[test]
    fn event_bus_config_default_matches_spec() {
        assert_eq!(EventBusConfig::default().max_history_size, 1000);
    }

    #[test]
    fn module_manager_config_default_matches_spec() {
        assert_eq!(
            ModuleManagerConfig::default().health_check_interval,
            Duration::from_secs(60)
        );
    }
}
