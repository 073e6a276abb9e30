// src/telemetry/attributes.rs
//! Telemetry attributes and the daemon-wide common attribute set
//!
//! Common attributes are resolved once at startup and attached to every batch
//! when it is built. The entity guid arrives later from a background task;
//! batches built after that see it, earlier ones do not.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub const APP_NAME: &str = "app.name";
pub const SERVICE_NAME: &str = "service.name";
pub const COLLECTOR_NAME: &str = "collector.name";
pub const ENTITY_GUID: &str = "entity.guid";
pub const HOSTNAME: &str = "host.hostname";
pub const INSTRUMENTATION_NAME: &str = "instrumentation.name";
pub const INSTRUMENTATION_PROVIDER: &str = "instrumentation.provider";
pub const SERVICE_INSTANCE_ID: &str = "service.instance.id";

const INSTRUMENTATION: &str = "JFR";
const COLLECTOR: &str = "JFR-Uploader";

/// Resource attributes variable (`k=v,k=v`)
pub const OTEL_RESOURCE_ATTRIBUTES_ENV: &str = "OTEL_RESOURCE_ATTRIBUTES";

/// Fallback variable for the service instance id
pub const SERVICE_INSTANCE_ID_ENV: &str = "SERVICE_INSTANCE_ID";

/// Ordered attribute map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, JsonValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.put(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(JsonValue::as_str)
    }

    /// Copy every entry of `other` over this set.
    pub fn merge(&mut self, other: &Attributes) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }
}

/// Attributes shared by every batch, swappable at runtime
#[derive(Debug, Default)]
pub struct CommonAttributes {
    current: RwLock<Arc<Attributes>>,
}

impl CommonAttributes {
    pub fn new(initial: Attributes) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Build the startup set: instrumentation identity, app/service name,
    /// host name and the service instance id when the environment has one.
    pub fn resolve(app_name: &str, hostname: Option<&str>) -> Self {
        let hostname = hostname
            .map(str::to_string)
            .unwrap_or_else(local_hostname);

        let mut attributes = Attributes::new()
            .with(INSTRUMENTATION_NAME, INSTRUMENTATION)
            .with(INSTRUMENTATION_PROVIDER, COLLECTOR)
            .with(COLLECTOR_NAME, COLLECTOR)
            .with(APP_NAME, app_name)
            .with(SERVICE_NAME, app_name)
            .with(HOSTNAME, hostname);

        if let Some(id) = service_instance_id(|name| std::env::var(name).ok()) {
            attributes.put(SERVICE_INSTANCE_ID, id);
        }

        Self::new(attributes)
    }

    /// Current set; cheap, never blocks writers for long
    pub fn snapshot(&self) -> Arc<Attributes> {
        self.current.read().clone()
    }

    /// Publish a new set with `extra` merged in.
    pub fn merge(&self, extra: &Attributes) {
        let mut current = self.current.write();
        let mut next = Attributes::clone(&current);
        next.merge(extra);
        *current = Arc::new(next);
    }
}

/// Host name of this machine, `localhost` when it cannot be read.
pub fn local_hostname() -> String {
    match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!("Unable to read host name, using localhost: {}", e);
            "localhost".to_string()
        }
    }
}

/// `service.instance.id` from `OTEL_RESOURCE_ATTRIBUTES`, else
/// `SERVICE_INSTANCE_ID`.
pub fn service_instance_id(env: impl Fn(&str) -> Option<String>) -> Option<String> {
    env(OTEL_RESOURCE_ATTRIBUTES_ENV)
        .and_then(|raw| {
            raw.split(',').find_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                (key.trim() == SERVICE_INSTANCE_ID).then(|| value.trim().to_string())
            })
        })
        .or_else(|| env(SERVICE_INSTANCE_ID_ENV))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_resolve_common_attributes() {
        let common = CommonAttributes::resolve("orders", Some("box-1"));
        let attrs = common.snapshot();

        assert_eq!(attrs.get_str(INSTRUMENTATION_NAME), Some("JFR"));
        assert_eq!(attrs.get_str(INSTRUMENTATION_PROVIDER), Some("JFR-Uploader"));
        assert_eq!(attrs.get_str(COLLECTOR_NAME), Some("JFR-Uploader"));
        assert_eq!(attrs.get_str(APP_NAME), Some("orders"));
        assert_eq!(attrs.get_str(SERVICE_NAME), Some("orders"));
        assert_eq!(attrs.get_str(HOSTNAME), Some("box-1"));
    }

    #[test]
    fn test_service_instance_id_from_otel() {
        let id = service_instance_id(env(&[
            ("OTEL_RESOURCE_ATTRIBUTES", "service.name=orders, service.instance.id = pod-7"),
            ("SERVICE_INSTANCE_ID", "fallback"),
        ]));
        assert_eq!(id.as_deref(), Some("pod-7"));
    }

    #[test]
    fn test_service_instance_id_fallback() {
        let id = service_instance_id(env(&[
            ("OTEL_RESOURCE_ATTRIBUTES", "service.name=orders"),
            ("SERVICE_INSTANCE_ID", "fallback"),
        ]));
        assert_eq!(id.as_deref(), Some("fallback"));
        assert_eq!(service_instance_id(env(&[])), None);
    }

    #[test]
    fn test_merge_is_visible_to_later_snapshots() {
        let common = CommonAttributes::new(Attributes::new().with(APP_NAME, "orders"));
        let before = common.snapshot();

        common.merge(&Attributes::new().with(ENTITY_GUID, "MXxBUE18"));

        assert!(before.get(ENTITY_GUID).is_none());
        assert_eq!(common.snapshot().get_str(ENTITY_GUID), Some("MXxBUE18"));
        assert_eq!(common.snapshot().get_str(APP_NAME), Some("orders"));
    }

    #[test]
    fn test_local_hostname_not_empty() {
        assert!(!local_hostname().is_empty());
    }
}
