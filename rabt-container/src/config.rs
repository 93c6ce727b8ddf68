//! Configuration providers.
//!
//! The injector reads configuration values from an ordered list of
//! [`ConfigurationProvider`]s. The first provider that knows a key and
//! holds a value of the expected type wins.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::key::TypeKey;

/// A type-erased configuration value.
pub type ConfigValue = Arc<dyn Any + Send + Sync>;

/// A read-only source of configuration values.
pub trait ConfigurationProvider: Send + Sync {
    /// Returns `true` if the provider knows `key`.
    fn contains(&self, key: &str) -> bool;

    /// Returns the value under `key` if it has the `expected` type.
    fn value(&self, key: &str, expected: &TypeKey) -> Option<ConfigValue>;

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        type_name::<Self>()
    }
}

/// An in-memory configuration provider.
///
/// Safe to share and update from several threads.
///
/// # Examples
/// ```
/// use rabt_container::config::{ConfigurationProvider, MemoryConfig};
/// use rabt_container::key::TypeKey;
///
/// let config = MemoryConfig::new()
///     .with("smtp.port", 2525u16)
///     .with("smtp.host", String::from("localhost"));
///
/// assert!(config.contains("smtp.port"));
/// assert!(config.value("smtp.port", &TypeKey::of::<u16>()).is_some());
/// // wrong type: nothing
/// assert!(config.value("smtp.port", &TypeKey::of::<u32>()).is_none());
/// ```
#[derive(Default)]
pub struct MemoryConfig {
    values: DashMap<String, (TypeKey, ConfigValue)>,
}

impl MemoryConfig {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`set`](Self::set).
    pub fn with<V: Any + Send + Sync>(self, key: impl Into<String>, value: V) -> Self {
        self.set(key, value);
        self
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set<V: Any + Send + Sync>(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        trace!(key = %key, value_type = type_name::<V>(), "Configuration value set");
        self.values.insert(key, (TypeKey::of::<V>(), Arc::new(value)));
    }

    /// Removes the value under `key`.
    pub fn remove(&self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigurationProvider for MemoryConfig {
    fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn value(&self, key: &str, expected: &TypeKey) -> Option<ConfigValue> {
        let entry = self.values.get(key)?;
        let (stored_type, value) = entry.value();
        if stored_type != expected {
            trace!(
                key,
                stored = stored_type.type_name(),
                expected = expected.type_name(),
                "Configuration value has a different type"
            );
            return None;
        }
        Some(Arc::clone(value))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

impl fmt::Debug for MemoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConfig")
            .field("keys", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn returns_value_of_expected_type() {
        let config = MemoryConfig::new().with("retries", 3u8);

        let value = config.value("retries", &TypeKey::of::<u8>()).unwrap();
        assert_eq!(value.downcast_ref::<u8>(), Some(&3));
    }

    #[test]
    fn type_mismatch_yields_nothing_but_key_is_known() {
        let config = MemoryConfig::new().with("retries", 3u8);

        assert!(config.contains("retries"));
        assert!(config.value("retries", &TypeKey::of::<String>()).is_none());
    }

    #[test]
    fn unknown_key() {
        let config = MemoryConfig::new();
        assert!(!config.contains("missing"));
        assert!(config.value("missing", &TypeKey::of::<u8>()).is_none());
        assert!(config.is_empty());
    }

    #[test]
    fn set_replaces_and_remove_deletes() {
        let config = MemoryConfig::new().with("mode", String::from("a"));
        config.set("mode", String::from("b"));
        assert_eq!(config.len(), 1);

        let value = config.value("mode", &TypeKey::of::<String>()).unwrap();
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("b"));

        assert!(config.remove("mode"));
        assert!(!config.remove("mode"));
    }

    #[test]
    fn concurrent_writers() {
        let config = MemoryConfig::new();
        thread::scope(|s| {
            for i in 0..8u32 {
                let config = &config;
                s.spawn(move || config.set(format!("worker.{i}"), i));
            }
        });
        assert_eq!(config.len(), 8);
    }
}
