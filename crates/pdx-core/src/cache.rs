//! Keyed in-memory cache for expensive listings

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Cache key: a prefix plus the parameters that distinguish entries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub prefix: String,
    pub parameters: Vec<String>,
}

impl CacheKey {
    pub fn new(prefix: impl Into<String>, parameters: &[&str]) -> Self {
        Self {
            prefix: prefix.into(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Storage for serialized values
pub trait Cache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Value>;

    fn set(&self, key: CacheKey, value: Value);

    fn invalidate(&self, keys: &[CacheKey]);
}

/// Read a typed value, treating undecodable entries as misses
pub fn get_typed<T: DeserializeOwned>(cache: &dyn Cache, key: &CacheKey) -> Option<T> {
    cache.get(key).and_then(|v| serde_json::from_value(v).ok())
}

/// Store a typed value; values that do not serialize are not cached
pub fn set_typed<T: Serialize>(cache: &dyn Cache, key: CacheKey, value: &T) {
    if let Ok(value) = serde_json::to_value(value) {
        cache.set(key, value);
    }
}

/// Process-local cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Value> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: CacheKey, value: Value) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, value);
        }
    }

    fn invalidate(&self, keys: &[CacheKey]) {
        if let Ok(mut entries) = self.entries.lock() {
            for key in keys {
                entries.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_invalidate() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("mods", &["stellaris"]);
        set_typed(&cache, key.clone(), &vec!["a".to_string(), "b".to_string()]);

        let found: Option<Vec<String>> = get_typed(&cache, &key);
        assert_eq!(found, Some(vec!["a".to_string(), "b".to_string()]));
        assert!(get_typed::<Vec<String>>(&cache, &CacheKey::new("mods", &["hoi4"])).is_none());

        cache.invalidate(&[key.clone()]);
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_mismatched_type_is_a_miss() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("mods", &[]);
        cache.set(key.clone(), Value::String("x".into()));
        assert!(get_typed::<Vec<String>>(&cache, &key).is_none());
    }
}
