//! The schema-state cache.
//!
//! Holds values computed from the current schema (compiled plans, resolved
//! descriptors) keyed by string. `get_or_create` computes each value at most
//! once, even under concurrent callers; any commit that changes the schema
//! clears the whole cache, never individual entries.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

type Entry = Arc<dyn Any + Send + Sync>;

/// Compute-once cache invalidated as a whole on schema change.
#[derive(Default)]
pub struct SchemaStateCache {
    entries: Mutex<FxHashMap<String, Entry>>,
}

impl SchemaStateCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached value for `key`, computing and storing it on first call.
    /// The map lock is held across `create`, so two callers racing on the
    /// same key never both compute.
    pub fn get_or_create<V, F>(&self, key: &str, create: F) -> Arc<V>
    where
        V: Any + Send + Sync,
        F: FnOnce() -> V,
    {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            if let Ok(value) = Arc::clone(entry).downcast::<V>() {
                return value;
            }
        }
        let value = Arc::new(create());
        entries.insert(key.to_owned(), value.clone() as Entry);
        value
    }

    /// The cached value for `key`, if present with the requested type.
    pub fn get<V: Any + Send + Sync>(&self, key: &str) -> Option<Arc<V>> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .and_then(|entry| Arc::clone(entry).downcast::<V>().ok())
    }

    /// Whether `key` is cached.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Drops every entry. Called when a commit changes the schema.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
