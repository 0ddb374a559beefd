//! # Aggregate Cache
//!
//! Latest aggregate per key, kept in process memory. No eviction, no TTL:
//! an entry lives until a newer computation replaces it.

use crate::domain::entities::AggregateEntry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Process-local aggregate store. Single writer, many readers.
#[derive(Debug, Default)]
pub struct AggregateCache {
    entries: RwLock<HashMap<String, Arc<AggregateEntry>>>,
}

impl AggregateCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest entry for `key`.
    pub fn get(&self, key: &str) -> Option<AggregateEntry> {
        self.get_shared(key).map(|e| (*e).clone())
    }

    /// Latest entry for `key` without copying it.
    pub fn get_shared(&self, key: &str) -> Option<Arc<AggregateEntry>> {
        self.entries.read().get(key).cloned()
    }

    /// Store `entry` under `entry.key`, replacing the previous one.
    ///
    /// Returns `false`, leaving the cache untouched, when the stored entry
    /// was computed later than `entry`.
    pub fn put(&self, entry: AggregateEntry) -> bool {
        self.put_or_current(entry).is_ok()
    }

    /// Like `put`, but a refused entry comes back as `Err` carrying the
    /// newer entry the cache kept.
    pub fn put_or_current(&self, entry: AggregateEntry) -> Result<(), AggregateEntry> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&entry.key) {
            if existing.computed_at > entry.computed_at {
                debug!(
                    key = %entry.key,
                    stored = existing.computed_at,
                    offered = entry.computed_at,
                    "Refusing older aggregate"
                );
                return Err((**existing).clone());
            }
        }
        entries.insert(entry.key.clone(), Arc::new(entry));
        Ok(())
    }

    /// All entries, sorted by key.
    pub fn snapshot(&self) -> Vec<AggregateEntry> {
        let mut all: Vec<AggregateEntry> = self
            .entries
            .read()
            .values()
            .map(|e| (**e).clone())
            .collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
