// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Read-only caches shared across classifications
//!
//! Detection schemas and the compiled import-root table are loaded once
//! and then only read. The cache is an explicit object owned by whoever
//! builds classifiers; `clear` resets it between test runs.

mod hash;

pub use hash::{hash_string, ContentHasher};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::classifier::{DetectionSchema, ImportRoot};
use crate::errors::FlowResult;

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub schemas: usize,
    pub hits: usize,
    pub loads: usize,
}

/// Schema cache with get-or-load semantics
#[derive(Default)]
pub struct SchemaCache {
    schemas: RwLock<HashMap<String, Arc<DetectionSchema>>>,
    import_roots: RwLock<Option<Arc<Vec<ImportRoot>>>>,
    stats: RwLock<CacheStats>,
}

impl SchemaCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached schema for `id`, loading it on first use
    pub fn get_or_load<F>(&self, id: &str, load: F) -> FlowResult<Arc<DetectionSchema>>
    where
        F: FnOnce() -> FlowResult<DetectionSchema>,
    {
        if let Some(schema) = self.get(id) {
            self.bump(|s| s.hits += 1);
            tracing::trace!("Schema cache hit: {}", id);
            return Ok(schema);
        }

        let schema = Arc::new(load()?);
        let mut schemas = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        // Another caller may have loaded it meanwhile; keep the first copy
        let entry = schemas.entry(id.to_string()).or_insert(schema).clone();
        self.bump(|s| {
            s.loads += 1;
            s.schemas = schemas.len();
        });
        tracing::debug!("Loaded detection schema '{}'", id);
        Ok(entry)
    }

    /// Cached schema for `id`, if loaded
    pub fn get(&self, id: &str) -> Option<Arc<DetectionSchema>> {
        self.schemas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Compiled import-root table, compiling it on first use
    pub fn import_roots_or_compile<F>(&self, compile: F) -> Arc<Vec<ImportRoot>>
    where
        F: FnOnce() -> Vec<ImportRoot>,
    {
        if let Some(roots) = self.import_roots.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            return Arc::clone(roots);
        }

        let mut slot = self.import_roots.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slot.get_or_insert_with(|| Arc::new(compile())))
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        *self.stats.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop every cached entry
    pub fn clear(&self) {
        self.schemas.write().unwrap_or_else(|e| e.into_inner()).clear();
        *self.import_roots.write().unwrap_or_else(|e| e.into_inner()) = None;
        *self.stats.write().unwrap_or_else(|e| e.into_inner()) = CacheStats::default();
    }

    fn bump(&self, update: impl FnOnce(&mut CacheStats)) {
        update(&mut self.stats.write().unwrap_or_else(|e| e.into_inner()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn schema(id: &str) -> DetectionSchema {
        DetectionSchema {
            id: id.to_string(),
            properties: BTreeMap::new(),
        }
    }

    #[test]
    fn test_get_or_load_loads_once() {
        let cache = SchemaCache::new();
        let mut calls = 0;

        for _ in 0..3 {
            let loaded = cache
                .get_or_load("claude", || {
                    calls += 1;
                    Ok(schema("claude"))
                })
                .unwrap();
            assert_eq!(loaded.id, "claude");
        }

        assert_eq!(calls, 1);
        assert_eq!(cache.stats(), CacheStats { schemas: 1, hits: 2, loads: 1 });
    }

    #[test]
    fn test_clear() {
        let cache = SchemaCache::new();
        cache.get_or_load("a", || Ok(schema("a"))).unwrap();
        let roots = cache.import_roots_or_compile(|| {
            vec![ImportRoot {
                root: ".claude/".into(),
                platform: "claude".into(),
            }]
        });
        assert_eq!(roots.len(), 1);

        cache.clear();
        assert!(cache.get("a").is_none());
        assert!(cache.import_roots_or_compile(Vec::new).is_empty());
    }

    #[test]
    fn test_load_errors_are_not_cached() {
        let cache = SchemaCache::new();
        let err = cache.get_or_load("x", || {
            Err(crate::errors::FlowError::SchemaNotFound { id: "x".into() })
        });
        assert!(err.is_err());
        assert!(cache.get("x").is_none());
    }
}
