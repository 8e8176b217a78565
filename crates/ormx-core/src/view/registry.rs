//! Type View registry.
//!
//! Views are registered once per [`ViewKey`] and shared afterwards; the
//! registry is a cache, never a factory of fresh instances.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{TypeView, ViewKey};
use crate::error::Error;

/// Registry statistics.
#[derive(Debug, Default)]
pub struct RegistryStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RegistryStats {
    /// Lookups answered from the registry.
    pub fn hits(&self) -> u64 {
        self.hits.load(AtomicOrdering::Relaxed)
    }

    /// Lookups that built a view.
    pub fn misses(&self) -> u64 {
        self.misses.load(AtomicOrdering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

/// Shared cache of synthesized Type Views.
#[derive(Debug, Default)]
pub struct ViewRegistry {
    views: RwLock<HashMap<ViewKey, Arc<TypeView>>>,
    stats: RegistryStats,
}

impl ViewRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a registered view.
    pub fn get(&self, key: &ViewKey) -> Option<Arc<TypeView>> {
        self.views.read().get(key).cloned()
    }

    /// Return the view registered under `key`, building and registering it
    /// on first use. When two callers race, the first registration wins and
    /// both receive the same instance.
    pub fn get_or_build<F>(&self, key: &ViewKey, build: F) -> Result<Arc<TypeView>, Error>
    where
        F: FnOnce() -> Result<TypeView, Error>,
    {
        if let Some(view) = self.views.read().get(key) {
            self.stats.hits.fetch_add(1, AtomicOrdering::Relaxed);
            return Ok(view.clone());
        }
        self.stats.misses.fetch_add(1, AtomicOrdering::Relaxed);

        let view = build()?;
        debug!(
            base = %key.base,
            source = %key.source,
            elements = view.elements.len(),
            hit_rate = self.stats.hit_rate(),
            "type view registered"
        );
        let mut views = self.views.write();
        Ok(views
            .entry(key.clone())
            .or_insert_with(|| Arc::new(view))
            .clone())
    }

    /// Registry statistics.
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// Number of registered views.
    pub fn len(&self) -> usize {
        self.views.read().len()
    }

    /// Check if no view is registered.
    pub fn is_empty(&self) -> bool {
        self.views.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = RegistryStats::default();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.misses.fetch_add(1, AtomicOrdering::Relaxed);
        stats.hits.fetch_add(3, AtomicOrdering::Relaxed);
        assert_eq!(stats.hits(), 3);
        assert_eq!(stats.misses(), 1);
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
