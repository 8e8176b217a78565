//! In-memory record store.

use std::collections::HashMap;
use std::sync::Arc;

use ormx_proto::{Record, Value};
use parking_lot::RwLock;
use tracing::trace;

/// Records grouped by entity type, in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    /// Entity name -> records.
    entities: RwLock<HashMap<String, Vec<Arc<Record>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record under its shape name.
    pub fn insert(&self, record: Record) {
        let mut entities = self.entities.write();
        entities
            .entry(record.shape.clone())
            .or_default()
            .push(Arc::new(record));
    }

    /// All records of an entity, as values.
    pub fn scan(&self, entity: &str) -> Vec<Value> {
        let entities = self.entities.read();
        let rows: Vec<Value> = entities
            .get(entity)
            .map(|records| records.iter().cloned().map(Value::Record).collect())
            .unwrap_or_default();
        trace!(entity, rows = rows.len(), "scanned entity");
        rows
    }

    /// Records of an entity whose `field` loosely equals `value`.
    pub fn find_by(&self, entity: &str, field: &str, value: &Value) -> Vec<Value> {
        if value.is_null() {
            return Vec::new();
        }
        let entities = self.entities.read();
        entities
            .get(entity)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.get(field).is_some_and(|v| v.loose_eq(value)))
                    .cloned()
                    .map(Value::Record)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of records of an entity.
    pub fn len(&self, entity: &str) -> usize {
        self.entities.read().get(entity).map_or(0, Vec::len)
    }

    /// Check if the store holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.entities.read().values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_store;

    #[test]
    fn test_scan_and_find() {
        let store = sample_store();
        assert_eq!(store.len("Item"), 20);
        assert_eq!(store.scan("Order").len(), 5);
        assert!(store.scan("Nope").is_empty());

        let orders = store.find_by("Order", "customer_id", &Value::Int32(1));
        assert_eq!(orders.len(), 2);
        assert!(store.find_by("Order", "customer_id", &Value::Null).is_empty());
    }

    #[test]
    fn test_insert_keeps_order() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.insert(Record::new("Item").with_field("key", 2i64));
        store.insert(Record::new("Item").with_field("key", 1i64));
        let keys: Vec<i64> = store
            .scan("Item")
            .iter()
            .filter_map(|v| v.as_record()?.get("key")?.as_i64())
            .collect();
        assert_eq!(keys, vec![2, 1]);
    }
}
