//! Ordered document set maintained from listener change events.
//!
//! Both backends reduce their change feeds to "current matching set"
//! snapshots; this map keeps that set keyed (and therefore ordered) by
//! document id, which is also what makes "first result wins" deterministic.

use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct SnapshotMap<T> {
    docs: BTreeMap<String, T>,
}

impl<T: Clone> SnapshotMap<T> {
    pub fn new() -> Self {
        Self {
            docs: BTreeMap::new(),
        }
    }

    /// Seed from an initial point-in-time query.
    pub fn seed(items: impl IntoIterator<Item = (String, T)>) -> Self {
        Self {
            docs: items.into_iter().collect(),
        }
    }

    pub fn upsert(&mut self, id: String, doc: T) {
        self.docs.insert(id, doc);
    }

    /// Returns true if the id was present.
    pub fn remove(&mut self, id: &str) -> bool {
        self.docs.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Current matching set, ordered by document id.
    pub fn snapshot(&self) -> Vec<T> {
        self.docs.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_and_orders_by_id() {
        let mut map = SnapshotMap::new();
        map.upsert("b".to_string(), 2);
        map.upsert("a".to_string(), 1);
        map.upsert("b".to_string(), 20);

        assert_eq!(map.snapshot(), vec![1, 20]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut map = SnapshotMap::seed([("a".to_string(), 1)]);
        assert!(map.remove("a"));
        assert!(!map.remove("a"));
        assert!(map.is_empty());
    }
}
