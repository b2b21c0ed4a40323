use super::{ChangeSet, KVStore};

/// Write overlay over a parent view. Reads fall through to the parent; writes
/// stay local until the owner takes them with [`CacheStore::into_changes`].
pub struct CacheStore<'a> {
    parent: &'a dyn KVStore,
    writes: ChangeSet,
}

impl<'a> CacheStore<'a> {
    pub fn new(parent: &'a dyn KVStore) -> Self {
        Self {
            parent,
            writes: ChangeSet::new(),
        }
    }

    pub fn into_changes(self) -> ChangeSet {
        self.writes
    }
}

impl KVStore for CacheStore<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.writes.get(key) {
            Some(value) => value.clone(),
            None => self.parent.get(key),
        }
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }

    fn prefix_entries(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut merged: std::collections::BTreeMap<Vec<u8>, Vec<u8>> =
            self.parent.prefix_entries(prefix).into_iter().collect();
        for (key, value) in self.writes.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }
        merged.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_overlay_reads_and_discard() {
        let mut base = MemoryStore::new();
        base.set(b"k1".to_vec(), b"v1".to_vec());
        base.set(b"k2".to_vec(), b"v2".to_vec());

        let mut cache = CacheStore::new(&base);
        cache.set(b"k1".to_vec(), b"new".to_vec());
        cache.delete(b"k2");
        cache.set(b"k3".to_vec(), b"v3".to_vec());

        assert_eq!(cache.get(b"k1"), Some(b"new".to_vec()));
        assert_eq!(cache.get(b"k2"), None);
        assert_eq!(
            cache.prefix_entries(b"k"),
            vec![
                (b"k1".to_vec(), b"new".to_vec()),
                (b"k3".to_vec(), b"v3".to_vec())
            ]
        );
        drop(cache);

        assert_eq!(base.get(b"k1"), Some(b"v1".to_vec()));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn test_nested_overlay_commit() {
        let mut base = MemoryStore::new();
        let outer_changes = {
            let mut outer = CacheStore::new(&base);
            outer.set(b"a".to_vec(), b"1".to_vec());
            let inner_changes = {
                let mut inner = CacheStore::new(&outer);
                assert_eq!(inner.get(b"a"), Some(b"1".to_vec()));
                inner.set(b"b".to_vec(), b"2".to_vec());
                inner.into_changes()
            };
            outer.apply(inner_changes);
            outer.into_changes()
        };
        base.apply(outer_changes);

        assert_eq!(base.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(base.get(b"b"), Some(b"2".to_vec()));
    }
}
