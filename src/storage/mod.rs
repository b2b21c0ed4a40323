use std::collections::BTreeMap;

pub mod cache;
pub mod memory;
pub mod script_store;

pub use cache::CacheStore;
pub use memory::MemoryStore;
pub use script_store::{ParamsStore, ScriptStore};

/// Pending writes of a branch; `None` marks a deletion.
pub type ChangeSet = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

pub trait KVStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);
    fn delete(&mut self, key: &[u8]);

    /// All entries whose key starts with `prefix`, in key order.
    fn prefix_entries(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;

    fn has(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    fn apply(&mut self, changes: ChangeSet) {
        for (key, value) in changes {
            match value {
                Some(value) => self.set(key, value),
                None => self.delete(&key),
            }
        }
    }
}
