//! The key-value seam behind the versioned stores.
//!
//! The stores only need these four operations, so any conforming
//! medium can back them.  The in-memory implementation here is the
//! one the emulator uses by default (and the tests throughout this
//! crate); the cli crate has a directory-backed one.
use std::collections::BTreeMap;
use std::fmt::Debug;

pub trait KeyValueStore: Debug {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&mut self, key: &str, value: &[u8]);
    fn remove(&mut self, key: &str);
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

/// A transient in-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.items.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &[u8]) {
        self.items.insert(key.to_string(), value.to_vec());
    }

    fn remove(&mut self, key: &str) {
        self.items.remove(key);
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.items
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[test]
fn memory_store_round_trip() {
    let mut store = MemoryStore::new();
    assert_eq!(store.get("a"), None);
    store.set("a", b"one");
    store.set("ab", b"two");
    store.set("b", b"three");
    assert_eq!(store.get("a").as_deref(), Some(b"one".as_slice()));
    assert_eq!(store.keys_with_prefix("a"), vec!["a", "ab"]);
    store.remove("a");
    assert_eq!(store.get("a"), None);
    assert_eq!(store.keys_with_prefix("a"), vec!["ab"]);
}
