//! A directory-backed key-value store.
//!
//! Each key becomes a file under the store's root; the `/` in a
//! versioned key (`dev18/3`) becomes a subdirectory, which keeps one
//! directory per device and one file per version, easy to poke at
//! with ordinary shell tools.  The [`KeyValueStore`] seam is
//! infallible, so I/O trouble is logged and treated as an absent key
//! (for reads) or a dropped write; the emulator core treats both as
//! it would a missing device state.
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{event, Level};

use vm::KeyValueStore;

#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: &Path) -> DirStore {
        DirStore {
            root: root.to_path_buf(),
        }
    }

    fn path_of(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/') {
            path.push(part);
        }
        path
    }
}

impl KeyValueStore for DirStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.path_of(key)).ok()
    }

    fn set(&mut self, key: &str, value: &[u8]) {
        let path = self.path_of(key);
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                event!(Level::ERROR, "cannot create {}: {}", parent.display(), e);
                return;
            }
        }
        if let Err(e) = fs::write(&path, value) {
            event!(Level::ERROR, "cannot write {}: {}", path.display(), e);
        }
    }

    fn remove(&mut self, key: &str) {
        let path = self.path_of(key);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                event!(Level::ERROR, "cannot remove {}: {}", path.display(), e);
            }
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys = Vec::new();
        collect_keys(&self.root, "", &mut keys);
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        keys
    }
}

fn collect_keys(dir: &Path, key_prefix: &str, keys: &mut Vec<String>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return, // an absent store has no keys
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };
        let key = if key_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{key_prefix}/{name}")
        };
        match entry.file_type() {
            Ok(kind) if kind.is_dir() => collect_keys(&entry.path(), &key, keys),
            Ok(_) => keys.push(key),
            Err(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_through_the_filesystem() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let mut store = DirStore::new(dir.path());
        assert_eq!(store.get("dev18/0"), None);
        store.set("dev18/0", b"");
        store.set("dev18/1", b"HELLO\n");
        store.set("dev7/0", b"\x00\x01");
        assert_eq!(store.get("dev18/1").as_deref(), Some(b"HELLO\n".as_slice()));
        assert_eq!(store.keys_with_prefix("dev18/"), vec!["dev18/0", "dev18/1"]);
        store.remove("dev18/1");
        assert_eq!(store.get("dev18/1"), None);
        assert_eq!(store.keys_with_prefix("dev18/"), vec!["dev18/0"]);
        // Removing what is already gone is quietly fine.
        store.remove("dev18/1");
    }

    #[test]
    fn an_empty_store_lists_nothing() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let store = DirStore::new(&dir.path().join("never-created"));
        assert!(store.keys_with_prefix("dev").is_empty());
    }

    #[test]
    fn backs_a_block_store() {
        use base::prelude::*;
        use vm::{DeviceConfig, DeviceRegistry, VersionId};

        let dir = tempfile::tempdir().expect("temporary directory");
        let mut registry = DeviceRegistry::new(
            DeviceConfig::mix_standard(),
            Box::new(DirStore::new(&dir.path().join("block"))),
            Box::new(DirStore::new(&dir.path().join("line-out"))),
            Box::new(DirStore::new(&dir.path().join("line-in"))),
        );
        let tape = DeviceId::from(0);
        let words = vec![Word::new(false, [1, 2, 3, 4, 5]); 100];
        registry.save_block_device(tape, &words).expect("tape is a block device");
        let v1 = registry
            .write_block_words(tape, VersionId::ZERO, 0, &words)
            .expect("write against the current version");
        assert_eq!(registry.read_block_words(tape, v1, 0).expect("read back"), words);
        assert_eq!(
            registry.list_versions(tape).expect("tape is attached"),
            vec![VersionId::new(0), VersionId::new(1)]
        );
    }
}
