//! Versioned device storage.
//!
//! Every write to a block or line-output device produces a new
//! immutable version of that device's contents, derived from the
//! previous one.  Version `0` is the state the device was in before
//! the program ran; the whole chain is retained so that rewinding
//! execution can show the contents that existed at any earlier step.
//!
//! The stores persist through the [`kv::KeyValueStore`] seam as
//! `dev<NUM>/<VERSION>` keys, so any conforming key-value medium
//! (in-memory map, a directory of files, browser storage behind a
//! bridge) can hold the data.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use base::prelude::*;

pub mod kv;

mod block;
mod line;

pub use block::BlockStore;
pub use line::{LineInputStore, LineOutputStore};

/// Marker stored in a line-output log for a page break: a form feed,
/// which is what line printers actually honoured.
pub const PAGE_BREAK: char = '\u{c}';

/// Identifies one immutable snapshot in a device's version chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize,
)]
pub struct VersionId(u32);

impl VersionId {
    pub const ZERO: VersionId = VersionId(0);

    pub fn new(n: u32) -> VersionId {
        VersionId(n)
    }

    pub fn number(&self) -> u32 {
        self.0
    }

    /// The version a successful write derives from this one.
    pub fn successor(&self) -> VersionId {
        VersionId(self.0 + 1)
    }
}

impl Display for VersionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.0)
    }
}

fn device_prefix(device: DeviceId) -> String {
    format!("dev{device}/")
}

fn version_key(device: DeviceId, version: VersionId) -> String {
    format!("dev{device}/{version}")
}

/// Enumerate the versions a device has in the backing store, in
/// ascending order.
fn versions_in<S: kv::KeyValueStore + ?Sized>(kv: &S, device: DeviceId) -> Vec<VersionId> {
    let prefix = device_prefix(device);
    let mut found: Vec<VersionId> = kv
        .keys_with_prefix(&prefix)
        .into_iter()
        .filter_map(|key| key[prefix.len()..].parse::<u32>().ok().map(VersionId::new))
        .collect();
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::kv::KeyValueStore;
    use super::*;

    #[test]
    fn version_key_layout() {
        assert_eq!(
            version_key(DeviceId::from(18), VersionId::new(3)),
            "dev18/3"
        );
        assert_eq!(device_prefix(DeviceId::from(7)), "dev7/");
    }

    #[test]
    fn version_enumeration_ignores_foreign_keys() {
        let mut kv = kv::MemoryStore::default();
        kv.set("dev7/0", b"x");
        kv.set("dev7/2", b"y");
        kv.set("dev7/not-a-version", b"z");
        kv.set("dev70/0", b"other device");
        assert_eq!(
            versions_in(&kv, DeviceId::from(7)),
            vec![VersionId::new(0), VersionId::new(2)]
        );
    }
}
