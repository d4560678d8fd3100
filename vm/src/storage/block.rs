//! Versioned storage for block-addressable devices (tapes, disks,
//! paper tape).
//!
//! A snapshot is a flat byte sequence.  A write overlays bytes onto a
//! copy of the source version, zero-extending it if the write runs
//! past its end; the source version itself is never touched.  The
//! version chain is advanced by optimistic concurrency: a write
//! naming a version that already has a successor is refused, so at
//! most one successor is ever created per source version.
use tracing::{event, Level};

use base::prelude::*;

use super::kv::KeyValueStore;
use super::{version_key, versions_in, VersionId};
use crate::fault::Fault;

#[derive(Debug)]
pub struct BlockStore {
    kv: Box<dyn KeyValueStore>,
}

impl BlockStore {
    pub fn new(kv: Box<dyn KeyValueStore>) -> BlockStore {
        BlockStore { kv }
    }

    /// Read `length` bytes starting at `position` from the given
    /// snapshot.  Reading past the stored data yields zero bytes.
    pub fn read_block(
        &self,
        device: DeviceId,
        version: VersionId,
        position: usize,
        length: usize,
    ) -> Result<Vec<u8>, Fault> {
        let data = self.get_data(device, version)?;
        let mut out = vec![0_u8; length];
        if position < data.len() {
            let end = (position + length).min(data.len());
            out[..end - position].copy_from_slice(&data[position..end]);
        }
        Ok(out)
    }

    /// Overlay `bytes` at `position` onto a copy of `version`,
    /// committing the result as the successor version.
    pub fn write_block(
        &mut self,
        device: DeviceId,
        version: VersionId,
        position: usize,
        bytes: &[u8],
    ) -> Result<VersionId, Fault> {
        let successor = version.successor();
        if self.kv.get(&version_key(device, successor)).is_some() {
            event!(
                Level::WARN,
                "device {} version {} is already superseded, refusing write",
                device,
                version
            );
            return Err(Fault::WriteConflict);
        }
        let mut data = self.kv.get(&version_key(device, version)).unwrap_or_default();
        if data.len() < position + bytes.len() {
            data.resize(position + bytes.len(), 0);
        }
        data[position..position + bytes.len()].copy_from_slice(bytes);
        self.kv.set(&version_key(device, successor), &data);
        event!(
            Level::TRACE,
            "device {}: wrote {} bytes at {}, version {} -> {}",
            device,
            bytes.len(),
            position,
            version,
            successor
        );
        Ok(successor)
    }

    /// Make the highest version the new version 0 and discard the
    /// rest of the chain.  A device with no versions at all gets an
    /// empty version 0.
    pub fn accept_current(&mut self, device: DeviceId) -> Result<(), Fault> {
        let versions = versions_in(self.kv.as_ref(), device);
        match versions.last() {
            None => {
                self.initialise(device, &[]);
                Ok(())
            }
            Some(current) => {
                let data = self.get_data(device, *current)?;
                for version in &versions {
                    self.kv.remove(&version_key(device, *version));
                }
                self.kv.set(&version_key(device, VersionId::ZERO), &data);
                event!(
                    Level::DEBUG,
                    "device {}: version {} accepted as the new baseline",
                    device,
                    current
                );
                Ok(())
            }
        }
    }

    /// Install `bytes` as version 0, discarding any existing chain.
    pub fn initialise(&mut self, device: DeviceId, bytes: &[u8]) {
        for version in versions_in(self.kv.as_ref(), device) {
            self.kv.remove(&version_key(device, version));
        }
        self.kv.set(&version_key(device, VersionId::ZERO), bytes);
        event!(
            Level::DEBUG,
            "device {}: initialised with {} bytes",
            device,
            bytes.len()
        );
    }

    pub fn list_versions(&self, device: DeviceId) -> Vec<VersionId> {
        versions_in(self.kv.as_ref(), device)
    }

    /// The full byte contents of one snapshot.
    pub fn get_data(&self, device: DeviceId, version: VersionId) -> Result<Vec<u8>, Fault> {
        self.kv
            .get(&version_key(device, version))
            .ok_or(Fault::DeviceNotConnected(device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::MemoryStore;

    fn store() -> BlockStore {
        BlockStore::new(Box::new(MemoryStore::new()))
    }

    #[test]
    fn overlay_write_preserves_prior_version() {
        let mut s = store();
        let dev = DeviceId::from(8);
        s.initialise(dev, &[1, 2, 3, 4, 5]);
        let v1 = s
            .write_block(dev, VersionId::ZERO, 2, &[9, 9])
            .expect("write against the current version");
        assert_eq!(v1, VersionId::new(1));
        assert_eq!(s.get_data(dev, v1).unwrap(), vec![1, 2, 9, 9, 5]);
        // The source version is untouched.
        assert_eq!(s.get_data(dev, VersionId::ZERO).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn write_extends_past_end_with_zero_fill() {
        let mut s = store();
        let dev = DeviceId::from(0);
        s.initialise(dev, &[1]);
        let v1 = s.write_block(dev, VersionId::ZERO, 3, &[7]).unwrap();
        assert_eq!(s.get_data(dev, v1).unwrap(), vec![1, 0, 0, 7]);
    }

    #[test]
    fn read_past_stored_data_is_zero() {
        let mut s = store();
        let dev = DeviceId::from(0);
        s.initialise(dev, &[5, 6]);
        assert_eq!(
            s.read_block(dev, VersionId::ZERO, 1, 4).unwrap(),
            vec![6, 0, 0, 0]
        );
    }

    #[test]
    fn read_of_missing_version_fails() {
        let s = store();
        let dev = DeviceId::from(3);
        assert_eq!(
            s.read_block(dev, VersionId::ZERO, 0, 1),
            Err(Fault::DeviceNotConnected(dev))
        );
    }

    #[test]
    fn second_write_against_same_version_conflicts() {
        let mut s = store();
        let dev = DeviceId::from(8);
        s.initialise(dev, &[0; 4]);
        s.write_block(dev, VersionId::ZERO, 0, &[1]).unwrap();
        assert_eq!(
            s.write_block(dev, VersionId::ZERO, 1, &[2]),
            Err(Fault::WriteConflict)
        );
        // The refused write committed nothing.
        assert_eq!(
            s.list_versions(dev),
            vec![VersionId::new(0), VersionId::new(1)]
        );
    }

    #[test]
    fn versions_accumulate_one_per_write() {
        let mut s = store();
        let dev = DeviceId::from(1);
        s.initialise(dev, &[]);
        let mut version = VersionId::ZERO;
        for i in 0..3 {
            version = s.write_block(dev, version, 0, &[i]).unwrap();
        }
        assert_eq!(
            s.list_versions(dev),
            (0..=3).map(VersionId::new).collect::<Vec<_>>()
        );
    }

    #[test]
    fn accept_current_renumbers_to_zero() {
        let mut s = store();
        let dev = DeviceId::from(2);
        s.initialise(dev, &[1]);
        let v1 = s.write_block(dev, VersionId::ZERO, 0, &[2]).unwrap();
        s.write_block(dev, v1, 0, &[3]).unwrap();
        s.accept_current(dev).unwrap();
        assert_eq!(s.list_versions(dev), vec![VersionId::ZERO]);
        assert_eq!(s.get_data(dev, VersionId::ZERO).unwrap(), vec![3]);
    }

    #[test]
    fn accept_current_of_untouched_device_makes_empty_baseline() {
        let mut s = store();
        let dev = DeviceId::from(4);
        s.accept_current(dev).unwrap();
        assert_eq!(s.get_data(dev, VersionId::ZERO).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn initialise_discards_history() {
        let mut s = store();
        let dev = DeviceId::from(5);
        s.initialise(dev, &[1]);
        s.write_block(dev, VersionId::ZERO, 0, &[2]).unwrap();
        s.initialise(dev, &[9, 9]);
        assert_eq!(s.list_versions(dev), vec![VersionId::ZERO]);
        assert_eq!(s.get_data(dev, VersionId::ZERO).unwrap(), vec![9, 9]);
    }
}
