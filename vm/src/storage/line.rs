//! Storage for line-addressable devices.
//!
//! Output devices (card punch, line printer) are append-only logs:
//! each committed append (a line, or a page break) produces a new
//! version, under the same one-successor-per-version rule as block
//! writes.  Input devices (card reader) hold a fixed line sequence
//! loaded before the run; reads are purely positional and never
//! create versions.
use tracing::{event, Level};

use base::prelude::*;

use super::kv::KeyValueStore;
use super::{version_key, versions_in, VersionId, PAGE_BREAK};
use crate::fault::Fault;

#[derive(Debug)]
pub struct LineOutputStore {
    kv: Box<dyn KeyValueStore>,
}

impl LineOutputStore {
    pub fn new(kv: Box<dyn KeyValueStore>) -> LineOutputStore {
        LineOutputStore { kv }
    }

    fn append_to_new_version(
        &mut self,
        device: DeviceId,
        version: VersionId,
        chars: &str,
    ) -> Result<VersionId, Fault> {
        let successor = version.successor();
        if self.kv.get(&version_key(device, successor)).is_some() {
            event!(
                Level::WARN,
                "device {} version {} is already superseded, refusing append",
                device,
                version
            );
            return Err(Fault::WriteConflict);
        }
        let mut data = match self.kv.get(&version_key(device, version)) {
            Some(raw) => String::from_utf8_lossy(&raw).into_owned(),
            None => String::new(),
        };
        data.push_str(chars);
        self.kv.set(&version_key(device, successor), data.as_bytes());
        Ok(successor)
    }

    /// Append one line of text (the line break is added here),
    /// committing the result as the successor version.
    pub fn append_line(
        &mut self,
        device: DeviceId,
        version: VersionId,
        text: &str,
    ) -> Result<VersionId, Fault> {
        event!(Level::TRACE, "device {}: append line {:?}", device, text);
        self.append_to_new_version(device, version, &format!("{text}\n"))
    }

    /// Append a page-break marker.
    pub fn append_page(&mut self, device: DeviceId, version: VersionId) -> Result<VersionId, Fault> {
        event!(Level::TRACE, "device {}: append page break", device);
        self.append_to_new_version(device, version, &format!("{PAGE_BREAK}\n"))
    }

    /// Reset the device to a single empty version 0, discarding the
    /// whole chain.
    pub fn initialise(&mut self, device: DeviceId) {
        for version in versions_in(self.kv.as_ref(), device) {
            self.kv.remove(&version_key(device, version));
        }
        self.kv.set(&version_key(device, VersionId::ZERO), b"");
        event!(Level::DEBUG, "device {}: output log reset", device);
    }

    pub fn list_versions(&self, device: DeviceId) -> Vec<VersionId> {
        versions_in(self.kv.as_ref(), device)
    }

    /// The full log text of one snapshot.
    pub fn get_data(&self, device: DeviceId, version: VersionId) -> Result<String, Fault> {
        self.kv
            .get(&version_key(device, version))
            .map(|raw| String::from_utf8_lossy(&raw).into_owned())
            .ok_or(Fault::DeviceNotConnected(device))
    }

    /// The log of one snapshot, split into lines.  Page breaks appear
    /// as lines consisting of the [`PAGE_BREAK`] marker.
    pub fn get_lines(&self, device: DeviceId, version: VersionId) -> Result<Vec<String>, Fault> {
        Ok(self
            .get_data(device, version)?
            .lines()
            .map(String::from)
            .collect())
    }
}

#[derive(Debug)]
pub struct LineInputStore {
    kv: Box<dyn KeyValueStore>,
}

impl LineInputStore {
    pub fn new(kv: Box<dyn KeyValueStore>) -> LineInputStore {
        LineInputStore { kv }
    }

    fn key(device: DeviceId) -> String {
        format!("dev{device}")
    }

    /// Read the line at the given zero-based position.
    pub fn read_line(&self, device: DeviceId, position: usize) -> Result<String, Fault> {
        let data = self.get_data(device)?;
        data.split('\n')
            .nth(position)
            .map(String::from)
            .ok_or(Fault::EndOfFile)
    }

    /// Seed an empty line sequence, but only if the device has no
    /// data yet; input data loaded before the run survives.
    pub fn initialise(&mut self, device: DeviceId) {
        if self.kv.get(&Self::key(device)).is_none() {
            self.kv.set(&Self::key(device), b"");
            event!(Level::DEBUG, "device {}: seeded empty input", device);
        }
    }

    /// Replace the whole backing text.
    pub fn save(&mut self, device: DeviceId, contents: &str) {
        event!(
            Level::DEBUG,
            "device {}: loaded {} bytes of input",
            device,
            contents.len()
        );
        self.kv.set(&Self::key(device), contents.as_bytes());
    }

    pub fn get_data(&self, device: DeviceId) -> Result<String, Fault> {
        self.kv
            .get(&Self::key(device))
            .map(|raw| String::from_utf8_lossy(&raw).into_owned())
            .ok_or(Fault::DeviceNotConnected(device))
    }

    pub fn get_lines(&self, device: DeviceId) -> Result<Vec<String>, Fault> {
        Ok(self
            .get_data(device)?
            .split('\n')
            .map(String::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::MemoryStore;

    fn output() -> LineOutputStore {
        LineOutputStore::new(Box::new(MemoryStore::new()))
    }

    fn input() -> LineInputStore {
        LineInputStore::new(Box::new(MemoryStore::new()))
    }

    #[test]
    fn appends_concatenate_in_issue_order() {
        let mut s = output();
        let dev = DeviceId::from(18);
        s.initialise(dev);
        let v1 = s.append_line(dev, VersionId::ZERO, "FIRST").unwrap();
        let v2 = s.append_line(dev, v1, "SECOND").unwrap();
        assert_eq!(s.get_data(dev, v2).unwrap(), "FIRST\nSECOND\n");
        // Every prefix of the log is still retrievable.
        assert_eq!(s.get_data(dev, v1).unwrap(), "FIRST\n");
        assert_eq!(s.get_data(dev, VersionId::ZERO).unwrap(), "");
    }

    #[test]
    fn page_break_is_its_own_line() {
        let mut s = output();
        let dev = DeviceId::from(18);
        s.initialise(dev);
        let v1 = s.append_line(dev, VersionId::ZERO, "TOP").unwrap();
        let v2 = s.append_page(dev, v1).unwrap();
        let v3 = s.append_line(dev, v2, "NEXT PAGE").unwrap();
        assert_eq!(
            s.get_lines(dev, v3).unwrap(),
            vec!["TOP".to_string(), PAGE_BREAK.to_string(), "NEXT PAGE".to_string()]
        );
    }

    #[test]
    fn append_against_superseded_version_conflicts() {
        let mut s = output();
        let dev = DeviceId::from(17);
        s.initialise(dev);
        s.append_line(dev, VersionId::ZERO, "A").unwrap();
        assert_eq!(
            s.append_line(dev, VersionId::ZERO, "B"),
            Err(Fault::WriteConflict)
        );
    }

    #[test]
    fn initialise_resets_the_log() {
        let mut s = output();
        let dev = DeviceId::from(18);
        s.initialise(dev);
        s.append_line(dev, VersionId::ZERO, "X").unwrap();
        s.initialise(dev);
        assert_eq!(s.list_versions(dev), vec![VersionId::ZERO]);
        assert_eq!(s.get_data(dev, VersionId::ZERO).unwrap(), "");
    }

    #[test]
    fn positional_reads() {
        let mut s = input();
        let dev = DeviceId::from(16);
        s.save(dev, "A\nB");
        assert_eq!(s.read_line(dev, 0).unwrap(), "A");
        assert_eq!(s.read_line(dev, 1).unwrap(), "B");
        assert_eq!(s.read_line(dev, 2), Err(Fault::EndOfFile));
    }

    #[test]
    fn initialise_does_not_clobber_loaded_input() {
        let mut s = input();
        let dev = DeviceId::from(16);
        s.save(dev, "CARD");
        s.initialise(dev);
        assert_eq!(s.get_data(dev).unwrap(), "CARD");
        // But it does seed a device with nothing at all.
        let other = DeviceId::from(19);
        s.initialise(other);
        assert_eq!(s.get_data(other).unwrap(), "");
    }

    #[test]
    fn reading_an_unloaded_device_fails() {
        let s = input();
        let dev = DeviceId::from(16);
        assert_eq!(s.read_line(dev, 0), Err(Fault::DeviceNotConnected(dev)));
    }
}
