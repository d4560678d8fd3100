//! The device registry: one uniform façade over every attached
//! peripheral.
//!
//! Which device number designates which kind of peripheral is fixed
//! by the surrounding application, not discovered here; the registry
//! is built from a [`DeviceConfig`] table and routes each operation
//! to the matching versioned store.  Word-level transfers (the
//! execution layer's view) and raw snapshot access (the data
//! inspector's view) both live here, so the character-code and
//! word-byte conversions happen in exactly one place.
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{event, Level};

use base::charset;
use base::prelude::*;

use crate::fault::Fault;
use crate::state::DeviceCursor;
use crate::storage::kv::{KeyValueStore, MemoryStore};
use crate::storage::{BlockStore, LineInputStore, LineOutputStore, VersionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    /// Random access by block number (tape, disk, paper tape).
    Block {
        words_per_block: usize,
        transfer_time: TimeUnits,
    },
    /// Sequential access by line (card reader/punch, printer).
    Line {
        direction: DeviceDirection,
        chars_per_line: usize,
        transfer_time: TimeUnits,
    },
}

impl DeviceKind {
    pub fn transfer_time(&self) -> TimeUnits {
        match self {
            DeviceKind::Block { transfer_time, .. } => *transfer_time,
            DeviceKind::Line { transfer_time, .. } => *transfer_time,
        }
    }

    /// How many memory cells one transfer touches.
    pub fn words_per_transfer(&self) -> usize {
        match self {
            DeviceKind::Block {
                words_per_block, ..
            } => *words_per_block,
            DeviceKind::Line { chars_per_line, .. } => chars_per_line / BYTES_PER_WORD,
        }
    }
}

/// The device table: device number to kind and geometry.
#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    kinds: BTreeMap<DeviceId, DeviceKind>,
}

impl DeviceConfig {
    pub fn new() -> DeviceConfig {
        DeviceConfig::default()
    }

    pub fn attach(&mut self, device: DeviceId, kind: DeviceKind) {
        self.kinds.insert(device, kind);
    }

    pub fn kind(&self, device: DeviceId) -> Option<DeviceKind> {
        self.kinds.get(&device).copied()
    }

    pub fn device_numbers(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.kinds.keys().copied()
    }

    /// The conventional MIX peripheral assignment: tape units 0-7,
    /// disk units 8-15, card reader 16, card punch 17, line printer
    /// 18 and paper tape 20.
    pub fn mix_standard() -> DeviceConfig {
        let mut config = DeviceConfig::new();
        for unit in 0..8 {
            config.attach(
                DeviceId::from(unit),
                DeviceKind::Block {
                    words_per_block: 100,
                    transfer_time: TimeUnits::new(100),
                },
            );
        }
        for unit in 8..16 {
            config.attach(
                DeviceId::from(unit),
                DeviceKind::Block {
                    words_per_block: 100,
                    transfer_time: TimeUnits::new(500),
                },
            );
        }
        config.attach(
            DeviceId::from(16),
            DeviceKind::Line {
                direction: DeviceDirection::Input,
                chars_per_line: 80,
                transfer_time: TimeUnits::new(1000),
            },
        );
        config.attach(
            DeviceId::from(17),
            DeviceKind::Line {
                direction: DeviceDirection::Output,
                chars_per_line: 80,
                transfer_time: TimeUnits::new(2000),
            },
        );
        config.attach(
            DeviceId::from(18),
            DeviceKind::Line {
                direction: DeviceDirection::Output,
                chars_per_line: 120,
                transfer_time: TimeUnits::new(1000),
            },
        );
        config.attach(
            DeviceId::from(20),
            DeviceKind::Block {
                words_per_block: 14,
                transfer_time: TimeUnits::new(1000),
            },
        );
        config
    }
}

/// All data of one device state, in the form its kind calls for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DeviceSnapshot {
    Words(Vec<Word>),
    Lines(Vec<String>),
}

#[derive(Debug)]
pub struct DeviceRegistry {
    config: DeviceConfig,
    blocks: BlockStore,
    line_out: LineOutputStore,
    line_in: LineInputStore,
}

impl DeviceRegistry {
    pub fn new(
        config: DeviceConfig,
        blocks: Box<dyn KeyValueStore>,
        line_out: Box<dyn KeyValueStore>,
        line_in: Box<dyn KeyValueStore>,
    ) -> DeviceRegistry {
        DeviceRegistry {
            config,
            blocks: BlockStore::new(blocks),
            line_out: LineOutputStore::new(line_out),
            line_in: LineInputStore::new(line_in),
        }
    }

    /// A registry over transient in-memory storage.
    pub fn in_memory(config: DeviceConfig) -> DeviceRegistry {
        DeviceRegistry::new(
            config,
            Box::new(MemoryStore::new()),
            Box::new(MemoryStore::new()),
            Box::new(MemoryStore::new()),
        )
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    fn kind_of(&self, device: DeviceId) -> Result<DeviceKind, Fault> {
        self.config
            .kind(device)
            .ok_or(Fault::DeviceNotConnected(device))
    }

    fn block_kind(&self, device: DeviceId, operation: &'static str) -> Result<usize, Fault> {
        match self.kind_of(device)? {
            DeviceKind::Block {
                words_per_block, ..
            } => Ok(words_per_block),
            DeviceKind::Line { .. } => Err(Fault::UnsupportedIoOperation { device, operation }),
        }
    }

    fn line_kind(
        &self,
        device: DeviceId,
        wanted: DeviceDirection,
        operation: &'static str,
    ) -> Result<usize, Fault> {
        match self.kind_of(device)? {
            DeviceKind::Line {
                direction,
                chars_per_line,
                ..
            } if direction == wanted => Ok(chars_per_line),
            _ => Err(Fault::UnsupportedIoOperation { device, operation }),
        }
    }

    /// One block of the device, as words.
    pub fn read_block_words(
        &self,
        device: DeviceId,
        version: VersionId,
        block: usize,
    ) -> Result<Vec<Word>, Fault> {
        let words_per_block = self.block_kind(device, "block read")?;
        let raw = self.blocks.read_block(
            device,
            version,
            block * words_per_block * WORD_BYTES,
            words_per_block * WORD_BYTES,
        )?;
        Ok(bytes_to_words(&raw, words_per_block))
    }

    /// Write one block of words, advancing the device's version
    /// chain.
    pub fn write_block_words(
        &mut self,
        device: DeviceId,
        version: VersionId,
        block: usize,
        words: &[Word],
    ) -> Result<VersionId, Fault> {
        let words_per_block = self.block_kind(device, "block write")?;
        self.blocks.write_block(
            device,
            version,
            block * words_per_block * WORD_BYTES,
            &words_to_bytes(&words[..words_per_block.min(words.len())]),
        )
    }

    /// The next input line, encoded into words (five character codes
    /// per word, space-padded to the device's line width).
    pub fn read_line_words(&self, device: DeviceId, position: usize) -> Result<Vec<Word>, Fault> {
        let chars_per_line = self.line_kind(device, DeviceDirection::Input, "line read")?;
        let text = self.line_in.read_line(device, position)?;
        let mut codes = Vec::with_capacity(chars_per_line);
        for ch in text.chars().take(chars_per_line) {
            match charset::code_of_char(ch) {
                Ok(code) => codes.push(code),
                Err(charset::CharacterNotInAlphabet(bad)) => {
                    return Err(Fault::UnsupportedCharacter(bad));
                }
            }
        }
        codes.resize(chars_per_line, 0); // pad with spaces
        Ok(codes
            .chunks(BYTES_PER_WORD)
            .map(|chunk| {
                let mut bytes = [0_u8; BYTES_PER_WORD];
                bytes[..chunk.len()].copy_from_slice(chunk);
                Word::new(false, bytes)
            })
            .collect())
    }

    /// Decode words into the text line they spell, without touching
    /// the device.  The card punch refuses characters cards cannot
    /// carry.  Used by the history controller to validate an output
    /// before anything is committed.
    pub fn decode_output_line(&self, device: DeviceId, words: &[Word]) -> Result<String, Fault> {
        let chars_per_line = self.line_kind(device, DeviceDirection::Output, "line write")?;
        // 80-column output is the card punch, by MIX convention.
        let is_card_device = chars_per_line == 80;
        let mut text = String::with_capacity(chars_per_line);
        'words: for word in words {
            for code in word.bytes {
                match charset::char_of_code(code) {
                    Ok(ch) => {
                        if is_card_device && !charset::card_punchable(ch) {
                            return Err(Fault::UnsupportedPunchedCardCharacter(ch));
                        }
                        text.push(ch);
                    }
                    Err(charset::UnknownCharacterCode(code)) => {
                        return Err(Fault::WrongCharacterCode(code));
                    }
                }
                if text.chars().count() == chars_per_line {
                    break 'words;
                }
            }
        }
        Ok(text.trim_end_matches(' ').to_string())
    }

    /// Append an already-decoded text line to an output device,
    /// advancing its version chain.
    pub fn append_line_text(
        &mut self,
        device: DeviceId,
        version: VersionId,
        text: &str,
    ) -> Result<VersionId, Fault> {
        self.line_kind(device, DeviceDirection::Output, "line write")?;
        self.line_out.append_line(device, version, text)
    }

    /// Decode words and append the line they spell.
    pub fn write_line_words(
        &mut self,
        device: DeviceId,
        version: VersionId,
        words: &[Word],
    ) -> Result<VersionId, Fault> {
        let text = self.decode_output_line(device, words)?;
        self.append_line_text(device, version, &text)
    }

    /// Append a page-break marker to an output device.
    pub fn append_page(&mut self, device: DeviceId, version: VersionId) -> Result<VersionId, Fault> {
        self.line_kind(device, DeviceDirection::Output, "page break")?;
        self.line_out.append_page(device, version)
    }

    /// All data of the device state the cursor names, for external
    /// inspection.
    pub fn snapshot_data(
        &self,
        device: DeviceId,
        cursor: DeviceCursor,
    ) -> Result<DeviceSnapshot, Fault> {
        match self.kind_of(device)? {
            DeviceKind::Block { .. } => {
                let raw = self.blocks.get_data(device, cursor.version)?;
                Ok(DeviceSnapshot::Words(bytes_to_words(
                    &raw,
                    raw.len().div_ceil(WORD_BYTES),
                )))
            }
            DeviceKind::Line {
                direction: DeviceDirection::Output,
                ..
            } => Ok(DeviceSnapshot::Lines(
                self.line_out.get_lines(device, cursor.version)?,
            )),
            DeviceKind::Line {
                direction: DeviceDirection::Input,
                ..
            } => Ok(DeviceSnapshot::Lines(self.line_in.get_lines(device)?)),
        }
    }

    /// Install words as the initial contents of a block device.
    pub fn save_block_device(&mut self, device: DeviceId, words: &[Word]) -> Result<(), Fault> {
        self.block_kind(device, "save block data")?;
        self.blocks.initialise(device, &words_to_bytes(words));
        Ok(())
    }

    /// Install the text a program will eventually read from a
    /// line-input device.
    pub fn save_line_device(&mut self, device: DeviceId, contents: &str) -> Result<(), Fault> {
        self.line_kind(device, DeviceDirection::Input, "save line data")?;
        self.line_in.save(device, contents);
        Ok(())
    }

    pub fn list_versions(&self, device: DeviceId) -> Result<Vec<VersionId>, Fault> {
        match self.kind_of(device)? {
            DeviceKind::Block { .. } => Ok(self.blocks.list_versions(device)),
            DeviceKind::Line {
                direction: DeviceDirection::Output,
                ..
            } => Ok(self.line_out.list_versions(device)),
            // An input device's data never versions.
            DeviceKind::Line {
                direction: DeviceDirection::Input,
                ..
            } => Ok(vec![VersionId::ZERO]),
        }
    }

    /// Adopt the device's latest state as the new version 0: block
    /// devices keep their current contents, output logs reset, input
    /// devices keep whatever was loaded.
    pub fn accept_current(&mut self, device: DeviceId) -> Result<(), Fault> {
        match self.kind_of(device)? {
            DeviceKind::Block { .. } => self.blocks.accept_current(device),
            DeviceKind::Line {
                direction: DeviceDirection::Output,
                ..
            } => {
                self.line_out.initialise(device);
                Ok(())
            }
            DeviceKind::Line {
                direction: DeviceDirection::Input,
                ..
            } => {
                self.line_in.initialise(device);
                Ok(())
            }
        }
    }

    /// [`DeviceRegistry::accept_current`] for every configured
    /// device; run before a program starts so every chain begins at
    /// version 0.
    pub fn accept_current_all(&mut self) -> Result<(), Fault> {
        let devices: Vec<DeviceId> = self.config.device_numbers().collect();
        for device in devices {
            self.accept_current(device)?;
        }
        event!(Level::DEBUG, "all device chains rebased to version 0");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DeviceRegistry {
        let mut r = DeviceRegistry::in_memory(DeviceConfig::mix_standard());
        r.accept_current_all().expect("fresh registry has no chains");
        r
    }

    fn word_of_text(text: &str) -> Word {
        let codes: Vec<u8> = text.chars().map(|c| charset::code_of_char(c).unwrap()).collect();
        let mut bytes = [0_u8; BYTES_PER_WORD];
        bytes.copy_from_slice(&codes);
        Word::new(false, bytes)
    }

    #[test]
    fn unknown_device_is_not_connected() {
        let r = registry();
        let dev = DeviceId::from(19);
        assert_eq!(
            r.read_block_words(dev, VersionId::ZERO, 0),
            Err(Fault::DeviceNotConnected(dev))
        );
    }

    #[test]
    fn kind_mismatch_is_unsupported() {
        let mut r = registry();
        let printer = DeviceId::from(18);
        assert_eq!(
            r.read_block_words(printer, VersionId::ZERO, 0),
            Err(Fault::UnsupportedIoOperation {
                device: printer,
                operation: "block read",
            })
        );
        let reader = DeviceId::from(16);
        assert_eq!(
            r.write_line_words(reader, VersionId::ZERO, &[]),
            Err(Fault::UnsupportedIoOperation {
                device: reader,
                operation: "line write",
            })
        );
        let tape = DeviceId::from(0);
        assert_eq!(
            r.save_line_device(tape, "X"),
            Err(Fault::UnsupportedIoOperation {
                device: tape,
                operation: "save line data",
            })
        );
    }

    #[test]
    fn block_round_trip_through_words() {
        let mut r = registry();
        let tape = DeviceId::from(0);
        let words: Vec<Word> = (0..100)
            .map(|i| Word::new(i % 2 == 0, [i as u8, 0, 0, 0, 0]))
            .collect();
        let v1 = r
            .write_block_words(tape, VersionId::ZERO, 2, &words)
            .unwrap();
        assert_eq!(r.read_block_words(tape, v1, 2).unwrap(), words);
        // Neighbouring blocks read as zero words.
        assert_eq!(
            r.read_block_words(tape, v1, 1).unwrap(),
            vec![Word::ZERO; 100]
        );
    }

    #[test]
    fn line_read_encodes_five_chars_per_word() {
        let mut r = registry();
        let reader = DeviceId::from(16);
        r.save_line_device(reader, "HELLO WORLD").unwrap();
        let words = r.read_line_words(reader, 0).unwrap();
        assert_eq!(words.len(), 16);
        assert_eq!(words[0], word_of_text("HELLO"));
        assert_eq!(words[1], word_of_text(" WORL"));
        // Past the text the line is space-padded, and spaces have
        // code zero.
        assert_eq!(words[3], Word::ZERO);
    }

    #[test]
    fn line_write_decodes_and_trims() {
        let mut r = registry();
        let printer = DeviceId::from(18);
        let words = [word_of_text("HELLO"), word_of_text(", WOR"), word_of_text("LD   ")];
        let v1 = r.write_line_words(printer, VersionId::ZERO, &words).unwrap();
        assert_eq!(
            r.snapshot_data(printer, DeviceCursor { version: v1, read_position: 0 })
                .unwrap(),
            DeviceSnapshot::Lines(vec!["HELLO, WORLD".to_string()])
        );
    }

    #[test]
    fn card_punch_refuses_greek_letters() {
        let mut r = registry();
        let punch = DeviceId::from(17);
        let delta = Word::new(false, [10, 0, 0, 0, 0]);
        assert_eq!(
            r.write_line_words(punch, VersionId::ZERO, &[delta]),
            Err(Fault::UnsupportedPunchedCardCharacter('Δ'))
        );
        // The printer is happy to print them.
        let printer = DeviceId::from(18);
        assert!(r.write_line_words(printer, VersionId::ZERO, &[delta]).is_ok());
    }

    #[test]
    fn snapshot_matches_store_data() {
        let mut r = registry();
        let disk = DeviceId::from(8);
        let words = vec![Word::new(false, [1, 2, 3, 4, 5]); 100];
        let v1 = r.write_block_words(disk, VersionId::ZERO, 0, &words).unwrap();
        match r
            .snapshot_data(disk, DeviceCursor { version: v1, read_position: 0 })
            .unwrap()
        {
            DeviceSnapshot::Words(seen) => assert_eq!(seen, words),
            DeviceSnapshot::Lines(_) => panic!("block device must snapshot as words"),
        }
    }

    #[test]
    fn accept_current_rebases_block_chains_and_resets_logs() {
        let mut r = registry();
        let tape = DeviceId::from(3);
        let printer = DeviceId::from(18);
        let words = vec![Word::new(false, [7, 0, 0, 0, 0]); 100];
        r.write_block_words(tape, VersionId::ZERO, 0, &words).unwrap();
        r.write_line_words(printer, VersionId::ZERO, &[word_of_text("GONE ")])
            .unwrap();
        r.accept_current(tape).unwrap();
        r.accept_current(printer).unwrap();
        assert_eq!(r.list_versions(tape).unwrap(), vec![VersionId::ZERO]);
        assert_eq!(r.read_block_words(tape, VersionId::ZERO, 0).unwrap(), words);
        assert_eq!(
            r.snapshot_data(printer, DeviceCursor::default()).unwrap(),
            DeviceSnapshot::Lines(Vec::new())
        );
    }
}
