//! The MIX word: a sign and five bytes.
//!
//! A MIX byte holds at least 64 distinct values on a binary machine
//! and at least 100 on a decimal one.  Programs that are to run on
//! both machines may only rely on 0..=63.  The emulator core never
//! does arithmetic on byte values (that is the CPU emulation's
//! business), so a single `u8`-per-byte representation serves both
//! machine flavours.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

/// Number of data bytes in a word.
pub const BYTES_PER_WORD: usize = 5;

/// Size of the device encoding of one word: a sign byte followed by
/// the five data bytes.  This is the byte sequence stored in block
/// devices and handed to external data inspectors.
pub const WORD_BYTES: usize = 1 + BYTES_PER_WORD;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Word {
    pub negative: bool,
    pub bytes: [u8; BYTES_PER_WORD],
}

impl Word {
    pub const ZERO: Word = Word {
        negative: false,
        bytes: [0; BYTES_PER_WORD],
    };

    pub fn new(negative: bool, bytes: [u8; BYTES_PER_WORD]) -> Word {
        Word { negative, bytes }
    }

    pub fn is_zero(&self) -> bool {
        self.bytes == [0; BYTES_PER_WORD]
    }

    /// Encode for device storage: sign byte (1 for negative) then the
    /// five data bytes.
    pub fn to_device_bytes(&self) -> [u8; WORD_BYTES] {
        let mut raw = [0_u8; WORD_BYTES];
        raw[0] = u8::from(self.negative);
        raw[1..].copy_from_slice(&self.bytes);
        raw
    }

    /// Decode from device storage.  Input shorter than [`WORD_BYTES`]
    /// is treated as zero-extended, which is what reading past the
    /// written part of a block snapshot yields.
    pub fn from_device_bytes(raw: &[u8]) -> Word {
        let mut padded = [0_u8; WORD_BYTES];
        let n = raw.len().min(WORD_BYTES);
        padded[..n].copy_from_slice(&raw[..n]);
        let mut bytes = [0_u8; BYTES_PER_WORD];
        bytes.copy_from_slice(&padded[1..]);
        Word {
            negative: padded[0] != 0,
            bytes,
        }
    }
}

impl Display for Word {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "{} {:02} {:02} {:02} {:02} {:02}",
            if self.negative { '-' } else { '+' },
            self.bytes[0],
            self.bytes[1],
            self.bytes[2],
            self.bytes[3],
            self.bytes[4]
        )
    }
}

/// Encode a sequence of words into the flat device byte form.
pub fn words_to_bytes(words: &[Word]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * WORD_BYTES);
    for w in words {
        out.extend_from_slice(&w.to_device_bytes());
    }
    out
}

/// Decode `count` words from the flat device byte form, zero-filling
/// past the end of `raw`.
pub fn bytes_to_words(raw: &[u8], count: usize) -> Vec<Word> {
    (0..count)
        .map(|i| {
            let start = (i * WORD_BYTES).min(raw.len());
            let end = ((i + 1) * WORD_BYTES).min(raw.len());
            Word::from_device_bytes(&raw[start..end])
        })
        .collect()
}

/// Result of a MIX comparison (the CMP indicator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Comparison {
    Less,
    #[default]
    Equal,
    Greater,
}

impl Comparison {
    /// -1 for less, 0 for equal, +1 for greater; the representation
    /// the original exposed to its presentation layer.
    pub fn signum(&self) -> i8 {
        match self {
            Comparison::Less => -1,
            Comparison::Equal => 0,
            Comparison::Greater => 1,
        }
    }
}

impl Display for Comparison {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            Comparison::Less => "L",
            Comparison::Equal => "E",
            Comparison::Greater => "G",
        })
    }
}
