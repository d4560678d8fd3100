//! The prelude exports the structs which are useful in representing
//! things to do with the MIX machine.  Providing this prelude is the
//! main purpose of the base crate.
pub use super::types::{
    Address, AddressOutOfRange, AddressRange, DeviceId, TimeUnits, MEMORY_SIZE,
};
pub use super::word::{
    bytes_to_words, words_to_bytes, Comparison, Word, BYTES_PER_WORD, WORD_BYTES,
};
