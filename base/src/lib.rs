//! The `base` crate defines the MIX-related things which are useful
//! in both the emulator core and other associated tools.  The idea is
//! that if you want to write a cross-assembler, it would depend on
//! the base crate but would not need to depend on the emulator
//! library itself.

mod types;
mod word;

pub mod charset;
pub mod prelude;

pub use crate::types::*;
pub use crate::word::*;
