//! The machine state at one point in execution.
//!
//! A [`MachineState`] is a complete snapshot: registers, flags,
//! memory image, the logical time counter, and the per-device
//! cursors.  The device cursors are what make execution reversible
//! across I/O: a device's versioned store retains every snapshot the
//! program produced, and each machine state records which version was
//! current, so restoring an earlier state restores the device view
//! with it.  States are immutable once recorded in the trace.
use std::collections::BTreeMap;

use serde::Serialize;

use base::prelude::*;

use crate::storage::VersionId;

/// The MIX register file.  Index registers conventionally hold
/// two-byte values; the core does not police that, the CPU emulation
/// does.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Registers {
    pub a: Word,
    pub x: Word,
    pub i: [Word; 6],
    pub j: Word,
    pub overflow: bool,
    pub comparison: Comparison,
}

/// A device's position as seen by one machine state: the version of
/// its contents that is current, and (for line-input devices) how
/// many lines have been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeviceCursor {
    pub version: VersionId,
    pub read_position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineState {
    pub registers: Registers,
    pub program_counter: Address,
    pub time: TimeUnits,
    pub halted: bool,
    memory: Vec<Word>,
    device_cursors: BTreeMap<DeviceId, DeviceCursor>,
}

impl MachineState {
    /// The state a machine is in before the first instruction: the
    /// assembled memory image, everything else at rest, every device
    /// at version 0.
    pub fn initial(mut memory: Vec<Word>, start: Address) -> MachineState {
        memory.resize(usize::from(MEMORY_SIZE), Word::ZERO);
        MachineState {
            registers: Registers::default(),
            program_counter: start,
            time: TimeUnits::ZERO,
            halted: false,
            memory,
            device_cursors: BTreeMap::new(),
        }
    }

    /// Contents of one memory cell.
    pub fn get(&self, address: Address) -> Word {
        self.memory[address.index()]
    }

    /// The whole memory image.
    pub fn memory(&self) -> &[Word] {
        &self.memory
    }

    pub fn set(&mut self, address: Address, value: Word) {
        self.memory[address.index()] = value;
    }

    /// The words covered by `range`, in address order.
    pub fn words_in(&self, range: &AddressRange) -> &[Word] {
        &self.memory[range.first.index()..=range.last.index()]
    }

    /// Overlay `words` onto memory starting at `range.first`.
    pub fn overlay(&mut self, range: &AddressRange, words: &[Word]) {
        self.memory[range.first.index()..=range.last.index()].copy_from_slice(words);
    }

    /// The device's cursor; a device never touched by the program is
    /// at version 0, read position 0.
    pub fn device_cursor(&self, device: DeviceId) -> DeviceCursor {
        self.device_cursors
            .get(&device)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_device_cursor(&mut self, device: DeviceId, cursor: DeviceCursor) {
        self.device_cursors.insert(device, cursor);
    }
}
