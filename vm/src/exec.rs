//! The contract with the external CPU emulation.
//!
//! This core does not decode or execute MIX instructions.  The
//! history controller hands the current [`MachineState`] to a
//! [`CpuCore`] and receives the successor state together with a
//! description of everything the instruction touched: the memory
//! ranges it read and wrote (checked against the consistency guard)
//! and the device operations it started (routed through the device
//! registry).  The CPU must not apply device effects itself; it
//! reports them and the controller applies, versions and tracks them.
use base::prelude::*;

use crate::fault::Fault;
use crate::state::MachineState;

/// A device operation raised by one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Transfer one block from the device into memory (MIX `IN`).
    BlockRead {
        device: DeviceId,
        /// Which block of the device to read.
        block: usize,
        into: Address,
    },
    /// Transfer one block from memory to the device (MIX `OUT`).
    BlockWrite {
        device: DeviceId,
        block: usize,
        from: Address,
    },
    /// Read the next line from an input device into memory.
    LineRead { device: DeviceId, into: Address },
    /// Write one line from memory to an output device.
    LineWrite { device: DeviceId, from: Address },
    /// Advance an output device to a new page (MIX `IOC 0(18)`).
    PageBreak { device: DeviceId },
    /// The instruction's branch condition tests whether the device
    /// is busy (MIX `JBUS`/`JRED`).  The controller refuses the step
    /// if a transfer is actually in flight, because the outcome
    /// would depend on completion timing the model does not define.
    BusyBranch { device: DeviceId },
}

/// What one instruction did, as reported by the CPU emulation.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// The machine state after the instruction, device effects not
    /// yet applied.
    pub state: MachineState,
    /// Memory ranges the instruction read as operands.
    pub memory_reads: Vec<AddressRange>,
    /// Memory ranges the instruction wrote.
    pub memory_writes: Vec<AddressRange>,
    /// Device operations the instruction started, in issue order.
    pub events: Vec<DeviceEvent>,
}

pub trait CpuCore {
    /// Execute the instruction the program counter points at,
    /// returning the successor state and the effects to route.
    /// CPU-origin faults (division by zero, overflow, bad character
    /// codes...) propagate through the controller unchanged.
    fn execute_next_instruction(&mut self, state: &MachineState) -> Result<StepOutcome, Fault>;
}
