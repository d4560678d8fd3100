//! The reversible execution driver.
//!
//! Execution produces a linear trace of machine states; the
//! controller's cursor moves along it.  Moving forward either
//! replays a state that was already computed (the user stepped back
//! earlier and is re-entering a visited future) or executes one
//! instruction through the external CPU core.  Moving backward only
//! ever replays; nothing is recomputed, so a back-then-forward pair
//! restores bit-identical state.
//!
//! Every fresh execution step routes the instruction's device events
//! through the registry and the consistency guard, in that strict
//! order: validate everything, then commit.  A step that faults
//! leaves the trace, the cursor, the guard and every device version
//! chain exactly as they were.
//!
//! History tracking is optional.  The non-tracking configuration
//! retains only the current state; it exists so that very long runs
//! do not accumulate a trace nobody will navigate.
use std::collections::BTreeSet;
use std::fmt::Debug;

use tracing::{event, Level};

use base::prelude::*;

use crate::devices::{DeviceRegistry, DeviceSnapshot};
use crate::exec::{CpuCore, DeviceEvent, StepOutcome};
use crate::fault::Fault;
use crate::guard::{ConsistencyGuard, GuardSnapshot, PendingOperation, TransferDirection};
use crate::state::{DeviceCursor, MachineState};
use crate::symbols::AddressIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryMode {
    /// Retain every visited state; backward navigation available.
    Tracking,
    /// Retain only the current state; `can_move_back` is always
    /// false.
    NonTracking,
}

#[derive(Debug, Clone)]
struct TraceEntry {
    state: MachineState,
    guard: GuardSnapshot,
}

trait Trace: Debug {
    fn current(&self) -> &TraceEntry;
    /// Step number of the current state.
    fn position(&self) -> usize;
    /// Commit a freshly executed successor state and advance onto it.
    fn append(&mut self, entry: TraceEntry);
    /// Advance onto an already-computed successor, if there is one.
    fn replay_forward(&mut self) -> Option<&TraceEntry>;
    fn move_back(&mut self) -> Option<&TraceEntry>;
    fn can_move_back(&self) -> bool;
}

#[derive(Debug)]
struct TrackingTrace {
    entries: Vec<TraceEntry>,
    cursor: usize,
}

impl Trace for TrackingTrace {
    fn current(&self) -> &TraceEntry {
        &self.entries[self.cursor]
    }

    fn position(&self) -> usize {
        self.cursor
    }

    fn append(&mut self, entry: TraceEntry) {
        // A fresh state can only be executed from the end of the
        // trace; anywhere earlier the successor already exists and is
        // replayed instead.
        debug_assert_eq!(self.cursor + 1, self.entries.len());
        self.entries.push(entry);
        self.cursor += 1;
    }

    fn replay_forward(&mut self) -> Option<&TraceEntry> {
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
            Some(&self.entries[self.cursor])
        } else {
            None
        }
    }

    fn move_back(&mut self) -> Option<&TraceEntry> {
        if self.cursor == 0 {
            None
        } else {
            self.cursor -= 1;
            Some(&self.entries[self.cursor])
        }
    }

    fn can_move_back(&self) -> bool {
        self.cursor > 0
    }
}

#[derive(Debug)]
struct CurrentOnlyTrace {
    entry: TraceEntry,
    position: usize,
}

impl Trace for CurrentOnlyTrace {
    fn current(&self) -> &TraceEntry {
        &self.entry
    }

    fn position(&self) -> usize {
        self.position
    }

    fn append(&mut self, entry: TraceEntry) {
        self.entry = entry;
        self.position += 1;
    }

    fn replay_forward(&mut self) -> Option<&TraceEntry> {
        None
    }

    fn move_back(&mut self) -> Option<&TraceEntry> {
        None
    }

    fn can_move_back(&self) -> bool {
        false
    }
}

/// A device effect that has been validated but not yet committed.
#[derive(Debug)]
enum Staged {
    /// Place transferred words into memory and track the in-flight
    /// transfer (a device-to-memory read).
    Deliver {
        device: DeviceId,
        range: AddressRange,
        words: Vec<Word>,
        cursor: DeviceCursor,
        due: TimeUnits,
    },
    /// Advance a block device's version chain with one block of
    /// words read out of memory.
    WriteBlock {
        device: DeviceId,
        block: usize,
        words: Vec<Word>,
        range: AddressRange,
        due: TimeUnits,
    },
    /// Append one decoded line to an output device.
    WriteLine {
        device: DeviceId,
        text: String,
        range: AddressRange,
        due: TimeUnits,
    },
    Page {
        device: DeviceId,
    },
}

pub struct ExecutionHistory {
    cpu: Box<dyn CpuCore>,
    registry: DeviceRegistry,
    guard: ConsistencyGuard,
    index: AddressIndex,
    breakpoints: BTreeSet<usize>,
    initial_memory: Vec<Word>,
    trace: Box<dyn Trace>,
}

impl ExecutionHistory {
    /// Set up a machine around an assembled memory image and its
    /// address index.  Every device version chain is rebased so that
    /// version 0 is the state the devices are in right now.
    pub fn new(
        cpu: Box<dyn CpuCore>,
        mut registry: DeviceRegistry,
        index: AddressIndex,
        initial: MachineState,
        mode: HistoryMode,
    ) -> Result<ExecutionHistory, Fault> {
        registry.accept_current_all()?;
        let entry = TraceEntry {
            guard: GuardSnapshot::default(),
            state: initial,
        };
        let initial_memory = entry.state.memory().to_vec();
        let trace: Box<dyn Trace> = match mode {
            HistoryMode::Tracking => Box::new(TrackingTrace {
                entries: vec![entry],
                cursor: 0,
            }),
            HistoryMode::NonTracking => Box::new(CurrentOnlyTrace { entry, position: 0 }),
        };
        Ok(ExecutionHistory {
            cpu,
            registry,
            guard: ConsistencyGuard::new(),
            index,
            breakpoints: BTreeSet::new(),
            initial_memory,
            trace,
        })
    }

    pub fn current_state(&self) -> &MachineState {
        &self.trace.current().state
    }

    /// Step number of the current state.
    pub fn position(&self) -> usize {
        self.trace.position()
    }

    pub fn can_move_forward(&self) -> bool {
        !self.current_state().halted
    }

    pub fn can_move_back(&self) -> bool {
        self.trace.can_move_back()
    }

    /// Switch to the next state: replay it if it was already
    /// computed, execute one instruction otherwise.
    pub fn step_forward(&mut self) -> Result<(), Fault> {
        if self.current_state().halted {
            return Err(Fault::ForwardFromTerminal);
        }
        if self.trace.replay_forward().is_some() {
            let snapshot = self.trace.current().guard.clone();
            self.guard.restore(&snapshot);
            event!(
                Level::TRACE,
                "replayed forward to step {}",
                self.trace.position()
            );
            return Ok(());
        }
        let outcome = self
            .cpu
            .execute_next_instruction(&self.trace.current().state)?;
        let guard_before = self.guard.snapshot();
        match self.apply_outcome(outcome) {
            Ok(state) => {
                self.trace.append(TraceEntry {
                    guard: self.guard.snapshot(),
                    state,
                });
                event!(Level::TRACE, "executed step {}", self.trace.position());
                Ok(())
            }
            Err(fault) => {
                // The step commits nothing: put the bookkeeping back.
                self.guard.restore(&guard_before);
                Err(fault)
            }
        }
    }

    /// Switch to the previous state in the history.
    pub fn step_back(&mut self) -> Result<(), Fault> {
        let snapshot = match self.trace.move_back() {
            Some(entry) => entry.guard.clone(),
            None => return Err(Fault::BackFromInitialState),
        };
        self.guard.restore(&snapshot);
        event!(Level::TRACE, "stepped back to step {}", self.trace.position());
        Ok(())
    }

    /// Run until the next breakpoint, the machine halting, or a
    /// fault (which leaves the machine at the last committed state).
    pub fn run_forward(&mut self) -> Result<(), Fault> {
        loop {
            self.step_forward()?;
            if self.current_state().halted || self.at_breakpoint() {
                return Ok(());
            }
        }
    }

    /// Run backward until the previous breakpoint or the initial
    /// state.
    pub fn run_back(&mut self) -> Result<(), Fault> {
        self.step_back()?;
        while self.trace.can_move_back() && !self.at_breakpoint() {
            self.step_back()?;
        }
        Ok(())
    }

    fn at_breakpoint(&self) -> bool {
        match self.program_counter_index() {
            Some(index) => self.breakpoints.contains(&index),
            None => false,
        }
    }

    pub fn toggle_breakpoint_at(&mut self, index: usize) {
        if !self.breakpoints.remove(&index) {
            self.breakpoints.insert(index);
        }
    }

    pub fn breakpoint_at(&self, index: usize) -> bool {
        self.breakpoints.contains(&index)
    }

    /// Total number of positions in the combined index of memory
    /// cells and source lines.
    pub fn symbols_len(&self) -> usize {
        self.index.len()
    }

    /// Positions that occupy no memory cell.
    pub fn symbol_indices(&self) -> Vec<usize> {
        self.index.symbol_indices()
    }

    /// The position the program counter points at.
    pub fn program_counter_index(&self) -> Option<usize> {
        self.index
            .index_of_address(self.current_state().program_counter)
    }

    pub fn address_at(&self, index: usize) -> Option<Address> {
        self.index.address_at(index)
    }

    pub fn line_number_at(&self, index: usize) -> Option<usize> {
        self.index.line_number_at(index)
    }

    pub fn line_at(&self, index: usize) -> Option<&str> {
        self.index.line_at(index)
    }

    /// Whether the cell behind this position differs from the
    /// assembled image; positions without a cell are never modified.
    pub fn line_is_modified_at(&self, index: usize) -> bool {
        match self.index.address_at(index) {
            Some(address) => {
                self.current_state().get(address) != self.initial_memory[address.index()]
            }
            None => false,
        }
    }

    pub fn cell_content(&self, index: usize) -> Option<Word> {
        self.index
            .address_at(index)
            .map(|address| self.current_state().get(address))
    }

    /// All data from the current state of a block device.
    pub fn block_device_data(&self, device: DeviceId) -> Result<Vec<Word>, Fault> {
        match self
            .registry
            .snapshot_data(device, self.current_state().device_cursor(device))?
        {
            DeviceSnapshot::Words(words) => Ok(words),
            DeviceSnapshot::Lines(_) => Err(Fault::UnsupportedIoOperation {
                device,
                operation: "block data",
            }),
        }
    }

    /// All data from the current state of a line device.
    pub fn line_device_data(&self, device: DeviceId) -> Result<Vec<String>, Fault> {
        match self
            .registry
            .snapshot_data(device, self.current_state().device_cursor(device))?
        {
            DeviceSnapshot::Lines(lines) => Ok(lines),
            DeviceSnapshot::Words(_) => Err(Fault::UnsupportedIoOperation {
                device,
                operation: "line data",
            }),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Adopt the current run's device contents as the permanent
    /// baseline (leaving history mode).  Refused while any transfer
    /// is still in flight; what a collapse means for a half-finished
    /// transfer is undefined, so we fail loudly instead of guessing.
    pub fn accept_devices(&mut self) -> Result<(), Fault> {
        if !self.guard.is_idle() {
            event!(
                Level::WARN,
                "refusing to rebase device chains under {} in-flight transfer(s)",
                self.guard.pending_count()
            );
            return Err(Fault::WriteConflict);
        }
        self.registry.accept_current_all()
    }

    /// Apply one instruction's outcome: settle due transfers, check
    /// every memory access, then validate and commit its device
    /// events.
    fn apply_outcome(&mut self, outcome: StepOutcome) -> Result<MachineState, Fault> {
        let StepOutcome {
            mut state,
            memory_reads,
            memory_writes,
            events,
        } = outcome;
        // Transfers that settle during this step are retired first;
        // they no longer constrain anything.
        self.guard.complete_due(state.time);
        for range in &memory_reads {
            self.guard.check_read_range(range)?;
        }
        for range in &memory_writes {
            self.guard.check_write_range(range)?;
        }
        let staged = self.plan_events(&state, &events)?;
        for action in staged {
            self.commit(action, &mut state)?;
        }
        Ok(state)
    }

    /// Validate the step's device events against the guard and the
    /// stores without committing anything.
    fn plan_events(
        &self,
        state: &MachineState,
        events: &[DeviceEvent],
    ) -> Result<Vec<Staged>, Fault> {
        let mut staged = Vec::with_capacity(events.len());
        for event in events {
            match event {
                DeviceEvent::BlockRead {
                    device,
                    block,
                    into,
                } => {
                    let kind = self.kind_of(*device)?;
                    let range = transfer_range(*into, kind.words_per_transfer())?;
                    self.guard.check_write_range(&range)?;
                    let cursor = state.device_cursor(*device);
                    let words = self
                        .registry
                        .read_block_words(*device, cursor.version, *block)?;
                    staged.push(Staged::Deliver {
                        device: *device,
                        range,
                        words,
                        cursor,
                        due: state.time + kind.transfer_time(),
                    });
                }
                DeviceEvent::BlockWrite {
                    device,
                    block,
                    from,
                } => {
                    let kind = self.kind_of(*device)?;
                    let range = transfer_range(*from, kind.words_per_transfer())?;
                    self.guard.check_read_range(&range)?;
                    staged.push(Staged::WriteBlock {
                        device: *device,
                        block: *block,
                        words: state.words_in(&range).to_vec(),
                        range,
                        due: state.time + kind.transfer_time(),
                    });
                }
                DeviceEvent::LineRead { device, into } => {
                    let kind = self.kind_of(*device)?;
                    let range = transfer_range(*into, kind.words_per_transfer())?;
                    self.guard.check_write_range(&range)?;
                    let cursor = state.device_cursor(*device);
                    let words = self
                        .registry
                        .read_line_words(*device, cursor.read_position)?;
                    staged.push(Staged::Deliver {
                        device: *device,
                        range,
                        words,
                        cursor: DeviceCursor {
                            read_position: cursor.read_position + 1,
                            ..cursor
                        },
                        due: state.time + kind.transfer_time(),
                    });
                }
                DeviceEvent::LineWrite { device, from } => {
                    let kind = self.kind_of(*device)?;
                    let range = transfer_range(*from, kind.words_per_transfer())?;
                    self.guard.check_read_range(&range)?;
                    let text = self
                        .registry
                        .decode_output_line(*device, state.words_in(&range))?;
                    staged.push(Staged::WriteLine {
                        device: *device,
                        text,
                        range,
                        due: state.time + kind.transfer_time(),
                    });
                }
                DeviceEvent::PageBreak { device } => {
                    self.kind_of(*device)?;
                    staged.push(Staged::Page { device: *device });
                }
                DeviceEvent::BusyBranch { device } => {
                    self.kind_of(*device)?;
                    if self.guard.device_is_busy(*device) {
                        // Whether the branch is taken depends on
                        // completion timing the model does not
                        // define.
                        return Err(Fault::UnpredictableExecutionFlow);
                    }
                }
            }
        }
        Ok(staged)
    }

    fn commit(&mut self, action: Staged, state: &mut MachineState) -> Result<(), Fault> {
        match action {
            Staged::Deliver {
                device,
                range,
                words,
                cursor,
                due,
            } => {
                state.overlay(&range, &words);
                state.set_device_cursor(device, cursor);
                self.guard.register_pending(PendingOperation {
                    device,
                    range,
                    direction: TransferDirection::DeviceToMemory,
                    due,
                });
            }
            Staged::WriteBlock {
                device,
                block,
                words,
                range,
                due,
            } => {
                let cursor = state.device_cursor(device);
                let version =
                    self.registry
                        .write_block_words(device, cursor.version, block, &words)?;
                state.set_device_cursor(device, DeviceCursor { version, ..cursor });
                self.guard.register_pending(PendingOperation {
                    device,
                    range,
                    direction: TransferDirection::MemoryToDevice,
                    due,
                });
            }
            Staged::WriteLine {
                device,
                text,
                range,
                due,
            } => {
                let cursor = state.device_cursor(device);
                let version = self
                    .registry
                    .append_line_text(device, cursor.version, &text)?;
                state.set_device_cursor(device, DeviceCursor { version, ..cursor });
                self.guard.register_pending(PendingOperation {
                    device,
                    range,
                    direction: TransferDirection::MemoryToDevice,
                    due,
                });
            }
            Staged::Page { device } => {
                let cursor = state.device_cursor(device);
                let version = self.registry.append_page(device, cursor.version)?;
                state.set_device_cursor(device, DeviceCursor { version, ..cursor });
            }
        }
        Ok(())
    }

    fn kind_of(&self, device: DeviceId) -> Result<crate::devices::DeviceKind, Fault> {
        self.registry
            .config()
            .kind(device)
            .ok_or(Fault::DeviceNotConnected(device))
    }
}

impl Debug for ExecutionHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHistory")
            .field("position", &self.trace.position())
            .field("breakpoints", &self.breakpoints)
            .field("pending", &self.guard.pending_count())
            .finish()
    }
}

fn transfer_range(first: Address, words: usize) -> Result<AddressRange, Fault> {
    Ok(AddressRange::starting_at(first, words as u16)?)
}
