//! End-to-end exercises of the contract between the execution
//! history and the versioned device storage: stepping backward must
//! restore the device view, and unsynchronised access to in-flight
//! transfers must be refused.
use base::charset;
use base::prelude::*;
use vm::{
    AddressIndex, CpuCore, DeviceConfig, DeviceEvent, DeviceRegistry, ExecutionHistory, Fault,
    HistoryMode, MachineState, StepOutcome, VersionId,
};

const CARD_READER: u8 = 16;
const PRINTER: u8 = 18;
const TAPE: u8 = 0;

/// A stand-in for the external CPU emulation: one scripted operation
/// per program-counter position, each costing one time unit unless
/// the script says otherwise.
#[derive(Debug, Clone)]
enum Op {
    /// Load the cell at the address into register A.
    Load(u32),
    /// Store register A into the cell at the address.
    Store(u32),
    /// Spin doing nothing for the given number of time units.
    Wait(u64),
    /// MIX `IN`: one tape block into memory.
    TapeIn { block: usize, into: u32 },
    /// MIX `OUT`: one tape block from memory.
    TapeOut { block: usize, from: u32 },
    /// Read the next card into memory.
    ReadCard { into: u32 },
    /// Print one line from memory.
    Print { from: u32 },
    Halt,
}

#[derive(Debug)]
struct ScriptedCpu {
    ops: Vec<Op>,
}

impl ScriptedCpu {
    fn new(ops: Vec<Op>) -> Box<ScriptedCpu> {
        Box::new(ScriptedCpu { ops })
    }
}

fn range(first: u32, count: u16) -> AddressRange {
    AddressRange::starting_at(Address::try_from(first).expect("test address"), count)
        .expect("test range")
}

impl CpuCore for ScriptedCpu {
    fn execute_next_instruction(&mut self, state: &MachineState) -> Result<StepOutcome, Fault> {
        let pc = state.program_counter.index();
        let op = self
            .ops
            .get(pc)
            .cloned()
            .ok_or(Fault::WrongMemoryAddress(pc as i64))?;
        let mut next = state.clone();
        next.time = next.time + TimeUnits::new(1);
        let mut outcome = StepOutcome {
            state: next,
            memory_reads: Vec::new(),
            memory_writes: Vec::new(),
            events: Vec::new(),
        };
        match op {
            Op::Load(address) => {
                let address = Address::try_from(address)?;
                outcome.memory_reads.push(range(u16::from(address).into(), 1));
                outcome.state.registers.a = state.get(address);
            }
            Op::Store(address) => {
                let address = Address::try_from(address)?;
                outcome.memory_writes.push(range(u16::from(address).into(), 1));
                outcome.state.set(address, state.registers.a);
            }
            Op::Wait(units) => {
                outcome.state.time = state.time + TimeUnits::new(units);
            }
            Op::TapeIn { block, into } => {
                outcome.events.push(DeviceEvent::BlockRead {
                    device: DeviceId::from(TAPE),
                    block,
                    into: Address::try_from(into)?,
                });
            }
            Op::TapeOut { block, from } => {
                outcome.events.push(DeviceEvent::BlockWrite {
                    device: DeviceId::from(TAPE),
                    block,
                    from: Address::try_from(from)?,
                });
            }
            Op::ReadCard { into } => {
                outcome.events.push(DeviceEvent::LineRead {
                    device: DeviceId::from(CARD_READER),
                    into: Address::try_from(into)?,
                });
            }
            Op::Print { from } => {
                outcome.events.push(DeviceEvent::LineWrite {
                    device: DeviceId::from(PRINTER),
                    from: Address::try_from(from)?,
                });
            }
            Op::Halt => {
                outcome.state.halted = true;
            }
        }
        if !outcome.state.halted {
            outcome.state.program_counter = Address::try_from(pc as u32 + 1)?;
        }
        Ok(outcome)
    }
}

fn machine_with(ops: Vec<Op>, registry: DeviceRegistry) -> ExecutionHistory {
    ExecutionHistory::new(
        ScriptedCpu::new(ops),
        registry,
        AddressIndex::memory_only(),
        MachineState::initial(memory_with_text(), Address::ZERO),
        HistoryMode::Tracking,
    )
    .expect("machine construction")
}

/// A memory image whose first cells spell "HELLO, WORLD" in MIX
/// character codes, for the print scripts.
fn memory_with_text() -> Vec<Word> {
    let codes = charset::codes_of_line("HELLO, WORLD   ").expect("text is in the alphabet");
    codes
        .chunks(BYTES_PER_WORD)
        .map(|chunk| {
            let mut bytes = [0_u8; BYTES_PER_WORD];
            bytes.copy_from_slice(chunk);
            Word::new(false, bytes)
        })
        .collect()
}

#[test]
fn stepping_back_restores_the_device_view() {
    let printer = DeviceId::from(PRINTER);
    let mut m = machine_with(
        vec![Op::Print { from: 0 }, Op::Print { from: 0 }, Op::Halt],
        DeviceRegistry::in_memory(DeviceConfig::mix_standard()),
    );

    assert_eq!(m.line_device_data(printer).unwrap(), Vec::<String>::new());
    m.step_forward().unwrap();
    assert_eq!(
        m.line_device_data(printer).unwrap(),
        vec!["HELLO, WORLD".to_string()]
    );
    m.step_forward().unwrap();
    assert_eq!(
        m.line_device_data(printer).unwrap(),
        vec!["HELLO, WORLD".to_string(), "HELLO, WORLD".to_string()]
    );

    // Going back shows the log as it was, though the store retains
    // every version.
    m.step_back().unwrap();
    assert_eq!(
        m.line_device_data(printer).unwrap(),
        vec!["HELLO, WORLD".to_string()]
    );
    m.step_back().unwrap();
    assert_eq!(m.line_device_data(printer).unwrap(), Vec::<String>::new());
    assert_eq!(
        m.registry().list_versions(printer).unwrap(),
        (0..=2).map(VersionId::new).collect::<Vec<_>>()
    );

    // Forward again replays; no new versions appear.
    m.step_forward().unwrap();
    m.step_forward().unwrap();
    assert_eq!(
        m.registry().list_versions(printer).unwrap(),
        (0..=2).map(VersionId::new).collect::<Vec<_>>()
    );
}

#[test]
fn alternating_back_and_forward_is_bit_identical() {
    let mut registry = DeviceRegistry::in_memory(DeviceConfig::mix_standard());
    registry
        .save_line_device(DeviceId::from(CARD_READER), "HELLO CARD")
        .unwrap();
    let mut m = machine_with(
        vec![
            Op::ReadCard { into: 100 },
            Op::Wait(5000),
            Op::Load(100),
            Op::TapeOut { block: 0, from: 100 },
            Op::Wait(5000),
            Op::Halt,
        ],
        registry,
    );

    let mut visited = vec![m.current_state().clone()];
    while m.can_move_forward() {
        m.step_forward().unwrap();
        visited.push(m.current_state().clone());
    }
    for expected in visited.iter().rev().skip(1) {
        m.step_back().unwrap();
        assert_eq!(m.current_state(), expected);
    }
    for expected in visited.iter().skip(1) {
        m.step_forward().unwrap();
        assert_eq!(m.current_state(), expected);
    }
    assert_eq!(m.current_state(), visited.last().unwrap());
}

#[test]
fn unsynchronised_read_of_incoming_data_is_refused() {
    let mut registry = DeviceRegistry::in_memory(DeviceConfig::mix_standard());
    registry
        .save_block_device(DeviceId::from(TAPE), &vec![Word::new(false, [9; 5]); 100])
        .unwrap();
    let mut m = machine_with(
        vec![
            Op::TapeIn { block: 0, into: 2000 },
            Op::Load(2050),
            Op::Halt,
        ],
        registry,
    );

    m.step_forward().unwrap();
    // The tape needs 100u; one 1u step has passed.
    assert_eq!(m.step_forward(), Err(Fault::InconsistentRead));
    // The failed step left the cursor alone.
    assert_eq!(m.position(), 1);
}

#[test]
fn read_succeeds_once_the_transfer_has_settled() {
    let mut registry = DeviceRegistry::in_memory(DeviceConfig::mix_standard());
    registry
        .save_block_device(DeviceId::from(TAPE), &vec![Word::new(false, [9; 5]); 100])
        .unwrap();
    let mut m = machine_with(
        vec![
            Op::TapeIn { block: 0, into: 2000 },
            Op::Wait(500),
            Op::Load(2050),
            Op::Halt,
        ],
        registry,
    );

    m.run_forward().unwrap();
    assert!(m.current_state().halted);
    assert_eq!(m.current_state().registers.a, Word::new(false, [9; 5]));
}

#[test]
fn write_under_an_outgoing_transfer_is_a_conflict() {
    let mut m = machine_with(
        vec![
            Op::Load(0),
            Op::TapeOut { block: 0, from: 100 },
            Op::Store(150),
            Op::Halt,
        ],
        DeviceRegistry::in_memory(DeviceConfig::mix_standard()),
    );

    m.step_forward().unwrap();
    m.step_forward().unwrap();
    assert_eq!(m.step_forward(), Err(Fault::WriteConflict));
    // The refused store left the cursor where it was.
    assert_eq!(m.position(), 2);
}

#[test]
fn card_reader_runs_out_of_cards() {
    let mut registry = DeviceRegistry::in_memory(DeviceConfig::mix_standard());
    registry
        .save_line_device(DeviceId::from(CARD_READER), "ONE\nTWO")
        .unwrap();
    let mut m = machine_with(
        vec![
            Op::ReadCard { into: 100 },
            Op::Wait(2000),
            Op::ReadCard { into: 200 },
            Op::Wait(2000),
            Op::ReadCard { into: 300 },
            Op::Halt,
        ],
        registry,
    );

    for _ in 0..4 {
        m.step_forward().unwrap();
    }
    assert_eq!(m.step_forward(), Err(Fault::EndOfFile));
    // Stepping back re-reads nothing: the earlier reads replay from
    // the trace.
    m.step_back().unwrap();
    m.step_forward().unwrap();
    assert_eq!(m.step_forward(), Err(Fault::EndOfFile));
}

#[test]
fn tape_round_trip_through_memory() {
    let tape = DeviceId::from(TAPE);
    let mut registry = DeviceRegistry::in_memory(DeviceConfig::mix_standard());
    let saved: Vec<Word> = (0..100)
        .map(|i| Word::new(i % 3 == 0, [i as u8, 0, 0, 0, 1]))
        .collect();
    registry.save_block_device(tape, &saved).unwrap();
    let mut m = machine_with(
        vec![
            Op::TapeIn { block: 0, into: 1000 },
            Op::Wait(500),
            Op::TapeOut { block: 1, from: 1000 },
            Op::Wait(500),
            Op::Halt,
        ],
        registry,
    );

    m.run_forward().unwrap();
    let data = m.block_device_data(tape).unwrap();
    assert_eq!(&data[..100], saved.as_slice());
    assert_eq!(&data[100..200], saved.as_slice());
    // Version 0 still holds only the original block.
    assert_eq!(
        m.registry().list_versions(tape).unwrap(),
        vec![VersionId::new(0), VersionId::new(1)]
    );
}

#[test]
fn accepting_devices_is_refused_while_a_transfer_is_in_flight() {
    let tape = DeviceId::from(TAPE);
    let mut m = machine_with(
        vec![
            Op::TapeOut { block: 0, from: 0 },
            Op::Wait(500),
            Op::Halt,
        ],
        DeviceRegistry::in_memory(DeviceConfig::mix_standard()),
    );

    m.step_forward().unwrap();
    assert_eq!(m.accept_devices(), Err(Fault::WriteConflict));
    // Once the transfer settles the collapse goes through and the
    // written contents become version 0.
    m.step_forward().unwrap();
    m.accept_devices().unwrap();
    assert_eq!(m.registry().list_versions(tape).unwrap(), vec![VersionId::ZERO]);
}

#[test]
fn device_snapshots_track_the_cursor_not_the_store() {
    // Two tape writes, then rewind one step: the snapshot must be
    // the version the *current state* names, not the store's head.
    let tape = DeviceId::from(TAPE);
    let mut m = machine_with(
        vec![
            Op::Load(0),
            Op::TapeOut { block: 0, from: 0 },
            Op::Wait(500),
            Op::TapeOut { block: 0, from: 5 },
            Op::Wait(500),
            Op::Halt,
        ],
        DeviceRegistry::in_memory(DeviceConfig::mix_standard()),
    );
    m.run_forward().unwrap();
    let final_view = m.block_device_data(tape).unwrap();
    // Three steps back lands between the two writes.
    m.step_back().unwrap();
    m.step_back().unwrap();
    m.step_back().unwrap();
    let earlier_view = m.block_device_data(tape).unwrap();
    assert_ne!(final_view, earlier_view);
    assert_eq!(final_view.len(), 100);
    // The earlier view is the first write's contents.
    assert_eq!(earlier_view[0], m.current_state().get(Address::ZERO));
}
