//! Emulator core for the MIX machine: versioned device storage and a
//! reversible execution history.
//!
//! The two halves of this crate have to stay mutually consistent
//! under quite different rules.  Device I/O is asynchronous: an
//! instruction starts a transfer and the program runs on while the
//! device works.  Execution history is deterministic and reversible:
//! the user may step the program backward and forward at will and
//! must always see exactly the state that existed at that point.
//!
//! The contract that reconciles the two:
//!
//! - every device write produces a new immutable version of that
//!   device's contents, and every machine state records which version
//!   of each device was current, so that rewinding restores the
//!   device view along with the registers;
//! - every in-flight transfer is tracked against the memory it will
//!   touch (the [`ConsistencyGuard`]), and any access whose result
//!   would depend on transfer completion timing is refused rather
//!   than guessed at.
//!
//! Instruction decoding and arithmetic are not implemented here; the
//! history controller drives an external [`CpuCore`] and routes the
//! device effects it reports.  Likewise the MIXAL assembler is a
//! collaborator: this crate consumes the memory image and
//! [`AddressIndex`] it produces.

mod devices;
mod exec;
mod fault;
mod guard;
mod history;
mod state;
mod storage;
mod symbols;

pub use devices::{
    DeviceConfig, DeviceDirection, DeviceKind, DeviceRegistry, DeviceSnapshot,
};
pub use exec::{CpuCore, DeviceEvent, StepOutcome};
pub use fault::{Fault, FaultKind};
pub use guard::{ConsistencyGuard, GuardSnapshot, PendingId, PendingOperation, TransferDirection};
pub use history::{ExecutionHistory, HistoryMode};
pub use state::{DeviceCursor, MachineState, Registers};
pub use storage::kv::{KeyValueStore, MemoryStore};
pub use storage::{BlockStore, LineInputStore, LineOutputStore, VersionId, PAGE_BREAK};
pub use symbols::{AddressIndex, IndexRow};
