//! Consistency tracking for in-flight device transfers.
//!
//! Device I/O is asynchronous: an instruction starts a transfer and
//! the program runs on while the device works.  Execution itself is
//! sequential and reversible, so any access whose result would depend
//! on the relative completion order of a transfer and an instruction
//! is refused rather than resolved by guesswork; the model does not
//! define an answer, and the guard never invents one.
//!
//! Each outstanding transfer is a [`PendingOperation`]: the device,
//! the memory range it will touch, the transfer direction and the
//! logical time at which it settles.  A memory read overlapping a
//! pending device-to-memory range is an inconsistent read; a write
//! overlapping any pending range is a write conflict; a branch that
//! depends on whether a device is still busy is unpredictable
//! execution flow (the history controller raises that one, using
//! [`ConsistencyGuard::device_is_busy`]).
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use keyed_priority_queue::KeyedPriorityQueue;
use serde::Serialize;
use tracing::{event, Level};

use base::prelude::*;

use crate::fault::Fault;

/// Identifies one outstanding transfer for [`ConsistencyGuard::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PendingId(u64);

impl Display for PendingId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferDirection {
    DeviceToMemory,
    MemoryToDevice,
}

/// An issued-but-not-yet-settled device transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingOperation {
    pub device: DeviceId,
    pub range: AddressRange,
    pub direction: TransferDirection,
    /// Logical time at which the transfer settles.
    pub due: TimeUnits,
}

/// The guard's bookkeeping at one instant, as recorded in the
/// execution trace so that stepping backward restores it exactly.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct GuardSnapshot {
    pending: Vec<(PendingId, PendingOperation)>,
    next_id: u64,
}

#[derive(Debug)]
pub struct ConsistencyGuard {
    pending: BTreeMap<PendingId, PendingOperation>,
    // Earliest-due transfer first.
    due_queue: KeyedPriorityQueue<PendingId, Reverse<TimeUnits>>,
    next_id: u64,
}

impl ConsistencyGuard {
    pub fn new() -> ConsistencyGuard {
        ConsistencyGuard {
            pending: BTreeMap::new(),
            due_queue: KeyedPriorityQueue::new(),
            next_id: 0,
        }
    }

    /// Record an issued transfer; the returned id names it until it
    /// settles.
    pub fn register_pending(&mut self, operation: PendingOperation) -> PendingId {
        let id = PendingId(self.next_id);
        self.next_id += 1;
        event!(
            Level::TRACE,
            "pending {}: device {} {:?} over {} due at {}",
            id,
            operation.device,
            operation.direction,
            operation.range,
            operation.due
        );
        self.due_queue.push(id, Reverse(operation.due));
        self.pending.insert(id, operation);
        id
    }

    /// Refuse a memory read whose result depends on an in-flight
    /// device-to-memory transfer.
    pub fn check_read(&self, address: Address) -> Result<(), Fault> {
        for operation in self.pending.values() {
            if operation.direction == TransferDirection::DeviceToMemory
                && operation.range.contains(address)
            {
                return Err(Fault::InconsistentRead);
            }
        }
        Ok(())
    }

    pub fn check_read_range(&self, range: &AddressRange) -> Result<(), Fault> {
        for operation in self.pending.values() {
            if operation.direction == TransferDirection::DeviceToMemory
                && operation.range.overlaps(range)
            {
                return Err(Fault::InconsistentRead);
            }
        }
        Ok(())
    }

    /// Refuse a write that overlaps any outstanding transfer, in
    /// either direction.
    pub fn check_write(&self, address: Address) -> Result<(), Fault> {
        for operation in self.pending.values() {
            if operation.range.contains(address) {
                return Err(Fault::WriteConflict);
            }
        }
        Ok(())
    }

    pub fn check_write_range(&self, range: &AddressRange) -> Result<(), Fault> {
        for operation in self.pending.values() {
            if operation.range.overlaps(range) {
                return Err(Fault::WriteConflict);
            }
        }
        Ok(())
    }

    /// Whether the device has a transfer still in flight.  Branch
    /// instructions that test device readiness must not be allowed to
    /// observe this state; see the module documentation.
    pub fn device_is_busy(&self, device: DeviceId) -> bool {
        self.pending.values().any(|op| op.device == device)
    }

    /// Remove a settled transfer.  Its entry in the due queue is left
    /// to age out; [`ConsistencyGuard::complete_due`] skips ids that
    /// are no longer pending.
    pub fn complete(&mut self, id: PendingId) -> Option<PendingOperation> {
        let removed = self.pending.remove(&id);
        if let Some(operation) = &removed {
            event!(Level::TRACE, "pending {} settled ({})", id, operation.range);
        }
        removed
    }

    /// Remove every transfer whose due time has passed, returning
    /// them in settling order.
    pub fn complete_due(&mut self, now: TimeUnits) -> Vec<(PendingId, PendingOperation)> {
        let mut settled = Vec::new();
        while let Some((_, Reverse(due))) = self.due_queue.peek() {
            if *due > now {
                break;
            }
            match self.due_queue.pop() {
                Some((id, _)) => {
                    if let Some(operation) = self.pending.remove(&id) {
                        event!(
                            Level::TRACE,
                            "pending {} settled at {} ({})",
                            id,
                            now,
                            operation.range
                        );
                        settled.push((id, operation));
                    }
                }
                None => unreachable!(),
            }
        }
        settled
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        GuardSnapshot {
            pending: self
                .pending
                .iter()
                .map(|(id, op)| (*id, op.clone()))
                .collect(),
            next_id: self.next_id,
        }
    }

    pub fn restore(&mut self, snapshot: &GuardSnapshot) {
        self.pending.clear();
        self.due_queue = KeyedPriorityQueue::new();
        for (id, operation) in &snapshot.pending {
            self.due_queue.push(*id, Reverse(operation.due));
            self.pending.insert(*id, operation.clone());
        }
        self.next_id = snapshot.next_id;
    }
}

impl Default for ConsistencyGuard {
    fn default() -> ConsistencyGuard {
        ConsistencyGuard::new()
    }
}
