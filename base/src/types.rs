//! Addresses, device numbers and the logical time counter.
//!
//! MIX addresses memory cells 0..=3999.  The emulator makes no
//! attempt to model the two-byte packed form an address takes inside
//! an instruction word; that is the CPU emulation's business.  Here
//! an address is simply a validated cell index.
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::ops::Add;

use serde::Serialize;

/// Amount of memory available to a MIX machine, in words.
pub const MEMORY_SIZE: u16 = 4000;

/// A validated MIX memory address, 0..=3999.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Address(u16);

/// The value was not a valid memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressOutOfRange(pub i64);

impl Display for AddressOutOfRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{} is not a valid MIX memory address", self.0)
    }
}

impl Error for AddressOutOfRange {}

impl Address {
    pub const ZERO: Address = Address(0);

    /// The last addressable cell.
    pub const MAX: Address = Address(MEMORY_SIZE - 1);

    pub fn index(&self) -> usize {
        usize::from(self.0)
    }

    /// The address `count` cells further on, if it is still inside
    /// the memory.
    pub fn offset(&self, count: u16) -> Option<Address> {
        Address::try_from(u32::from(self.0) + u32::from(count)).ok()
    }
}

impl TryFrom<u32> for Address {
    type Error = AddressOutOfRange;
    fn try_from(value: u32) -> Result<Address, AddressOutOfRange> {
        if value < u32::from(MEMORY_SIZE) {
            Ok(Address(value as u16))
        } else {
            Err(AddressOutOfRange(i64::from(value)))
        }
    }
}

impl TryFrom<i64> for Address {
    type Error = AddressOutOfRange;
    fn try_from(value: i64) -> Result<Address, AddressOutOfRange> {
        match u32::try_from(value) {
            Ok(v) => Address::try_from(v),
            Err(_) => Err(AddressOutOfRange(value)),
        }
    }
}

impl From<Address> for u16 {
    fn from(addr: Address) -> u16 {
        addr.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:04}", self.0)
    }
}

/// An inclusive range of memory addresses, as touched by one device
/// transfer or one instruction operand access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AddressRange {
    pub first: Address,
    pub last: Address,
}

impl AddressRange {
    /// The range starting at `first` and covering `count` cells.
    /// Fails if the range would run off the end of the memory.
    pub fn starting_at(first: Address, count: u16) -> Result<AddressRange, AddressOutOfRange> {
        if count == 0 {
            return Ok(AddressRange { first, last: first });
        }
        match first.offset(count - 1) {
            Some(last) => Ok(AddressRange { first, last }),
            None => Err(AddressOutOfRange(
                i64::from(u16::from(first)) + i64::from(count) - 1,
            )),
        }
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.first <= addr && addr <= self.last
    }

    pub fn overlaps(&self, other: &AddressRange) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    pub fn len(&self) -> usize {
        self.last.index() - self.first.index() + 1
    }

    pub fn is_empty(&self) -> bool {
        false // an inclusive range always covers at least one cell
    }
}

impl Display for AddressRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}..={}", self.first, self.last)
    }
}

/// Identifies a peripheral device.  Which device number designates
/// which kind of device is a convention of the surrounding
/// application; the conventional MIX assignment is tape units 0-7,
/// disk units 8-15, card reader 16, card punch 17, line printer 18
/// and paper tape 20.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DeviceId(u8);

impl DeviceId {
    pub fn number(&self) -> u8 {
        self.0
    }
}

impl From<u8> for DeviceId {
    fn from(n: u8) -> DeviceId {
        DeviceId(n)
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.0)
    }
}

/// The logical time counter, in MIX time units (`u`).  The emulator
/// tracks no wall-clock time at all; device completion is scheduled
/// against this counter only.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize,
)]
pub struct TimeUnits(u64);

impl TimeUnits {
    pub const ZERO: TimeUnits = TimeUnits(0);

    pub fn new(units: u64) -> TimeUnits {
        TimeUnits(units)
    }

    pub fn units(&self) -> u64 {
        self.0
    }
}

impl Add for TimeUnits {
    type Output = TimeUnits;
    fn add(self, rhs: TimeUnits) -> TimeUnits {
        TimeUnits(self.0 + rhs.0)
    }
}

impl Display for TimeUnits {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}u", self.0)
    }
}
