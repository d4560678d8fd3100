//! MIX emulator faults.
//!
//! One closed type covers everything that can stop the emulator:
//! history-navigation misuse, device trouble, the consistency rules
//! for unsynchronised I/O, and the faults that originate in the
//! external CPU and assembler collaborators, which this core
//! propagates without reinterpretation.  Callers match on the
//! variant; [`Fault::kind`] gives the payload-free discriminant for
//! reporting.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use base::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// An attempt to go back from the initial state of the machine.
    BackFromInitialState,

    /// An attempt to go forward after the machine has halted.
    ForwardFromTerminal,

    /// Operation against a device number with no attached device.
    DeviceNotConnected(DeviceId),

    /// The device exists but does not support the requested
    /// operation (for example writing to a pure input device).
    UnsupportedIoOperation {
        device: DeviceId,
        operation: &'static str,
    },

    /// A memory read overlaps a device transfer that is still in
    /// flight, so its result would depend on transfer timing.
    InconsistentRead,

    /// A write overlaps another outstanding operation on the same
    /// range, or a device version chain was advanced from a stale
    /// version.
    WriteConflict,

    /// A line read past the end of an input device's data.
    EndOfFile,

    /// A branch decision depends on whether a device transfer has
    /// completed, which the model leaves undefined.
    UnpredictableExecutionFlow,

    // Faults below originate in the CPU or assembler collaborators
    // and pass through this core unchanged.
    DivisionByZero,
    Overflow,
    UndefinedSymbol(String),
    DuplicateSymbol(String),
    WrongLine(usize),
    WrongOperator {
        operator: String,
        line: usize,
    },
    WrongAddressPart {
        text: String,
        line: usize,
    },
    WrongLabel(String),
    WrongFieldSpec(u8),
    FixedFieldSpec {
        operator: String,
        line: usize,
    },
    WrongIndexSpec(u8),
    WrongMemoryAddress(i64),
    InvalidExpression(String),
    UnsupportedCharacter(char),
    WrongCharacterCode(u8),
    UnsupportedPunchedCardCharacter(char),
}

/// The payload-free discriminant of a [`Fault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FaultKind {
    BackFromInitialState,
    ForwardFromTerminal,
    DeviceNotConnected,
    UnsupportedIoOperation,
    InconsistentRead,
    WriteConflict,
    EndOfFile,
    UnpredictableExecutionFlow,
    DivisionByZero,
    Overflow,
    UndefinedSymbol,
    DuplicateSymbol,
    WrongLine,
    WrongOperator,
    WrongAddressPart,
    WrongLabel,
    WrongFieldSpec,
    FixedFieldSpec,
    WrongIndexSpec,
    WrongMemoryAddress,
    InvalidExpression,
    UnsupportedCharacter,
    WrongCharacterCode,
    UnsupportedPunchedCardCharacter,
}

impl Fault {
    pub fn kind(&self) -> FaultKind {
        match self {
            Fault::BackFromInitialState => FaultKind::BackFromInitialState,
            Fault::ForwardFromTerminal => FaultKind::ForwardFromTerminal,
            Fault::DeviceNotConnected(_) => FaultKind::DeviceNotConnected,
            Fault::UnsupportedIoOperation { .. } => FaultKind::UnsupportedIoOperation,
            Fault::InconsistentRead => FaultKind::InconsistentRead,
            Fault::WriteConflict => FaultKind::WriteConflict,
            Fault::EndOfFile => FaultKind::EndOfFile,
            Fault::UnpredictableExecutionFlow => FaultKind::UnpredictableExecutionFlow,
            Fault::DivisionByZero => FaultKind::DivisionByZero,
            Fault::Overflow => FaultKind::Overflow,
            Fault::UndefinedSymbol(_) => FaultKind::UndefinedSymbol,
            Fault::DuplicateSymbol(_) => FaultKind::DuplicateSymbol,
            Fault::WrongLine(_) => FaultKind::WrongLine,
            Fault::WrongOperator { .. } => FaultKind::WrongOperator,
            Fault::WrongAddressPart { .. } => FaultKind::WrongAddressPart,
            Fault::WrongLabel(_) => FaultKind::WrongLabel,
            Fault::WrongFieldSpec(_) => FaultKind::WrongFieldSpec,
            Fault::FixedFieldSpec { .. } => FaultKind::FixedFieldSpec,
            Fault::WrongIndexSpec(_) => FaultKind::WrongIndexSpec,
            Fault::WrongMemoryAddress(_) => FaultKind::WrongMemoryAddress,
            Fault::InvalidExpression(_) => FaultKind::InvalidExpression,
            Fault::UnsupportedCharacter(_) => FaultKind::UnsupportedCharacter,
            Fault::WrongCharacterCode(_) => FaultKind::WrongCharacterCode,
            Fault::UnsupportedPunchedCardCharacter(_) => {
                FaultKind::UnsupportedPunchedCardCharacter
            }
        }
    }
}

impl From<AddressOutOfRange> for Fault {
    fn from(e: AddressOutOfRange) -> Fault {
        Fault::WrongMemoryAddress(e.0)
    }
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Fault::BackFromInitialState => {
                f.write_str("cannot step back from the initial state")
            }
            Fault::ForwardFromTerminal => {
                f.write_str("cannot step forward, the machine has halted")
            }
            Fault::DeviceNotConnected(device) => {
                write!(f, "device {device} is not connected")
            }
            Fault::UnsupportedIoOperation { device, operation } => {
                write!(f, "device {device} does not support {operation}")
            }
            Fault::InconsistentRead => f.write_str(
                "memory read overlaps an in-flight device transfer; its result is unpredictable",
            ),
            Fault::WriteConflict => {
                f.write_str("write overlaps another outstanding operation on the same range")
            }
            Fault::EndOfFile => f.write_str("read past the end of the device data"),
            Fault::UnpredictableExecutionFlow => f.write_str(
                "branch condition depends on the completion of an in-flight device transfer",
            ),
            Fault::DivisionByZero => f.write_str("division by zero"),
            Fault::Overflow => f.write_str("value too big for a register"),
            Fault::UndefinedSymbol(symbol) => {
                write!(f, "symbol {symbol} is not defined in the program")
            }
            Fault::DuplicateSymbol(symbol) => {
                write!(f, "symbol {symbol} is defined more than once")
            }
            Fault::WrongLine(line) => write!(f, "line {line} is not a valid MIXAL line"),
            Fault::WrongOperator { operator, line } => {
                write!(f, "'{operator}' on line {line} is not a valid MIXAL operator")
            }
            Fault::WrongAddressPart { text, line } => {
                write!(f, "'{text}' on line {line} is not a valid address part")
            }
            Fault::WrongLabel(label) => write!(f, "'{label}' is not a valid label"),
            Fault::WrongFieldSpec(spec) => {
                write!(f, "{spec} is not a valid field specification")
            }
            Fault::FixedFieldSpec { operator, line } => write!(
                f,
                "'{operator}' on line {line} does not accept a field specification"
            ),
            Fault::WrongIndexSpec(index) => {
                write!(f, "there is no index register {index}")
            }
            Fault::WrongMemoryAddress(address) => {
                write!(f, "{address} is not a valid memory address")
            }
            Fault::InvalidExpression(text) => {
                write!(f, "'{text}' is not a valid MIXAL expression")
            }
            Fault::UnsupportedCharacter(ch) => {
                write!(f, "character '{ch}' is absent from the MIX alphabet")
            }
            Fault::WrongCharacterCode(code) => {
                write!(f, "no character corresponds to code {code}")
            }
            Fault::UnsupportedPunchedCardCharacter(ch) => {
                write!(f, "character '{ch}' cannot be printed on punched cards")
            }
        }
    }
}

impl Error for Fault {}
