//! The combined index over memory cells and source lines.
//!
//! A program listing and the memory it assembles into do not line up
//! one-to-one: a comment or pseudo-operation occupies a line but no
//! cell, and a cell filled by `ORIG` padding occupies no line.  The
//! assembler therefore produces a single ordered table in which each
//! position has an optional memory address and an optional source
//! line; breakpoints and the presentation layer's cursor both work in
//! these positions.  The table is immutable for the life of a machine
//! instance.
use base::prelude::*;

/// One position in the combined index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexRow {
    pub address: Option<Address>,
    pub line_number: Option<usize>,
    /// The source line text, for rows that came from the listing.
    pub line: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AddressIndex {
    rows: Vec<IndexRow>,
}

impl AddressIndex {
    pub fn new(rows: Vec<IndexRow>) -> AddressIndex {
        AddressIndex { rows }
    }

    /// An index for a machine loaded from cards rather than from a
    /// listing: one row per memory cell, no source lines.
    pub fn memory_only() -> AddressIndex {
        AddressIndex {
            rows: (0..u32::from(MEMORY_SIZE))
                .map(|cell| IndexRow {
                    address: Address::try_from(cell).ok(),
                    line_number: None,
                    line: None,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&IndexRow> {
        self.rows.get(index)
    }

    pub fn address_at(&self, index: usize) -> Option<Address> {
        self.rows.get(index).and_then(|row| row.address)
    }

    pub fn line_number_at(&self, index: usize) -> Option<usize> {
        self.rows.get(index).and_then(|row| row.line_number)
    }

    pub fn line_at(&self, index: usize) -> Option<&str> {
        self.rows.get(index).and_then(|row| row.line.as_deref())
    }

    /// Positions that occupy no memory cell.
    pub fn symbol_indices(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.address.is_none())
            .map(|(index, _)| index)
            .collect()
    }

    /// The position of the row holding the given memory address.
    pub fn index_of_address(&self, address: Address) -> Option<usize> {
        self.rows.iter().position(|row| row.address == Some(address))
    }
}
