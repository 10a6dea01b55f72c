//! Template geometry
//!
//! Every address the projector writes is computed here from a
//! `(block, slot, day)` triple and only turned into A1 text at the workbook
//! boundary. The layout is fixed by the timecard template:
//!
//! ```text
//!        A  B       C     D      E     F     ...  AG     AH     ...  AJ
//!   2                     M2: employee name                        pay period
//!   3                                                              year
//!   4       start   label job#   label job#  ...  label  job#      week label
//!   5-11    date    hrs          hrs         ...  hrs                (regular)
//!  15               label job#   label job#  ...  label  job#
//!  16-22    date    hrs          hrs         ...  hrs                (overtime)
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of label/job-number column pairs per block
pub const SLOT_COUNT: usize = 16;

/// Data rows per block, one per day starting at the week start
pub const DAYS_PER_WEEK: u32 = 7;

// ============================================================================
// Cell addressing
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid cell reference: {0:?}")]
pub struct InvalidCellRef(pub String);

/// Zero-based cell coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Column letters for a zero-based column index (0 → "A", 26 → "AA")
    pub fn column_name(col: u32) -> String {
        let mut n = col + 1;
        let mut letters = Vec::new();
        while n > 0 {
            let rem = ((n - 1) % 26) as u8;
            letters.push(b'A' + rem);
            n = (n - 1) / 26;
        }
        letters.reverse();
        String::from_utf8(letters).unwrap_or_default()
    }

    /// Parse column letters back to a zero-based index
    pub fn column_index(letters: &str) -> Option<u32> {
        if letters.is_empty() || letters.len() > 3 {
            return None;
        }
        let mut col: u32 = 0;
        for b in letters.bytes() {
            if !b.is_ascii_alphabetic() {
                return None;
            }
            col = col * 26 + u32::from(b.to_ascii_uppercase() - b'A' + 1);
        }
        Some(col - 1)
    }

    pub fn to_a1(&self) -> String {
        format!("{}{}", Self::column_name(self.col), self.row + 1)
    }

    pub fn from_a1(s: &str) -> Result<Self, InvalidCellRef> {
        let invalid = || InvalidCellRef(s.to_string());
        let s = s.trim().trim_start_matches('$');
        let split = s.find(|c: char| c.is_ascii_digit() || c == '$').ok_or_else(invalid)?;
        let (letters, digits) = s.split_at(split);
        let col = Self::column_index(letters).ok_or_else(invalid)?;
        let row: u32 = digits
            .trim_start_matches('$')
            .parse()
            .map_err(|_| invalid())?;
        if row == 0 {
            return Err(invalid());
        }
        Ok(Self::new(row - 1, col))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

impl FromStr for CellRef {
    type Err = InvalidCellRef;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_a1(s)
    }
}

/// Inclusive rectangle of cells
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl CellRange {
    /// Build a range from any two corners
    pub fn new(a: CellRef, b: CellRef) -> Self {
        Self {
            start: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        (self.start.row..=self.end.row).contains(&cell.row)
            && (self.start.col..=self.end.col).contains(&cell.col)
    }

    /// Cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        (self.start.row..=self.end.row)
            .flat_map(move |row| (self.start.col..=self.end.col).map(move |col| CellRef::new(row, col)))
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for CellRange {
    type Err = InvalidCellRef;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((a, b)) => Ok(Self::new(a.parse()?, b.parse()?)),
            None => {
                let cell = s.parse()?;
                Ok(Self::new(cell, cell))
            }
        }
    }
}

// ============================================================================
// Blocks and slots
// ============================================================================

/// Regular or overtime half of a week sheet
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Block {
    Regular,
    Overtime,
}

impl Block {
    pub const ALL: [Block; 2] = [Block::Regular, Block::Overtime];

    pub fn from_overtime(overtime: bool) -> Self {
        if overtime {
            Block::Overtime
        } else {
            Block::Regular
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Block::Regular => "regular",
            Block::Overtime => "overtime",
        }
    }

    /// Row holding job labels and job numbers (sheet rows 4 / 15)
    pub fn header_row(self) -> u32 {
        match self {
            Block::Regular => 3,
            Block::Overtime => 14,
        }
    }

    /// Row for day `day` (0..7) of the week (sheet rows 5-11 / 16-22)
    pub fn data_row(self, day: u32) -> u32 {
        self.header_row() + 1 + day
    }

    /// Area that receives the bordered-table style (A4:AJ12 / A15:AJ24)
    pub fn border_range(self) -> CellRange {
        let (first, last) = match self {
            Block::Regular => (3, 11),
            Block::Overtime => (14, 23),
        };
        CellRange::new(
            CellRef::new(first, 0),
            CellRef::new(last, TemplateLayout::LAST_COL),
        )
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One of the sixteen label/job-number column pairs in a block
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(u8);

impl Slot {
    pub fn new(index: usize) -> Option<Self> {
        (index < SLOT_COUNT).then(|| Slot(index as u8))
    }

    pub fn all() -> impl Iterator<Item = Slot> {
        (0..SLOT_COUNT as u8).map(Slot)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Label column: C, E, G, ... AG
    pub fn label_col(self) -> u32 {
        2 + 2 * u32::from(self.0)
    }

    /// Job-number column: D, F, H, ... AH
    pub fn job_col(self) -> u32 {
        self.label_col() + 1
    }
}

// ============================================================================
// Fixed template cells
// ============================================================================

/// Fixed addresses of the timecard template
pub struct TemplateLayout;

impl TemplateLayout {
    /// Column AJ, the right edge of both tables
    pub const LAST_COL: u32 = 35;
    /// Column B, which holds the date of every data row
    pub const DATE_COL: u32 = 1;

    pub const EMPLOYEE_NAME: CellRef = CellRef::new(1, 12);
    pub const PAY_PERIOD: CellRef = CellRef::new(1, Self::LAST_COL);
    pub const YEAR: CellRef = CellRef::new(2, Self::LAST_COL);
    pub const WEEK_START: CellRef = CellRef::new(3, Self::DATE_COL);
    pub const WEEK_LABEL: CellRef = CellRef::new(3, Self::LAST_COL);

    /// Fallback workbook: "Employee:" caption and name
    pub const FALLBACK_CAPTION: CellRef = CellRef::new(0, 0);
    pub const FALLBACK_NAME: CellRef = CellRef::new(0, 1);

    pub fn label_cell(block: Block, slot: Slot) -> CellRef {
        CellRef::new(block.header_row(), slot.label_col())
    }

    pub fn job_cell(block: Block, slot: Slot) -> CellRef {
        CellRef::new(block.header_row(), slot.job_col())
    }

    pub fn date_cell(block: Block, day: u32) -> CellRef {
        CellRef::new(block.data_row(day), Self::DATE_COL)
    }

    pub fn hours_cell(block: Block, slot: Slot, day: u32) -> CellRef {
        CellRef::new(block.data_row(day), slot.label_col())
    }
}
