//! Workbook capability
//!
//! The projector only needs to address cells, decorate ranges, list sheets
//! and serialize. [`Workbook`] captures exactly that, so the projection logic
//! can run against the xlsx template patcher or an in-memory recorder.

use std::fmt;

use thiserror::Error;
use timecard_core::{CellRange, CellRef};

// ============================================================================
// Values and styles
// ============================================================================

/// A value written into a cell
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BorderStyle {
    Thin,
    Medium,
    Thick,
}

impl BorderStyle {
    /// SpreadsheetML `style` attribute value
    pub fn as_str(self) -> &'static str {
        match self {
            BorderStyle::Thin => "thin",
            BorderStyle::Medium => "medium",
            BorderStyle::Thick => "thick",
        }
    }
}

/// The same line on all four edges of a cell
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Border {
    pub style: BorderStyle,
    /// 0xRRGGBB
    pub color: u32,
}

impl Border {
    /// Thin black line
    pub const fn thin() -> Self {
        Self {
            style: BorderStyle::Thin,
            color: 0x000000,
        }
    }

    /// ARGB hex as used by SpreadsheetML colour elements
    pub fn argb(&self) -> String {
        format!("FF{:06X}", self.color & 0xFF_FFFF)
    }
}

/// Decoration applied to a range of cells
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CellStyle {
    pub border: Option<Border>,
}

impl CellStyle {
    pub const fn bordered(border: Border) -> Self {
        Self {
            border: Some(border),
        }
    }
}

// ============================================================================
// Capability traits
// ============================================================================

/// Workbook error
#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("xlsx writer error: {0}")]
    Writer(#[from] rust_xlsxwriter::XlsxError),

    #[error("package part not found: {0}")]
    MissingPart(String),

    #[error("sheet not found: {0}")]
    UnknownSheet(String),

    #[error("invalid workbook: {0}")]
    Invalid(String),
}

/// Cell-level access to an open workbook
pub trait Workbook {
    /// Sheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    fn set_cell_value(&mut self, sheet: &str, cell: CellRef, value: CellValue) -> Result<(), WorkbookError>;

    /// Apply `style` to every cell of `range`, creating empty cells as needed
    fn set_cell_style(&mut self, sheet: &str, range: CellRange, style: &CellStyle) -> Result<(), WorkbookError>;

    /// Encode the workbook with every edit applied
    fn serialize(&mut self) -> Result<Vec<u8>, WorkbookError>;
}

/// Something a fresh workbook can be opened from, once per request
pub trait TemplateSource {
    type Workbook: Workbook;

    fn open(&self) -> Result<Self::Workbook, WorkbookError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_argb() {
        assert_eq!(Border::thin().argb(), "FF000000");
        let red = Border {
            style: BorderStyle::Medium,
            color: 0xFF0000,
        };
        assert_eq!(red.argb(), "FFFF0000");
    }

    #[test]
    fn cell_value_conversions() {
        assert_eq!(CellValue::from("x"), CellValue::Text("x".into()));
        assert_eq!(CellValue::from(7_i64), CellValue::Number(7.0));
        assert_eq!(CellValue::from(7.5).to_string(), "7.5");
    }
}
