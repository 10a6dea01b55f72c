//! Template-backed workbook
//!
//! The template is opened as an OOXML package and every edit is recorded as a
//! pending cell patch. Nothing is rewritten until [`Workbook::serialize`], which
//! streams each touched worksheet once and leaves all other parts byte-identical.

mod openxml;
mod package;
mod recalc;
mod sheet;
mod styles;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use timecard_core::{CellRange, CellRef};

use crate::workbook::{CellStyle, CellValue, TemplateSource, Workbook, WorkbookError};
use openxml::SheetEntry;
use package::XlsxPackage;
use sheet::{patch_worksheet, scan_cell_styles, SheetPatches};
use styles::StyleSheet;

// ============================================================================
// Template source
// ============================================================================

#[derive(Clone, Debug)]
enum TemplateData {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

/// An xlsx template that every request opens afresh
#[derive(Clone, Debug)]
pub struct XlsxTemplate {
    data: TemplateData,
}

impl XlsxTemplate {
    /// Template read from disk on every [`TemplateSource::open`]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            data: TemplateData::Path(path.into()),
        }
    }

    /// Template held in memory
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: TemplateData::Bytes(bytes.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.data {
            TemplateData::Path(path) => Some(path),
            TemplateData::Bytes(_) => None,
        }
    }
}

impl TemplateSource for XlsxTemplate {
    type Workbook = XlsxWorkbook;

    fn open(&self) -> Result<XlsxWorkbook, WorkbookError> {
        match &self.data {
            TemplateData::Path(path) => XlsxWorkbook::open(path),
            TemplateData::Bytes(bytes) => XlsxWorkbook::from_bytes(bytes),
        }
    }
}

// ============================================================================
// Workbook
// ============================================================================

/// An opened xlsx package with pending cell edits
#[derive(Debug)]
pub struct XlsxWorkbook {
    package: XlsxPackage,
    sheets: Vec<SheetEntry>,
    styles_part: Option<String>,
    styles: Option<StyleSheet>,
    /// Pending edits by worksheet part name
    patches: HashMap<String, SheetPatches>,
}

impl XlsxWorkbook {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WorkbookError> {
        let package = XlsxPackage::from_bytes(bytes)?;
        let sheets = openxml::workbook_sheets(&package)?;
        let styles_part = openxml::styles_part(&package)?;
        tracing::debug!(sheets = sheets.len(), styles = ?styles_part, "opened xlsx package");

        Ok(Self {
            package,
            sheets,
            styles_part,
            styles: None,
            patches: HashMap::new(),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, WorkbookError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    fn sheet_part(&self, sheet: &str) -> Result<&str, WorkbookError> {
        self.sheets
            .iter()
            .find(|entry| entry.name == sheet)
            .map(|entry| entry.part.as_str())
            .ok_or_else(|| WorkbookError::UnknownSheet(sheet.to_string()))
    }
}

/// Parse the styles part on first use
fn load_styles<'a>(
    styles: &'a mut Option<StyleSheet>,
    part: Option<&str>,
    package: &XlsxPackage,
) -> Result<&'a mut StyleSheet, WorkbookError> {
    if styles.is_none() {
        let part = part.ok_or_else(|| WorkbookError::MissingPart("xl/styles.xml".to_string()))?;
        *styles = Some(StyleSheet::parse(package.require_part(part)?)?);
    }
    styles
        .as_mut()
        .ok_or_else(|| WorkbookError::Invalid("styles not loaded".to_string()))
}

impl Workbook for XlsxWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|entry| entry.name.clone()).collect()
    }

    fn set_cell_value(&mut self, sheet: &str, cell: CellRef, value: CellValue) -> Result<(), WorkbookError> {
        let part = self.sheet_part(sheet)?.to_string();
        self.patches
            .entry(part)
            .or_default()
            .entry(cell)
            .or_default()
            .value = Some(value);
        Ok(())
    }

    fn set_cell_style(&mut self, sheet: &str, range: CellRange, style: &CellStyle) -> Result<(), WorkbookError> {
        let Some(border) = style.border else {
            return Ok(());
        };
        let part = self.sheet_part(sheet)?.to_string();
        let Self {
            package,
            styles_part,
            styles,
            patches,
            ..
        } = self;

        let current = scan_cell_styles(package.require_part(&part)?, range)?;
        let styles = load_styles(styles, styles_part.as_deref(), package)?;
        let sheet_patches = patches.entry(part).or_default();
        for cell in range.cells() {
            let patch = sheet_patches.entry(cell).or_default();
            let base = patch
                .xf
                .or_else(|| current.get(&cell).copied())
                .unwrap_or(0);
            patch.xf = Some(styles.xf_with_border(base, &border)?);
        }
        Ok(())
    }

    fn serialize(&mut self) -> Result<Vec<u8>, WorkbookError> {
        let mut package = self.package.clone();

        for (part, patches) in &self.patches {
            if patches.is_empty() {
                continue;
            }
            let updated = patch_worksheet(package.require_part(part)?, part, patches)?;
            package.set_part(part.clone(), updated);
        }

        if let (Some(part), Some(styles)) = (&self.styles_part, &self.styles) {
            if styles.is_dirty() {
                tracing::debug!(
                    borders = styles.border_count(),
                    formats = styles.xf_count(),
                    "writing extended styles"
                );
                package.set_part(part.clone(), styles.to_xml()?);
            }
        }

        recalc::apply(&mut package)?;
        package.write_to_vec()
    }
}
