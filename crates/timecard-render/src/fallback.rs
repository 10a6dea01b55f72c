//! Basic workbook used when no template is available

use rust_xlsxwriter::{Format, Workbook as XlsxWriter};
use timecard_core::{CellRef, TemplateLayout};

use crate::workbook::WorkbookError;

fn col(cell: CellRef) -> Result<u16, WorkbookError> {
    u16::try_from(cell.col).map_err(|_| WorkbookError::Invalid(format!("column out of range: {cell}")))
}

/// A single `Sheet1` carrying only the employee name.
pub fn basic_workbook(employee_name: &str) -> Result<Vec<u8>, WorkbookError> {
    let mut workbook = XlsxWriter::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Sheet1")?;

    let caption = TemplateLayout::FALLBACK_CAPTION;
    let name = TemplateLayout::FALLBACK_NAME;
    sheet.write_string_with_format(caption.row, col(caption)?, "Employee:", &bold)?;
    sheet.write_string(name.row, col(name)?, employee_name)?;
    sheet.set_column_width(col(name)?, 30)?;

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
    use std::io::Cursor;

    #[test]
    fn writes_caption_and_name() {
        let bytes = basic_workbook("Ada Lovelace").unwrap();
        let mut xlsx: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        assert_eq!(xlsx.sheet_names(), vec!["Sheet1".to_string()]);

        let range = xlsx.worksheet_range("Sheet1").unwrap();
        assert_eq!(range.get_value((0, 0)), Some(&Data::String("Employee:".into())));
        assert_eq!(range.get_value((0, 1)), Some(&Data::String("Ada Lovelace".into())));
    }
}
