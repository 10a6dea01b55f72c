//! Worksheet rewriting
//!
//! Cell edits are applied in a single streaming pass over the worksheet XML.
//! Rows and cells that do not exist yet are inserted in sheet order; every
//! element that is not edited passes through untouched, so template
//! formatting, merges, column widths and print settings survive.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use timecard_core::{CellRange, CellRef};

use super::openxml::{attr_value, local_name};
use crate::workbook::{CellValue, WorkbookError};

/// Pending edit of one cell
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct CellPatch {
    pub value: Option<CellValue>,
    /// Index into `cellXfs`
    pub xf: Option<u32>,
}

pub(crate) type SheetPatches = BTreeMap<CellRef, CellPatch>;

struct RowState<'p> {
    row: u32,
    pending: Vec<(u32, &'p CellPatch)>,
    next: usize,
    last_col: Option<u32>,
}

impl<'p> RowState<'p> {
    fn new(row: u32, pending: Vec<(u32, &'p CellPatch)>) -> Self {
        Self {
            row,
            pending,
            next: 0,
            last_col: None,
        }
    }

    /// Write every pending cell left of `col`
    fn flush_before<W: Write>(
        &mut self,
        writer: &mut Writer<W>,
        col: u32,
        prefix: Option<&str>,
    ) -> Result<(), WorkbookError> {
        while let Some(&(pending_col, patch)) = self.pending.get(self.next) {
            if pending_col >= col {
                break;
            }
            write_cell(writer, None, CellRef::new(self.row, pending_col), patch, prefix, &[])?;
            self.next += 1;
        }
        Ok(())
    }

    fn take(&mut self, col: u32) -> Option<&'p CellPatch> {
        match self.pending.get(self.next) {
            Some(&(pending_col, patch)) if pending_col == col => {
                self.next += 1;
                Some(patch)
            }
            _ => None,
        }
    }
}

fn is_element(e: &BytesStart<'_>, name: &[u8]) -> bool {
    local_name(e.name().as_ref()) == name
}

fn element_prefix(e: &BytesStart<'_>) -> Option<String> {
    let name = e.name();
    let name = name.as_ref();
    name.iter()
        .position(|b| *b == b':')
        .map(|idx| String::from_utf8_lossy(&name[..idx]).into_owned())
}

fn prefixed(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Zero-based row index of a `<row>`, or the row after `previous` when `r` is absent
fn row_index(e: &BytesStart<'_>, previous: Option<u32>) -> Result<u32, WorkbookError> {
    match attr_value(e, b"r")? {
        Some(r) => match r.trim().parse::<u32>() {
            Ok(n) if n > 0 => Ok(n - 1),
            _ => Err(WorkbookError::Invalid(format!("bad row number {r:?}"))),
        },
        None => Ok(previous.map_or(0, |p| p + 1)),
    }
}

/// Zero-based column of a `<c>`, or the column after `previous` when `r` is absent
fn cell_col(e: &BytesStart<'_>, previous: Option<u32>) -> Result<u32, WorkbookError> {
    match attr_value(e, b"r")? {
        Some(r) => CellRef::from_a1(&r)
            .map(|cell| cell.col)
            .map_err(|err| WorkbookError::Invalid(err.to_string())),
        None => Ok(previous.map_or(0, |p| p + 1)),
    }
}

fn patch_bounds(patches: &SheetPatches) -> Option<CellRange> {
    let first = patches.keys().next()?;
    let (mut min_col, mut max_col) = (first.col, first.col);
    let (mut min_row, mut max_row) = (first.row, first.row);
    for cell in patches.keys() {
        min_col = min_col.min(cell.col);
        max_col = max_col.max(cell.col);
        min_row = min_row.min(cell.row);
        max_row = max_row.max(cell.row);
    }
    Some(CellRange::new(
        CellRef::new(min_row, min_col),
        CellRef::new(max_row, max_col),
    ))
}

fn widen_dimension(
    e: &BytesStart<'_>,
    bounds: Option<CellRange>,
) -> Result<BytesStart<'static>, WorkbookError> {
    let Some(bounds) = bounds else {
        return Ok(e.to_owned());
    };
    let merged = match attr_value(e, b"ref")?.and_then(|r| r.parse::<CellRange>().ok()) {
        Some(current) => CellRange::new(
            CellRef::new(
                current.start.row.min(bounds.start.row),
                current.start.col.min(bounds.start.col),
            ),
            CellRef::new(
                current.end.row.max(bounds.end.row),
                current.end.col.max(bounds.end.col),
            ),
        ),
        None => bounds,
    };

    let mut out = BytesStart::new(tag_name(e));
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != b"ref" {
            out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    let reference = if merged.start == merged.end {
        merged.start.to_a1()
    } else {
        merged.to_string()
    };
    out.push_attribute(("ref", reference.as_str()));
    Ok(out)
}

/// Copy of a patched `<row>` without `spans`, which may no longer cover its cells
fn without_spans(e: &BytesStart<'_>) -> Result<BytesStart<'static>, WorkbookError> {
    let mut out = BytesStart::new(tag_name(e));
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != b"spans" {
            out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    Ok(out)
}

fn write_cell<W: Write>(
    writer: &mut Writer<W>,
    existing: Option<&BytesStart<'_>>,
    cell: CellRef,
    patch: &CellPatch,
    prefix: Option<&str>,
    children: &[Event<'static>],
) -> Result<(), WorkbookError> {
    let tag = prefixed(prefix, "c");
    let mut start = BytesStart::new(tag.as_str());
    let mut has_r = false;

    if let Some(existing) = existing {
        for attr in existing.attributes() {
            let attr = attr?;
            match attr.key.as_ref() {
                b"s" if patch.xf.is_some() => continue,
                b"t" if patch.value.is_some() => continue,
                b"r" => has_r = true,
                _ => {}
            }
            start.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    if !has_r {
        let a1 = cell.to_a1();
        start.push_attribute(("r", a1.as_str()));
    }
    if let Some(xf) = patch.xf.filter(|xf| *xf != 0) {
        let xf = xf.to_string();
        start.push_attribute(("s", xf.as_str()));
    }

    match &patch.value {
        Some(CellValue::Number(n)) => {
            writer.write_event(Event::Start(start))?;
            let v = prefixed(prefix, "v");
            let text = n.to_string();
            writer.write_event(Event::Start(BytesStart::new(v.as_str())))?;
            writer.write_event(Event::Text(BytesText::new(&text)))?;
            writer.write_event(Event::End(BytesEnd::new(v.as_str())))?;
        }
        Some(CellValue::Text(s)) => {
            start.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(start))?;
            let is = prefixed(prefix, "is");
            let t = prefixed(prefix, "t");
            let mut t_start = BytesStart::new(t.as_str());
            if s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) {
                t_start.push_attribute(("xml:space", "preserve"));
            }
            writer.write_event(Event::Start(BytesStart::new(is.as_str())))?;
            writer.write_event(Event::Start(t_start))?;
            writer.write_event(Event::Text(BytesText::new(s)))?;
            writer.write_event(Event::End(BytesEnd::new(t.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new(is.as_str())))?;
        }
        None if children.is_empty() => {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        None => {
            writer.write_event(Event::Start(start))?;
            for child in children {
                writer.write_event(child.clone())?;
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    Ok(())
}

fn write_row<W: Write>(
    writer: &mut Writer<W>,
    row: u32,
    pending: &[(u32, &CellPatch)],
    prefix: Option<&str>,
) -> Result<(), WorkbookError> {
    let tag = prefixed(prefix, "row");
    let mut start = BytesStart::new(tag.as_str());
    let r = (row + 1).to_string();
    start.push_attribute(("r", r.as_str()));
    writer.write_event(Event::Start(start))?;
    for &(col, patch) in pending {
        write_cell(writer, None, CellRef::new(row, col), patch, prefix, &[])?;
    }
    writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    Ok(())
}

/// Insert every pending row above `limit`
fn write_rows_before<W: Write>(
    writer: &mut Writer<W>,
    rows: &mut BTreeMap<u32, Vec<(u32, &CellPatch)>>,
    limit: u32,
    prefix: Option<&str>,
) -> Result<(), WorkbookError> {
    while let Some(entry) = rows.first_entry() {
        if *entry.key() >= limit {
            break;
        }
        let (row, pending) = entry.remove_entry();
        write_row(writer, row, &pending, prefix)?;
    }
    Ok(())
}

/// Apply `patches` to a worksheet part, returning the rewritten XML.
pub(crate) fn patch_worksheet(
    xml: &[u8],
    part: &str,
    patches: &SheetPatches,
) -> Result<Vec<u8>, WorkbookError> {
    let mut rows: BTreeMap<u32, Vec<(u32, &CellPatch)>> = BTreeMap::new();
    for (cell, patch) in patches {
        rows.entry(cell.row).or_default().push((cell.col, patch));
    }
    let bounds = patch_bounds(patches);

    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + patches.len() * 48));
    let mut buf = Vec::new();

    let mut saw_sheet_data = false;
    let mut in_sheet_data = false;
    let mut prefix: Option<String> = None;
    let mut row_state: Option<RowState<'_>> = None;
    let mut last_row: Option<u32> = None;
    let mut in_cell = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,

            Event::Start(ref e) if is_element(e, b"dimension") => {
                writer.write_event(Event::Start(widen_dimension(e, bounds)?))?;
            }
            Event::Empty(ref e) if is_element(e, b"dimension") => {
                writer.write_event(Event::Empty(widen_dimension(e, bounds)?))?;
            }

            Event::Start(ref e) if is_element(e, b"sheetData") => {
                saw_sheet_data = true;
                in_sheet_data = true;
                prefix = element_prefix(e);
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::Empty(ref e) if is_element(e, b"sheetData") => {
                saw_sheet_data = true;
                if rows.is_empty() {
                    writer.write_event(Event::Empty(e.to_owned()))?;
                } else {
                    prefix = element_prefix(e);
                    writer.write_event(Event::Start(e.to_owned()))?;
                    write_rows_before(&mut writer, &mut rows, u32::MAX, prefix.as_deref())?;
                    writer.write_event(Event::End(BytesEnd::new(tag_name(e))))?;
                }
            }
            Event::End(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                write_rows_before(&mut writer, &mut rows, u32::MAX, prefix.as_deref())?;
                in_sheet_data = false;
                writer.write_event(Event::End(e.to_owned()))?;
            }

            Event::Start(ref e) if in_sheet_data && is_element(e, b"row") => {
                let row = row_index(e, last_row)?;
                last_row = Some(row);
                in_cell = false;
                write_rows_before(&mut writer, &mut rows, row, prefix.as_deref())?;
                match rows.remove(&row) {
                    Some(pending) => {
                        writer.write_event(Event::Start(without_spans(e)?))?;
                        row_state = Some(RowState::new(row, pending));
                    }
                    None => writer.write_event(Event::Start(e.to_owned()))?,
                }
            }
            Event::Empty(ref e) if in_sheet_data && is_element(e, b"row") => {
                let row = row_index(e, last_row)?;
                last_row = Some(row);
                write_rows_before(&mut writer, &mut rows, row, prefix.as_deref())?;
                match rows.remove(&row) {
                    Some(pending) => {
                        // Expand `<row/>` so the new cells have somewhere to go.
                        let row_prefix = element_prefix(e).or_else(|| prefix.clone());
                        writer.write_event(Event::Start(without_spans(e)?))?;
                        for (col, patch) in pending {
                            write_cell(&mut writer, None, CellRef::new(row, col), patch, row_prefix.as_deref(), &[])?;
                        }
                        writer.write_event(Event::End(BytesEnd::new(tag_name(e))))?;
                    }
                    None => writer.write_event(Event::Empty(e.to_owned()))?,
                }
            }
            Event::End(ref e) if in_sheet_data && local_name(e.name().as_ref()) == b"row" => {
                if let Some(mut state) = row_state.take() {
                    state.flush_before(&mut writer, u32::MAX, prefix.as_deref())?;
                }
                in_cell = false;
                writer.write_event(Event::End(e.to_owned()))?;
            }

            Event::Start(ref e) if is_element(e, b"c") => {
                let Some(state) = row_state.as_mut() else {
                    in_cell = true;
                    writer.write_event(Event::Start(e.to_owned()))?;
                    buf.clear();
                    continue;
                };
                let cell_prefix = element_prefix(e).or_else(|| prefix.clone());
                let col = cell_col(e, state.last_col)?;
                state.last_col = Some(col);
                state.flush_before(&mut writer, col, cell_prefix.as_deref())?;

                match state.take(col) {
                    Some(patch) => {
                        let children = read_cell_children(&mut reader, part)?;
                        let cell = CellRef::new(state.row, col);
                        write_cell(&mut writer, Some(e), cell, patch, cell_prefix.as_deref(), &children)?;
                    }
                    None => {
                        in_cell = true;
                        writer.write_event(Event::Start(e.to_owned()))?;
                    }
                }
            }
            Event::Empty(ref e) if is_element(e, b"c") => {
                let Some(state) = row_state.as_mut() else {
                    writer.write_event(Event::Empty(e.to_owned()))?;
                    buf.clear();
                    continue;
                };
                let cell_prefix = element_prefix(e).or_else(|| prefix.clone());
                let col = cell_col(e, state.last_col)?;
                state.last_col = Some(col);
                state.flush_before(&mut writer, col, cell_prefix.as_deref())?;

                match state.take(col) {
                    Some(patch) => {
                        let cell = CellRef::new(state.row, col);
                        write_cell(&mut writer, Some(e), cell, patch, cell_prefix.as_deref(), &[])?;
                    }
                    None => writer.write_event(Event::Empty(e.to_owned()))?,
                }
            }
            Event::End(ref e) if in_cell && local_name(e.name().as_ref()) == b"c" => {
                in_cell = false;
                writer.write_event(Event::End(e.to_owned()))?;
            }

            // Row-level elements after the cells (e.g. extLst): pending cells go first.
            Event::Start(ref e) if !in_cell && row_state.is_some() => {
                if let Some(state) = row_state.as_mut() {
                    state.flush_before(&mut writer, u32::MAX, prefix.as_deref())?;
                }
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::Empty(ref e) if !in_cell && row_state.is_some() => {
                if let Some(state) = row_state.as_mut() {
                    state.flush_before(&mut writer, u32::MAX, prefix.as_deref())?;
                }
                writer.write_event(Event::Empty(e.to_owned()))?;
            }

            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    if !saw_sheet_data {
        return Err(WorkbookError::Invalid(format!(
            "worksheet {part} has no <sheetData>"
        )));
    }

    Ok(writer.into_inner())
}

/// Consume a cell's children up to and including its `</c>`
fn read_cell_children(reader: &mut Reader<&[u8]>, part: &str) -> Result<Vec<Event<'static>>, WorkbookError> {
    let mut children = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::End(ref e) if local_name(e.name().as_ref()) == b"c" => break,
            Event::Eof => {
                return Err(WorkbookError::Invalid(format!(
                    "worksheet {part} ends inside a cell"
                )))
            }
            ev => children.push(ev.into_owned()),
        }
        buf.clear();
    }
    Ok(children)
}

/// `s` attribute of every styled cell inside `range`
pub(crate) fn scan_cell_styles(xml: &[u8], range: CellRange) -> Result<HashMap<CellRef, u32>, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut styles = HashMap::new();
    let mut row: Option<u32> = None;
    let mut col: Option<u32> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if is_element(e, b"row") => {
                row = Some(row_index(e, row)?);
                col = None;
            }
            Event::Start(ref e) | Event::Empty(ref e) if is_element(e, b"c") => {
                let c = cell_col(e, col)?;
                col = Some(c);
                let cell = CellRef::new(row.unwrap_or(0), c);
                if !range.contains(cell) {
                    buf.clear();
                    continue;
                }
                if let Some(xf) = attr_value(e, b"s")?.and_then(|s| s.trim().parse::<u32>().ok()) {
                    styles.insert(cell, xf);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(styles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cell(a1: &str) -> CellRef {
        CellRef::from_a1(a1).unwrap()
    }

    fn value(v: impl Into<CellValue>) -> CellPatch {
        CellPatch {
            value: Some(v.into()),
            xf: None,
        }
    }

    fn styled(xf: u32) -> CellPatch {
        CellPatch { value: None, xf: Some(xf) }
    }

    fn patch(xml: &str, patches: &[(&str, CellPatch)]) -> String {
        let patches: SheetPatches = patches.iter().map(|(a1, p)| (cell(a1), p.clone())).collect();
        String::from_utf8(patch_worksheet(xml.as_bytes(), "sheet1.xml", &patches).unwrap()).unwrap()
    }

    #[test]
    fn expands_empty_sheet_data() {
        let out = patch(
            "<worksheet><sheetData/></worksheet>",
            &[("B2", value(5.0)), ("A1", value("Hi"))],
        );
        assert_eq!(
            out,
            r#"<worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>Hi</t></is></c></row><row r="2"><c r="B2"><v>5</v></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn replaces_value_and_keeps_style() {
        let out = patch(
            r#"<worksheet><sheetData><row r="1" spans="1:3"><c r="A1" s="3" t="s"><v>0</v></c><c r="C1"><v>1</v></c></row></sheetData></worksheet>"#,
            &[("B1", value(2.0)), ("A1", value("x"))],
        );
        assert_eq!(
            out,
            r#"<worksheet><sheetData><row r="1"><c r="A1" s="3" t="inlineStr"><is><t>x</t></is></c><c r="B1"><v>2</v></c><c r="C1"><v>1</v></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn style_only_patch_keeps_value() {
        let out = patch(
            r#"<worksheet><sheetData><row r="1"><c r="A1" s="1"><v>7</v></c><c r="B1" s="2"/></row></sheetData></worksheet>"#,
            &[("A1", styled(4)), ("B1", styled(5))],
        );
        assert_eq!(
            out,
            r#"<worksheet><sheetData><row r="1"><c r="A1" s="4"><v>7</v></c><c r="B1" s="5"/></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn inserts_rows_in_order() {
        let out = patch(
            r#"<worksheet><sheetData><row r="1"><c r="A1"><v>1</v></c></row><row r="3"/></sheetData></worksheet>"#,
            &[("A2", value(2.0)), ("B3", value(3.0)), ("A5", value(5.0))],
        );
        assert_eq!(
            out,
            r#"<worksheet><sheetData><row r="1"><c r="A1"><v>1</v></c></row><row r="2"><c r="A2"><v>2</v></c></row><row r="3"><c r="B3"><v>3</v></c></row><row r="5"><c r="A5"><v>5</v></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn cells_without_references_are_counted() {
        let out = patch(
            r#"<worksheet><sheetData><row><c><v>1</v></c><c><v>2</v></c></row></sheetData></worksheet>"#,
            &[("B1", value(9.0))],
        );
        assert_eq!(
            out,
            r#"<worksheet><sheetData><row><c><v>1</v></c><c r="B1"><v>9</v></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn widens_dimension() {
        let out = patch(
            r#"<worksheet><dimension ref="A1:B2"/><sheetData/></worksheet>"#,
            &[("D5", value(1.0))],
        );
        assert!(out.starts_with(r#"<worksheet><dimension ref="A1:D5"/>"#), "{out}");
    }

    #[test]
    fn text_is_escaped_and_whitespace_preserved() {
        let out = patch(
            "<worksheet><sheetData/></worksheet>",
            &[("A1", value(" A & B "))],
        );
        assert!(
            out.contains(r#"<t xml:space="preserve"> A &amp; B </t>"#),
            "{out}"
        );
    }

    #[test]
    fn missing_sheet_data_is_an_error() {
        let patches: SheetPatches = [(cell("A1"), value(1.0))].into_iter().collect();
        let err = patch_worksheet(b"<worksheet/>", "xl/worksheets/sheet1.xml", &patches).unwrap_err();
        assert!(err.to_string().contains("sheetData"));
    }

    #[test]
    fn scans_styles_in_range() {
        let xml = br#"<worksheet><sheetData><row r="4"><c r="A4" s="7"/><c r="B4"><v>1</v></c><c r="C4" s="2"/></row><row r="30"><c r="A30" s="9"/></row></sheetData></worksheet>"#;
        let range: CellRange = "A4:B12".parse().unwrap();
        let styles = scan_cell_styles(xml, range).unwrap();
        assert_eq!(styles.len(), 1);
        assert_eq!(styles.get(&cell("A4")), Some(&7));
    }
}
