//! Workbook part discovery: sheet list, relationships, target resolution

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::package::XlsxPackage;
use crate::workbook::WorkbookError;

pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";
pub(crate) const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

pub(crate) const REL_TYPE_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub(crate) const REL_TYPE_CALC_CHAIN: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";

/// A worksheet tab and the part holding its XML
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SheetEntry {
    pub name: String,
    pub part: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
}

pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

pub(crate) fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, WorkbookError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Resolve a relationship target against the part that owns the relationship
pub(crate) fn resolve_target(base_part: &str, target: &str) -> String {
    let (target, is_absolute) = match target.strip_prefix('/') {
        Some(target) => (target, true),
        None => (target, false),
    };
    let base_dir = if is_absolute {
        ""
    } else {
        base_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    };

    let mut components: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            _ => components.push(segment),
        }
    }
    components.join("/")
}

pub(crate) fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut relationships = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"Relationship" => {
                let id = attr_value(&e, b"Id")?;
                let type_uri = attr_value(&e, b"Type")?;
                let target = attr_value(&e, b"Target")?;
                if let (Some(id), Some(type_uri), Some(target)) = (id, type_uri, target) {
                    relationships.push(Relationship {
                        id,
                        type_uri,
                        target,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(relationships)
}

/// Ordered `(name, relationship id)` pairs from `xl/workbook.xml`
fn parse_workbook_sheet_ids(xml: &[u8]) -> Result<Vec<(String, String)>, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"sheet" => {
                let mut name = None;
                let mut rel_id = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    let key = attr.key.as_ref();
                    if key == b"name" {
                        name = Some(attr.unescape_value()?.into_owned());
                    } else if local_name(key) == b"id" && key != b"id" {
                        // `r:id`, whatever the relationships prefix is bound to
                        rel_id = Some(attr.unescape_value()?.into_owned());
                    }
                }
                if let (Some(name), Some(rel_id)) = (name, rel_id) {
                    sheets.push((name, rel_id));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

/// Resolve every worksheet tab to its part name, in tab order
pub(crate) fn workbook_sheets(package: &XlsxPackage) -> Result<Vec<SheetEntry>, WorkbookError> {
    let workbook_xml = package.require_part(WORKBOOK_PART)?;
    let rels = match package.part(WORKBOOK_RELS_PART) {
        Some(xml) => parse_relationships(xml)?,
        None => Vec::new(),
    };
    let targets: HashMap<&str, String> = rels
        .iter()
        .map(|rel| (rel.id.as_str(), resolve_target(WORKBOOK_PART, &rel.target)))
        .collect();

    let mut sheets = Vec::new();
    for (name, rel_id) in parse_workbook_sheet_ids(workbook_xml)? {
        match targets.get(rel_id.as_str()) {
            Some(part) if package.part(part).is_some() => sheets.push(SheetEntry {
                name,
                part: part.clone(),
            }),
            // Chartsheets and dangling relationships have no worksheet to patch.
            _ => {}
        }
    }
    Ok(sheets)
}

/// Part name of the workbook's styles, if it has one
pub(crate) fn styles_part(package: &XlsxPackage) -> Result<Option<String>, WorkbookError> {
    let from_rels = match package.part(WORKBOOK_RELS_PART) {
        Some(xml) => parse_relationships(xml)?
            .into_iter()
            .find(|rel| rel.type_uri == REL_TYPE_STYLES)
            .map(|rel| resolve_target(WORKBOOK_PART, &rel.target)),
        None => None,
    };
    let part = from_rels.unwrap_or_else(|| "xl/styles.xml".to_string());
    Ok(package.part(&part).is_some().then_some(part))
}
