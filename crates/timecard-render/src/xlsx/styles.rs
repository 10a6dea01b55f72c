//! Cell format table (`xl/styles.xml`)
//!
//! Bordering a cell must not lose its number format, font or fill, so every
//! bordered format is derived from the cell's current `cellXfs` entry with only
//! `borderId` replaced. Derived entries and new borders are appended; existing
//! indices never move.

use std::collections::HashMap;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::openxml::local_name;
use crate::workbook::{Border, WorkbookError};

#[derive(Debug, Clone)]
pub(crate) struct StyleSheet {
    xml: Vec<u8>,
    border_count: u32,
    new_borders: Vec<Border>,
    border_ids: HashMap<Border, u32>,
    /// Every `<xf>` of `cellXfs` as owned events, originals first
    xfs: Vec<Vec<Event<'static>>>,
    original_xfs: usize,
    derived: HashMap<(u32, u32), u32>,
}

impl StyleSheet {
    pub(crate) fn parse(xml: &[u8]) -> Result<Self, WorkbookError> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();

        let mut border_count = 0u32;
        let mut in_borders = false;
        let mut border_depth = 0usize;
        let mut in_cell_xfs = false;
        let mut xfs = Vec::new();
        let mut current_xf: Option<Vec<Event<'static>>> = None;
        let mut xf_depth = 0usize;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let name = local_name(e.name().as_ref()).to_vec();
                    if let Some(xf) = current_xf.as_mut() {
                        xf.push(Event::Start(e.into_owned()));
                        xf_depth += 1;
                    } else if in_cell_xfs && name == b"xf" {
                        current_xf = Some(vec![Event::Start(e.into_owned())]);
                        xf_depth = 1;
                    } else if in_borders {
                        if border_depth == 0 && name == b"border" {
                            border_count += 1;
                        }
                        border_depth += 1;
                    } else if name == b"borders" {
                        in_borders = true;
                    } else if name == b"cellXfs" {
                        in_cell_xfs = true;
                    }
                }
                Event::Empty(e) => {
                    let name = local_name(e.name().as_ref()).to_vec();
                    if let Some(xf) = current_xf.as_mut() {
                        xf.push(Event::Empty(e.into_owned()));
                    } else if in_cell_xfs && name == b"xf" {
                        xfs.push(vec![Event::Empty(e.into_owned())]);
                    } else if in_borders && border_depth == 0 && name == b"border" {
                        border_count += 1;
                    }
                }
                Event::End(e) => {
                    if let Some(mut xf) = current_xf.take() {
                        xf.push(Event::End(e.into_owned()));
                        xf_depth -= 1;
                        if xf_depth == 0 {
                            xfs.push(xf);
                        } else {
                            current_xf = Some(xf);
                        }
                    } else if in_borders {
                        if border_depth == 0 {
                            in_borders = false;
                        } else {
                            border_depth -= 1;
                        }
                    } else if local_name(e.name().as_ref()) == b"cellXfs" {
                        in_cell_xfs = false;
                    }
                }
                Event::Eof => break,
                other => {
                    if let Some(xf) = current_xf.as_mut() {
                        xf.push(other.into_owned());
                    }
                }
            }
            buf.clear();
        }

        let original_xfs = xfs.len();
        Ok(Self {
            xml: xml.to_vec(),
            border_count,
            new_borders: Vec::new(),
            border_ids: HashMap::new(),
            xfs,
            original_xfs,
            derived: HashMap::new(),
        })
    }

    pub(crate) fn border_count(&self) -> u32 {
        self.border_count + self.new_borders.len() as u32
    }

    pub(crate) fn xf_count(&self) -> usize {
        self.xfs.len()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        !self.new_borders.is_empty() || self.xfs.len() != self.original_xfs
    }

    /// Index of `border` in `<borders>`, appending it on first use
    pub(crate) fn border_id(&mut self, border: &Border) -> u32 {
        if let Some(id) = self.border_ids.get(border) {
            return *id;
        }
        let id = self.border_count();
        self.new_borders.push(*border);
        self.border_ids.insert(*border, id);
        id
    }

    /// Index of a format equal to `base` except for its border.
    ///
    /// An out-of-range `base` is treated as the default format 0.
    pub(crate) fn xf_with_border(&mut self, base: u32, border: &Border) -> Result<u32, WorkbookError> {
        let border_id = self.border_id(border);
        let base = if (base as usize) < self.xfs.len() { base } else { 0 };
        if let Some(xf) = self.derived.get(&(base, border_id)) {
            return Ok(*xf);
        }

        let template = self
            .xfs
            .get(base as usize)
            .ok_or_else(|| WorkbookError::Invalid("styles have no cell formats".to_string()))?;
        let mut derived = template.clone();
        if let Some(first) = derived.first_mut() {
            *first = match &*first {
                Event::Start(e) => Event::Start(replace_border(e, border_id)?),
                Event::Empty(e) => Event::Empty(replace_border(e, border_id)?),
                other => other.clone(),
            };
        }

        let id = self.xfs.len() as u32;
        self.xfs.push(derived);
        self.derived.insert((base, border_id), id);
        Ok(id)
    }

    /// The styles part with every appended border and format
    pub(crate) fn to_xml(&self) -> Result<Vec<u8>, WorkbookError> {
        if !self.is_dirty() {
            return Ok(self.xml.clone());
        }

        let mut reader = Reader::from_reader(self.xml.as_slice());
        reader.config_mut().trim_text(false);
        let mut writer = Writer::new(Vec::with_capacity(self.xml.len() + 512));
        let mut buf = Vec::new();
        let border_count = self.border_count().to_string();
        let xf_count = self.xfs.len().to_string();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Eof => break,
                Event::Start(ref e) if local_name(e.name().as_ref()) == b"borders" => {
                    writer.write_event(Event::Start(with_count(e, &border_count)?))?;
                }
                Event::Empty(ref e) if local_name(e.name().as_ref()) == b"borders" => {
                    writer.write_event(Event::Start(with_count(e, &border_count)?))?;
                    self.write_new_borders(&mut writer, element_prefix(e).as_deref())?;
                    writer.write_event(Event::End(BytesEnd::new(tag_name(e))))?;
                }
                Event::End(ref e) if local_name(e.name().as_ref()) == b"borders" => {
                    let prefix = end_prefix(e.name().as_ref());
                    self.write_new_borders(&mut writer, prefix.as_deref())?;
                    writer.write_event(Event::End(e.to_owned()))?;
                }
                Event::Start(ref e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    writer.write_event(Event::Start(with_count(e, &xf_count)?))?;
                }
                Event::Empty(ref e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    writer.write_event(Event::Start(with_count(e, &xf_count)?))?;
                    self.write_new_xfs(&mut writer)?;
                    writer.write_event(Event::End(BytesEnd::new(tag_name(e))))?;
                }
                Event::End(ref e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    self.write_new_xfs(&mut writer)?;
                    writer.write_event(Event::End(e.to_owned()))?;
                }
                ev => writer.write_event(ev.into_owned())?,
            }
            buf.clear();
        }

        Ok(writer.into_inner())
    }

    fn write_new_borders<W: std::io::Write>(
        &self,
        writer: &mut Writer<W>,
        prefix: Option<&str>,
    ) -> Result<(), WorkbookError> {
        let tag = |local: &str| match prefix {
            Some(p) => format!("{p}:{local}"),
            None => local.to_string(),
        };
        for border in &self.new_borders {
            let border_tag = tag("border");
            writer.write_event(Event::Start(BytesStart::new(border_tag.as_str())))?;
            for edge in ["left", "right", "top", "bottom"] {
                let edge_tag = tag(edge);
                let mut start = BytesStart::new(edge_tag.as_str());
                start.push_attribute(("style", border.style.as_str()));
                writer.write_event(Event::Start(start))?;
                let mut color = BytesStart::new(tag("color"));
                color.push_attribute(("rgb", border.argb().as_str()));
                writer.write_event(Event::Empty(color))?;
                writer.write_event(Event::End(BytesEnd::new(edge_tag.as_str())))?;
            }
            writer.write_event(Event::Empty(BytesStart::new(tag("diagonal"))))?;
            writer.write_event(Event::End(BytesEnd::new(border_tag.as_str())))?;
        }
        Ok(())
    }

    fn write_new_xfs<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<(), WorkbookError> {
        for xf in &self.xfs[self.original_xfs..] {
            for event in xf {
                writer.write_event(event.clone())?;
            }
        }
        Ok(())
    }
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn element_prefix(e: &BytesStart<'_>) -> Option<String> {
    end_prefix(e.name().as_ref())
}

fn end_prefix(name: &[u8]) -> Option<String> {
    name.iter()
        .position(|b| *b == b':')
        .map(|idx| String::from_utf8_lossy(&name[..idx]).into_owned())
}

fn with_count(e: &BytesStart<'_>, count: &str) -> Result<BytesStart<'static>, WorkbookError> {
    let mut out = BytesStart::new(tag_name(e));
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != b"count" {
            out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    out.push_attribute(("count", count));
    Ok(out)
}

fn replace_border(e: &BytesStart<'_>, border_id: u32) -> Result<BytesStart<'static>, WorkbookError> {
    let mut out = BytesStart::new(tag_name(e));
    for attr in e.attributes() {
        let attr = attr?;
        if !matches!(attr.key.as_ref(), b"borderId" | b"applyBorder") {
            out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    let id = border_id.to_string();
    out.push_attribute(("borderId", id.as_str()));
    out.push_attribute(("applyBorder", "1"));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::BorderStyle;

    const STYLES: &str = concat!(
        r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
        r#"<cellXfs count="2"><xf numFmtId="0" fontId="0" borderId="0" xfId="0"/>"#,
        r#"<xf numFmtId="14" fontId="0" borderId="0" xfId="0" applyNumberFormat="1"><alignment horizontal="center"/></xf></cellXfs>"#,
        r#"<dxfs count="1"><dxf><border><left/></border></dxf></dxfs>"#,
        r#"</styleSheet>"#,
    );

    #[test]
    fn counts_borders_and_formats() {
        let styles = StyleSheet::parse(STYLES.as_bytes()).unwrap();
        assert_eq!(styles.border_count(), 1);
        assert_eq!(styles.xf_count(), 2);
        assert!(!styles.is_dirty());
        assert_eq!(styles.to_xml().unwrap(), STYLES.as_bytes());
    }

    #[test]
    fn derives_bordered_format_once() {
        let mut styles = StyleSheet::parse(STYLES.as_bytes()).unwrap();
        let thin = Border::thin();

        assert_eq!(styles.xf_with_border(1, &thin).unwrap(), 2);
        assert_eq!(styles.xf_with_border(1, &thin).unwrap(), 2);
        assert_eq!(styles.xf_with_border(0, &thin).unwrap(), 3);
        assert_eq!(styles.xf_with_border(99, &thin).unwrap(), 3);
        assert_eq!(styles.border_count(), 2);

        let thick = Border {
            style: BorderStyle::Thick,
            color: 0x00_00FF,
        };
        assert_eq!(styles.border_id(&thick), 2);
        assert_eq!(styles.border_id(&thin), 1);
    }

    #[test]
    fn writes_appended_entries() {
        let mut styles = StyleSheet::parse(STYLES.as_bytes()).unwrap();
        styles.xf_with_border(1, &Border::thin()).unwrap();
        let xml = String::from_utf8(styles.to_xml().unwrap()).unwrap();

        assert!(xml.contains(r#"<borders count="2">"#), "{xml}");
        assert!(xml.contains(r#"<cellXfs count="3">"#), "{xml}");
        assert!(xml.contains(r#"<dxfs count="1">"#), "{xml}");
        assert!(xml.contains(
            r#"<border><left style="thin"><color rgb="FF000000"/></left><right style="thin"><color rgb="FF000000"/></right><top style="thin"><color rgb="FF000000"/></top><bottom style="thin"><color rgb="FF000000"/></bottom><diagonal/></border></borders>"#
        ), "{xml}");
        assert!(xml.contains(
            r#"<xf numFmtId="14" fontId="0" xfId="0" applyNumberFormat="1" borderId="1" applyBorder="1"><alignment horizontal="center"/></xf></cellXfs>"#
        ), "{xml}");
    }

    #[test]
    fn empty_format_table_is_an_error() {
        let mut styles = StyleSheet::parse(br#"<styleSheet><borders count="0"/><cellXfs count="0"/></styleSheet>"#).unwrap();
        assert!(styles.xf_with_border(0, &Border::thin()).is_err());
    }
}
