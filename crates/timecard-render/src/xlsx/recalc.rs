//! Recalculation on open
//!
//! Filled templates usually carry totals formulas whose cached values predate
//! the new hours. The workbook is flagged for a full calculation on load and
//! its calculation chain is removed, so a reader never shows stale totals.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::openxml::{
    attr_value, local_name, CONTENT_TYPES_PART, REL_TYPE_CALC_CHAIN, WORKBOOK_PART, WORKBOOK_RELS_PART,
};
use super::package::XlsxPackage;
use crate::workbook::WorkbookError;

const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

pub(crate) fn apply(package: &mut XlsxPackage) -> Result<(), WorkbookError> {
    if let Some(xml) = package.part(WORKBOOK_PART) {
        let updated = force_full_calc_on_load(xml)?;
        package.set_part(WORKBOOK_PART, updated);
    }

    if package.remove_part(CALC_CHAIN_PART).is_some() {
        tracing::debug!("dropped {CALC_CHAIN_PART}");
    }
    if let Some(xml) = package.part(WORKBOOK_RELS_PART) {
        let updated = drop_elements(xml, b"Relationship", |e| {
            let is_type = attr_value(e, b"Type")?.is_some_and(|t| t == REL_TYPE_CALC_CHAIN);
            let is_target = attr_value(e, b"Target")?.is_some_and(|t| t.ends_with("calcChain.xml"));
            Ok(is_type || is_target)
        })?;
        package.set_part(WORKBOOK_RELS_PART, updated);
    }
    if let Some(xml) = package.part(CONTENT_TYPES_PART) {
        let updated = drop_elements(xml, b"Override", |e| {
            Ok(attr_value(e, b"PartName")?.is_some_and(|p| p.ends_with("calcChain.xml")))
        })?;
        package.set_part(CONTENT_TYPES_PART, updated);
    }

    Ok(())
}

fn calc_pr_with_full_calc(e: Option<&BytesStart<'_>>, tag: &str) -> Result<BytesStart<'static>, WorkbookError> {
    let mut calc_pr = BytesStart::new(tag.to_string());
    if let Some(e) = e {
        for attr in e.attributes() {
            let attr = attr?;
            if attr.key.as_ref() != b"fullCalcOnLoad" {
                calc_pr.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
            }
        }
    }
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    Ok(calc_pr)
}

/// Workbook children that follow `calcPr` in schema order
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// `calcPr` tag name carrying the root element's namespace prefix
fn calc_pr_tag(root: &BytesStart<'_>) -> String {
    let name = root.name();
    match name.prefix() {
        Some(prefix) => format!("{}:calcPr", String::from_utf8_lossy(prefix.as_ref())),
        None => "calcPr".to_string(),
    }
}

/// Set `fullCalcOnLoad="1"` on `<calcPr>`, adding the element when missing
pub(crate) fn force_full_calc_on_load(xml: &[u8]) -> Result<Vec<u8>, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 32));
    let mut buf = Vec::new();
    let mut saw_calc_pr = false;
    let mut tag = String::from("calcPr");
    let mut depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;

        // A missing calcPr goes before the first root child that must follow it.
        let follows_calc_pr = match &event {
            Event::Start(e) | Event::Empty(e) => depth == 1 && AFTER_CALC_PR.contains(&local_name(e.name().as_ref())),
            Event::End(_) => depth == 1,
            _ => false,
        };
        if follows_calc_pr && !saw_calc_pr {
            saw_calc_pr = true;
            writer.write_event(Event::Empty(calc_pr_with_full_calc(None, &tag)?))?;
        }

        match event {
            Event::Eof => break,
            Event::Start(ref e) if local_name(e.name().as_ref()) == b"calcPr" => {
                saw_calc_pr = true;
                depth += 1;
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(calc_pr_with_full_calc(Some(e), &name)?))?;
            }
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"calcPr" => {
                saw_calc_pr = true;
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Empty(calc_pr_with_full_calc(Some(e), &name)?))?;
            }
            // <workbook/>
            Event::Empty(ref e) if depth == 0 && local_name(e.name().as_ref()) == b"workbook" => {
                saw_calc_pr = true;
                writer.write_event(Event::Start(e.to_owned()))?;
                writer.write_event(Event::Empty(calc_pr_with_full_calc(None, &calc_pr_tag(e))?))?;
                writer.write_event(Event::End(e.to_end().into_owned()))?;
            }
            Event::Start(ref e) => {
                if depth == 0 {
                    tag = calc_pr_tag(e);
                }
                depth += 1;
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e.to_owned()))?;
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// Copy `xml`, leaving out every `element` that `matches`
fn drop_elements(
    xml: &[u8],
    element: &[u8],
    matches: impl Fn(&BytesStart<'_>) -> Result<bool, WorkbookError>,
) -> Result<Vec<u8>, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(_) if skip_depth > 0 => skip_depth += 1,
            Event::End(_) if skip_depth > 0 => skip_depth -= 1,
            _ if skip_depth > 0 => {}
            Event::Start(ref e) if local_name(e.name().as_ref()) == element && matches(e)? => skip_depth = 1,
            Event::Empty(ref e) if local_name(e.name().as_ref()) == element && matches(e)? => {}
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xlsx::test_support::build_zip;
    use pretty_assertions::assert_eq;

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn adds_calc_pr() {
        let out = force_full_calc_on_load(b"<workbook><sheets/></workbook>").unwrap();
        assert_eq!(text(out), r#"<workbook><sheets/><calcPr fullCalcOnLoad="1"/></workbook>"#);
    }

    #[test]
    fn adds_calc_pr_before_ext_lst() {
        let out = force_full_calc_on_load(b"<workbook><sheets/><extLst><ext/></extLst></workbook>").unwrap();
        assert_eq!(
            text(out),
            r#"<workbook><sheets/><calcPr fullCalcOnLoad="1"/><extLst><ext/></extLst></workbook>"#
        );
    }

    #[test]
    fn adds_calc_pr_before_later_workbook_children() {
        let out = force_full_calc_on_load(
            b"<workbook><sheets/><definedNames/><fileRecoveryPr repairLoad=\"1\"/><webPublishObjects count=\"0\"></webPublishObjects></workbook>",
        )
        .unwrap();
        assert_eq!(
            text(out),
            r#"<workbook><sheets/><definedNames/><calcPr fullCalcOnLoad="1"/><fileRecoveryPr repairLoad="1"/><webPublishObjects count="0"></webPublishObjects></workbook>"#
        );
    }

    #[test]
    fn nested_names_do_not_move_calc_pr() {
        let out = force_full_calc_on_load(b"<workbook><sheets><sheet name=\"extLst\"/></sheets></workbook>").unwrap();
        assert_eq!(
            text(out),
            r#"<workbook><sheets><sheet name="extLst"/></sheets><calcPr fullCalcOnLoad="1"/></workbook>"#
        );
    }

    #[test]
    fn self_closing_workbook_gets_calc_pr() {
        let out = force_full_calc_on_load(b"<workbook/>").unwrap();
        assert_eq!(text(out), r#"<workbook><calcPr fullCalcOnLoad="1"/></workbook>"#);
    }

    #[test]
    fn prefixed_workbook_gets_prefixed_calc_pr() {
        let out = force_full_calc_on_load(b"<x:workbook xmlns:x=\"urn:x\"><x:sheets/><x:extLst/></x:workbook>").unwrap();
        assert_eq!(
            text(out),
            r#"<x:workbook xmlns:x="urn:x"><x:sheets/><x:calcPr fullCalcOnLoad="1"/><x:extLst/></x:workbook>"#
        );
    }

    #[test]
    fn updates_existing_calc_pr() {
        let out = force_full_calc_on_load(br#"<workbook><calcPr calcId="191029" fullCalcOnLoad="0"/></workbook>"#).unwrap();
        assert_eq!(
            text(out),
            r#"<workbook><calcPr calcId="191029" fullCalcOnLoad="1"/></workbook>"#
        );
    }

    #[test]
    fn removes_calc_chain_everywhere() {
        let rels = concat!(
            r#"<Relationships>"#,
            r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>"#,
            r#"<Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/>"#,
            r#"</Relationships>"#,
        );
        let types = concat!(
            r#"<Types>"#,
            r#"<Override PartName="/xl/workbook.xml" ContentType="wb"/>"#,
            r#"<Override PartName="/xl/calcChain.xml" ContentType="cc"/>"#,
            r#"</Types>"#,
        );
        let mut package = XlsxPackage::from_bytes(&build_zip(&[
            ("[Content_Types].xml", types),
            ("xl/workbook.xml", "<workbook/>"),
            ("xl/_rels/workbook.xml.rels", rels),
            ("xl/calcChain.xml", "<calcChain/>"),
        ]))
        .unwrap();

        apply(&mut package).unwrap();

        assert!(package.part("xl/calcChain.xml").is_none());
        let workbook = text(package.part(WORKBOOK_PART).unwrap().to_vec());
        assert_eq!(workbook, r#"<workbook><calcPr fullCalcOnLoad="1"/></workbook>"#);
        let rels = text(package.part(WORKBOOK_RELS_PART).unwrap().to_vec());
        assert!(rels.contains("rId1") && !rels.contains("rId9"), "{rels}");
        let types = text(package.part(CONTENT_TYPES_PART).unwrap().to_vec());
        assert!(types.contains("/xl/workbook.xml") && !types.contains("calcChain"), "{types}");
    }
}
