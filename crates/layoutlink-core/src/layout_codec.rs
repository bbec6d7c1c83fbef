//! Parse and serialize the layout definition wire format.
//!
//! The format is a fixed external XML schema: root `<r>`, devices `<d>`
//! (attributes `id`, `l`), placeholders `<p>` (`key`, `md`, `uid`) and
//! renderings `<r>` (`id`, `uid`, `ph`, `ds`, `par`, `mvt`) with an optional
//! `<rls>` child carrying the rules blob. The nested `<r>` is told apart
//! from the root `<r>` by nesting level. Unknown elements and attributes are
//! rejected; silently dropping them would corrupt documents on the way back
//! out. Round-trips are semantically equivalent, not byte-identical.

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::RewriteError;
use crate::layout_model::{Device, LayoutDocument, Placeholder, Rendering};

fn xml_err(err: impl std::fmt::Display) -> RewriteError {
    RewriteError::MalformedLayout(err.to_string())
}

fn unexpected(event: &Event) -> RewriteError {
    RewriteError::MalformedLayout(format!("unexpected content: {:?}", event))
}

fn unknown_attribute(element: &str, key: &[u8]) -> RewriteError {
    RewriteError::MalformedLayout(format!(
        "unknown attribute {:?} on <{}>",
        String::from_utf8_lossy(key),
        element
    ))
}

fn some_nonempty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a serialized layout document.
pub fn parse(input: &str) -> Result<LayoutDocument, RewriteError> {
    let mut reader = Reader::from_str(input);
    reader.trim_text(true);

    let mut document = None;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Decl(_) | Event::Comment(_) => {}
            Event::Start(e) if e.name().as_ref() == b"r" && document.is_none() => {
                reject_attributes(&e, "r")?;
                document = Some(LayoutDocument {
                    devices: parse_devices(&mut reader, input)?,
                });
            }
            Event::Empty(e) if e.name().as_ref() == b"r" && document.is_none() => {
                reject_attributes(&e, "r")?;
                document = Some(LayoutDocument::default());
            }
            Event::Eof => break,
            other => return Err(unexpected(&other)),
        }
    }
    document.ok_or_else(|| RewriteError::MalformedLayout("missing root <r> element".into()))
}

fn parse_devices(
    reader: &mut Reader<&[u8]>,
    input: &str,
) -> Result<Vec<Device>, RewriteError> {
    let mut devices = Vec::new();
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Comment(_) => {}
            Event::Start(e) if e.name().as_ref() == b"d" => {
                let mut device = device_from_attributes(&e)?;
                parse_device_children(reader, input, &mut device)?;
                devices.push(device);
            }
            Event::Empty(e) if e.name().as_ref() == b"d" => {
                devices.push(device_from_attributes(&e)?);
            }
            Event::End(e) if e.name().as_ref() == b"r" => return Ok(devices),
            Event::Eof => {
                return Err(RewriteError::MalformedLayout(
                    "unterminated <r> element".into(),
                ))
            }
            other => return Err(unexpected(&other)),
        }
    }
}

fn parse_device_children(
    reader: &mut Reader<&[u8]>,
    input: &str,
    device: &mut Device,
) -> Result<(), RewriteError> {
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Comment(_) => {}
            Event::Start(e) if e.name().as_ref() == b"p" => {
                let placeholder = placeholder_from_attributes(&e)?;
                let span = reader.read_to_end(e.name()).map_err(xml_err)?;
                if !input[span].trim().is_empty() {
                    return Err(RewriteError::MalformedLayout(
                        "<p> element carries unexpected content".into(),
                    ));
                }
                device.placeholders.push(placeholder);
            }
            Event::Empty(e) if e.name().as_ref() == b"p" => {
                device.placeholders.push(placeholder_from_attributes(&e)?);
            }
            Event::Start(e) if e.name().as_ref() == b"r" => {
                let mut rendering = rendering_from_attributes(&e)?;
                parse_rendering_children(reader, input, &mut rendering)?;
                device.renderings.push(rendering);
            }
            Event::Empty(e) if e.name().as_ref() == b"r" => {
                device.renderings.push(rendering_from_attributes(&e)?);
            }
            Event::End(e) if e.name().as_ref() == b"d" => return Ok(()),
            Event::Eof => {
                return Err(RewriteError::MalformedLayout(
                    "unterminated <d> element".into(),
                ))
            }
            other => return Err(unexpected(&other)),
        }
    }
}

fn parse_rendering_children(
    reader: &mut Reader<&[u8]>,
    input: &str,
    rendering: &mut Rendering,
) -> Result<(), RewriteError> {
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Comment(_) => {}
            Event::Start(e) if e.name().as_ref() == b"rls" => {
                if rendering.rules.is_some() {
                    return Err(RewriteError::MalformedLayout(
                        "duplicate <rls> element on rendering".into(),
                    ));
                }
                let open = raw_start_tag(&e)?;
                let span = reader.read_to_end(e.name()).map_err(xml_err)?;
                rendering.rules = Some(format!("{}>{}</rls>", open, &input[span]));
            }
            Event::Empty(e) if e.name().as_ref() == b"rls" => {
                if rendering.rules.is_some() {
                    return Err(RewriteError::MalformedLayout(
                        "duplicate <rls> element on rendering".into(),
                    ));
                }
                rendering.rules = Some(format!("{}/>", raw_start_tag(&e)?));
            }
            Event::End(e) if e.name().as_ref() == b"r" => return Ok(()),
            Event::Eof => {
                return Err(RewriteError::MalformedLayout(
                    "unterminated rendering element".into(),
                ))
            }
            other => return Err(unexpected(&other)),
        }
    }
}

/// Rebuild the opening tag of a captured element, without the closing `>`.
/// Attribute values are kept in their raw escaped form so the blob
/// round-trips without re-escaping.
fn raw_start_tag(e: &BytesStart) -> Result<String, RewriteError> {
    let mut tag = format!("<{}", String::from_utf8_lossy(e.name().as_ref()));
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        tag.push(' ');
        tag.push_str(&String::from_utf8_lossy(attr.key.as_ref()));
        tag.push_str("=\"");
        tag.push_str(&String::from_utf8_lossy(&attr.value));
        tag.push('"');
    }
    Ok(tag)
}

fn reject_attributes(e: &BytesStart, element: &str) -> Result<(), RewriteError> {
    if let Some(attr) = e.attributes().next() {
        let attr = attr.map_err(xml_err)?;
        return Err(unknown_attribute(element, attr.key.as_ref()));
    }
    Ok(())
}

fn device_from_attributes(e: &BytesStart) -> Result<Device, RewriteError> {
    let mut device = Device::default();
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        match attr.key.as_ref() {
            b"id" => device.id = value,
            b"l" => device.layout = some_nonempty(value),
            other => return Err(unknown_attribute("d", other)),
        }
    }
    Ok(device)
}

fn placeholder_from_attributes(e: &BytesStart) -> Result<Placeholder, RewriteError> {
    let mut placeholder = Placeholder::default();
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        match attr.key.as_ref() {
            b"key" => placeholder.key = some_nonempty(value),
            b"md" => placeholder.metadata = value,
            b"uid" => placeholder.unique_id = some_nonempty(value),
            other => return Err(unknown_attribute("p", other)),
        }
    }
    Ok(placeholder)
}

fn rendering_from_attributes(e: &BytesStart) -> Result<Rendering, RewriteError> {
    let mut rendering = Rendering::default();
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        match attr.key.as_ref() {
            b"id" => rendering.item = some_nonempty(value),
            b"uid" => rendering.unique_id = some_nonempty(value),
            b"ph" => rendering.placeholder = some_nonempty(value),
            b"ds" => rendering.datasource = value,
            b"par" => rendering.parameters = value,
            b"mvt" => rendering.multivariate_test = some_nonempty(value),
            other => return Err(unknown_attribute("r", other)),
        }
    }
    Ok(rendering)
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Serialize a layout document back to its wire form.
pub fn serialize(document: &LayoutDocument) -> Result<String, RewriteError> {
    let mut writer = Writer::new(Vec::new());
    if document.devices.is_empty() {
        writer
            .write_event(Event::Empty(BytesStart::new("r")))
            .map_err(xml_err)?;
    } else {
        writer
            .write_event(Event::Start(BytesStart::new("r")))
            .map_err(xml_err)?;
        for device in &document.devices {
            write_device(&mut writer, device)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("r")))
            .map_err(xml_err)?;
    }
    String::from_utf8(writer.into_inner()).map_err(xml_err)
}

fn write_device(writer: &mut Writer<Vec<u8>>, device: &Device) -> Result<(), RewriteError> {
    let mut start = BytesStart::new("d");
    start.push_attribute(("id", device.id.as_str()));
    if let Some(layout) = &device.layout {
        start.push_attribute(("l", layout.as_str()));
    }
    if device.placeholders.is_empty() && device.renderings.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(xml_err)?;
        return Ok(());
    }
    writer.write_event(Event::Start(start)).map_err(xml_err)?;
    for placeholder in &device.placeholders {
        write_placeholder(writer, placeholder)?;
    }
    for rendering in &device.renderings {
        write_rendering(writer, rendering)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("d")))
        .map_err(xml_err)
}

fn write_placeholder(
    writer: &mut Writer<Vec<u8>>,
    placeholder: &Placeholder,
) -> Result<(), RewriteError> {
    let mut start = BytesStart::new("p");
    if let Some(key) = &placeholder.key {
        start.push_attribute(("key", key.as_str()));
    }
    if !placeholder.metadata.is_empty() {
        start.push_attribute(("md", placeholder.metadata.as_str()));
    }
    if let Some(unique_id) = &placeholder.unique_id {
        start.push_attribute(("uid", unique_id.as_str()));
    }
    writer.write_event(Event::Empty(start)).map_err(xml_err)
}

fn write_rendering(
    writer: &mut Writer<Vec<u8>>,
    rendering: &Rendering,
) -> Result<(), RewriteError> {
    let mut start = BytesStart::new("r");
    if let Some(item) = &rendering.item {
        start.push_attribute(("id", item.as_str()));
    }
    if let Some(unique_id) = &rendering.unique_id {
        start.push_attribute(("uid", unique_id.as_str()));
    }
    if let Some(placeholder) = &rendering.placeholder {
        start.push_attribute(("ph", placeholder.as_str()));
    }
    if !rendering.datasource.is_empty() {
        start.push_attribute(("ds", rendering.datasource.as_str()));
    }
    if !rendering.parameters.is_empty() {
        start.push_attribute(("par", rendering.parameters.as_str()));
    }
    if let Some(test) = &rendering.multivariate_test {
        start.push_attribute(("mvt", test.as_str()));
    }
    match &rendering.rules {
        None => writer.write_event(Event::Empty(start)).map_err(xml_err),
        Some(rules) => {
            writer.write_event(Event::Start(start)).map_err(xml_err)?;
            copy_raw_xml(writer, rules)?;
            writer
                .write_event(Event::End(BytesEnd::new("r")))
                .map_err(xml_err)
        }
    }
}

/// Stream a raw markup blob into the writer event by event. Malformed blobs
/// fail serialization instead of emitting broken output.
fn copy_raw_xml(writer: &mut Writer<Vec<u8>>, raw: &str) -> Result<(), RewriteError> {
    let mut reader = Reader::from_str(raw);
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Eof => return Ok(()),
            event => writer.write_event(event).map_err(xml_err)?,
        }
    }
}

/// Check that `raw` is a single well-formed element, possibly surrounded by
/// whitespace or comments. Rewritten rules blobs must pass this before they
/// are reinserted into the document.
pub(crate) fn ensure_element(raw: &str) -> Result<(), String> {
    let mut reader = Reader::from_str(raw);
    let mut saw_root = false;
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Comment(_) => {}
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                if !text.trim().is_empty() {
                    return Err("text outside the root element".into());
                }
            }
            Event::Start(e) if !saw_root => {
                reader.read_to_end(e.name()).map_err(|e| e.to_string())?;
                saw_root = true;
            }
            Event::Empty(_) if !saw_root => saw_root = true,
            Event::Eof => {
                return if saw_root {
                    Ok(())
                } else {
                    Err("no root element".into())
                }
            }
            other => return Err(format!("unexpected content: {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = concat!(
        r#"<r><d id="{D1}" l="{L1}">"#,
        r#"<p key="main" md="{MD1}" uid="{U1}"/>"#,
        r#"<r id="{R1}" uid="{U2}" ph="content" ds="/content/home" par="a=1&amp;b=2" mvt="{T1}">"#,
        r#"<rls><ruleset><rule uid="{RU1}"/></ruleset></rls>"#,
        r#"</r>"#,
        r#"<r id="{R2}"/>"#,
        r#"</d><d id="{D2}"/></r>"#,
    );

    // === parsing ===

    #[test]
    fn parses_full_document() {
        let document = parse(FULL).unwrap();
        assert_eq!(document.devices.len(), 2);

        let device = &document.devices[0];
        assert_eq!(device.id, "{D1}");
        assert_eq!(device.layout.as_deref(), Some("{L1}"));
        assert_eq!(device.placeholders.len(), 1);
        assert_eq!(device.renderings.len(), 2);

        let placeholder = &device.placeholders[0];
        assert_eq!(placeholder.key.as_deref(), Some("main"));
        assert_eq!(placeholder.metadata, "{MD1}");
        assert_eq!(placeholder.unique_id.as_deref(), Some("{U1}"));

        let rendering = &device.renderings[0];
        assert_eq!(rendering.item.as_deref(), Some("{R1}"));
        assert_eq!(rendering.placeholder.as_deref(), Some("content"));
        assert_eq!(rendering.datasource, "/content/home");
        assert_eq!(rendering.parameters, "a=1&b=2");
        assert_eq!(rendering.multivariate_test.as_deref(), Some("{T1}"));
        assert_eq!(
            rendering.rules.as_deref(),
            Some("<rls><ruleset><rule uid=\"{RU1}\"/></ruleset></rls>")
        );

        assert_eq!(device.renderings[1].item.as_deref(), Some("{R2}"));
        assert!(device.renderings[1].rules.is_none());

        assert_eq!(document.devices[1].id, "{D2}");
        assert!(document.devices[1].layout.is_none());
    }

    #[test]
    fn parses_empty_root() {
        let document = parse("<r/>").unwrap();
        assert!(document.devices.is_empty());
        let document = parse("<r></r>").unwrap();
        assert!(document.devices.is_empty());
    }

    #[test]
    fn tolerates_declaration_and_whitespace() {
        let document = parse("<?xml version=\"1.0\"?>\n<r>\n  <d id=\"{D1}\"/>\n</r>\n").unwrap();
        assert_eq!(document.devices.len(), 1);
    }

    #[test]
    fn missing_attributes_parse_to_absent_forms() {
        let document = parse(r#"<r><d id="{D1}"><r/></d></r>"#).unwrap();
        let rendering = &document.devices[0].renderings[0];
        assert!(rendering.item.is_none());
        assert!(rendering.datasource.is_empty());
        assert!(rendering.parameters.is_empty());
        assert!(rendering.multivariate_test.is_none());
    }

    #[test]
    fn empty_self_closing_rules_are_captured() {
        let document = parse(r#"<r><d id="{D1}"><r id="{R1}"><rls/></r></d></r>"#).unwrap();
        assert_eq!(
            document.devices[0].renderings[0].rules.as_deref(),
            Some("<rls/>")
        );
    }

    // === rejection ===

    #[test]
    fn rejects_missing_root() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
    }

    #[test]
    fn rejects_unknown_root() {
        assert!(parse("<layout/>").is_err());
    }

    #[test]
    fn rejects_unknown_element_in_device() {
        assert!(parse(r#"<r><d id="{D1}"><widget/></d></r>"#).is_err());
    }

    #[test]
    fn rejects_unknown_attribute() {
        assert!(parse(r#"<r><d id="{D1}" cache="1"/></r>"#).is_err());
    }

    #[test]
    fn rejects_stray_text() {
        assert!(parse(r#"<r><d id="{D1}">text</d></r>"#).is_err());
    }

    #[test]
    fn rejects_unterminated_document() {
        assert!(parse(r#"<r><d id="{D1}">"#).is_err());
    }

    #[test]
    fn rejects_duplicate_rules() {
        assert!(parse(r#"<r><d id="{D1}"><r id="{R1}"><rls/><rls/></r></d></r>"#).is_err());
    }

    // === round-trip ===

    #[test]
    fn round_trip_preserves_model() {
        let document = parse(FULL).unwrap();
        let serialized = serialize(&document).unwrap();
        let reparsed = parse(&serialized).unwrap();
        assert_eq!(document, reparsed, "serialized form was {}", serialized);
    }

    #[test]
    fn escaped_attribute_values_round_trip() {
        let input = r#"<r><d id="{D1}"><r id="{R1}" ds="/content/a &amp; b"/></d></r>"#;
        let document = parse(input).unwrap();
        assert_eq!(document.devices[0].renderings[0].datasource, "/content/a & b");
        let reparsed = parse(&serialize(&document).unwrap()).unwrap();
        assert_eq!(document, reparsed);
    }

    #[test]
    fn childless_device_serializes_self_closing() {
        let document = parse(r#"<r><d id="{D1}"></d></r>"#).unwrap();
        assert_eq!(serialize(&document).unwrap(), r#"<r><d id="{D1}"/></r>"#);
    }

    #[test]
    fn rules_text_content_round_trips() {
        let input = concat!(
            r#"<r><d id="{D1}"><r id="{R1}">"#,
            r#"<rls><ruleset><rule>when the &lt;thing&gt; is set</rule></ruleset></rls>"#,
            r#"</r></d></r>"#,
        );
        let document = parse(input).unwrap();
        let reparsed = parse(&serialize(&document).unwrap()).unwrap();
        assert_eq!(document, reparsed);
    }

    // === ensure_element ===

    #[test]
    fn ensure_element_accepts_single_element() {
        assert!(ensure_element("<rls><ruleset/></rls>").is_ok());
        assert!(ensure_element("  <rls/>  ").is_ok());
    }

    #[test]
    fn ensure_element_rejects_broken_markup() {
        assert!(ensure_element("<rls>").is_err());
        assert!(ensure_element("").is_err());
        assert!(ensure_element("no markup").is_err());
        assert!(ensure_element("<a/><b/>").is_err());
    }
}
