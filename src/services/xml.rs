use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::XmlError;

const UTF8_BOM: &str = "\u{feff}";

/// Text content of the first `<tag>` element, `None` if there is none
pub fn element_text(xml: &str, tag: &str) -> Result<Option<String>, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut inside = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if !inside && e.name().as_ref() == tag.as_bytes() => inside = true,
            Event::Empty(e) if !inside && e.name().as_ref() == tag.as_bytes() => {
                return Ok(Some(String::new()))
            }
            Event::Text(t) if inside => return Ok(Some(t.unescape()?.into_owned())),
            Event::CData(c) if inside => {
                return Ok(Some(String::from_utf8(c.into_inner().into_owned())?))
            }
            Event::End(_) if inside => return Ok(Some(String::new())),
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Like [`element_text`], but the element must exist
pub fn require_text(xml: &str, tag: &str) -> Result<String, XmlError> {
    element_text(xml, tag)?.ok_or_else(|| XmlError::MissingElement(tag.to_string()))
}

/// Replace the text of the first `<tag>` element, leaving the rest of the
/// document as it was
///
/// A CDATA value stays a CDATA section.
pub fn set_element_text(xml: &str, tag: &str, value: &str) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let body = match xml.strip_prefix(UTF8_BOM) {
        Some(rest) => {
            writer.get_mut().extend_from_slice(UTF8_BOM.as_bytes());
            rest
        }
        None => xml,
    };
    let mut reader = Reader::from_str(body);
    let mut inside = false;
    let mut replaced = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if !replaced && e.name().as_ref() == tag.as_bytes() => {
                inside = true;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if !replaced && e.name().as_ref() == tag.as_bytes() => {
                let end = BytesEnd::new(tag);
                let start = BytesStart::new(tag).with_attributes(e.attributes().flatten());
                writer.write_event(Event::Start(start))?;
                writer.write_event(Event::Text(BytesText::new(value)))?;
                writer.write_event(Event::End(end))?;
                replaced = true;
            }
            Event::Text(_) if inside => {
                writer.write_event(Event::Text(BytesText::new(value)))?;
                inside = false;
                replaced = true;
            }
            Event::CData(_) if inside => {
                writer.write_event(Event::CData(BytesCData::new(value)))?;
                inside = false;
                replaced = true;
            }
            Event::End(e) if inside => {
                writer.write_event(Event::Text(BytesText::new(value)))?;
                writer.write_event(Event::End(e))?;
                inside = false;
                replaced = true;
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    if !replaced {
        return Err(XmlError::MissingElement(tag.to_string()));
    }

    Ok(String::from_utf8(writer.into_inner())?)
}
