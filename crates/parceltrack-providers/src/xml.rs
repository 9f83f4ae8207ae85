//! Shared XML helpers for carrier payloads.
//!
//! Carrier XML arrives with and without namespaces, so element matching is
//! done on local names over the streaming reader. The helpers here cover the
//! simple lookups; adapters with structured lists run their own event loops.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

/// Extracts the local name from a potentially namespaced element name.
pub(crate) fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Returns the text content of the first element with the given local name,
/// wherever it appears in the document.
pub(crate) fn first_text(xml: &str, element: &str) -> Option<String> {
    scan_text(xml, None, element)
}

/// Returns the text content of the first `inner` element that appears inside
/// an `outer` element (e.g. the error description under a message node).
pub(crate) fn nested_text(xml: &str, outer: &str, inner: &str) -> Option<String> {
    scan_text(xml, Some(outer), inner)
}

fn scan_text(xml: &str, outer: Option<&str>, inner: &str) -> Option<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_outer = outer.is_none();
    let mut in_inner = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let local = local_name(&name);
                if Some(local) == outer {
                    in_outer = true;
                } else if in_outer && local == inner {
                    in_inner = true;
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let local = local_name(&name);
                if Some(local) == outer {
                    in_outer = false;
                } else if local == inner {
                    in_inner = false;
                }
            }
            Ok(Event::Text(e)) if in_inner => {
                return Some(e.unescape().unwrap_or_default().to_string());
            }
            Ok(Event::CData(e)) if in_inner => {
                return Some(String::from_utf8_lossy(&e).to_string());
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

/// Collects the text content of every element with the given local name, in
/// document order.
pub(crate) fn collect_texts(xml: &str, element: &str) -> Vec<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut texts = Vec::new();
    let mut in_target = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                in_target = local_name(&name) == element;
            }
            Ok(Event::End(_)) => {
                in_target = false;
            }
            Ok(Event::Text(e)) if in_target => {
                texts.push(e.unescape().unwrap_or_default().to_string());
            }
            Ok(Event::CData(e)) if in_target => {
                texts.push(String::from_utf8_lossy(&e).to_string());
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    texts
}

/// Helper to write an element containing only text.
pub(crate) fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, text: &str) {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .unwrap();
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .unwrap();
}
