//! Structured body decoders (JSON, XML, YAML).

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::binding::error::BindingError;
use crate::binding::target::BodyEncoding;
use crate::binding::value::FieldValue;

/// Decode a whole body. Form encodings are handled by [`crate::binding::form`].
pub fn decode(encoding: BodyEncoding, body: &[u8]) -> Result<FieldValue, BindingError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(BindingError::malformed(encoding, "body is empty"));
    }
    match encoding {
        BodyEncoding::Json => serde_json::from_slice::<serde_json::Value>(body)
            .map(FieldValue::from)
            .map_err(|e| BindingError::malformed(encoding, e)),
        BodyEncoding::Yaml => serde_yaml::from_slice::<serde_yaml::Value>(body)
            .map(FieldValue::from)
            .map_err(|e| BindingError::malformed(encoding, e)),
        BodyEncoding::Xml => decode_xml(body),
        BodyEncoding::UrlEncoded | BodyEncoding::Multipart => Err(BindingError::malformed(
            encoding,
            "form bodies are not structured documents",
        )),
    }
}

struct Element {
    name: String,
    children: BTreeMap<String, FieldValue>,
    text: String,
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            children: BTreeMap::new(),
            text: String::new(),
        }
    }

    fn into_value(self) -> FieldValue {
        if self.children.is_empty() {
            FieldValue::Text(self.text)
        } else {
            FieldValue::Map(self.children)
        }
    }

    /// Repeated child tags collapse into a list.
    fn add_child(&mut self, name: String, value: FieldValue) {
        match self.children.get_mut(&name) {
            None => {
                self.children.insert(name, value);
            }
            Some(FieldValue::List(items)) => items.push(value),
            Some(existing) => {
                let first = std::mem::replace(existing, FieldValue::Null);
                *existing = FieldValue::List(vec![first, value]);
            }
        }
    }
}

/// The document element's content: a map of its children, or its text.
fn decode_xml(body: &[u8]) -> Result<FieldValue, BindingError> {
    let malformed = |detail: &str| BindingError::malformed(BodyEncoding::Xml, detail);

    let mut reader = Reader::from_reader(body);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<FieldValue> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| BindingError::malformed(BodyEncoding::Xml, e))?;
        match event {
            Event::Start(ref e) => {
                if root.is_some() {
                    return Err(malformed("multiple root elements"));
                }
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                stack.push(Element::new(name));
            }
            Event::Empty(ref e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match stack.last_mut() {
                    Some(parent) => parent.add_child(name, FieldValue::Text(String::new())),
                    None if root.is_none() => root = Some(FieldValue::Text(String::new())),
                    None => return Err(malformed("multiple root elements")),
                }
            }
            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map_err(|e| BindingError::malformed(BodyEncoding::Xml, e))?;
                match stack.last_mut() {
                    Some(current) => current.text.push_str(&text),
                    None => return Err(malformed("text outside the root element")),
                }
            }
            Event::CData(ref e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| malformed("unexpected end tag"))?;
                let name = element.name.clone();
                let value = element.into_value();
                match stack.last_mut() {
                    Some(parent) => parent.add_child(name, value),
                    None => root = Some(value),
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(malformed("unclosed element"));
    }
    root.ok_or_else(|| malformed("no root element"))
}
