//! Decoding of the XML search-request view into issue records.
//!
//! The payload is converted into a nested JSON value using the usual
//! XML-to-mapping conventions:
//!
//! | XML | Value |
//! |-----|-------|
//! | `<a>text</a>` | `"a": "text"` |
//! | `<a x="1">text</a>` | `"a": {"@x": "1", "#text": "text"}` |
//! | `<a/>` | `"a": null` |
//! | repeated `<a>` siblings | `"a": [..]` |
//!
//! A lone element is therefore never wrapped in a list. That quirk is undone
//! here, once, for every field known to be a sequence.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::{as_sequence, wrap_sequence, RawIssue, SearchPage};

/// Issue fields that hold a list of child elements, as `(parent, child)`.
/// An empty child name means the repeated element sits directly on the issue.
const SEQUENCE_FIELDS: &[(&str, &str)] = &[
    ("labels", "label"),
    ("comments", "comment"),
    ("component", ""),
];

struct Frame {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            fields: Map::new(),
            text: String::new(),
        }
    }

    fn open(element: &BytesStart<'_>) -> Result<Self> {
        let mut frame = Self::new(String::from_utf8_lossy(element.name().as_ref()).into_owned());
        for attr in element.attributes() {
            let attr = attr.map_err(|e| Error::Payload(format!("bad attribute: {e}")))?;
            let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
            let value = attr
                .unescape_value()
                .map_err(|e| Error::Payload(format!("bad attribute value: {e}")))?;
            frame.fields.insert(key, Value::String(value.into_owned()));
        }
        Ok(frame)
    }

    fn finish(mut self) -> (String, Value) {
        let value = if self.fields.is_empty() {
            if self.text.is_empty() {
                Value::Null
            } else {
                Value::String(self.text)
            }
        } else {
            if !self.text.is_empty() {
                self.fields.insert("#text".to_string(), Value::String(self.text));
            }
            Value::Object(self.fields)
        };
        (self.name, value)
    }
}

fn insert_child(fields: &mut Map<String, Value>, name: String, value: Value) {
    match fields.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            fields.insert(name, value);
        }
    }
}

/// Decode an XML document into a nested value rooted at the document element.
pub fn to_value(xml: &str) -> Result<Value> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack = vec![Frame::new(String::new())];
    loop {
        let event = reader.read_event().map_err(|e| {
            Error::Payload(format!("xml error at {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(e) => stack.push(Frame::open(&e)?),
            Event::Empty(e) => {
                let (name, value) = Frame::open(&e)?.finish();
                if let Some(parent) = stack.last_mut() {
                    insert_child(&mut parent.fields, name, value);
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(Error::Payload("unbalanced closing tag".to_string()));
                }
                if let Some(frame) = stack.pop() {
                    let (name, value) = frame.finish();
                    if let Some(parent) = stack.last_mut() {
                        insert_child(&mut parent.fields, name, value);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(Error::Payload("unexpected end of document".to_string()));
    }
    let root = stack.pop().map(|f| f.fields).unwrap_or_default();
    Ok(Value::Object(root))
}

/// Rewrite every known sequence field of one issue as a list.
pub fn normalize_issue(issue: &mut RawIssue) {
    for (parent, child) in SEQUENCE_FIELDS {
        let Some(slot) = issue.get_mut(*parent) else {
            continue;
        };
        if child.is_empty() {
            wrap_sequence(slot);
        } else if let Some(inner) = slot.get_mut(*child) {
            wrap_sequence(inner);
        }
    }
}

/// Parse one page of `SearchRequest.xml` into its total count and issues.
pub fn parse_search_response(body: &str) -> Result<SearchPage> {
    let doc = to_value(body)?;
    let channel = doc
        .pointer("/rss/channel")
        .ok_or_else(|| Error::Payload("missing rss/channel element".to_string()))?;

    let total = match channel.pointer("/issue/@total") {
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::Payload(format!("invalid total count: {s:?}")))?,
        _ => return Err(Error::Payload("missing issue@total attribute".to_string())),
    };

    let issues = as_sequence(channel.get("item"))
        .into_iter()
        .cloned()
        .map(|mut issue| {
            normalize_issue(&mut issue);
            issue
        })
        .collect();

    Ok(SearchPage { total, issues })
}
