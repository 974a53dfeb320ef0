//! HTML to plain text for terminal output.

use regex::Regex;
use std::sync::LazyLock;

/// Converts an HTML fragment into readable plain text.
pub trait HtmlToText: Send + Sync {
    fn convert(&self, html: &str) -> String;
}

static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|pre|blockquote|table|ul|ol)\s*>")
        .expect("hardcoded regex is valid")
});
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<li(\s[^>]*)?>").expect("hardcoded regex is valid"));
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("hardcoded regex is valid"));
static NUMERIC_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#(x[0-9A-Fa-f]+|[0-9]+);").expect("hardcoded regex is valid")
});
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*){2,}").expect("hardcoded regex is valid"));

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&mdash;", "\u{2014}"),
    ("&ndash;", "\u{2013}"),
    ("&hellip;", "\u{2026}"),
];

/// Regex-based converter: block tags become line breaks, list items get a
/// `* ` bullet, everything else is dropped and entities are decoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagStripper;

impl HtmlToText for TagStripper {
    fn convert(&self, html: &str) -> String {
        let text = LINE_BREAK.replace_all(html, "\n");
        let text = LIST_ITEM.replace_all(&text, "* ");
        let text = TAG.replace_all(&text, "");
        let text = decode_entities(&text);
        BLANK_LINES.replace_all(&text, "\n\n").into_owned()
    }
}

fn decode_entities(text: &str) -> String {
    let mut out = NUMERIC_ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let digits = &caps[1];
            let code = match digits.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => digits.parse().ok(),
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();
    for (entity, plain) in NAMED_ENTITIES {
        out = out.replace(entity, plain);
    }
    // last, so `&amp;lt;` decodes to `&lt;`
    out.replace("&amp;", "&")
}
