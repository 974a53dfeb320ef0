//! Match highlighting for search and grep output.
//!
//! Two extractors locate spans to mark: [`WholeFieldHighlighter`] re-runs a
//! field's analyzer over the full rendered text and marks tokens that match
//! the parsed query, and [`GrepMatcher`] marks regex matches. Both never
//! truncate the text. A [`HighlightRenderer`] decides how a span is marked.

use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use tantivy::query::Query;
use tantivy::schema::Field;
use tantivy::tokenizer::{TextAnalyzer, TokenStream};
use tantivy::Index;

use crate::error::Result;

/// Wraps one matched span for display.
pub trait HighlightRenderer: Send + Sync {
    fn render(&self, matched: &str) -> String;
}

/// Bright green ANSI escape.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnsiHighlight;

impl HighlightRenderer for AnsiHighlight {
    fn render(&self, matched: &str) -> String {
        format!("\x1b[92m{matched}\x1b[0m")
    }
}

/// Marks every token of a text that the query matches in one field.
pub struct WholeFieldHighlighter {
    analyzer: TextAnalyzer,
    terms: HashSet<String>,
}

impl WholeFieldHighlighter {
    pub fn new(index: &Index, query: &dyn Query, field: Field) -> Result<Self> {
        let analyzer = index.tokenizer_for_field(field)?;
        let mut terms = HashSet::new();
        query.query_terms(&mut |term: &tantivy::Term, _| {
            if term.field() == field {
                if let Ok(text) = std::str::from_utf8(term.serialized_value_bytes()) {
                    terms.insert(text.to_string());
                }
            }
        });
        Ok(Self { analyzer, terms })
    }

    /// The highlighted text, or `None` when no token matched.
    pub fn highlight(&mut self, text: &str, renderer: &dyn HighlightRenderer) -> Option<String> {
        if self.terms.is_empty() {
            return None;
        }

        let mut spans = Vec::new();
        let mut stream = self.analyzer.token_stream(text);
        while stream.advance() {
            let token = stream.token();
            if self.terms.contains(&token.text) {
                spans.push((token.offset_from, token.offset_to));
            }
        }
        if spans.is_empty() {
            return None;
        }

        let mut out = String::with_capacity(text.len() + spans.len() * 10);
        let mut cursor = 0;
        for (from, to) in spans {
            if from < cursor || !text.is_char_boundary(from) || !text.is_char_boundary(to) {
                continue;
            }
            out.push_str(&text[cursor..from]);
            out.push_str(&renderer.render(&text[from..to]));
            cursor = to;
        }
        out.push_str(&text[cursor..]);
        Some(out)
    }
}

/// A caller-supplied pattern that filters and highlights dump output.
#[derive(Debug, Clone)]
pub struct GrepMatcher {
    regex: Regex,
}

impl GrepMatcher {
    pub fn new(pattern: &str, ignore_case: bool) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(ignore_case)
            .build()?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Highlight every match in place, or `None` when there is no match.
    pub fn apply(&self, text: &str, renderer: &dyn HighlightRenderer) -> Option<String> {
        if !self.regex.is_match(text) {
            return None;
        }
        let out = self
            .regex
            .replace_all(text, |caps: &regex::Captures<'_>| renderer.render(&caps[0]));
        Some(out.into_owned())
    }
}
