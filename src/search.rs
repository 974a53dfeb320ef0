//! Ranked full-text search over the issue index.
//!
//! A query string is parsed against the selected analyzed fields (a match
//! in any of them counts), with `summary` boosted 2×. Hits carry only the
//! stored metadata; the canonical record is always re-read from the
//! [`TicketStore`] before rendering.
//!
//! Query syntax (`AND`, `OR`, `-term`, `"phrases"`, `field:term`) is honored
//! when the text parses. Text that does not parse, such as `file.c:123` or
//! an unbalanced quote, is searched as plain words instead of failing.

use std::io::Write;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{Query, QueryParser};
use tantivy::schema::{Field, Value};
use tantivy::TantivyDocument;

use crate::dump::{render_block, write_block, RenderOptions};
use crate::error::Result;
use crate::highlight::{HighlightRenderer, WholeFieldHighlighter};
use crate::html::HtmlToText;
use crate::index::{IssueFields, IssueIndex};
use crate::store::TicketStore;

pub const DEFAULT_LIMIT: usize = 10;
const SUMMARY_BOOST: f32 = 2.0;

/// Analyzed fields a query may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Summary,
    Description,
    Comments,
}

impl SearchField {
    fn resolve(self, fields: &IssueFields) -> Field {
        match self {
            SearchField::Summary => fields.summary,
            SearchField::Description => fields.description,
            SearchField::Comments => fields.comments_str,
        }
    }
}

/// Fields searched for a given rendering: summary and description, plus the
/// comment transcript when comments are shown.
pub fn default_fields(include_comments: bool) -> Vec<SearchField> {
    let mut fields = vec![SearchField::Summary, SearchField::Description];
    if include_comments {
        fields.push(SearchField::Comments);
    }
    fields
}

/// One ranked hit with its stored fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub key: String,
    pub assignee: String,
    pub reporter: String,
    pub status: String,
    pub labels: String,
    pub components: String,
    pub score: f32,
}

pub struct SearchResults {
    pub query: Box<dyn Query>,
    /// Number of matching documents, before the limit.
    pub total: usize,
    pub hits: Vec<SearchHit>,
}

fn parse_query(parser: &QueryParser, text: &str) -> Box<dyn Query> {
    match parser.parse_query(text) {
        Ok(query) => query,
        Err(err) => {
            tracing::debug!(query = text, error = %err, "query syntax rejected; searching words");
            let words = plain_words(text);
            let (query, errors) = parser.parse_query_lenient(&words);
            for err in errors {
                tracing::debug!(query = %words, error = %err, "query fragment ignored");
            }
            query
        }
    }
}

/// Every character that is neither alphanumeric nor whitespace becomes a
/// space, leaving nothing the query grammar treats as syntax.
fn plain_words(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Run `text` against `fields` and return up to `limit` hits, best first.
pub fn search(
    index: &IssueIndex,
    text: &str,
    fields: &[SearchField],
    limit: usize,
) -> Result<SearchResults> {
    let handles = index.fields();
    let targets: Vec<Field> = fields.iter().map(|f| f.resolve(&handles)).collect();
    let mut parser = QueryParser::for_index(index.index(), targets);
    parser.set_field_boost(handles.summary, SUMMARY_BOOST);
    let query = parse_query(&parser, text);

    if limit == 0 {
        return Ok(SearchResults {
            query,
            total: 0,
            hits: Vec::new(),
        });
    }

    let searcher = index.searcher()?;
    let (top, total) = searcher.search(&query, &(TopDocs::with_limit(limit), Count))?;
    let mut hits = Vec::with_capacity(top.len());
    for (score, address) in top {
        let doc: TantivyDocument = searcher.doc(address)?;
        let stored = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        hits.push(SearchHit {
            key: stored(handles.key),
            assignee: stored(handles.assignee),
            reporter: stored(handles.reporter),
            status: stored(handles.status),
            labels: stored(handles.labels),
            components: stored(handles.components),
            score,
        });
    }
    tracing::debug!(query = text, total, returned = hits.len(), "search finished");

    Ok(SearchResults { query, total, hits })
}

/// Search and print every hit as a rendered block. Returns the number of
/// blocks written.
#[allow(clippy::too_many_arguments)]
pub async fn run_search<W: Write>(
    store: &TicketStore,
    index: &IssueIndex,
    text: &str,
    limit: usize,
    options: &RenderOptions,
    highlight: Option<&dyn HighlightRenderer>,
    html: &dyn HtmlToText,
    out: &mut W,
) -> Result<usize> {
    let fields = default_fields(options.comments);
    let results = search(index, text, &fields, limit)?;
    writeln!(out, "{} results for {:?}", results.total, text)?;

    let mut highlighter = match highlight {
        Some(_) if options.description => Some(WholeFieldHighlighter::new(
            index.index(),
            results.query.as_ref(),
            index.fields().description,
        )?),
        _ => None,
    };

    let mut written = 0;
    for hit in &results.hits {
        let Some(payload) = store.get_by_key(&hit.key).await? else {
            tracing::warn!(key = %hit.key, "indexed issue missing from store");
            continue;
        };
        let mut block = match render_block(&payload, options, html) {
            Ok(block) => block,
            Err(err) => {
                tracing::warn!(key = %hit.key, error = %err, "cannot render issue");
                continue;
            }
        };
        if let (Some(hl), Some(renderer)) = (highlighter.as_mut(), highlight) {
            if let Some(marked) = hl.highlight(&block, renderer) {
                block = marked;
            }
        }
        write_block(out, &block, options)?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexedDocument;

    fn doc(key: &str, summary: &str, description: &str, comments: &str) -> IndexedDocument {
        IndexedDocument {
            key: key.to_string(),
            assignee: "alice".to_string(),
            reporter: "bob".to_string(),
            status: "Open".to_string(),
            summary: summary.to_string(),
            description: description.to_string(),
            comments_str: comments.to_string(),
            labels: "ops".to_string(),
            components: "Core".to_string(),
        }
    }

    fn sample_index() -> IssueIndex {
        let index = IssueIndex::in_memory("en").unwrap();
        let mut writer = index.writer().unwrap();
        writer
            .sync(&doc("PROJ-1", "database timeout", "nothing else", ""))
            .unwrap();
        writer
            .sync(&doc("PROJ-2", "nothing else", "database timeout", ""))
            .unwrap();
        writer
            .sync(&doc("PROJ-3", "unrelated", "unrelated", "seen a deadlock"))
            .unwrap();
        writer.commit(false).unwrap();
        index
    }

    #[test]
    fn summary_match_outranks_description_match() {
        let index = sample_index();
        let results = search(&index, "timeout", &default_fields(false), 10).unwrap();
        assert_eq!(results.total, 2);
        assert_eq!(results.hits[0].key, "PROJ-1");
        assert_eq!(results.hits[1].key, "PROJ-2");
        assert!(results.hits[0].score >= results.hits[1].score);
    }

    #[test]
    fn comments_only_searched_when_selected() {
        let index = sample_index();
        let without = search(&index, "deadlock", &default_fields(false), 10).unwrap();
        assert!(without.hits.is_empty());
        let with = search(&index, "deadlock", &default_fields(true), 10).unwrap();
        assert_eq!(with.hits.len(), 1);
        assert_eq!(with.hits[0].key, "PROJ-3");
    }

    #[test]
    fn hits_carry_stored_fields() {
        let index = sample_index();
        let results = search(&index, "database", &[SearchField::Summary], 10).unwrap();
        let hit = &results.hits[0];
        assert_eq!(hit.key, "PROJ-1");
        assert_eq!(hit.assignee, "alice");
        assert_eq!(hit.status, "Open");
        assert_eq!(hit.labels, "ops");
    }

    #[test]
    fn limit_caps_hits_not_total() {
        let index = sample_index();
        let results = search(&index, "database OR unrelated", &default_fields(false), 1).unwrap();
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.total, 3);
        let none = search(&index, "database", &default_fields(false), 0).unwrap();
        assert!(none.hits.is_empty());
    }

    #[test]
    fn unparseable_text_is_searched_as_words() {
        let index = IssueIndex::in_memory("en").unwrap();
        let mut writer = index.writer().unwrap();
        writer
            .sync(&doc(
                "PROJ-9",
                "Build broken",
                "see http://example.com and file.c:123, linker error (unbalanced",
                "",
            ))
            .unwrap();
        writer.commit(false).unwrap();

        for text in [
            "file.c:123",
            "\"unbalanced",
            "error:",
            "fails (linker",
            "http://example.com",
            "nosuchfield:linker",
        ] {
            let results = search(&index, text, &default_fields(false), 10).unwrap();
            assert_eq!(results.total, 1, "no hit for {text:?}");
            assert_eq!(results.hits[0].key, "PROJ-9");
        }
    }

    #[test]
    fn valid_syntax_is_still_honored() {
        let index = sample_index();
        let results =
            search(&index, "database -summary:timeout", &default_fields(false), 10).unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.hits[0].key, "PROJ-2");
        assert_eq!(plain_words("a:b \"c(d"), "a b  c d");
    }
}
