//! Full-text index over issue projections.
//!
//! The schema is fixed:
//!
//! | Field | Kind |
//! |-------|------|
//! | `key` | exact term, stored, unique per document |
//! | `assignee`, `reporter`, `status` | exact term, stored |
//! | `summary`, `description`, `comments_str` | analyzed text (language stemmer) |
//! | `labels`, `components` | whitespace keywords, case-folded, stored |
//!
//! `summary` gets a 2× boost at query time (see [`search`](crate::search)).
//! Analyzed text is not stored; hits are resolved back to the ticket store.
//!
//! Every supported language analyzer is registered on open, so an index
//! created with one language can always be reopened and queried.

use std::path::Path;
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING,
};
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer,
    WhitespaceTokenizer,
};
use tantivy::{Index, IndexReader, IndexWriter, TantivyDocument, Term};

use crate::error::{Error, Result};
use crate::models::IndexedDocument;

/// Directory of the index inside the index directory root.
pub const INDEX_DIR_NAME: &str = "index";
pub const DEFAULT_LANGUAGE: &str = "en";

const KEYWORD_TOKENIZER: &str = "issue_keyword";
const TEXT_TOKENIZER_PREFIX: &str = "issue_text_";
const MAX_TOKEN_LENGTH: usize = 40;
const WRITER_MEMORY_BYTES: usize = 50_000_000;

/// Supported analyzer languages by ISO code.
pub const LANGUAGES: [(&str, Language); 18] = [
    ("ar", Language::Arabic),
    ("da", Language::Danish),
    ("de", Language::German),
    ("el", Language::Greek),
    ("en", Language::English),
    ("es", Language::Spanish),
    ("fi", Language::Finnish),
    ("fr", Language::French),
    ("hu", Language::Hungarian),
    ("it", Language::Italian),
    ("nl", Language::Dutch),
    ("no", Language::Norwegian),
    ("pt", Language::Portuguese),
    ("ro", Language::Romanian),
    ("ru", Language::Russian),
    ("sv", Language::Swedish),
    ("ta", Language::Tamil),
    ("tr", Language::Turkish),
];

pub fn is_supported_language(code: &str) -> bool {
    LANGUAGES.iter().any(|(c, _)| *c == code)
}

fn text_tokenizer_name(code: &str) -> String {
    format!("{TEXT_TOKENIZER_PREFIX}{code}")
}

/// Field handles of the issue schema. [`Field`] is `Copy`.
#[derive(Debug, Clone, Copy)]
pub struct IssueFields {
    pub key: Field,
    pub assignee: Field,
    pub reporter: Field,
    pub status: Field,
    pub summary: Field,
    pub description: Field,
    pub comments_str: Field,
    pub labels: Field,
    pub components: Field,
}

impl IssueFields {
    fn resolve(schema: &Schema) -> Result<Self> {
        let field = |name: &str| schema.get_field(name).map_err(Error::Index);
        Ok(Self {
            key: field("key")?,
            assignee: field("assignee")?,
            reporter: field("reporter")?,
            status: field("status")?,
            summary: field("summary")?,
            description: field("description")?,
            comments_str: field("comments_str")?,
            labels: field("labels")?,
            components: field("components")?,
        })
    }
}

/// Build the issue schema with analyzed text fields in `language`.
pub fn build_schema(language: &str) -> Result<Schema> {
    if !is_supported_language(language) {
        return Err(Error::UnsupportedLanguage(language.to_string()));
    }

    let text = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(&text_tokenizer_name(language))
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let keyword = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(KEYWORD_TOKENIZER)
                .set_index_option(IndexRecordOption::Basic),
        )
        .set_stored();

    let mut b = Schema::builder();
    b.add_text_field("key", STRING | STORED);
    b.add_text_field("assignee", STRING | STORED);
    b.add_text_field("reporter", STRING | STORED);
    b.add_text_field("status", STRING | STORED);
    b.add_text_field("summary", text.clone());
    b.add_text_field("description", text.clone());
    b.add_text_field("comments_str", text);
    b.add_text_field("labels", keyword.clone());
    b.add_text_field("components", keyword);
    Ok(b.build())
}

/// Register the keyword analyzer and one text analyzer per language.
pub fn register_tokenizers(index: &Index) {
    let tokenizers = index.tokenizers();
    for (code, language) in LANGUAGES {
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LENGTH))
            .filter(LowerCaser)
            .filter(Stemmer::new(language))
            .build();
        tokenizers.register(&text_tokenizer_name(code), analyzer);
    }

    let keyword = TextAnalyzer::builder(WhitespaceTokenizer::default())
        .filter(LowerCaser)
        .build();
    tokenizers.register(KEYWORD_TOKENIZER, keyword);
}

/// An opened on-disk issue index.
pub struct IssueIndex {
    index: Index,
    fields: IssueFields,
    reader: IndexReader,
}

impl IssueIndex {
    /// Open the index in `dir`, creating it with `language` analyzers if the
    /// directory holds no index yet.
    pub fn open_or_create(dir: &Path, language: &str) -> Result<Self> {
        let index = if dir.join("meta.json").exists() {
            Index::open_in_dir(dir)?
        } else {
            std::fs::create_dir_all(dir)?;
            tracing::info!(dir = %dir.display(), language, "creating search index");
            Index::create_in_dir(dir, build_schema(language)?)?
        };
        Self::from_index(index)
    }

    /// An index held in memory only.
    pub fn in_memory(language: &str) -> Result<Self> {
        Self::from_index(Index::create_in_ram(build_schema(language)?))
    }

    fn from_index(index: Index) -> Result<Self> {
        register_tokenizers(&index);
        let fields = IssueFields::resolve(&index.schema())?;
        let reader = index.reader()?;
        Ok(Self {
            index,
            fields,
            reader,
        })
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn fields(&self) -> IssueFields {
        self.fields
    }

    /// A searcher over the latest commit.
    pub fn searcher(&self) -> Result<tantivy::Searcher> {
        self.reader.reload()?;
        Ok(self.reader.searcher())
    }

    pub fn num_docs(&self) -> Result<u64> {
        Ok(self.searcher()?.num_docs())
    }

    /// The single writer of one sync run.
    pub fn writer(&self) -> Result<IssueIndexWriter> {
        let writer = self.index.writer_with_num_threads(1, WRITER_MEMORY_BYTES)?;
        Ok(IssueIndexWriter {
            writer,
            index: self.index.clone(),
            fields: self.fields,
            pending: 0,
        })
    }
}

pub struct IssueIndexWriter {
    writer: IndexWriter,
    index: Index,
    fields: IssueFields,
    pending: u64,
}

impl IssueIndexWriter {
    /// Replace whatever document is indexed under `doc.key`.
    pub fn sync(&mut self, doc: &IndexedDocument) -> Result<()> {
        let f = &self.fields;
        self.writer
            .delete_term(Term::from_field_text(f.key, &doc.key));

        let mut out = TantivyDocument::default();
        out.add_text(f.key, &doc.key);
        out.add_text(f.assignee, &doc.assignee);
        out.add_text(f.reporter, &doc.reporter);
        out.add_text(f.status, &doc.status);
        out.add_text(f.summary, &doc.summary);
        out.add_text(f.description, &doc.description);
        out.add_text(f.comments_str, &doc.comments_str);
        out.add_text(f.labels, &doc.labels);
        out.add_text(f.components, &doc.components);
        self.writer.add_document(out)?;
        self.pending += 1;
        Ok(())
    }

    /// Documents written since the writer was opened.
    pub fn pending(&self) -> u64 {
        self.pending
    }

    /// Commit every pending write, then optionally merge all segments into one.
    pub fn commit(mut self, optimize: bool) -> Result<u64> {
        self.writer.commit()?;
        if optimize {
            let segments = self.index.searchable_segment_ids()?;
            if segments.len() > 1 {
                tracing::info!(segments = segments.len(), "merging index segments");
                self.writer.merge(&segments).wait()?;
            }
        }
        let pending = self.pending;
        self.writer.wait_merging_threads()?;
        Ok(pending)
    }

    /// Drop every write since the last commit.
    pub fn rollback(mut self) -> Result<()> {
        self.writer.rollback()?;
        Ok(())
    }
}
