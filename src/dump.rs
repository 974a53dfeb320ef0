//! Dump and grep over every stored ticket.
//!
//! Tickets are streamed in store order (shortest key first), rendered as
//! display blocks and optionally filtered through a [`GrepMatcher`], which
//! drops blocks without a match and highlights the rest in place.

use futures::TryStreamExt;
use std::io::Write;

use crate::error::Result;
use crate::highlight::{GrepMatcher, HighlightRenderer};
use crate::html::HtmlToText;
use crate::issue::{Issue, ProjectionError};
use crate::models::RawIssue;
use crate::store::TicketStore;

const SEPARATOR_WIDTH: usize = 80;

/// What goes into one rendered block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub description: bool,
    pub comments: bool,
    /// Keep raw HTML instead of converting it to plain text.
    pub html: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            description: true,
            comments: false,
            html: false,
        }
    }
}

impl RenderOptions {
    /// Header line only.
    pub fn short(html: bool) -> Self {
        Self {
            description: false,
            comments: false,
            html,
        }
    }

    fn separated(&self) -> bool {
        self.description || self.comments
    }
}

/// Render one payload as display text, converted and trimmed.
pub fn render_block(
    payload: &RawIssue,
    options: &RenderOptions,
    html: &dyn HtmlToText,
) -> Result<String, ProjectionError> {
    let text = Issue::new(payload).to_display_text(options.description, options.comments)?;
    let text = if options.html {
        text
    } else {
        html.convert(&text)
    };
    Ok(text.trim().to_string())
}

/// Write a block, followed by a separator line when it has a body.
pub fn write_block<W: Write>(out: &mut W, block: &str, options: &RenderOptions) -> Result<()> {
    writeln!(out, "{block}")?;
    if options.separated() {
        writeln!(out, "{}", "-".repeat(SEPARATOR_WIDTH))?;
    }
    Ok(())
}

/// Print every stored ticket, or with a matcher only those that match.
/// Returns the number of blocks written.
pub async fn dump<W: Write>(
    store: &TicketStore,
    options: &RenderOptions,
    html: &dyn HtmlToText,
    matcher: Option<&GrepMatcher>,
    renderer: &dyn HighlightRenderer,
    out: &mut W,
) -> Result<usize> {
    let mut tickets = store.scan_all();
    let mut written = 0;
    while let Some(ticket) = tickets.try_next().await? {
        let block = match render_block(&ticket.payload, options, html) {
            Ok(block) => block,
            Err(err) => {
                tracing::warn!(key = %ticket.key, error = %err, "cannot render issue");
                continue;
            }
        };
        let block = match matcher {
            Some(m) => match m.apply(&block, renderer) {
                Some(marked) => marked,
                None => continue,
            },
            None => block,
        };
        write_block(out, &block, options)?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::TagStripper;
    use crate::store::DB_FILE_NAME;
    use chrono::NaiveDate;
    use serde_json::json;
    use tempfile::TempDir;

    struct Stars;

    impl HighlightRenderer for Stars {
        fn render(&self, matched: &str) -> String {
            format!("*{matched}*")
        }
    }

    fn payload(key: &str, summary: &str, description: &str) -> RawIssue {
        json!({
            "key": {"#text": key},
            "assignee": {"@username": "alice"},
            "reporter": {"@username": "bob"},
            "status": {"#text": "Open"},
            "summary": summary,
            "description": description,
        })
    }

    async fn store_with(tmp: &TempDir, issues: &[RawIssue]) -> TicketStore {
        let store = TicketStore::open(&tmp.path().join(DB_FILE_NAME)).await.unwrap();
        let when = NaiveDate::from_ymd_opt(2019, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let mut writer = store.begin().await.unwrap();
        for issue in issues {
            let key = issue["key"]["#text"].as_str().unwrap().to_string();
            writer.upsert(&key, when, when, issue).await.unwrap();
        }
        writer.commit().await.unwrap();
        store
    }

    fn lines(out: Vec<u8>) -> Vec<String> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn html_is_converted_unless_kept() {
        let raw = payload("PROJ-1", "Title", "<p>Body &amp; soul</p>");
        let plain = render_block(&raw, &RenderOptions::default(), &TagStripper).unwrap();
        assert_eq!(plain, "PROJ-1 (Open) [bob -> alice] Title\nBody & soul");

        let kept = RenderOptions {
            html: true,
            ..RenderOptions::default()
        };
        let raw_block = render_block(&raw, &kept, &TagStripper).unwrap();
        assert!(raw_block.ends_with("<p>Body &amp; soul</p>"));
    }

    #[tokio::test]
    async fn dump_streams_in_key_order_with_separators() {
        let tmp = TempDir::new().unwrap();
        let store = store_with(
            &tmp,
            &[
                payload("PROJ-10", "ten", "x"),
                payload("PROJ-9", "nine", "y"),
            ],
        )
        .await;

        let mut out = Vec::new();
        let n = dump(
            &store,
            &RenderOptions::default(),
            &TagStripper,
            None,
            &Stars,
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(n, 2);
        let sep = "-".repeat(80);
        assert_eq!(
            lines(out),
            [
                "PROJ-9 (Open) [bob -> alice] nine",
                "y",
                sep.as_str(),
                "PROJ-10 (Open) [bob -> alice] ten",
                "x",
                sep.as_str(),
            ]
        );
    }

    #[tokio::test]
    async fn short_dump_has_no_separator() {
        let tmp = TempDir::new().unwrap();
        let store = store_with(&tmp, &[payload("PROJ-1", "one", "body")]).await;
        let mut out = Vec::new();
        dump(
            &store,
            &RenderOptions::short(false),
            &TagStripper,
            None,
            &Stars,
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(lines(out), ["PROJ-1 (Open) [bob -> alice] one"]);
    }

    #[tokio::test]
    async fn grep_skips_non_matching_and_highlights() {
        let tmp = TempDir::new().unwrap();
        let store = store_with(
            &tmp,
            &[
                payload("PROJ-1", "disk full", "no space left"),
                payload("PROJ-2", "login", "password reset"),
            ],
        )
        .await;
        let matcher = GrepMatcher::new("SPACE", true).unwrap();
        let mut out = Vec::new();
        let n = dump(
            &store,
            &RenderOptions::default(),
            &TagStripper,
            Some(&matcher),
            &Stars,
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(n, 1);
        let lines = lines(out);
        assert_eq!(lines[0], "PROJ-1 (Open) [bob -> alice] disk full");
        assert_eq!(lines[1], "no *space* left");
    }

    #[tokio::test]
    async fn unrenderable_ticket_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let mut broken = payload("PROJ-1", "x", "y");
        broken.as_object_mut().unwrap().remove("status");
        let store = store_with(&tmp, &[broken, payload("PROJ-2", "fine", "z")]).await;
        let mut out = Vec::new();
        let n = dump(
            &store,
            &RenderOptions::short(false),
            &TagStripper,
            None,
            &Stars,
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(n, 1);
        assert_eq!(lines(out), ["PROJ-2 (Open) [bob -> alice] fine"]);
    }
}
