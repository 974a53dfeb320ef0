//! Issue document model.
//!
//! A pure projection over one [`RawIssue`]: it never mutates the record and
//! never touches the store or the index. Two views are produced:
//!
//! - [`Issue::to_document`] gives the [`IndexedDocument`] written to the index.
//! - [`Issue::to_display_text`] gives the text block printed by search and dump:
//!
//! ```text
//! KEY (STATUS) [REPORTER -> ASSIGNEE] SUMMARY
//! <description>            (optional)
//! <comment transcript>     (optional)
//! ```

use serde_json::Value;
use thiserror::Error;

use crate::models::{as_sequence, IndexedDocument, RawIssue};

/// Malformed or missing data in a single issue record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("missing field `{path}`")]
    Missing { path: &'static str },
    #[error("field `{path}` is not text")]
    NotText { path: &'static str },
}

/// Borrowing view over a raw issue record.
#[derive(Debug, Clone, Copy)]
pub struct Issue<'a> {
    data: &'a RawIssue,
}

impl<'a> Issue<'a> {
    pub fn new(data: &'a RawIssue) -> Self {
        Self { data }
    }

    pub fn key(&self) -> Result<String, ProjectionError> {
        nested_text(self.data, "key", "#text", "key/#text")
    }

    pub fn assignee(&self) -> Result<String, ProjectionError> {
        nested_text(self.data, "assignee", "@username", "assignee/@username")
    }

    pub fn reporter(&self) -> Result<String, ProjectionError> {
        nested_text(self.data, "reporter", "@username", "reporter/@username")
    }

    pub fn status(&self) -> Result<String, ProjectionError> {
        nested_text(self.data, "status", "#text", "status/#text")
    }

    pub fn summary(&self) -> Result<String, ProjectionError> {
        match self.data.get("summary") {
            None => Err(ProjectionError::Missing { path: "summary" }),
            Some(Value::Null) => Ok(String::new()),
            Some(v) => scalar_text(v).ok_or(ProjectionError::NotText { path: "summary" }),
        }
    }

    /// Description HTML; an empty element yields `None`.
    pub fn description(&self) -> Result<Option<String>, ProjectionError> {
        match self.data.get("description") {
            None => Err(ProjectionError::Missing {
                path: "description",
            }),
            Some(Value::Null) => Ok(None),
            Some(v) => scalar_text(v)
                .map(Some)
                .ok_or(ProjectionError::NotText {
                    path: "description",
                }),
        }
    }

    pub fn labels(&self) -> Result<Vec<String>, ProjectionError> {
        let labels = self.data.get("labels").and_then(|l| l.get("label"));
        texts(as_sequence(labels), "labels/label")
    }

    pub fn components(&self) -> Result<Vec<String>, ProjectionError> {
        texts(as_sequence(self.data.get("component")), "component")
    }

    /// Newline-joined `"<created> <author>: <text>"` lines, or an empty
    /// string when the issue has no comments.
    pub fn comments_str(&self) -> Result<String, ProjectionError> {
        let comments = self.data.get("comments").and_then(|c| c.get("comment"));
        let mut lines = Vec::new();
        for comment in as_sequence(comments) {
            let created = attribute(comment, "@created", "comments/comment/@created")?;
            let author = attribute(comment, "@author", "comments/comment/@author")?;
            let text = match comment {
                Value::Object(fields) => fields.get("#text").and_then(scalar_text),
                other => scalar_text(other),
            }
            .unwrap_or_default();
            lines.push(format!("{created} {author}: {text}"));
        }
        Ok(lines.join("\n"))
    }

    pub fn to_document(&self) -> Result<IndexedDocument, ProjectionError> {
        Ok(IndexedDocument {
            key: self.key()?,
            assignee: self.assignee()?,
            reporter: self.reporter()?,
            status: self.status()?,
            summary: self.summary()?,
            description: self.description()?.unwrap_or_default(),
            comments_str: self.comments_str()?,
            labels: self.labels()?.join(" "),
            components: self.components()?.join(" "),
        })
    }

    pub fn to_display_text(
        &self,
        include_description: bool,
        include_comments: bool,
    ) -> Result<String, ProjectionError> {
        let mut parts = vec![format!(
            "{} ({}) [{} -> {}] {}",
            self.key()?,
            self.status()?,
            self.reporter()?,
            self.assignee()?,
            self.summary()?
        )];
        if include_description {
            parts.push(self.description()?.unwrap_or_default());
        }
        if include_comments {
            parts.push(self.comments_str()?);
        }
        Ok(parts.join("\n"))
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn nested_text(
    data: &Value,
    field: &str,
    inner: &str,
    path: &'static str,
) -> Result<String, ProjectionError> {
    let node = data.get(field).ok_or(ProjectionError::Missing { path })?;
    match node {
        Value::Object(fields) => fields
            .get(inner)
            .ok_or(ProjectionError::Missing { path })
            .and_then(|v| scalar_text(v).ok_or(ProjectionError::NotText { path })),
        _ => Err(ProjectionError::Missing { path }),
    }
}

fn attribute(value: &Value, name: &str, path: &'static str) -> Result<String, ProjectionError> {
    value
        .get(name)
        .ok_or(ProjectionError::Missing { path })
        .and_then(|v| scalar_text(v).ok_or(ProjectionError::NotText { path }))
}

fn texts(values: Vec<&Value>, path: &'static str) -> Result<Vec<String>, ProjectionError> {
    values
        .into_iter()
        .map(|v| match v {
            Value::Object(fields) => fields.get("#text").and_then(scalar_text),
            other => scalar_text(other),
        })
        .map(|t| t.ok_or(ProjectionError::NotText { path }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "key": {"@id": "1", "#text": "PROJ-7"},
            "assignee": {"@username": "alice", "#text": "Alice"},
            "reporter": {"@username": "bob", "#text": "Bob"},
            "status": {"@id": "3", "#text": "In Progress"},
            "summary": "Login fails",
            "description": "<p>Stack trace</p>",
            "labels": {"label": ["auth", "Backend"]},
            "component": ["Web", "API"],
            "comments": {"comment": [
                {"@created": "Mon, 4 Mar 2019 10:20:30 +0300", "@author": "carol", "#text": "Repro'd"},
                {"@created": "Tue, 5 Mar 2019 11:00:00 +0300", "@author": "dave", "#text": "Fixed"}
            ]}
        })
    }

    #[test]
    fn document_projection() {
        let raw = sample();
        let doc = Issue::new(&raw).to_document().unwrap();
        assert_eq!(doc.key, "PROJ-7");
        assert_eq!(doc.assignee, "alice");
        assert_eq!(doc.reporter, "bob");
        assert_eq!(doc.status, "In Progress");
        assert_eq!(doc.labels, "auth Backend");
        assert_eq!(doc.components, "Web API");
        assert_eq!(
            doc.comments_str,
            "Mon, 4 Mar 2019 10:20:30 +0300 carol: Repro'd\nTue, 5 Mar 2019 11:00:00 +0300 dave: Fixed"
        );
    }

    #[test]
    fn missing_labels_and_components_are_empty() {
        let mut raw = sample();
        let obj = raw.as_object_mut().unwrap();
        obj.remove("labels");
        obj.remove("component");
        obj.remove("comments");
        let issue = Issue::new(&raw);
        assert!(issue.labels().unwrap().is_empty());
        assert!(issue.components().unwrap().is_empty());
        assert_eq!(issue.comments_str().unwrap(), "");

        let doc = issue.to_document().unwrap();
        assert_eq!(doc.labels, "");
        assert_eq!(doc.components, "");
    }

    #[test]
    fn unwrapped_singletons_project_like_lists() {
        let comment = json!({"@created": "Mon, 4 Mar 2019 10:20:30 +0300", "@author": "carol", "#text": "Only one"});
        let mut wrapped = sample();
        wrapped["comments"] = json!({"comment": [comment.clone()]});
        wrapped["labels"] = json!({"label": ["solo"]});
        wrapped["component"] = json!(["Web"]);
        let mut bare = sample();
        bare["comments"] = json!({"comment": comment});
        bare["labels"] = json!({"label": "solo"});
        bare["component"] = json!("Web");

        assert_eq!(
            Issue::new(&wrapped).to_document().unwrap(),
            Issue::new(&bare).to_document().unwrap()
        );
    }

    #[test]
    fn display_text_variants() {
        let raw = sample();
        let issue = Issue::new(&raw);
        let header = "PROJ-7 (In Progress) [bob -> alice] Login fails";
        assert_eq!(issue.to_display_text(false, false).unwrap(), header);
        assert_eq!(
            issue.to_display_text(true, false).unwrap(),
            format!("{header}\n<p>Stack trace</p>")
        );
        let full = issue.to_display_text(true, true).unwrap();
        assert!(full.starts_with(header));
        assert!(full.ends_with("dave: Fixed"));
    }

    #[test]
    fn empty_description_renders_blank() {
        let mut raw = sample();
        raw["description"] = Value::Null;
        let issue = Issue::new(&raw);
        assert_eq!(issue.description().unwrap(), None);
        assert_eq!(
            issue.to_display_text(true, false).unwrap(),
            "PROJ-7 (In Progress) [bob -> alice] Login fails\n"
        );
    }

    #[test]
    fn missing_reporter_is_projection_error() {
        let mut raw = sample();
        raw.as_object_mut().unwrap().remove("reporter");
        let err = Issue::new(&raw).to_document().unwrap_err();
        assert_eq!(
            err,
            ProjectionError::Missing {
                path: "reporter/@username"
            }
        );
    }

    #[test]
    fn structured_summary_is_not_text() {
        let mut raw = sample();
        raw["summary"] = json!({"nested": true});
        assert_eq!(
            Issue::new(&raw).summary().unwrap_err(),
            ProjectionError::NotText { path: "summary" }
        );
    }
}
