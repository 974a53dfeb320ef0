//! Core data models shared by the fetch, store, index and search stages.

use chrono::NaiveDateTime;
use serde_json::Value;

/// One issue record exactly as decoded from the wire payload.
///
/// Fields are addressed by path (`key/#text`, `assignee/@username`, ...),
/// see [`issue`](crate::issue) for the projection rules.
pub type RawIssue = Value;

/// Format used when timestamps are embedded back into a stored payload.
pub const PAYLOAD_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Persisted mirror of one upstream issue. Exactly one per key.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub key: String,
    pub updated: NaiveDateTime,
    pub created: NaiveDateTime,
    pub payload: RawIssue,
}

/// An issue produced by the fetcher, with its dates already parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedIssue {
    pub key: String,
    pub updated: NaiveDateTime,
    pub created: NaiveDateTime,
    pub raw: RawIssue,
}

impl FetchedIssue {
    pub fn into_ticket(self) -> Ticket {
        Ticket {
            key: self.key,
            updated: self.updated,
            created: self.created,
            payload: self.raw,
        }
    }
}

/// One page of the remote search endpoint.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Total number of issues matching the query, across all pages.
    pub total: u64,
    pub issues: Vec<RawIssue>,
}

/// Derived, non-persisted projection of an issue written to the index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexedDocument {
    pub key: String,
    pub assignee: String,
    pub reporter: String,
    pub status: String,
    pub summary: String,
    pub description: String,
    pub comments_str: String,
    /// Space-joined labels.
    pub labels: String,
    /// Space-joined component names.
    pub components: String,
}

/// Views a value that may hold either a list or a lone unwrapped element as
/// a sequence. Absent and null values yield an empty sequence.
pub fn as_sequence(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
    }
}

/// Rewrites a lone unwrapped element in place as a one-element list.
pub fn wrap_sequence(value: &mut Value) {
    match value {
        Value::Null | Value::Array(_) => {}
        single => {
            let item = single.take();
            *single = Value::Array(vec![item]);
        }
    }
}
