//! Incremental, concurrent issue fetcher.
//!
//! # Query
//!
//! The server-side filter combines an optional `project in (..)` clause with,
//! when the store already covers a window `[min, max]` of `updated`
//! timestamps, a clause excluding exactly that window. Results are sorted by
//! `updated` descending.
//!
//! # Pagination
//!
//! Page 1 is fetched before anything else to learn the total count. The
//! remaining pages are handed to a bounded pool of tokio tasks and drained
//! in completion order, so issues from different pages interleave in no
//! particular order. Consumers must not rely on cross-page ordering.
//!
//! # Cancellation
//!
//! When the [`CancellationToken`] fires, every page that has not started is
//! cancelled, requests already on the wire are allowed to finish (their
//! results are discarded), and the stream ends. Issues yielded before that
//! point stay valid. See [`CancellationReport`].

use chrono::{DateTime, NaiveDateTime};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::issue::Issue;
use crate::models::{FetchedIssue, RawIssue, SearchPage, PAYLOAD_DATE_FORMAT};

/// Timestamp format of `updated`/`created` on the wire.
pub const WIRE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";
/// Timestamp format inside query filters.
pub const QUERY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_PAGE_SIZE: u64 = 50;

const DATE_FIELDS: [&str; 2] = ["updated", "created"];

const PAGE_PENDING: u8 = 0;
const PAGE_RUNNING: u8 = 1;
const PAGE_CANCELLED: u8 = 2;

/// Parameters of one fetch.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Project keys; empty means every project.
    pub projects: Vec<String>,
    pub page_size: u64,
    pub min_date: Option<NaiveDateTime>,
    pub max_date: Option<NaiveDateTime>,
    /// Maximum number of issues; `None` (or zero) means all of them.
    pub limit: Option<u64>,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            min_date: None,
            max_date: None,
            limit: None,
        }
    }
}

/// Outcome of an interrupted fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationReport {
    /// Pages that were cancelled before their request started.
    pub cancelled: usize,
    /// All pages of the fetch, including the first one.
    pub total: usize,
}

/// Build the search query for a fetch.
///
/// The date clause is only added when both ends of the window are known.
pub fn build_query(
    projects: &[String],
    min_date: Option<NaiveDateTime>,
    max_date: Option<NaiveDateTime>,
) -> String {
    let mut parts = Vec::new();
    if !projects.is_empty() {
        parts.push(format!("project in ({})", projects.join(", ")));
    }
    if let (Some(min), Some(max)) = (min_date, max_date) {
        parts.push(format!(
            "NOT (updated >= '{}' AND updated <= '{}')",
            min.format(QUERY_DATE_FORMAT),
            max.format(QUERY_DATE_FORMAT)
        ));
    }
    let filter = parts.join(" AND ");
    format!("{filter} ORDER BY updated DESC").trim().to_string()
}

/// Parse a wire timestamp, keeping its wall-clock time and dropping the offset.
pub fn parse_wire_date(value: &str) -> Result<NaiveDateTime> {
    DateTime::parse_from_str(value.trim(), WIRE_DATE_FORMAT)
        .map(|dt| dt.naive_local())
        .map_err(|e| Error::Payload(format!("invalid timestamp {value:?}: {e}")))
}

/// Turn a raw record into a [`FetchedIssue`], rewriting its date fields in
/// the payload as `YYYY-MM-DDTHH:MM:SS`.
pub fn fetched_issue(mut raw: RawIssue) -> Result<FetchedIssue> {
    let key = Issue::new(&raw)
        .key()
        .map_err(|e| Error::Payload(format!("issue without key: {e}")))?;

    let mut dates = [NaiveDateTime::default(); 2];
    for (slot, field) in dates.iter_mut().zip(DATE_FIELDS) {
        let text = raw
            .get(field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Payload(format!("{key}: missing `{field}`")))?;
        *slot = parse_wire_date(text)?;
        raw[field] = serde_json::Value::String(slot.format(PAYLOAD_DATE_FORMAT).to_string());
    }
    let [updated, created] = dates;

    Ok(FetchedIssue {
        key,
        updated,
        created,
        raw,
    })
}

/// Downloads issues from an [`IssueSource`](crate::source::IssueSource).
pub struct Fetcher {
    source: Arc<dyn crate::source::IssueSource>,
    concurrency: usize,
}

impl Fetcher {
    pub fn new(source: Arc<dyn crate::source::IssueSource>, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    /// Start a fetch. The first page is downloaded before this returns; the
    /// remaining pages are dispatched to the worker pool.
    pub async fn iterate(
        &self,
        request: &FetchRequest,
        cancel: CancellationToken,
    ) -> Result<IssueStream> {
        let query = build_query(&request.projects, request.min_date, request.max_date);
        let requested_limit = request.limit.filter(|l| *l > 0);
        let mut page_size = request.page_size.max(1);
        if let Some(limit) = requested_limit {
            page_size = page_size.min(limit);
        }

        tracing::info!(%query, page_size, "fetching first page");
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("fetch cancelled before the first page arrived");
                return Ok(IssueStream::interrupted(cancel));
            }
            page = self.source.fetch_page(&query, 0, page_size) => page?,
        };
        let total = first.total;
        if total == 0 {
            tracing::warn!(%query, "no results downloaded; wrong query or auth data");
            return Ok(IssueStream::new(0, 0, VecDeque::new(), cancel));
        }

        let limit = requested_limit.map_or(total, |l| l.min(total));
        let mut stream = IssueStream::new(total, limit, first.issues.into(), cancel);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let query = Arc::new(query);
        let mut start = page_size;
        while start < limit {
            stream.dispatch(
                Arc::clone(&self.source),
                Arc::clone(&semaphore),
                Arc::clone(&query),
                start,
                page_size,
            );
            start += page_size;
        }
        tracing::debug!(total, limit, pages = stream.pages.len() + 1, "pages dispatched");

        Ok(stream)
    }
}

struct DispatchedPage {
    state: Arc<AtomicU8>,
    handle: AbortHandle,
}

/// Lazily yields `(issue, total)` pairs as pages complete.
pub struct IssueStream {
    buffer: VecDeque<RawIssue>,
    tasks: JoinSet<Result<SearchPage>>,
    pages: Vec<DispatchedPage>,
    total: u64,
    limit: u64,
    yielded: u64,
    completed_pages: usize,
    cancel: CancellationToken,
    cancellation: Option<CancellationReport>,
    done: bool,
}

impl IssueStream {
    fn new(
        total: u64,
        limit: u64,
        first_page: VecDeque<RawIssue>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            buffer: first_page,
            tasks: JoinSet::new(),
            pages: Vec::new(),
            total,
            limit,
            yielded: 0,
            completed_pages: 1,
            cancel,
            cancellation: None,
            done: total == 0,
        }
    }

    /// A stream that ends immediately: the first page was abandoned.
    fn interrupted(cancel: CancellationToken) -> Self {
        let mut stream = Self::new(0, 0, VecDeque::new(), cancel);
        stream.completed_pages = 0;
        stream.cancellation = Some(CancellationReport {
            cancelled: 0,
            total: 1,
        });
        stream
    }

    fn dispatch(
        &mut self,
        source: Arc<dyn crate::source::IssueSource>,
        semaphore: Arc<Semaphore>,
        query: Arc<String>,
        start: u64,
        page_size: u64,
    ) {
        let state = Arc::new(AtomicU8::new(PAGE_PENDING));
        let task_state = Arc::clone(&state);
        let handle = self.tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| Error::Worker(e.to_string()))?;
            if task_state
                .compare_exchange(PAGE_PENDING, PAGE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Ok(SearchPage::default());
            }
            source.fetch_page(&query, start, page_size).await
        });
        self.pages.push(DispatchedPage { state, handle });
    }

    /// Total number of matching issues reported by the server.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of issues this stream will yield at most.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn yielded(&self) -> u64 {
        self.yielded
    }

    /// Pages fetched so far, including the first one.
    pub fn completed_pages(&self) -> usize {
        self.completed_pages
    }

    /// Set once the stream ended because of an interrupt.
    pub fn cancellation(&self) -> Option<CancellationReport> {
        self.cancellation
    }

    /// Next issue, or `None` when the fetch is exhausted, the limit is
    /// reached, or the fetch was cancelled.
    pub async fn next(&mut self) -> Result<Option<(FetchedIssue, u64)>> {
        loop {
            if self.done {
                return Ok(None);
            }
            if self.cancel.is_cancelled() {
                self.shutdown().await;
                return Ok(None);
            }
            if self.yielded >= self.limit {
                self.finish();
                return Ok(None);
            }
            if let Some(raw) = self.buffer.pop_front() {
                let issue = fetched_issue(raw)?;
                self.yielded += 1;
                return Ok(Some((issue, self.total)));
            }
            if self.tasks.is_empty() {
                self.done = true;
                return Ok(None);
            }

            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                joined = self.tasks.join_next() => Some(joined),
            };
            match joined {
                None => continue,
                Some(None) => self.done = true,
                Some(Some(Ok(Ok(page)))) => {
                    self.completed_pages += 1;
                    self.buffer.extend(page.issues);
                }
                Some(Some(Ok(Err(err)))) => {
                    self.finish();
                    return Err(err);
                }
                Some(Some(Err(join_err))) if join_err.is_cancelled() => continue,
                Some(Some(Err(join_err))) => {
                    self.finish();
                    return Err(Error::Worker(join_err.to_string()));
                }
            }
        }
    }

    fn finish(&mut self) {
        self.tasks.abort_all();
        self.buffer.clear();
        self.done = true;
    }

    async fn shutdown(&mut self) {
        let mut cancelled = 0;
        for page in &self.pages {
            if page
                .state
                .compare_exchange(PAGE_PENDING, PAGE_CANCELLED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                page.handle.abort();
                cancelled += 1;
            }
        }
        let total = self.pages.len() + 1;
        tracing::info!(cancelled, total, "fetch cancelled; draining running requests");

        while self.tasks.join_next().await.is_some() {}

        self.buffer.clear();
        self.cancellation = Some(CancellationReport { cancelled, total });
        self.done = true;
    }
}
