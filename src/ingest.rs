//! Sync pipeline orchestration.
//!
//! Coordinates one sync run: derive the fetch window from the store, stream
//! issues from the [`Fetcher`], upsert each into the [`TicketStore`] and
//! index its projection. The store and the index each get a single writer
//! for the whole run; both are committed at the end (index first), so a
//! failed run leaves only prior runs' work behind.
//!
//! An issue whose projection fails is still stored but not indexed.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::fetcher::{
    CancellationReport, FetchRequest, Fetcher, DEFAULT_CONCURRENCY, DEFAULT_PAGE_SIZE,
};
use crate::index::{IssueIndex, IssueIndexWriter};
use crate::issue::Issue;
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::source::IssueSource;
use crate::store::{TicketStore, TicketWriter};

/// Parameters of one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Project keys; empty syncs every visible project.
    pub projects: Vec<String>,
    /// Ignore the stored window and fetch everything.
    pub fetch_all: bool,
    /// Merge index segments after the commit.
    pub optimize: bool,
    pub concurrency: usize,
    pub page_size: u64,
    pub limit: Option<u64>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            fetch_all: false,
            optimize: false,
            concurrency: DEFAULT_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
            limit: None,
        }
    }
}

/// Outcome of a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Issues stored.
    pub fetched: u64,
    /// Issues indexed.
    pub indexed: u64,
    /// Issues stored but not indexed because their projection failed.
    pub skipped: u64,
    /// Matching issues reported by the remote source.
    pub total: u64,
    pub cancellation: Option<CancellationReport>,
}

pub async fn run_sync(
    store: &TicketStore,
    index: &IssueIndex,
    source: Arc<dyn IssueSource>,
    options: &SyncOptions,
    cancel: CancellationToken,
    progress: &dyn SyncProgressReporter,
) -> Result<SyncReport> {
    let window = if options.fetch_all {
        None
    } else {
        match store.min_max_updated().await? {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        }
    };
    let scope = if options.projects.is_empty() {
        "all projects".to_string()
    } else {
        options.projects.join(", ")
    };
    tracing::info!(%scope, ?window, "sync started");
    progress.report(SyncProgressEvent::Started { scope, window });

    let request = FetchRequest {
        projects: options.projects.clone(),
        page_size: options.page_size,
        min_date: window.map(|(min, _)| min),
        max_date: window.map(|(_, max)| max),
        limit: options.limit,
    };

    let mut tickets = store.begin().await?;
    let mut documents = index.writer()?;
    let mut report = SyncReport::default();

    let outcome = sync_issues(
        &Fetcher::new(source, options.concurrency),
        &request,
        cancel,
        &mut tickets,
        &mut documents,
        &mut report,
        progress,
    )
    .await;
    if let Err(err) = outcome {
        tracing::error!(error = %err, fetched = report.fetched, "sync failed; discarding run");
        documents.rollback()?;
        tickets.rollback().await?;
        return Err(err);
    }

    if let Some(cancelled) = report.cancellation {
        progress.report(SyncProgressEvent::Cancelled {
            cancelled: cancelled.cancelled,
            total: cancelled.total,
        });
    }

    if report.indexed > 0 {
        progress.report(SyncProgressEvent::Saving {
            optimize: options.optimize,
        });
        documents.commit(options.optimize)?;
    } else {
        documents.rollback()?;
    }
    tickets.commit().await?;

    tracing::info!(
        fetched = report.fetched,
        indexed = report.indexed,
        skipped = report.skipped,
        "sync committed"
    );
    progress.report(SyncProgressEvent::Finished {
        fetched: report.fetched,
        indexed: report.indexed,
        skipped: report.skipped,
    });
    Ok(report)
}

async fn sync_issues(
    fetcher: &Fetcher,
    request: &FetchRequest,
    cancel: CancellationToken,
    tickets: &mut TicketWriter,
    documents: &mut IssueIndexWriter,
    report: &mut SyncReport,
    progress: &dyn SyncProgressReporter,
) -> Result<()> {
    let mut stream = fetcher.iterate(request, cancel).await?;
    let checkpoint = request.page_size.max(1);

    while let Some((issue, total)) = stream.next().await? {
        report.total = total;
        tickets
            .upsert(&issue.key, issue.updated, issue.created, &issue.raw)
            .await?;
        report.fetched += 1;

        match Issue::new(&issue.raw).to_document() {
            Ok(doc) => {
                documents.sync(&doc)?;
                report.indexed += 1;
            }
            Err(err) => {
                tracing::warn!(
                    key = %issue.key,
                    error = %err,
                    raw = %issue.raw,
                    "issue not indexed"
                );
                report.skipped += 1;
            }
        }

        progress.report(SyncProgressEvent::Synced {
            n: report.fetched,
            total: stream.limit(),
            key: issue.key,
            updated: issue.updated,
        });
        if report.fetched % checkpoint == 0 {
            progress.report(SyncProgressEvent::Batch {
                n: report.fetched,
                total: stream.limit(),
            });
        }
    }

    report.total = stream.total();
    report.cancellation = stream.cancellation();
    Ok(())
}
