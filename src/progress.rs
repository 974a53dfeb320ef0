//! Sync progress reporting.
//!
//! Progress goes to **stderr** so stdout stays clean for search and dump
//! output. Human mode prints one line per page checkpoint; JSON mode prints
//! one object per event, including every synced issue.

use chrono::NaiveDateTime;
use std::io::Write;

/// A single progress event of a sync run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncProgressEvent {
    /// A run started; `window` is the already covered `updated` range.
    Started {
        scope: String,
        window: Option<(NaiveDateTime, NaiveDateTime)>,
    },
    /// One issue was stored.
    Synced {
        n: u64,
        total: u64,
        key: String,
        updated: NaiveDateTime,
    },
    /// Checkpoint after every page worth of issues.
    Batch { n: u64, total: u64 },
    /// The index commit is starting.
    Saving { optimize: bool },
    /// The fetch was interrupted; pages cancelled out of all pages.
    Cancelled { cancelled: usize, total: usize },
    Finished {
        fetched: u64,
        indexed: u64,
        skipped: u64,
    },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync  1,250 / 5,000 issues".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        if let Some(line) = human_line(&event) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

fn human_line(event: &SyncProgressEvent) -> Option<String> {
    let line = match event {
        SyncProgressEvent::Started { scope, window } => match window {
            Some((min, max)) => format!("sync {}  skipping {} .. {}", scope, min, max),
            None => format!("sync {}  full fetch", scope),
        },
        SyncProgressEvent::Synced { .. } => return None,
        SyncProgressEvent::Batch { n, total } => format!(
            "sync  {} / {} issues",
            format_number(*n),
            format_number(*total)
        ),
        SyncProgressEvent::Saving { optimize } => format!(
            "saving index{}...",
            if *optimize { " with optimization" } else { "" }
        ),
        SyncProgressEvent::Cancelled { cancelled, total } => {
            format!("cancelled {cancelled} / {total} pages")
        }
        SyncProgressEvent::Finished {
            fetched,
            indexed,
            skipped,
        } => format!(
            "sync done  {} fetched, {} indexed, {} skipped",
            format_number(*fetched),
            format_number(*indexed),
            format_number(*skipped)
        ),
    };
    Some(line)
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        if let Ok(line) = serde_json::to_string(&json_event(&event)) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

fn json_event(event: &SyncProgressEvent) -> serde_json::Value {
    match event {
        SyncProgressEvent::Started { scope, window } => serde_json::json!({
            "event": "started",
            "scope": scope,
            "min_updated": window.map(|(min, _)| min.to_string()),
            "max_updated": window.map(|(_, max)| max.to_string()),
        }),
        SyncProgressEvent::Synced {
            n,
            total,
            key,
            updated,
        } => serde_json::json!({
            "event": "synced",
            "n": n,
            "total": total,
            "key": key,
            "updated": updated.to_string(),
        }),
        SyncProgressEvent::Batch { n, total } => serde_json::json!({
            "event": "progress",
            "n": n,
            "total": total
        }),
        SyncProgressEvent::Saving { optimize } => serde_json::json!({
            "event": "saving",
            "optimize": optimize
        }),
        SyncProgressEvent::Cancelled { cancelled, total } => serde_json::json!({
            "event": "cancelled",
            "cancelled": cancelled,
            "total": total
        }),
        SyncProgressEvent::Finished {
            fetched,
            indexed,
            skipped,
        } => serde_json::json!({
            "event": "finished",
            "fetched": fetched,
            "indexed": indexed,
            "skipped": skipped
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn human_mode_skips_per_issue_events() {
        let updated = NaiveDate::from_ymd_opt(2019, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let synced = SyncProgressEvent::Synced {
            n: 1,
            total: 2,
            key: "PROJ-1".to_string(),
            updated,
        };
        assert_eq!(human_line(&synced), None);
        assert_eq!(json_event(&synced)["key"], "PROJ-1");
        assert_eq!(json_event(&synced)["updated"], "2019-03-04 10:00:00");
    }

    #[test]
    fn human_lines() {
        assert_eq!(
            human_line(&SyncProgressEvent::Batch { n: 1250, total: 5000 }).unwrap(),
            "sync  1,250 / 5,000 issues"
        );
        assert_eq!(
            human_line(&SyncProgressEvent::Saving { optimize: true }).unwrap(),
            "saving index with optimization..."
        );
        assert_eq!(
            human_line(&SyncProgressEvent::Cancelled {
                cancelled: 3,
                total: 7
            })
            .unwrap(),
            "cancelled 3 / 7 pages"
        );
    }

    #[test]
    fn json_started_without_window() {
        let v = json_event(&SyncProgressEvent::Started {
            scope: "all projects".to_string(),
            window: None,
        });
        assert_eq!(v["event"], "started");
        assert!(v["min_updated"].is_null());
    }
}
