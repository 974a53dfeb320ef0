//! # jirafts CLI
//!
//! Keeps an offline, searchable mirror of JIRA issues.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `jirafts sync -u <url>` | Download new or changed issues, store and index them |
//! | `jirafts search "<query>"` | Ranked full-text search |
//! | `jirafts dump` | Print every stored issue |
//! | `jirafts grep <regex>` | Print stored issues matching a regex |
//!
//! ## Examples
//!
//! ```bash
//! # First sync of two projects, token read from a file
//! jirafts sync -u https://jira.example.com -t ~/.jirafts/token -p OPS -p WEB
//!
//! # Search summaries, descriptions and comments
//! jirafts search -c "deadlock"
//!
//! # One line per issue mentioning a host name
//! jirafts grep -s -i 'db-0[0-9]'
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use jirafts::config::{self, Config};
use jirafts::dump::{self, RenderOptions};
use jirafts::highlight::{AnsiHighlight, GrepMatcher, HighlightRenderer};
use jirafts::html::TagStripper;
use jirafts::index::IssueIndex;
use jirafts::ingest::{self, SyncOptions};
use jirafts::progress::ProgressMode;
use jirafts::search;
use jirafts::source::{Credentials, JiraClient};
use jirafts::store::TicketStore;

/// jirafts: offline full-text search over JIRA issues.
#[derive(Parser)]
#[command(
    name = "jirafts",
    about = "jirafts: keep a local, full-text searchable mirror of JIRA issues",
    version
)]
struct Cli {
    /// Directory holding the ticket store and the search index.
    ///
    /// Defaults to `~/.jirafts/default_index`.
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    /// Path to an optional configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Sync progress on stderr: `off`, `human` or `json`.
    ///
    /// Defaults to `human` when stderr is a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download issues updated outside the locally covered window.
    ///
    /// The first run downloads everything visible; later runs skip the
    /// range of `updated` timestamps already stored. Interrupting with
    /// Ctrl-C keeps everything downloaded so far.
    Sync {
        /// Base URL of the JIRA server.
        #[arg(short, long)]
        url: Option<String>,

        /// `user:password`, a bearer token, or a file holding either.
        #[arg(short = 't', long = "auth", visible_alias = "token")]
        auth: Option<String>,

        /// Ignore the stored window and download every issue.
        #[arg(short, long)]
        all: bool,

        /// Project key to sync (repeatable). Defaults to all projects.
        #[arg(short, long = "project")]
        projects: Vec<String>,

        /// Merge index segments after saving.
        #[arg(short, long)]
        optimize: bool,

        /// Parallel page downloads.
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Issues per page.
        #[arg(long)]
        page_size: Option<u64>,

        /// Maximum number of issues to download.
        #[arg(short, long)]
        limit: Option<u64>,

        /// Analyzer language used when the index is first created.
        #[arg(long)]
        language: Option<String>,
    },

    /// Ranked full-text search.
    Search {
        /// Query string, e.g. `timeout AND database`.
        query: String,

        /// Maximum number of results.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Do not highlight matched terms.
        #[arg(long = "no-hl")]
        no_highlight: bool,

        /// Analyzer language used if the index does not exist yet.
        #[arg(long)]
        language: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print every stored issue, shortest keys first.
    Dump {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print stored issues matching a regular expression.
    Grep {
        /// Regular expression.
        pattern: String,

        #[arg(short, long)]
        ignore_case: bool,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Clone, Copy)]
struct OutputArgs {
    /// Print raw HTML instead of plain text.
    #[arg(long)]
    html: bool,

    /// Header line only.
    #[arg(short, long)]
    short: bool,

    /// Include comments.
    #[arg(short, long)]
    comments: bool,
}

impl OutputArgs {
    fn render_options(self) -> RenderOptions {
        if self.short {
            RenderOptions::short(self.html)
        } else {
            RenderOptions {
                description: true,
                comments: self.comments,
                html: self.html,
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("JIRAFTS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    if let Some(dir) = cli.index {
        cfg.index.dir = dir;
    }
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    let db_path = cfg.index.db_path();
    let store = TicketStore::open(&db_path)
        .await
        .with_context(|| format!("Failed to open ticket store: {}", db_path.display()))?;

    let result = run(cli.command, cfg, &store, progress).await;
    store.close().await;
    result
}

async fn run(
    command: Commands,
    mut cfg: Config,
    store: &TicketStore,
    progress: ProgressMode,
) -> Result<()> {
    let stdout = std::io::stdout();

    match command {
        Commands::Sync {
            url,
            auth,
            all,
            projects,
            optimize,
            concurrency,
            page_size,
            limit,
            language,
        } => {
            if let Some(url) = url {
                cfg.sync.url = Some(url);
            }
            if let Some(auth) = auth {
                cfg.sync.auth = Some(auth);
            }
            if !projects.is_empty() {
                cfg.sync.projects = projects;
            }
            if let Some(n) = concurrency {
                cfg.sync.concurrency = n;
            }
            if let Some(n) = page_size {
                cfg.sync.page_size = n;
            }
            if let Some(lang) = language {
                cfg.sync.language = lang;
            }
            config::validate(&cfg)?;

            let url = cfg
                .sync
                .url
                .clone()
                .context("No server URL. Pass --url or set [sync] url in the config file.")?;
            let credentials = cfg
                .sync
                .auth
                .as_deref()
                .map(Credentials::resolve)
                .transpose()
                .context("Failed to read credentials")?;
            let index = open_index(&cfg)?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                on_interrupt.cancel();
                eprintln!("interrupted, saving downloaded issues (Ctrl-C again to quit)");
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });

            let options = SyncOptions {
                projects: cfg.sync.projects.clone(),
                fetch_all: all,
                optimize,
                concurrency: cfg.sync.concurrency,
                page_size: cfg.sync.page_size,
                limit,
            };
            let reporter = progress.reporter();
            let report = ingest::run_sync(
                store,
                &index,
                Arc::new(JiraClient::new(&url, credentials)),
                &options,
                cancel,
                reporter.as_ref(),
            )
            .await?;

            if report.total == 0 && report.cancellation.is_none() {
                println!("No results downloaded. Wrong query or auth data?");
            }
            println!("sync {}", url);
            println!("  matching: {} issues", report.total);
            println!("  fetched: {} issues", report.fetched);
            println!("  indexed: {}", report.indexed);
            println!("  skipped: {}", report.skipped);
            if let Some(cancelled) = report.cancellation {
                println!(
                    "  cancelled: {} / {} pages",
                    cancelled.cancelled, cancelled.total
                );
            }
            println!("ok");
        }
        Commands::Search {
            query,
            limit,
            no_highlight,
            language,
            output,
        } => {
            if let Some(n) = limit {
                cfg.search.limit = n;
            }
            if let Some(lang) = language {
                cfg.sync.language = lang;
            }
            config::validate(&cfg)?;
            let index = open_index(&cfg)?;
            let highlight = (!no_highlight).then_some(&AnsiHighlight as &dyn HighlightRenderer);
            search::run_search(
                store,
                &index,
                &query,
                cfg.search.limit,
                &output.render_options(),
                highlight,
                &TagStripper,
                &mut stdout.lock(),
            )
            .await?;
        }
        Commands::Dump { output } => {
            dump::dump(
                store,
                &output.render_options(),
                &TagStripper,
                None,
                &AnsiHighlight,
                &mut stdout.lock(),
            )
            .await?;
        }
        Commands::Grep {
            pattern,
            ignore_case,
            output,
        } => {
            let matcher = GrepMatcher::new(&pattern, ignore_case)
                .with_context(|| format!("Invalid regular expression: {}", pattern))?;
            dump::dump(
                store,
                &output.render_options(),
                &TagStripper,
                Some(&matcher),
                &AnsiHighlight,
                &mut stdout.lock(),
            )
            .await?;
        }
    }

    Ok(())
}

fn open_index(cfg: &Config) -> Result<IssueIndex> {
    let dir = cfg.index.index_path();
    IssueIndex::open_or_create(&dir, &cfg.sync.language)
        .with_context(|| format!("Failed to open search index: {}", dir.display()))
}
