//! # jirafts
//!
//! An offline mirror of JIRA issues with full-text search.
//!
//! A sync run downloads every issue updated outside the window already held
//! locally, stores the raw records in SQLite and indexes a projection of
//! each one with tantivy. Search, dump and grep read from that local copy
//! only.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ IssueSource │──▶│   Fetcher   │──▶│ TicketStore  │
//! │ (JIRA XML)  │   │ window+pool │   │   (SQLite)   │
//! └─────────────┘   └──────┬──────┘   └──────┬───────┘
//!                          │                 │
//!                          ▼                 ▼
//!                   ┌─────────────┐   ┌──────────────┐
//!                   │ IssueIndex  │◀──│ search, dump │
//!                   │  (tantivy)  │   │    grep      │
//!                   └─────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`xml`] | Search response decoding |
//! | [`source`] | Remote issue source and HTTP client |
//! | [`fetcher`] | Windowed query, concurrent pagination, cancellation |
//! | [`issue`] | Index and display projections of one issue |
//! | [`codec`] | Stored payload encoding |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Ticket store |
//! | [`index`] | Full-text index schema and writer |
//! | [`search`] | Ranked search |
//! | [`highlight`] | Match highlighting |
//! | [`html`] | HTML to plain text |
//! | [`dump`] | Dump and grep |
//! | [`ingest`] | Sync pipeline |
//! | [`progress`] | Sync progress reporting |

pub mod codec;
pub mod config;
pub mod db;
pub mod dump;
pub mod error;
pub mod fetcher;
pub mod highlight;
pub mod html;
pub mod index;
pub mod ingest;
pub mod issue;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod search;
pub mod source;
pub mod store;
pub mod xml;

pub use error::{Error, Result};
