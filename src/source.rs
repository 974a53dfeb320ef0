//! Remote issue source.
//!
//! The fetcher only needs one operation from the remote tracker: run a
//! search query and return one page of results. [`IssueSource`] is that
//! seam; [`JiraClient`] implements it over the XML search-request view of a
//! JIRA server.
//!
//! # Endpoint
//!
//! ```text
//! GET {url}/sr/jira.issueviews:searchrequest-xml/temp/SearchRequest.xml
//!     ?jqlQuery=<query>&pager/start=<offset>&tempMax=<page size>
//! ```
//!
//! Any non-success status is fatal for the whole fetch and carries the raw
//! response body. Connecting times out after 30 seconds; a slow response
//! has no deadline.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::SearchPage;
use crate::xml;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const SEARCH_REQUEST_PATH: &str = "sr/jira.issueviews:searchrequest-xml/temp/SearchRequest.xml";

/// A paginated text-search endpoint returning issue records.
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Fetch `max` issues matching `query`, starting at offset `start`.
    async fn fetch_page(&self, query: &str, start: u64, max: u64) -> Result<SearchPage>;
}

/// Authentication for the remote server.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { user: String, password: String },
    Bearer(String),
}

impl Credentials {
    /// Interpret an `--auth` value: either the secret itself or a path to a
    /// file containing it. `user:secret` selects basic auth, anything else is
    /// sent as a bearer token.
    pub fn resolve(value: &str) -> Result<Self> {
        let path = Path::new(value);
        let secret = if path.is_file() {
            std::fs::read_to_string(path)?.trim().to_string()
        } else {
            value.to_string()
        };
        Ok(Self::parse(&secret))
    }

    pub fn parse(secret: &str) -> Self {
        match secret.split_once(':') {
            Some((user, password)) => Credentials::Basic {
                user: user.to_string(),
                password: password.to_string(),
            },
            None => Credentials::Bearer(secret.to_string()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { user, .. } => write!(f, "Basic({user}:***)"),
            Credentials::Bearer(_) => write!(f, "Bearer(***)"),
        }
    }
}

/// HTTP client for a JIRA server's XML search view.
pub struct JiraClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl JiraClient {
    pub fn new(base_url: &str, credentials: Option<Credentials>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn search_url(&self) -> String {
        format!("{}/{}", self.base_url, SEARCH_REQUEST_PATH)
    }
}

#[async_trait]
impl IssueSource for JiraClient {
    async fn fetch_page(&self, query: &str, start: u64, max: u64) -> Result<SearchPage> {
        let start = start.to_string();
        let max = max.to_string();
        let mut request = self.client.get(self.search_url()).query(&[
            ("jqlQuery", query),
            ("pager/start", start.as_str()),
            ("tempMax", max.as_str()),
        ]);
        request = match &self.credentials {
            Some(Credentials::Basic { user, password }) => {
                request.basic_auth(user, Some(password))
            }
            Some(Credentials::Bearer(token)) => request.bearer_auth(token),
            None => request,
        };

        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Transport {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(start = %start, max = %max, bytes = body.len(), "fetched search page");
        xml::parse_search_response(&body)
    }
}
