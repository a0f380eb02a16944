//! Paginated insights fetcher.
//!
//! Builds one campaign-level, daily-granularity query for an ad account and
//! follows the `paging.next` cursor until the API stops returning one.
//! Continuation URLs are self-contained, so they are requested with no
//! additional parameters.
//!
//! There is no page cap: termination depends entirely on the upstream cursor
//! becoming absent.

use crate::diagnostics::{diagnostic_body, redact_url};
use crate::transport::{HttpTransport, TransportError};
use crate::window::Window;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// One loosely-typed record as returned by the API.
pub type RawRecord = Map<String, Value>;

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_API_VERSION: &str = "v20.0";
pub const DEFAULT_PAGE_LIMIT: u32 = 5000;

/// Dimension used when the publisher-platform breakdown is enabled.
pub const PUBLISHER_PLATFORM_BREAKDOWN: &str = "publisher_platform";

const BASE_FIELDS: &[&str] = &[
    "date_start",
    "date_stop",
    "account_id",
    "campaign_id",
    "campaign_name",
    "objective",
    "reach",
    "impressions",
    "spend",
    "clicks",
    "ctr",
    "cpc",
    "cpm",
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("insights request failed with HTTP {status} ({url}): {body}")]
    Upstream {
        status: u16,
        /// Request URL with the access token redacted.
        url: String,
        /// Diagnostic rendering of the error body.
        body: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unexpected insights response: {0}")]
    MalformedResponse(String),
}

/// API credential. `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Where the insights endpoint lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightsEndpoint {
    pub base_url: String,
    pub api_version: String,
}

impl Default for InsightsEndpoint {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl InsightsEndpoint {
    /// `{base}/{version}/act_{account}/insights`
    pub fn url_for(&self, account_id: &str) -> String {
        format!(
            "{}/{}/act_{account_id}/insights",
            self.base_url.trim_end_matches('/'),
            self.api_version
        )
    }
}

/// Parameters of the initial (non-continuation) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightsQuery {
    pub level: &'static str,
    pub time_increment: u32,
    pub time_range: String,
    pub fields: Vec<&'static str>,
    pub breakdowns: Option<&'static str>,
    pub limit: u32,
}

impl InsightsQuery {
    /// Campaign-level, one row per calendar day in `window`.
    pub fn campaign_daily(window: &Window, breakdown: bool, inline_link_clicks: bool, limit: u32) -> Self {
        let mut fields = BASE_FIELDS.to_vec();
        if inline_link_clicks {
            let pos = fields.iter().position(|f| *f == "clicks").map_or(fields.len(), |i| i + 1);
            fields.insert(pos, "inline_link_clicks");
        }

        Self {
            level: "campaign",
            time_increment: 1,
            time_range: window.time_range_json(),
            fields,
            breakdowns: breakdown.then_some(PUBLISHER_PLATFORM_BREAKDOWN),
            limit,
        }
    }

    /// Query-string pairs, credential first.
    pub fn params(&self, credentials: &Credentials) -> Vec<(String, String)> {
        let mut params = vec![
            ("access_token".to_string(), credentials.access_token().to_string()),
            ("level".to_string(), self.level.to_string()),
            ("time_increment".to_string(), self.time_increment.to_string()),
            ("time_range".to_string(), self.time_range.clone()),
            ("fields".to_string(), self.fields.join(",")),
            ("limit".to_string(), self.limit.to_string()),
        ];
        if let Some(b) = self.breakdowns {
            params.push(("breakdowns".to_string(), b.to_string()));
        }
        params
    }
}

#[derive(Debug, Deserialize)]
struct InsightsPage {
    #[serde(default)]
    data: Vec<RawRecord>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

impl InsightsPage {
    /// Continuation reference; an empty string counts as absent.
    fn next_cursor(&self) -> Option<String> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.clone())
            .filter(|n| !n.is_empty())
    }
}

/// Fetches every page of an insights query through an [`HttpTransport`].
pub struct InsightsFetcher<T: HttpTransport> {
    transport: T,
    endpoint: InsightsEndpoint,
    page_limit: u32,
    inline_link_clicks: bool,
}

impl<T: HttpTransport> InsightsFetcher<T> {
    pub fn new(transport: T, endpoint: InsightsEndpoint) -> Self {
        Self {
            transport,
            endpoint,
            page_limit: DEFAULT_PAGE_LIMIT,
            inline_link_clicks: false,
        }
    }

    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit;
        self
    }

    pub fn with_inline_link_clicks(mut self, enabled: bool) -> Self {
        self.inline_link_clicks = enabled;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn endpoint(&self) -> &InsightsEndpoint {
        &self.endpoint
    }

    /// Fetch all records for `account_id` over `window`, following pagination
    /// to the end. Records are returned in page order.
    pub fn fetch_all(
        &self,
        credentials: &Credentials,
        account_id: &str,
        window: &Window,
        breakdown: bool,
    ) -> Result<Vec<RawRecord>, FetchError> {
        let query = InsightsQuery::campaign_daily(window, breakdown, self.inline_link_clicks, self.page_limit);
        let first_url = self.endpoint.url_for(account_id);

        let mut records = Vec::new();
        let mut pages = 0usize;
        let mut page = self.get_page(&first_url, &query.params(credentials))?;

        loop {
            pages += 1;
            tracing::debug!(page = pages, rows = page.data.len(), "insights page received");
            let next = page.next_cursor();
            records.append(&mut page.data);

            match next {
                Some(url) => page = self.get_page(&url, &[])?,
                None => break,
            }
        }

        tracing::info!(
            account_id,
            window = %window,
            pages,
            rows = records.len(),
            "insights fetch complete"
        );
        Ok(records)
    }

    fn get_page(&self, url: &str, params: &[(String, String)]) -> Result<InsightsPage, FetchError> {
        let resp = self.transport.get(url, params)?;

        if resp.is_error() {
            let body = diagnostic_body(&resp.body);
            let url = redact_url(&resp.url);
            tracing::error!(status = resp.status, url = %url, "insights request failed");
            tracing::error!("response body:\n{body}");
            return Err(FetchError::Upstream {
                status: resp.status,
                url,
                body,
            });
        }

        serde_json::from_str(&resp.body).map_err(|e| {
            FetchError::MalformedResponse(format!("failed to parse page from {}: {e}", redact_url(&resp.url)))
        })
    }
}
