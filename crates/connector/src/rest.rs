//! HTTP client for symbol search and sector screening

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use tvfeed_metadata::RestEndpoints;

use crate::error::RestError;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// One symbol search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSearchHit {
    pub symbol: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub symbol_type: String,
    #[serde(default)]
    pub exchange: String,
    /// Exchange prefix when it differs from the display exchange
    pub prefix: Option<String>,
    pub currency_code: Option<String>,
    pub country: Option<String>,
    pub provider_id: Option<String>,
}

impl SymbolSearchHit {
    /// `PREFIX:SYMBOL`, the form the streaming session expects
    pub fn full_name(&self) -> String {
        let prefix = self.prefix.as_deref().unwrap_or(&self.exchange);
        format!("{}:{}", prefix, self.symbol)
    }

    fn strip_highlights(mut self) -> Self {
        self.symbol = strip_highlight_tags(&self.symbol);
        self.description = strip_highlight_tags(&self.description);
        self
    }
}

/// The search endpoint answers with a bare array or, on newer versions,
/// an object wrapping it
#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Hits(Vec<SymbolSearchHit>),
    Wrapped { symbols: Vec<SymbolSearchHit> },
}

#[derive(Deserialize)]
struct ScanResponse {
    #[serde(default)]
    data: Vec<ScanRow>,
}

#[derive(Deserialize)]
struct ScanRow {
    s: String,
}

fn strip_highlight_tags(text: &str) -> String {
    text.replace("<em>", "").replace("</em>", "")
}

/// Client for the symbol search and scanner services
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    search_url: String,
    scanner_url: String,
    lang: String,
}

impl RestClient {
    pub fn new(endpoints: &RestEndpoints) -> Result<Self, RestError> {
        let client = Client::builder()
            .user_agent(endpoints.user_agent.as_str())
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            search_url: endpoints.symbol_search_url.trim_end_matches('/').to_string(),
            scanner_url: endpoints.scanner_url.trim_end_matches('/').to_string(),
            lang: endpoints.lang.clone(),
        })
    }

    /// Search symbols by free text; highlight markup is removed from the hits
    pub async fn search_symbol(&self, text: &str) -> Result<Vec<SymbolSearchHit>, RestError> {
        let url = format!("{}/symbol_search/", self.search_url);
        debug!(url = %url, text = %text, "Searching symbols");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("text", text),
                ("hl", "1"),
                ("lang", self.lang.as_str()),
                ("domain", "production"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::Status { status, body });
        }

        let hits = match response.json::<SearchResponse>().await? {
            SearchResponse::Hits(hits) | SearchResponse::Wrapped { symbols: hits } => hits,
        };
        let hits: Vec<_> = hits.into_iter().map(SymbolSearchHit::strip_highlights).collect();

        info!(text = %text, hits = hits.len(), "Symbol search complete");
        Ok(hits)
    }

    /// Every symbol the screener lists for `sector` (e.g. "america", "russia", "crypto")
    pub async fn sector_symbols(&self, sector: &str) -> Result<Vec<String>, RestError> {
        let url = format!("{}/{}/scan", self.scanner_url, sector);
        debug!(url = %url, sector = %sector, "Fetching sector symbols");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::Status { status, body });
        }

        let scan: ScanResponse = response.json().await?;
        let symbols: Vec<String> = scan.data.into_iter().map(|row| row.s).collect();

        info!(sector = %sector, symbol_count = symbols.len(), "Fetched sector symbols");
        Ok(symbols)
    }
}
