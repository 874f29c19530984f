/// HTTP client for the vendor's price endpoints

use crate::types::{RawTickerItem, INDEX_SYMBOLS};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;

pub const PRICEBOARD_BASE_URL: &str = "https://trading.vietcap.com.vn/api/price/v1/w/priceboard";
pub const INDEX_LIST_URL: &str = "https://trading.vietcap.com.vn/api/price/marketIndex/getList";

// The vendor rejects non-browser user agents
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

type FetchError = Box<dyn Error + Send + Sync>;

/// Thin wrapper over one pooled HTTP client with the vendor's fixed headers.
/// Every call carries its own timeout so no loop iteration can hang.
#[derive(Debug, Clone)]
pub struct VciClient {
    http: reqwest::Client,
    board_url: String,
    index_url: String,
}

impl VciClient {
    pub fn new(board_url: impl Into<String>, index_url: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            board_url: board_url.into(),
            index_url: index_url.into(),
        }
    }

    /// Bulk snapshot for one exchange group, keyed by uppercase symbol.
    /// Any failure collapses to an empty map so one bad group never blocks
    /// the others from merging.
    pub async fn fetch_group(
        &self,
        group: &str,
        timeout: Duration,
    ) -> HashMap<String, RawTickerItem> {
        match self.try_fetch_group(group, timeout).await {
            Ok(map) => map,
            Err(e) => {
                tracing::error!("Failed to fetch group {}: {}", group, e);
                HashMap::new()
            }
        }
    }

    async fn try_fetch_group(
        &self,
        group: &str,
        timeout: Duration,
    ) -> Result<HashMap<String, RawTickerItem>, FetchError> {
        let url = format!("{}/tickers/price/group", self.board_url);
        let items: Vec<RawTickerItem> = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(&serde_json::json!({ "group": group }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(items
            .into_iter()
            .filter(|item| !item.symbol.is_empty())
            .map(|item| (item.symbol.to_uppercase(), item))
            .collect())
    }

    /// Single-ticker snapshot for the cache-miss rescue path.
    pub async fn fetch_symbol(
        &self,
        symbol: &str,
        timeout: Duration,
    ) -> Result<Option<RawTickerItem>, FetchError> {
        let url = format!("{}/ticker/price/{}", self.board_url, symbol);
        let items: Vec<RawTickerItem> = self
            .http
            .get(&url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(items.into_iter().next())
    }

    /// Current snapshot for the whole index allow-list. Returned raw; the
    /// normalization layer decides what is a usable record.
    pub async fn fetch_indices(&self, timeout: Duration) -> Result<Value, FetchError> {
        let payload: Value = self
            .http
            .post(&self.index_url)
            .timeout(timeout)
            .json(&serde_json::json!({ "symbols": INDEX_SYMBOLS }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(payload)
    }
}

impl Default for VciClient {
    fn default() -> Self {
        Self::new(PRICEBOARD_BASE_URL, INDEX_LIST_URL)
    }
}
