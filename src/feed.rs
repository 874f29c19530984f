/// Process-wide market data feed: owns both caches, starts the background
/// tasks at most once each, and exposes the read accessors the route layer
/// consumes.

use crate::fetch::{VciClient, INDEX_LIST_URL, PRICEBOARD_BASE_URL};
use crate::index_cache::{IndexCache, SharedIndexCache};
use crate::poll::{self, IndexPollSettings};
use crate::price_cache::{PriceCache, SharedPriceCache};
use crate::push::{self, PushSettings, PushState, PushStateCell};
use crate::types::{IndexRecord, IndexSource, PriceDetail, PriceSource};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Tunables for the refresh subsystem. Compile-time defaulted, not
/// environment-driven; the endpoints and cadences mirror the vendor's
/// production values.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub board_url: String,
    pub index_url: String,
    pub push_url: String,
    pub push_enabled: bool,
    pub price_poll_interval: Duration,
    pub index_poll_interval: Duration,
    /// Index updates newer than this make a poll cycle redundant
    pub index_freshness_window: Duration,
    pub group_fetch_timeout: Duration,
    pub direct_fetch_timeout: Duration,
    pub index_fetch_timeout: Duration,
    /// The one-time warm-up fetch gets a little longer than steady state
    pub bootstrap_fetch_timeout: Duration,
    pub push_retry_delay: Duration,
    pub push_max_attempts: Option<u32>,
    /// Reject board cache hits older than this; None serves stale data
    /// indefinitely (availability over freshness, the vendor-outage policy)
    pub price_max_age: Option<Duration>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            board_url: PRICEBOARD_BASE_URL.to_string(),
            index_url: INDEX_LIST_URL.to_string(),
            push_url: "wss://trading.vietcap.com.vn/ws/price".to_string(),
            push_enabled: true,
            price_poll_interval: Duration::from_secs(12),
            index_poll_interval: Duration::from_secs(3),
            index_freshness_window: Duration::from_millis(2500),
            group_fetch_timeout: Duration::from_secs(5),
            direct_fetch_timeout: Duration::from_secs(3),
            index_fetch_timeout: Duration::from_secs(3),
            bootstrap_fetch_timeout: Duration::from_secs(5),
            push_retry_delay: Duration::from_secs(3),
            push_max_attempts: None,
            price_max_age: None,
        }
    }
}

pub struct MarketFeed {
    client: VciClient,
    config: FeedConfig,
    prices: SharedPriceCache,
    indices: SharedIndexCache,
    push_state: Arc<PushStateCell>,
    price_guard: OnceCell<()>,
    index_guard: OnceCell<()>,
    tasks_started: AtomicUsize,
}

impl MarketFeed {
    pub fn new(config: FeedConfig) -> Arc<Self> {
        let client = VciClient::new(&config.board_url, &config.index_url);
        Arc::new(Self {
            client,
            config,
            prices: Arc::new(PriceCache::new()),
            indices: Arc::new(IndexCache::new()),
            push_state: Arc::new(PushStateCell::default()),
            price_guard: OnceCell::new(),
            index_guard: OnceCell::new(),
            tasks_started: AtomicUsize::new(0),
        })
    }

    /// Idempotent: the first caller spawns the board refresh loop, later
    /// callers get a cheap no-op. Concurrent first callers serialize on the
    /// cell, so exactly one loop ever runs.
    pub async fn ensure_price_refresh(&self) {
        self.price_guard
            .get_or_init(|| async {
                tokio::spawn(poll::run_price_loop(
                    self.client.clone(),
                    Arc::clone(&self.prices),
                    self.config.price_poll_interval,
                    self.config.group_fetch_timeout,
                ));
                self.tasks_started.fetch_add(1, Ordering::Relaxed);
            })
            .await;
    }

    /// Idempotent; the first caller additionally performs one warm-up REST
    /// fetch before returning so the earliest reader sees a populated
    /// cache. Concurrent first callers all wait on that same bootstrap.
    pub async fn ensure_indices_refresh(&self) {
        self.index_guard
            .get_or_init(|| async {
                // Warm-up failure is not fatal: the loop retries in 3s
                poll::refresh_indices_once(
                    &self.client,
                    &self.indices,
                    self.config.bootstrap_fetch_timeout,
                )
                .await;

                tokio::spawn(poll::run_index_loop(
                    self.client.clone(),
                    Arc::clone(&self.indices),
                    IndexPollSettings {
                        poll_interval: self.config.index_poll_interval,
                        freshness_window: self.config.index_freshness_window,
                        fetch_timeout: self.config.index_fetch_timeout,
                    },
                ));
                self.tasks_started.fetch_add(1, Ordering::Relaxed);

                if self.config.push_enabled {
                    tokio::spawn(push::run_push_listener(
                        PushSettings {
                            url: self.config.push_url.clone(),
                            retry_delay: self.config.push_retry_delay,
                            max_attempts: self.config.push_max_attempts,
                        },
                        Arc::clone(&self.indices),
                        Arc::clone(&self.push_state),
                    ));
                    self.tasks_started.fetch_add(1, Ordering::Relaxed);
                }
            })
            .await;
    }

    /// Latest trade price, None when the symbol resolves nowhere.
    pub async fn get_price(&self, symbol: &str) -> Option<f64> {
        self.get_price_detail(symbol).await.map(|d| d.price)
    }

    /// Full normalized snapshot for one symbol: board cache first, then a
    /// one-shot direct fetch that deliberately does not populate the cache.
    pub async fn get_price_detail(&self, symbol: &str) -> Option<PriceDetail> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return None;
        }
        self.ensure_price_refresh().await;

        if let Some(detail) = self
            .prices
            .lookup_within(&symbol, self.config.price_max_age)
            .await
        {
            return Some(detail);
        }

        match self
            .client
            .fetch_symbol(&symbol, self.config.direct_fetch_timeout)
            .await
        {
            Ok(Some(item)) => Some(item.to_detail(PriceSource::Direct)),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!("Direct price fetch failed for {}: {}", symbol, e);
                None
            }
        }
    }

    /// Bulk price read. Symbols with no resolvable (non-zero) price are
    /// absent from the result, not null.
    pub async fn get_multiple_prices<S: AsRef<str>>(
        &self,
        symbols: &[S],
    ) -> HashMap<String, f64> {
        self.ensure_price_refresh().await;

        let mut out = HashMap::new();
        for symbol in symbols {
            let symbol = symbol.as_ref().trim().to_uppercase();
            if symbol.is_empty() {
                continue;
            }
            if let Some(price) = self.get_price(&symbol).await {
                if price != 0.0 {
                    out.insert(symbol, price);
                }
            }
        }
        out
    }

    /// Current index snapshot from memory; never a network call on this
    /// path once started.
    pub async fn get_market_indices(&self) -> Vec<IndexRecord> {
        self.ensure_indices_refresh().await;
        self.indices.snapshot().await
    }

    /// Rolling sparkline history per index, oldest first.
    pub fn get_indices_history(&self) -> HashMap<String, Vec<f64>> {
        self.indices.history()
    }

    /// Which channel last wrote the index cache (diagnostic).
    pub async fn get_indices_source(&self) -> IndexSource {
        self.indices.source().await
    }

    /// Wall-clock stamp and channel of the last index write.
    pub async fn indices_freshness(&self) -> (Option<DateTime<Utc>>, IndexSource) {
        self.indices.freshness().await
    }

    /// Connection state of the push listener.
    pub fn push_state(&self) -> PushState {
        self.push_state.get()
    }

    pub async fn board_symbol_count(&self) -> usize {
        self.prices.len().await
    }

    /// Age of the current price board, None before the first fill.
    pub async fn board_age(&self) -> Option<Duration> {
        self.prices.snapshot_age().await
    }

    /// Number of background tasks launched so far (diagnostic).
    pub fn tasks_started(&self) -> usize {
        self.tasks_started.load(Ordering::Relaxed)
    }

    /// Direct handle to the board cache; the bulk /prices route reads the
    /// raw board through this.
    pub fn price_board(&self) -> &SharedPriceCache {
        &self.prices
    }

    pub fn index_cache(&self) -> &SharedIndexCache {
        &self.indices
    }
}
