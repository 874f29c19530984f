/// Background poll loops keeping both caches warm
///
/// Every iteration catches its own failures: one bad cycle logs and waits
/// for the next tick, it never kills the loop.

use crate::fetch::VciClient;
use crate::index_cache::IndexCache;
use crate::normalize::extract_index_items;
use crate::price_cache::PriceCache;
use crate::types::{IndexSource, RawTickerItem, EXCHANGE_GROUPS};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// One bulk refresh of the price board: the three exchange-group fetches
/// run concurrently (exactly three in flight) and whatever succeeds merges
/// into a single board. Per-group failures already collapse to empty maps
/// inside the client, so a partial outage still replaces the board with the
/// surviving groups.
pub async fn update_bulk_cache(
    client: &VciClient,
    cache: &PriceCache,
    fetch_timeout: Duration,
) -> bool {
    let fetches = EXCHANGE_GROUPS
        .iter()
        .map(|group| client.fetch_group(group, fetch_timeout));

    let mut merged: HashMap<String, RawTickerItem> = HashMap::new();
    for group_map in join_all(fetches).await {
        merged.extend(group_map);
    }

    cache.apply_bulk(merged).await
}

pub async fn run_price_loop(
    client: VciClient,
    cache: Arc<PriceCache>,
    poll_interval: Duration,
    fetch_timeout: Duration,
) {
    tracing::info!(
        "Price board refresh loop started ({}s cadence)",
        poll_interval.as_secs()
    );

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !update_bulk_cache(&client, &cache, fetch_timeout).await {
            tracing::warn!("Price board refresh produced no data; keeping previous snapshot");
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexPollSettings {
    pub poll_interval: Duration,
    /// Updates newer than this (from any source) make a poll cycle redundant
    pub freshness_window: Duration,
    pub fetch_timeout: Duration,
}

/// One REST refresh of the index cache. Returns whether the cache changed.
pub async fn refresh_indices_once(
    client: &VciClient,
    cache: &IndexCache,
    fetch_timeout: Duration,
) -> bool {
    match client.fetch_indices(fetch_timeout).await {
        Ok(payload) => {
            let items = extract_index_items(&payload);
            if items.is_empty() {
                tracing::warn!("Index fetch returned no recognizable records");
                false
            } else {
                cache.apply_update(items, IndexSource::Rest).await
            }
        }
        Err(e) => {
            tracing::error!("Index REST refresh failed: {}", e);
            false
        }
    }
}

pub async fn run_index_loop(
    client: VciClient,
    cache: Arc<IndexCache>,
    settings: IndexPollSettings,
) {
    tracing::info!(
        "Index refresh loop started ({}ms cadence, {}ms freshness window)",
        settings.poll_interval.as_millis(),
        settings.freshness_window.as_millis()
    );

    let mut ticker = tokio::time::interval(settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        // The push channel may have written more recently; a redundant
        // fetch racing it is harmless, this check just saves the call.
        if cache.updated_within(settings.freshness_window).await {
            tracing::debug!("Index cache fresh; skipping REST poll");
            continue;
        }

        refresh_indices_once(&client, &cache, settings.fetch_timeout).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IndexRecord;

    fn record(symbol: &str, price: f64) -> IndexRecord {
        IndexRecord {
            symbol: symbol.to_string(),
            price,
            ref_price: 0.0,
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_total_failure_cycle_retains_previous_board() {
        // Unroutable endpoint: all three group fetches fail, the merge is
        // empty, and the previously cached board must survive unchanged.
        let client = VciClient::new("http://127.0.0.1:9", "http://127.0.0.1:9");
        let cache = PriceCache::new();

        let seeded: HashMap<String, RawTickerItem> = [(
            "VNM".to_string(),
            RawTickerItem {
                symbol: "VNM".to_string(),
                close: Some(80.0),
                reference: Some(79.0),
                ..Default::default()
            },
        )]
        .into();
        cache.apply_bulk(seeded).await;

        let replaced = update_bulk_cache(&client, &cache, Duration::from_millis(200)).await;
        assert!(!replaced);
        assert_eq!(cache.lookup("VNM").await.unwrap().price, 80.0);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_index_refresh_leaves_cache_alone() {
        let client = VciClient::new("http://127.0.0.1:9", "http://127.0.0.1:9");
        let cache = IndexCache::new();
        cache
            .apply_update(vec![record("VNINDEX", 1200.0)], IndexSource::Rest)
            .await;

        let changed = refresh_indices_once(&client, &cache, Duration::from_millis(200)).await;
        assert!(!changed);
        assert_eq!(cache.snapshot().await[0].price, 1200.0);
        assert_eq!(cache.source().await, IndexSource::Rest);
    }
}
