//! Market data cache daemon for the dashboard backend

use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vnboard_feed::feed::{FeedConfig, MarketFeed};
use vnboard_feed::types::{EXCHANGE_GROUPS, INDEX_SYMBOLS};

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting market data cache daemon");
    tracing::info!(
        "Tracking {} exchange groups {:?}, {} indices {:?}",
        EXCHANGE_GROUPS.len(),
        EXCHANGE_GROUPS,
        INDEX_SYMBOLS.len(),
        INDEX_SYMBOLS
    );

    let feed = MarketFeed::new(FeedConfig::default());
    feed.ensure_price_refresh().await;
    feed.ensure_indices_refresh().await;

    // Log cache status periodically
    let mut status = tokio::time::interval(STATUS_INTERVAL);
    loop {
        status.tick().await;

        let symbols = feed.board_symbol_count().await;
        let board_age = feed
            .board_age()
            .await
            .map(|a| format!("{}s", a.as_secs()))
            .unwrap_or_else(|| "never filled".to_string());
        let (stamped_at, source) = feed.indices_freshness().await;

        tracing::info!(
            "status: {} symbols on board (age {}), index source {} (stamped {}), push {}",
            symbols,
            board_age,
            source.as_str(),
            stamped_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            feed.push_state().as_str()
        );
    }
}
