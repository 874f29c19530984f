use crate::types::{PriceDetail, PriceSource, RawTickerItem};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct BoardState {
    items: HashMap<String, RawTickerItem>,
    replaced_at: Option<Instant>,
}

/// In-memory price board for every listed ticker.
///
/// The poll loop replaces the whole board each cycle; readers get a
/// normalized view with no network call. Individual entries are never
/// mutated or deleted in place.
#[derive(Debug, Default)]
pub struct PriceCache {
    state: RwLock<BoardState>,
}

pub type SharedPriceCache = Arc<PriceCache>;

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// All-or-nothing swap. An empty board means every group fetch failed
    /// this cycle: keep serving the previous snapshot instead of wiping it.
    /// Returns whether the board was replaced.
    pub async fn apply_bulk(&self, new_board: HashMap<String, RawTickerItem>) -> bool {
        if new_board.is_empty() {
            return false;
        }
        let count = new_board.len();
        {
            let mut state = self.state.write().await;
            state.items = new_board;
            state.replaced_at = Some(Instant::now());
        }
        tracing::info!("Price board replaced: {} symbols", count);
        true
    }

    /// Normalized lookup; `symbol` must already be uppercase.
    pub async fn lookup(&self, symbol: &str) -> Option<PriceDetail> {
        self.lookup_within(symbol, None).await
    }

    /// Lookup with an optional staleness ceiling: a hit on a board older
    /// than `max_age` counts as a miss.
    pub async fn lookup_within(
        &self,
        symbol: &str,
        max_age: Option<Duration>,
    ) -> Option<PriceDetail> {
        let state = self.state.read().await;
        if let (Some(ceiling), Some(replaced_at)) = (max_age, state.replaced_at) {
            if replaced_at.elapsed() >= ceiling {
                return None;
            }
        }
        state
            .items
            .get(symbol)
            .map(|item| item.to_detail(PriceSource::Ram))
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Age of the current board, None until the first successful replace.
    pub async fn snapshot_age(&self) -> Option<Duration> {
        self.state
            .read()
            .await
            .replaced_at
            .map(|t| t.elapsed())
    }

    /// Uppercase symbols currently on the board (diagnostic / route layer
    /// bulk endpoint).
    pub async fn symbols(&self) -> Vec<String> {
        self.state.read().await.items.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(symbol: &str, close: f64, reference: f64) -> RawTickerItem {
        RawTickerItem {
            symbol: symbol.to_string(),
            close: Some(close),
            reference: Some(reference),
            ..Default::default()
        }
    }

    fn board(entries: &[(&str, f64, f64)]) -> HashMap<String, RawTickerItem> {
        entries
            .iter()
            .map(|(s, c, r)| (s.to_string(), item(s, *c, *r)))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_board_is_a_no_op() {
        let cache = PriceCache::new();
        assert!(cache.apply_bulk(board(&[("VNM", 80.0, 79.0)])).await);
        assert!(!cache.apply_bulk(HashMap::new()).await);

        // Previous snapshot survives a total-failure cycle untouched
        let detail = cache.lookup("VNM").await.unwrap();
        assert_eq!(detail.price, 80.0);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_swap_drops_stale_entries() {
        let cache = PriceCache::new();
        cache
            .apply_bulk(board(&[("VNM", 80.0, 79.0), ("FPT", 105.5, 105.0)]))
            .await;
        cache.apply_bulk(board(&[("SSI", 33.0, 32.5)])).await;

        assert!(cache.lookup("VNM").await.is_none());
        assert!(cache.lookup("FPT").await.is_none());
        assert_eq!(cache.lookup("SSI").await.unwrap().price, 33.0);
    }

    #[tokio::test]
    async fn test_lookup_normalizes_fields() {
        let cache = PriceCache::new();
        cache.apply_bulk(board(&[("VNM", 80.0, 79.0)])).await;

        let detail = cache.lookup("VNM").await.unwrap();
        assert_eq!(detail.symbol, "VNM");
        assert_eq!(detail.ref_price, 79.0);
        assert_eq!(detail.source, PriceSource::Ram);
        // Fields absent upstream come back as 0.0
        assert_eq!(detail.volume, 0.0);
        assert_eq!(detail.ceiling, 0.0);
    }

    #[tokio::test]
    async fn test_staleness_ceiling_turns_hit_into_miss() {
        let cache = PriceCache::new();
        cache.apply_bulk(board(&[("VNM", 80.0, 79.0)])).await;

        assert!(cache.lookup_within("VNM", None).await.is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache
            .lookup_within("VNM", Some(Duration::from_millis(5)))
            .await
            .is_none());
        assert!(cache
            .lookup_within("VNM", Some(Duration::from_secs(60)))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_snapshot_age_starts_unset() {
        let cache = PriceCache::new();
        assert!(cache.snapshot_age().await.is_none());
        cache.apply_bulk(board(&[("VNM", 80.0, 79.0)])).await;
        assert!(cache.snapshot_age().await.is_some());
    }
}
