use crate::types::{IndexRecord, IndexSource, INDEX_HISTORY_SIZE};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug)]
struct IndexState {
    items: Vec<IndexRecord>,
    updated_at: Option<Instant>,
    stamped_at: Option<DateTime<Utc>>,
    source: IndexSource,
}

impl Default for IndexState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            updated_at: None,
            stamped_at: None,
            source: IndexSource::Empty,
        }
    }
}

/// In-memory market index snapshot plus per-index sparkline history.
///
/// Two writers exist (REST poll loop, push listener); both replace the
/// snapshot wholesale and last writer wins. The freshness timestamp is the
/// only coordination between them, and it is advisory.
#[derive(Debug, Default)]
pub struct IndexCache {
    state: RwLock<IndexState>,
    history: DashMap<String, VecDeque<f64>>,
}

pub type SharedIndexCache = Arc<IndexCache>;

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot, stamp freshness and source, and extend each
    /// index's history buffer. Empty input never overwrites good data.
    /// Returns whether the cache changed.
    pub async fn apply_update(&self, items: Vec<IndexRecord>, source: IndexSource) -> bool {
        if items.is_empty() {
            return false;
        }

        // Append before truncating; the dashmap entry guard makes the pair
        // atomic per symbol even with both writers active.
        for item in &items {
            let mut buf = self.history.entry(item.symbol.clone()).or_default();
            buf.push_back(item.price);
            while buf.len() > INDEX_HISTORY_SIZE {
                buf.pop_front();
            }
        }

        let mut state = self.state.write().await;
        state.items = items;
        state.updated_at = Some(Instant::now());
        state.stamped_at = Some(Utc::now());
        state.source = source;
        true
    }

    /// Current snapshot list, cloned out so readers never hold the lock.
    pub async fn snapshot(&self) -> Vec<IndexRecord> {
        self.state.read().await.items.clone()
    }

    pub async fn source(&self) -> IndexSource {
        self.state.read().await.source
    }

    /// Whether any source wrote the cache within `window`. The poll loop
    /// uses this to skip redundant fetches while the push channel is live.
    pub async fn updated_within(&self, window: Duration) -> bool {
        self.state
            .read()
            .await
            .updated_at
            .map(|t| t.elapsed() < window)
            .unwrap_or(false)
    }

    /// Wall-clock stamp of the last write plus the channel that made it.
    pub async fn freshness(&self) -> (Option<DateTime<Utc>>, IndexSource) {
        let state = self.state.read().await;
        (state.stamped_at, state.source)
    }

    /// Rolling price history per index, oldest first.
    pub fn history(&self) -> HashMap<String, Vec<f64>> {
        self.history
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().iter().copied().collect()))
            .collect()
    }
}
