/// Realtime push listener for index updates
///
/// Best-effort freshness channel: the REST poll loop is the safety net, so
/// this listener reconnects forever with a fixed short delay and swallows
/// malformed frames per-message.

use crate::index_cache::IndexCache;
use crate::normalize::extract_index_items;
use crate::types::{IndexSource, INDEX_SYMBOLS};
use futures_util::{SinkExt, StreamExt};
use std::error::Error;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

/// Observable connection state of the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    Disconnected,
    Connecting,
    Connected,
}

impl PushState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushState::Disconnected => "DISCONNECTED",
            PushState::Connecting => "CONNECTING",
            PushState::Connected => "CONNECTED",
        }
    }
}

/// Lock-free cell holding the current connection state
#[derive(Debug, Default)]
pub struct PushStateCell(AtomicU8);

impl PushStateCell {
    pub fn get(&self) -> PushState {
        match self.0.load(Ordering::Relaxed) {
            1 => PushState::Connecting,
            2 => PushState::Connected,
            _ => PushState::Disconnected,
        }
    }

    fn set(&self, state: PushState) {
        let v = match state {
            PushState::Disconnected => 0,
            PushState::Connecting => 1,
            PushState::Connected => 2,
        };
        self.0.store(v, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub struct PushSettings {
    pub url: String,
    /// Fixed delay between reconnect attempts (no exponential growth;
    /// REST remains the fallback while we are down)
    pub retry_delay: Duration,
    /// Stop reconnecting for this process after this many consecutive
    /// failures; None retries forever
    pub max_attempts: Option<u32>,
}

/// The subscribe convention of the realtime channel is not documented and
/// has changed across vendor releases. Send every plausible frame and let
/// the server ignore the ones it does not understand.
pub fn subscription_frames() -> Vec<String> {
    let topics: Vec<String> = INDEX_SYMBOLS.iter().map(|s| format!("index.{}", s)).collect();
    vec![
        serde_json::json!({
            "type": "subscribe",
            "topic": "marketIndex",
            "symbols": INDEX_SYMBOLS,
        })
        .to_string(),
        serde_json::json!({
            "op": "subscribe",
            "args": topics,
        })
        .to_string(),
        serde_json::json!({
            "event": "sub",
            "channel": "market-index",
            "codes": INDEX_SYMBOLS,
        })
        .to_string(),
    ]
}

pub async fn run_push_listener(
    settings: PushSettings,
    cache: Arc<IndexCache>,
    state: Arc<PushStateCell>,
) {
    tracing::info!("Index push listener started ({})", settings.url);
    let mut failed_attempts: u32 = 0;

    loop {
        state.set(PushState::Connecting);

        match connect_and_stream(&settings, &cache, &state).await {
            Ok(()) => {
                tracing::info!("Push connection closed by server; reconnecting");
                failed_attempts = 0;
            }
            Err(e) => {
                failed_attempts += 1;
                tracing::warn!(
                    "Push connection error: {} (attempt {})",
                    e,
                    failed_attempts
                );
            }
        }

        state.set(PushState::Disconnected);

        if let Some(max) = settings.max_attempts {
            if failed_attempts >= max {
                tracing::error!(
                    "Push listener giving up after {} failed attempts; REST polling remains",
                    failed_attempts
                );
                return;
            }
        }

        tokio::time::sleep(settings.retry_delay).await;
    }
}

async fn connect_and_stream(
    settings: &PushSettings,
    cache: &IndexCache,
    state: &PushStateCell,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let (ws_stream, _) = connect_async(&settings.url).await?;
    let (mut write, mut read) = ws_stream.split();
    state.set(PushState::Connected);
    tracing::info!("Push channel connected");

    for frame in subscription_frames() {
        write.send(WsMessage::Text(frame.into())).await?;
    }
    tracing::debug!("Push subscriptions sent");

    while let Some(msg) = read.next().await {
        match msg? {
            WsMessage::Text(text) => handle_frame(&text, cache).await,
            WsMessage::Binary(_) => {
                // Not observed from this vendor; ignore
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => {
                // Heartbeat - ignore
            }
            WsMessage::Close(_) => {
                break;
            }
            _ => {}
        }
    }

    Ok(())
}

/// One frame, one independent cache update attempt. A bad frame never
/// takes the connection down.
async fn handle_frame(text: &str, cache: &IndexCache) {
    let payload: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("Unparseable push frame: {}", e);
            return;
        }
    };

    let items = extract_index_items(&payload);
    if items.is_empty() {
        tracing::debug!("Push frame carried no index records");
        return;
    }

    if cache.apply_update(items, IndexSource::Push).await {
        tracing::debug!("Index cache updated from push channel");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_frames_cover_allow_list() {
        let frames = subscription_frames();
        assert_eq!(frames.len(), 3);
        for frame in &frames {
            // Every frame must be valid JSON
            let v: serde_json::Value = serde_json::from_str(frame).unwrap();
            assert!(v.is_object());
            // And mention every tracked index one way or another
            for symbol in INDEX_SYMBOLS {
                assert!(frame.contains(symbol), "{} missing from {}", symbol, frame);
            }
        }
    }

    #[test]
    fn test_state_cell_round_trips() {
        let cell = PushStateCell::default();
        assert_eq!(cell.get(), PushState::Disconnected);
        cell.set(PushState::Connecting);
        assert_eq!(cell.get(), PushState::Connecting);
        cell.set(PushState::Connected);
        assert_eq!(cell.get(), PushState::Connected);
        cell.set(PushState::Disconnected);
        assert_eq!(cell.get(), PushState::Disconnected);
    }

    #[tokio::test]
    async fn test_push_frame_updates_cache() {
        let cache = IndexCache::new();
        let frame = serde_json::json!({
            "event": "indexUpdate",
            "data": [{"indexSymbol": "VNINDEX", "indexValue": 1205.0}]
        })
        .to_string();

        handle_frame(&frame, &cache).await;

        let items = cache.snapshot().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price, 1205.0);
        assert_eq!(cache.source().await, IndexSource::Push);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_swallowed() {
        let cache = IndexCache::new();
        handle_frame("{not json", &cache).await;
        handle_frame(r#"{"status": "ok"}"#, &cache).await;
        assert!(cache.snapshot().await.is_empty());
        assert_eq!(cache.source().await, IndexSource::Empty);
    }

    #[tokio::test]
    async fn test_listener_gives_up_after_max_attempts() {
        // Unroutable endpoint with a two-attempt budget: the listener must
        // return instead of looping forever.
        let settings = PushSettings {
            url: "ws://127.0.0.1:9".to_string(),
            retry_delay: Duration::from_millis(10),
            max_attempts: Some(2),
        };
        let cache = Arc::new(IndexCache::new());
        let state = Arc::new(PushStateCell::default());

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_push_listener(settings, Arc::clone(&cache), Arc::clone(&state)),
        )
        .await;

        assert!(result.is_ok(), "listener did not stop at the attempt cap");
        assert_eq!(state.get(), PushState::Disconnected);
    }
}
