use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Exchange groups whose priceboards are bulk-fetched each refresh cycle
pub const EXCHANGE_GROUPS: [&str; 3] = ["HOSE", "HNX", "UPCOM"];

/// Fixed allow-list of market index codes tracked by the index cache
pub const INDEX_SYMBOLS: [&str; 5] = ["VNINDEX", "VN30", "HNXIndex", "HNX30", "HNXUpcomIndex"];

/// Rolling per-index history length (sparkline window)
pub const INDEX_HISTORY_SIZE: usize = 30;

/// Lenient numeric read: the vendor serves prices as JSON numbers on some
/// endpoints and as strings on others. Anything else counts as absent.
pub fn lenient_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn de_lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(lenient_f64(&v))
}

/// One priceboard record as the vendor sends it: short-code field names,
/// every numeric field optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTickerItem {
    #[serde(rename = "s", default)]
    pub symbol: String,
    #[serde(rename = "c", default, deserialize_with = "de_lenient_f64")]
    pub close: Option<f64>,
    #[serde(rename = "ref", default, deserialize_with = "de_lenient_f64")]
    pub reference: Option<f64>,
    #[serde(rename = "cei", default, deserialize_with = "de_lenient_f64")]
    pub ceiling: Option<f64>,
    #[serde(rename = "flo", default, deserialize_with = "de_lenient_f64")]
    pub floor: Option<f64>,
    #[serde(rename = "op", default, deserialize_with = "de_lenient_f64")]
    pub open: Option<f64>,
    #[serde(rename = "h", default, deserialize_with = "de_lenient_f64")]
    pub high: Option<f64>,
    #[serde(rename = "l", default, deserialize_with = "de_lenient_f64")]
    pub low: Option<f64>,
    #[serde(rename = "vo", default, deserialize_with = "de_lenient_f64")]
    pub volume: Option<f64>,
    #[serde(rename = "va", default, deserialize_with = "de_lenient_f64")]
    pub value: Option<f64>,
}

/// First non-zero link of a fallback chain, 0.0 when every link is absent
/// or zero.
pub fn first_nonzero(chain: &[Option<f64>]) -> f64 {
    chain
        .iter()
        .flatten()
        .copied()
        .find(|v| *v != 0.0)
        .unwrap_or(0.0)
}

impl RawTickerItem {
    /// Trade price resolved through close -> reference -> open.
    pub fn resolved_price(&self) -> f64 {
        first_nonzero(&[self.close, self.reference, self.open])
    }

    /// Normalized read-side view. Missing numerics become 0.0, never null.
    pub fn to_detail(&self, source: PriceSource) -> PriceDetail {
        PriceDetail {
            symbol: self.symbol.to_uppercase(),
            price: self.resolved_price(),
            ref_price: self.reference.unwrap_or(0.0),
            ceiling: self.ceiling.unwrap_or(0.0),
            floor: self.floor.unwrap_or(0.0),
            open: self.open.unwrap_or(0.0),
            high: self.high.unwrap_or(0.0),
            low: self.low.unwrap_or(0.0),
            volume: self.volume.unwrap_or(0.0),
            value: self.value.unwrap_or(0.0),
            source,
        }
    }
}

/// Which path produced a price answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriceSource {
    /// Served from the background-refreshed board cache
    #[serde(rename = "VCI_RAM")]
    Ram,
    /// One-shot direct fetch after a cache miss
    #[serde(rename = "VCI_DIRECT")]
    Direct,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Ram => "VCI_RAM",
            PriceSource::Direct => "VCI_DIRECT",
        }
    }
}

/// Normalized price snapshot handed to the route layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceDetail {
    pub symbol: String,
    pub price: f64,
    pub ref_price: f64,
    pub ceiling: f64,
    pub floor: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub value: f64,
    pub source: PriceSource,
}

/// Which channel last wrote the index cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexSource {
    /// Nothing has been written yet
    #[serde(rename = "EMPTY")]
    Empty,
    /// REST poll loop
    #[serde(rename = "REST")]
    Rest,
    /// Realtime push channel
    #[serde(rename = "SOCKET")]
    Push,
}

impl IndexSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexSource::Empty => "EMPTY",
            IndexSource::Rest => "REST",
            IndexSource::Push => "SOCKET",
        }
    }
}

/// One market index snapshot. `extra` carries the vendor fields we do not
/// interpret, passed through unchanged for the frontend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexRecord {
    pub symbol: String,
    pub price: f64,
    pub ref_price: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}
