/// Index payload normalization
///
/// The vendor's REST list endpoint and its push channel do not share a wire
/// shape, and neither is formally documented. Instead of guessing one schema
/// we walk whatever JSON arrives and try a prioritized list of known record
/// shapes on every object; anything unrecognized is recursed into and then
/// dropped.

use crate::types::{lenient_f64, IndexRecord, INDEX_SYMBOLS};
use serde_json::{Map, Value};

/// Canonical allow-list casing for a candidate symbol, None when the symbol
/// is not tracked.
pub fn canonical_index_symbol(raw: &str) -> Option<&'static str> {
    INDEX_SYMBOLS
        .iter()
        .copied()
        .find(|s| s.eq_ignore_ascii_case(raw.trim()))
}

/// Pull every recognizable index record out of an arbitrary nested payload.
/// Duplicate symbols de-duplicate keeping the last-seen occurrence.
pub fn extract_index_items(payload: &Value) -> Vec<IndexRecord> {
    let mut out = Vec::new();
    walk(payload, &mut out);
    out
}

fn walk(value: &Value, out: &mut Vec<IndexRecord>) {
    match value {
        Value::Array(items) => {
            for item in items {
                walk(item, out);
            }
        }
        Value::Object(obj) => {
            if let Some(record) = decode_index_object(obj) {
                upsert(out, record);
            } else {
                // Envelope object: the record may be nested under "data",
                // "content" or similar. Keep digging.
                for nested in obj.values() {
                    walk(nested, out);
                }
            }
        }
        _ => {}
    }
}

fn upsert(out: &mut Vec<IndexRecord>, record: IndexRecord) {
    if let Some(existing) = out.iter_mut().find(|r| r.symbol == record.symbol) {
        *existing = record;
    } else {
        out.push(record);
    }
}

/// Known shapes in priority order. A record that matches no shape is not an
/// index record.
fn decode_index_object(obj: &Map<String, Value>) -> Option<IndexRecord> {
    decode_rest_shape(obj)
        .or_else(|| decode_board_shape(obj))
        .or_else(|| decode_push_shape(obj))
}

/// marketIndex list records: `{"symbol": "VNINDEX", "price": 1200.0,
/// "refPrice": 1195.0, ...}`
pub(crate) fn decode_rest_shape(obj: &Map<String, Value>) -> Option<IndexRecord> {
    let symbol = canonical_index_symbol(obj.get("symbol")?.as_str()?)?;
    let price = obj.get("price").and_then(lenient_f64)?;
    let ref_price = obj
        .get("refPrice")
        .and_then(lenient_f64)
        .or_else(|| obj.get("ref").and_then(lenient_f64))
        .unwrap_or(0.0);
    Some(build_record(symbol, price, ref_price, obj))
}

/// Priceboard-style records with short codes: `{"s": "VNINDEX", "c": ...,
/// "ref": ...}`. Indices occasionally ride along on board frames.
pub(crate) fn decode_board_shape(obj: &Map<String, Value>) -> Option<IndexRecord> {
    let symbol = canonical_index_symbol(obj.get("s")?.as_str()?)?;
    let close = obj.get("c").and_then(lenient_f64);
    let reference = obj.get("ref").and_then(lenient_f64);
    let open = obj.get("op").and_then(lenient_f64);
    let price = [close, reference, open]
        .iter()
        .flatten()
        .copied()
        .find(|v| *v != 0.0)?;
    Some(build_record(symbol, price, reference.unwrap_or(0.0), obj))
}

/// Push-channel records observed with id-style keys: `{"indexSymbol" |
/// "code": ..., "indexValue" | "last": ..., "priorIndexValue": ...}`
pub(crate) fn decode_push_shape(obj: &Map<String, Value>) -> Option<IndexRecord> {
    let raw_symbol = obj
        .get("indexSymbol")
        .or_else(|| obj.get("code"))
        .or_else(|| obj.get("comGroupCode"))?
        .as_str()?;
    let symbol = canonical_index_symbol(raw_symbol)?;
    let price = obj
        .get("indexValue")
        .and_then(lenient_f64)
        .or_else(|| obj.get("last").and_then(lenient_f64))?;
    let ref_price = obj
        .get("priorIndexValue")
        .and_then(lenient_f64)
        .or_else(|| obj.get("refIndex").and_then(lenient_f64))
        .unwrap_or(0.0);
    Some(build_record(symbol, price, ref_price, obj))
}

fn build_record(
    symbol: &str,
    price: f64,
    ref_price: f64,
    obj: &Map<String, Value>,
) -> IndexRecord {
    let mut extra = obj.clone();
    // Keys that would collide with our named fields on serialization
    extra.remove("symbol");
    extra.remove("price");
    extra.remove("ref_price");
    IndexRecord {
        symbol: symbol.to_string(),
        price,
        ref_price,
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_rest_shape_decodes() {
        let record = decode_rest_shape(&obj(json!({
            "symbol": "VNINDEX", "price": 1200.5, "refPrice": 1195.0, "allValue": 9.9
        })))
        .unwrap();
        assert_eq!(record.symbol, "VNINDEX");
        assert_eq!(record.price, 1200.5);
        assert_eq!(record.ref_price, 1195.0);
        assert_eq!(record.extra["allValue"], 9.9);
    }

    #[test]
    fn test_rest_shape_requires_numeric_price() {
        assert!(decode_rest_shape(&obj(json!({"symbol": "VNINDEX", "price": "n/a"}))).is_none());
        assert!(decode_rest_shape(&obj(json!({"symbol": "VNINDEX"}))).is_none());
    }

    #[test]
    fn test_board_shape_decodes_with_price_chain() {
        let record = decode_board_shape(&obj(json!({
            "s": "VN30", "c": 0, "ref": 1250.0
        })))
        .unwrap();
        assert_eq!(record.symbol, "VN30");
        assert_eq!(record.price, 1250.0);
    }

    #[test]
    fn test_push_shape_decodes_both_key_variants() {
        let a = decode_push_shape(&obj(json!({
            "indexSymbol": "HNXIndex", "indexValue": 230.1, "priorIndexValue": 229.0
        })))
        .unwrap();
        assert_eq!(a.price, 230.1);

        let b = decode_push_shape(&obj(json!({"code": "VN30", "last": "1251.3"}))).unwrap();
        assert_eq!(b.price, 1251.3);
        assert_eq!(b.ref_price, 0.0);
    }

    #[test]
    fn test_allow_list_is_case_insensitive_and_strict() {
        assert_eq!(canonical_index_symbol("vnindex"), Some("VNINDEX"));
        assert_eq!(canonical_index_symbol("hnxindex"), Some("HNXIndex"));
        assert_eq!(canonical_index_symbol("FOOBAR"), None);
    }

    #[test]
    fn test_extract_filters_unknown_symbols() {
        let payload = json!([
            {"symbol": "VNINDEX", "price": 1200.0},
            {"symbol": "FOOBAR", "price": 42.0}
        ]);
        let items = extract_index_items(&payload);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].symbol, "VNINDEX");
    }

    #[test]
    fn test_extract_recurses_into_envelopes() {
        let payload = json!({
            "event": "indexUpdate",
            "data": {
                "content": [
                    {"indexSymbol": "VNINDEX", "indexValue": 1205.0},
                    {"symbol": "HNX30", "price": 410.2}
                ]
            }
        });
        let items = extract_index_items(&payload);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_extract_keeps_last_seen_duplicate() {
        let payload = json!([
            {"symbol": "VNINDEX", "price": 1200.0},
            {"symbol": "VN30", "price": 1250.0},
            {"symbol": "VNINDEX", "price": 1201.5}
        ]);
        let items = extract_index_items(&payload);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].symbol, "VNINDEX");
        assert_eq!(items[0].price, 1201.5);
    }

    #[test]
    fn test_extract_ignores_scalars_and_junk() {
        assert!(extract_index_items(&json!("hello")).is_empty());
        assert!(extract_index_items(&json!({"status": "ok", "ts": 1})).is_empty());
        assert!(extract_index_items(&json!(null)).is_empty());
    }
}
