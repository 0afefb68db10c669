//! Normalization of raw asset payloads.
//!
//! The backend may return partially-populated or outright malformed asset
//! records. Everything that reaches the cache or the UI goes through
//! `normalize` first, which converts an arbitrary JSON value into a
//! complete `NormalizedAsset` with documented fallback values. Normalization
//! never fails: one bad record degrades to a placeholder, it never drops out
//! of the collection or aborts the batch.
//!
//! All functions here are pure; the `_at` variants take the clock as an
//! argument so tests are deterministic.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::models::{
    AssetDetails, AssetKind, NormalizedAsset, DEFAULT_CURRENCY, DEFAULT_UNIT, PLACEHOLDER_SYMBOL,
    UNKNOWN_ASSET_NAME,
};

// ============================================================================
// Constants
// ============================================================================

/// Identifier assigned when a record carries no usable id of its own.
const FALLBACK_ID: &str = "unknown";

/// Maximum number of initials used for a synthesized symbol.
const MAX_SYNTHESIZED_SYMBOL_LEN: usize = 5;

// ============================================================================
// Public API
// ============================================================================

/// Normalize a single raw asset record against the current wall clock.
pub fn normalize(raw: &Value) -> NormalizedAsset {
    normalize_at(raw, Utc::now())
}

/// Normalize a whole collection, preserving input order and length.
pub fn normalize_collection(raws: &[Value]) -> Vec<NormalizedAsset> {
    normalize_collection_at(raws, Utc::now())
}

/// Normalize a collection with an injected clock.
///
/// Records that are not JSON objects cannot be normalized field-by-field;
/// they degrade to the fallback display record, keyed by their position so
/// ids stay unique within the batch.
pub fn normalize_collection_at(raws: &[Value], now: DateTime<Utc>) -> Vec<NormalizedAsset> {
    raws.iter()
        .enumerate()
        .map(|(idx, raw)| {
            if raw.is_object() {
                normalize_at(raw, now)
            } else {
                debug!(index = idx, "Non-object asset record, using fallback");
                fallback_asset(format!("invalid-{}", idx), now)
            }
        })
        .collect()
}

/// Normalize a single raw asset record with an injected clock.
///
/// Field-level fallbacks:
/// - numbers: finite number or string parseable to one, else a related
///   already-validated value, else 0
/// - strings: non-empty after trimming, else a documented default
/// - kind: recognized variant, else `stock`
/// - timestamps: RFC 3339, else `now`
pub fn normalize_at(raw: &Value, now: DateTime<Utc>) -> NormalizedAsset {
    let obj = match raw.as_object() {
        Some(obj) => obj,
        None => return fallback_asset(FALLBACK_ID, now),
    };

    let id = id_field(obj).unwrap_or_else(|| FALLBACK_ID.to_string());
    let name = string_field(obj, "name").unwrap_or_else(|| UNKNOWN_ASSET_NAME.to_string());
    let kind = string_field(obj, "assetKind")
        .or_else(|| string_field(obj, "type"))
        .map(|s| AssetKind::parse(&s))
        .unwrap_or_default();

    let total_value = number_field(obj, "totalValue").unwrap_or(0.0);
    let total_gain_loss = number_field(obj, "totalGainLoss").unwrap_or(0.0);
    let total_gain_loss_percent = number_field(obj, "totalGainLossPercent")
        .unwrap_or_else(|| percent_of(total_gain_loss, total_value - total_gain_loss));

    let details = if kind.is_tradable() {
        tradable_details(obj, &name)
    } else {
        physical_details(obj)
    };

    NormalizedAsset {
        id,
        name,
        kind,
        total_value,
        total_gain_loss,
        total_gain_loss_percent,
        details,
        last_updated: timestamp_field(obj, "lastUpdated", now),
        created_at: timestamp_field(obj, "createdAt", now),
        updated_at: timestamp_field(obj, "updatedAt", now),
    }
}

/// The record shown in place of an asset that could not be normalized at
/// all. Flat synthetic values, safe to render, clearly marked unknown.
pub fn fallback_asset(id: impl Into<String>, now: DateTime<Utc>) -> NormalizedAsset {
    NormalizedAsset {
        id: id.into(),
        name: UNKNOWN_ASSET_NAME.to_string(),
        kind: AssetKind::Stock,
        total_value: 0.0,
        total_gain_loss: 0.0,
        total_gain_loss_percent: 0.0,
        details: AssetDetails::Tradable {
            symbol: PLACEHOLDER_SYMBOL.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            quantity: 0.0,
            average_purchase_price: 0.0,
            current_price: 0.0,
            daily_change: 0.0,
            daily_change_percent: 0.0,
        },
        last_updated: now,
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// Variant detail extraction
// ============================================================================

fn tradable_details(obj: &serde_json::Map<String, Value>, name: &str) -> AssetDetails {
    let quantity = number_field(obj, "quantity").unwrap_or(0.0);
    let average_purchase_price = number_field(obj, "averagePurchasePrice").unwrap_or(0.0);
    // A missing live price falls back to the purchase price rather than 0,
    // so gain/loss math stays flat instead of showing a total loss.
    let current_price = number_field(obj, "currentPrice").unwrap_or(average_purchase_price);
    let daily_change = number_field(obj, "dailyChange").unwrap_or(0.0);
    let daily_change_percent = number_field(obj, "dailyChangePercent")
        .unwrap_or_else(|| percent_of(daily_change, current_price - daily_change));

    AssetDetails::Tradable {
        symbol: string_field(obj, "symbol").unwrap_or_else(|| synthesize_symbol(name)),
        currency: string_field(obj, "currency").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        quantity,
        average_purchase_price,
        current_price,
        daily_change,
        daily_change_percent,
    }
}

fn physical_details(obj: &serde_json::Map<String, Value>) -> AssetDetails {
    AssetDetails::Physical {
        quantity: number_field(obj, "quantity").unwrap_or(0.0),
        unit: string_field(obj, "unit").unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        purchase_price: number_field(obj, "purchasePrice").unwrap_or(0.0),
        current_market_price: number_field(obj, "currentMarketPrice"),
    }
}

// ============================================================================
// Field validation helpers
// ============================================================================

/// Accept a value as numeric only if it is a finite number, or a string
/// that parses to one.
fn finite(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn number_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<f64> {
    obj.get(key).and_then(finite)
}

/// Accept a string only if it is non-empty after trimming.
fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Ids arrive as strings or bare numbers depending on the endpoint.
fn id_field(obj: &serde_json::Map<String, Value>) -> Option<String> {
    match obj.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp_field(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    obj.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}

/// `part` as a percentage of `base`, or 0 when the base is unusable.
fn percent_of(part: f64, base: f64) -> f64 {
    if base.abs() > f64::EPSILON {
        let pct = part / base * 100.0;
        if pct.is_finite() {
            return pct;
        }
    }
    0.0
}

/// Build a symbol from the initials of the asset name ("Reliance
/// Industries" becomes "RI").
fn synthesize_symbol(name: &str) -> String {
    let initials: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().find(|c| c.is_alphanumeric()))
        .take(MAX_SYNTHESIZED_SYMBOL_LEN)
        .collect::<String>()
        .to_uppercase();

    if initials.is_empty() {
        PLACEHOLDER_SYMBOL.to_string()
    } else {
        initials
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
    }

    fn assert_render_safe(asset: &NormalizedAsset) {
        assert!(!asset.id.is_empty());
        assert!(!asset.name.is_empty());
        assert!(asset.total_value.is_finite());
        assert!(asset.total_gain_loss.is_finite());
        assert!(asset.total_gain_loss_percent.is_finite());
        match &asset.details {
            AssetDetails::Tradable {
                symbol,
                currency,
                quantity,
                average_purchase_price,
                current_price,
                daily_change,
                daily_change_percent,
            } => {
                assert!(!symbol.is_empty());
                assert!(!currency.is_empty());
                for n in [
                    quantity,
                    average_purchase_price,
                    current_price,
                    daily_change,
                    daily_change_percent,
                ] {
                    assert!(n.is_finite());
                }
            }
            AssetDetails::Physical {
                quantity,
                unit,
                purchase_price,
                current_market_price,
            } => {
                assert!(!unit.is_empty());
                assert!(quantity.is_finite());
                assert!(purchase_price.is_finite());
                if let Some(p) = current_market_price {
                    assert!(p.is_finite());
                }
            }
        }
    }

    #[test]
    fn test_totality_over_junk_inputs() {
        let inputs = vec![
            Value::Null,
            json!([]),
            json!("just a string"),
            json!(42),
            json!(true),
            json!({}),
            json!({"id": null, "name": 17, "totalValue": [], "assetKind": {}}),
            json!({"id": "x", "totalValue": "NaN", "totalGainLoss": "-inf"}),
        ];
        for input in &inputs {
            let asset = normalize_at(input, fixed_now());
            assert_render_safe(&asset);
        }
    }

    #[test]
    fn test_invalid_value_and_empty_name_scenario() {
        let raw = json!({"id": "1", "totalValue": "abc", "name": ""});
        let asset = normalize_at(&raw, fixed_now());
        assert_eq!(asset.id, "1");
        assert_eq!(asset.total_value, 0.0);
        assert_eq!(asset.name, UNKNOWN_ASSET_NAME);
    }

    #[test]
    fn test_string_numbers_are_accepted() {
        let raw = json!({
            "id": "2",
            "name": "Nifty Bees",
            "assetKind": "etf",
            "totalValue": "15000.50",
            "totalGainLoss": "500",
            "currentPrice": "250.25",
        });
        let asset = normalize_at(&raw, fixed_now());
        assert_eq!(asset.total_value, 15000.50);
        assert_eq!(asset.total_gain_loss, 500.0);
        match asset.details {
            AssetDetails::Tradable { current_price, .. } => assert_eq!(current_price, 250.25),
            _ => panic!("etf should be tradable"),
        }
    }

    #[test]
    fn test_unrecognized_kind_defaults_to_stock() {
        let raw = json!({"id": "3", "name": "Mystery", "assetKind": "artwork"});
        let asset = normalize_at(&raw, fixed_now());
        assert_eq!(asset.kind, AssetKind::Stock);
    }

    #[test]
    fn test_physical_defaults() {
        let raw = json!({"id": "4", "name": "Wedding Gold", "assetKind": "gold", "quantity": 20});
        let asset = normalize_at(&raw, fixed_now());
        match asset.details {
            AssetDetails::Physical {
                quantity,
                unit,
                purchase_price,
                current_market_price,
            } => {
                assert_eq!(quantity, 20.0);
                assert_eq!(unit, DEFAULT_UNIT);
                assert_eq!(purchase_price, 0.0);
                assert_eq!(current_market_price, None);
            }
            _ => panic!("gold should be physical"),
        }
    }

    #[test]
    fn test_missing_symbol_synthesized_from_name() {
        let raw = json!({"id": "5", "name": "Reliance Industries", "assetKind": "stock"});
        let asset = normalize_at(&raw, fixed_now());
        assert_eq!(asset.symbol(), Some("RI"));
    }

    #[test]
    fn test_missing_price_falls_back_to_purchase_price() {
        let raw = json!({
            "id": "6",
            "name": "HDFC Bank",
            "assetKind": "stock",
            "averagePurchasePrice": 1500.0,
        });
        let asset = normalize_at(&raw, fixed_now());
        match asset.details {
            AssetDetails::Tradable { current_price, .. } => assert_eq!(current_price, 1500.0),
            _ => panic!("stock should be tradable"),
        }
    }

    #[test]
    fn test_gain_loss_percent_derived_from_related_fields() {
        // value 1100, gain 100 -> cost 1000 -> 10%
        let raw = json!({
            "id": "7",
            "name": "Infosys",
            "totalValue": 1100.0,
            "totalGainLoss": 100.0,
        });
        let asset = normalize_at(&raw, fixed_now());
        assert!((asset.total_gain_loss_percent - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_timestamps_parse_or_default_to_now() {
        let now = fixed_now();
        let raw = json!({
            "id": "8",
            "name": "TCS",
            "lastUpdated": "2025-01-15T09:30:00Z",
            "createdAt": "not a timestamp",
        });
        let asset = normalize_at(&raw, now);
        assert_eq!(
            asset.last_updated,
            Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 0).unwrap()
        );
        assert_eq!(asset.created_at, now);
        assert_eq!(asset.updated_at, now);
    }

    #[test]
    fn test_collection_preserves_order_and_length() {
        let raws = vec![
            json!({"id": "a", "name": "First"}),
            Value::Null,
            json!({"id": "c", "name": "Third"}),
        ];
        let assets = normalize_collection_at(&raws, fixed_now());
        assert_eq!(assets.len(), 3);
        assert_eq!(assets[0].id, "a");
        assert_eq!(assets[1].id, "invalid-1");
        assert_eq!(assets[1].name, UNKNOWN_ASSET_NAME);
        assert_eq!(assets[2].id, "c");
    }

    #[test]
    fn test_negative_values_pass_through() {
        let raw = json!({
            "id": "9",
            "name": "Losing Position",
            "totalValue": 900.0,
            "totalGainLoss": -100.0,
        });
        let asset = normalize_at(&raw, fixed_now());
        assert_eq!(asset.total_gain_loss, -100.0);
        assert!((asset.total_gain_loss_percent - (-10.0)).abs() < 1e-9);
    }
}
