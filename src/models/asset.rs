// Allow dead code: model accessors exist for completeness of the public API
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Currency assumed when a tradable record carries none.
pub const DEFAULT_CURRENCY: &str = "INR";

/// Measurement unit assumed when a physical record carries none.
pub const DEFAULT_UNIT: &str = "units";

/// Display name used when an asset record has no usable name.
pub const UNKNOWN_ASSET_NAME: &str = "Unknown Asset";

/// Placeholder used when no symbol can be derived at all.
pub const PLACEHOLDER_SYMBOL: &str = "N/A";

/// Category of a holding. Unrecognized input resolves to `Stock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum AssetKind {
    #[default]
    Stock,
    Etf,
    Bond,
    Crypto,
    Gold,
    Silver,
    Commodity,
}

impl AssetKind {
    /// Parse a raw kind string, falling back to `Stock` for anything
    /// unrecognized (including empty input).
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "stock" => AssetKind::Stock,
            "etf" => AssetKind::Etf,
            "bond" => AssetKind::Bond,
            "crypto" => AssetKind::Crypto,
            "gold" => AssetKind::Gold,
            "silver" => AssetKind::Silver,
            "commodity" => AssetKind::Commodity,
            _ => AssetKind::Stock,
        }
    }

    /// Kinds traded on an exchange and carrying symbol/price detail.
    pub fn is_tradable(&self) -> bool {
        matches!(
            self,
            AssetKind::Stock | AssetKind::Etf | AssetKind::Bond | AssetKind::Crypto
        )
    }

    /// Kinds held as physical quantities (metals, commodities).
    pub fn is_physical(&self) -> bool {
        !self.is_tradable()
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AssetKind::Stock => "stock",
            AssetKind::Etf => "etf",
            AssetKind::Bond => "bond",
            AssetKind::Crypto => "crypto",
            AssetKind::Gold => "gold",
            AssetKind::Silver => "silver",
            AssetKind::Commodity => "commodity",
        };
        write!(f, "{}", s)
    }
}

/// Kind-specific detail of a holding.
///
/// Tagged so the UI layer can match exhaustively instead of probing for
/// optional fields at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "detail", rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum AssetDetails {
    #[serde(rename_all = "camelCase")]
    Tradable {
        symbol: String,
        currency: String,
        quantity: f64,
        average_purchase_price: f64,
        current_price: f64,
        daily_change: f64,
        daily_change_percent: f64,
    },
    #[serde(rename_all = "camelCase")]
    Physical {
        quantity: f64,
        unit: String,
        purchase_price: f64,
        current_market_price: Option<f64>,
    },
}

/// The canonical, render-safe representation of one holding.
///
/// Every field is always populated: numeric slots are finite, string slots
/// are non-empty. Malformed upstream input is replaced by documented
/// fallbacks during normalization and never reaches this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NormalizedAsset {
    /// Opaque stable identifier assigned by the backend.
    pub id: String,
    pub name: String,
    #[serde(rename = "assetKind")]
    pub kind: AssetKind,
    pub total_value: f64,
    pub total_gain_loss: f64,
    pub total_gain_loss_percent: f64,
    pub details: AssetDetails,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NormalizedAsset {
    /// Symbol for tradable holdings, `None` for physical ones.
    pub fn symbol(&self) -> Option<&str> {
        match &self.details {
            AssetDetails::Tradable { symbol, .. } => Some(symbol),
            AssetDetails::Physical { .. } => None,
        }
    }
}

/// A targeted price refresh result for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PriceUpdate {
    pub symbol: String,
    pub price: f64,
    pub daily_change: f64,
    pub daily_change_percent: f64,
    pub as_of: DateTime<Utc>,
}

/// One point of a cached price time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_kind_parse_known() {
        assert_eq!(AssetKind::parse("crypto"), AssetKind::Crypto);
        assert_eq!(AssetKind::parse(" GOLD "), AssetKind::Gold);
        assert_eq!(AssetKind::parse("Etf"), AssetKind::Etf);
    }

    #[test]
    fn test_asset_kind_parse_unknown_defaults_to_stock() {
        assert_eq!(AssetKind::parse("mutualfund"), AssetKind::Stock);
        assert_eq!(AssetKind::parse(""), AssetKind::Stock);
    }

    #[test]
    fn test_asset_kind_partition() {
        assert!(AssetKind::Crypto.is_tradable());
        assert!(AssetKind::Bond.is_tradable());
        assert!(AssetKind::Silver.is_physical());
        assert!(!AssetKind::Silver.is_tradable());
    }

    #[test]
    fn test_details_serialize_tagged() {
        let details = AssetDetails::Physical {
            quantity: 10.0,
            unit: "grams".to_string(),
            purchase_price: 6200.0,
            current_market_price: None,
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["detail"], "physical");
        assert_eq!(json["unit"], "grams");
    }
}
