//! Data models for portfolio holdings.
//!
//! This module contains the data structures shared by the cache, the
//! normalizer, and the update scheduler:
//!
//! - `NormalizedAsset`: the validated, render-safe shape of one holding
//! - `AssetKind` / `AssetDetails`: the tagged kind taxonomy
//! - `PriceUpdate`: targeted per-symbol price refresh results
//! - `PricePoint`: cached time-series data

pub mod asset;

pub use asset::{
    AssetDetails, AssetKind, NormalizedAsset, PricePoint, PriceUpdate, DEFAULT_CURRENCY,
    DEFAULT_UNIT, PLACEHOLDER_SYMBOL, UNKNOWN_ASSET_NAME,
};
