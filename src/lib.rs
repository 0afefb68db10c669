//! holdsync - asset data synchronization and caching engine.
//!
//! This crate keeps a local, persisted snapshot of a user's financial
//! holdings fresh, consistent, and usable offline, while reconciling it
//! against an unreliable network and a backend that may return partial or
//! malformed records. Three pieces form one pipeline:
//!
//! - [`cache::CacheStore`]: persisted, TTL-scoped storage of asset
//!   collections, individual records, and price time series, with
//!   size-bounded eviction.
//! - [`scheduler::UpdateScheduler`]: decides when to refresh, combining
//!   wall-clock cadence, app foreground/background lifecycle, and
//!   market-hours awareness, with bounded retry and linear backoff.
//! - [`normalize`]: converts heterogeneous or invalid asset payloads into
//!   a complete, render-safe [`models::NormalizedAsset`], never failing.
//!
//! The host application constructs the pieces once and wires them
//! together:
//!
//! ```no_run
//! use std::sync::Arc;
//! use holdsync::cache::{CacheStore, FileStorage};
//! use holdsync::config::SyncConfig;
//! use holdsync::fetch::http::HttpFetcher;
//! use holdsync::scheduler::{UpdateListener, UpdateScheduler};
//! use holdsync::models::NormalizedAsset;
//!
//! struct PrintListener;
//!
//! impl UpdateListener for PrintListener {
//!     fn on_update(&self, assets: &[NormalizedAsset]) {
//!         println!("refreshed {} holdings", assets.len());
//!     }
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = SyncConfig::load()?;
//! let storage = Arc::new(FileStorage::open_default()?);
//! let cache = CacheStore::new(storage, &config);
//! let fetcher = Arc::new(HttpFetcher::new("https://api.example.com")?);
//!
//! let scheduler = UpdateScheduler::new(cache, fetcher, config);
//! scheduler.initialize(Arc::new(PrintListener)).await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod market;
pub mod models;
pub mod normalize;
pub mod scheduler;

pub use cache::{CacheEntry, CacheStore, FileStorage, MemoryStorage, Namespace, Storage};
pub use config::{SyncConfig, SyncConfigPatch, TtlConfig};
pub use error::SyncError;
pub use fetch::{AssetFetcher, FetchError};
pub use market::{MarketHours, MarketSession, MarketStatus, MarketTransition};
pub use models::{AssetDetails, AssetKind, NormalizedAsset, PricePoint, PriceUpdate};
pub use scheduler::{ScheduleState, UpdateListener, UpdatePhase, UpdateScheduler};
