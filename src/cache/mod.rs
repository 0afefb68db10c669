//! Persisted TTL cache for asset data.
//!
//! `CacheStore` provides namespaced, expiring storage for the asset
//! collection, per-id records, price quotes, and chart time series, over
//! any backend implementing the `Storage` trait.

pub mod storage;
pub mod store;

pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use store::{CacheEntry, CacheStore, MaintenanceReport, Namespace};
