//! Update scheduling for asset data.
//!
//! The `UpdateScheduler` decides when the cached snapshot needs
//! refreshing, drives the remote fetch through the normalizer into the
//! cache, and notifies a registered listener. Refresh cycles retry with
//! linear backoff; when the retry budget runs out the previous cache
//! contents are left untouched so the UI never degrades to a blank state
//! over a transient network blip.
//!
//! Cadence is tiered: aggressive while the market is open, conservative
//! otherwise. The app lifecycle feeds in from outside: foregrounding
//! re-evaluates freshness and restarts the periodic timer, backgrounding
//! stops the timer while letting any in-flight cycle complete.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, Timelike, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::CacheStore;
use crate::config::{SyncConfig, SyncConfigPatch};
use crate::error::SyncError;
use crate::fetch::AssetFetcher;
use crate::market::{self, MarketHours, MarketStatus};
use crate::models::{NormalizedAsset, PriceUpdate};
use crate::normalize;

// ============================================================================
// Constants
// ============================================================================

/// A snapshot older than this is refreshed regardless of market state.
const MAX_STALENESS_MINUTES: i64 = 60;

/// While the market is open, a snapshot older than this is refreshed.
const OPEN_MARKET_STALENESS_MINUTES: i64 = 5;

/// Floor for the periodic timer; anything shorter would busy-loop.
const MIN_TIMER_INTERVAL: Duration = Duration::from_secs(1);

/// Cache maintenance runs once per this many timer ticks (hourly at the
/// default interval), in addition to the pass at initialization.
const MAINTENANCE_EVERY_TICKS: u64 = 60;

// ============================================================================
// State machine types
// ============================================================================

/// Phase of the refresh state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePhase {
    #[default]
    Idle,
    Updating,
    BackingOff,
}

/// Scheduler bookkeeping. `last_successful_update` is persisted alongside
/// the cache and restored on `initialize`; the rest is ephemeral.
#[derive(Debug, Clone, Default)]
pub struct ScheduleState {
    pub last_successful_update: Option<DateTime<Utc>>,
    pub phase: UpdatePhase,
    pub retry_count: u32,
}

/// Receiver for refresh outcomes.
///
/// `on_update` fires only after a successful cycle, always with a complete
/// normalized collection. `on_refresh_failed` fires only once a cycle has
/// exhausted its retry budget; cached data is untouched at that point.
pub trait UpdateListener: Send + Sync {
    fn on_update(&self, assets: &[NormalizedAsset]);

    fn on_refresh_failed(&self, error: &SyncError) {
        let _ = error;
    }
}

// ============================================================================
// Policy functions
// ============================================================================

/// Delay before the next retry attempt: linear in the number of failures
/// so far.
pub fn next_delay(retry_count: u32, retry_delay: Duration) -> Duration {
    retry_delay.saturating_mul(retry_count + 1)
}

/// Whether a refresh is due, given the local wall-clock time of the last
/// successful update and the current one.
///
/// True when any of: never updated; more than an hour elapsed; a new
/// trading day has begun (date changed and past the open); the market is
/// open and more than five minutes elapsed.
pub fn should_update(
    last: Option<NaiveDateTime>,
    now: NaiveDateTime,
    hours: &MarketHours,
) -> bool {
    let last = match last {
        None => return true,
        Some(l) => l,
    };

    let elapsed = now.signed_duration_since(last);
    if elapsed > chrono::Duration::minutes(MAX_STALENESS_MINUTES) {
        return true;
    }
    if now.date() != last.date() && now.hour() >= hours.open_hour {
        return true;
    }
    market::is_market_open(now, hours)
        && elapsed > chrono::Duration::minutes(OPEN_MARKET_STALENESS_MINUTES)
}

// ============================================================================
// Scheduler
// ============================================================================

struct Inner {
    cache: CacheStore,
    fetcher: Arc<dyn AssetFetcher>,
    config: RwLock<SyncConfig>,
    listener: RwLock<Option<Arc<dyn UpdateListener>>>,
    state: Mutex<ScheduleState>,
    /// At-most-one-in-flight guard for whole refresh cycles, including
    /// their backoff gaps.
    updating: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Orchestrates periodic and lifecycle-triggered refresh cycles.
///
/// Constructed explicitly with its collaborators and passed by reference;
/// `initialize`/`destroy` bracket the scheduling lifecycle.
pub struct UpdateScheduler {
    inner: Arc<Inner>,
}

impl UpdateScheduler {
    pub fn new(cache: CacheStore, fetcher: Arc<dyn AssetFetcher>, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                fetcher,
                config: RwLock::new(config),
                listener: RwLock::new(None),
                state: Mutex::new(ScheduleState::default()),
                updating: AtomicBool::new(false),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Register the listener and start the scheduling lifecycle: restore
    /// persisted bookkeeping, refresh immediately if due, start the timer.
    pub async fn initialize(&self, listener: Arc<dyn UpdateListener>) {
        *write_lock(&self.inner.listener) = Some(listener);

        self.inner.cache.optimize_memory().await;

        if let Some(ts) = self.inner.cache.last_update().await {
            lock(&self.inner.state).last_successful_update = Some(ts);
            debug!(last_update = %ts, "Restored last update marker");
        }

        info!("Update scheduler initialized");
        if Inner::refresh_due(&self.inner) {
            Inner::spawn_cycle(&self.inner);
        }
        self.start_timer();
    }

    /// Trigger an immediate refresh cycle outside the normal cadence and
    /// wait for its outcome. A cycle already in flight absorbs the trigger.
    pub async fn force_update(&self) -> Result<(), SyncError> {
        if read_lock(&self.inner.listener).is_none() {
            return Err(SyncError::NotInitialized);
        }
        Inner::run_cycle(Arc::clone(&self.inner)).await
    }

    /// Targeted price refresh for a handful of symbols. Updates the price
    /// cache but not the collection or the last-update bookkeeping.
    pub async fn update_specific_symbols(
        &self,
        symbols: &[String],
    ) -> Result<Vec<PriceUpdate>, SyncError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let updates = self.inner.fetcher.fetch_prices_for(symbols).await?;
        for update in &updates {
            self.inner.cache.cache_price(update).await;
        }
        debug!(count = updates.len(), "Targeted price refresh complete");
        Ok(updates)
    }

    /// Current market session and next transition, by the local clock.
    pub fn get_market_status(&self) -> MarketStatus {
        self.market_status_at(Local::now().naive_local())
    }

    pub fn market_status_at(&self, now: NaiveDateTime) -> MarketStatus {
        let hours = read_lock(&self.inner.config).market_hours;
        market::market_status(now, &hours)
    }

    /// Merge a partial configuration. A running timer is restarted so a
    /// changed interval takes effect.
    pub fn configure(&self, patch: SyncConfigPatch) {
        patch.apply(&mut write_lock(&self.inner.config));
        let running = lock(&self.inner.timer).is_some();
        if running {
            self.start_timer();
        }
        debug!("Scheduler configuration updated");
    }

    /// Snapshot of the scheduler bookkeeping.
    pub fn state(&self) -> ScheduleState {
        lock(&self.inner.state).clone()
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> SyncConfig {
        read_lock(&self.inner.config).clone()
    }

    // =========================================================================
    // App lifecycle
    // =========================================================================

    /// The app came to the foreground: catch up if stale, resume the timer.
    pub fn on_foreground(&self) {
        info!("App foregrounded");
        if Inner::refresh_due(&self.inner) {
            Inner::spawn_cycle(&self.inner);
        }
        self.start_timer();
    }

    /// The app went to the background: no further network activity, but an
    /// in-flight cycle runs to completion.
    pub fn on_background(&self) {
        info!("App backgrounded, pausing periodic refresh");
        self.stop_timer();
    }

    /// Stop timers, release the listener, reset the in-flight flag.
    pub fn destroy(&self) {
        self.stop_timer();
        *write_lock(&self.inner.listener) = None;
        lock(&self.inner.state).phase = UpdatePhase::Idle;
        self.inner.updating.store(false, Ordering::SeqCst);
        info!("Update scheduler destroyed");
    }

    // =========================================================================
    // Cache pass-throughs for offline-first callers
    // =========================================================================

    pub async fn get_cached_assets(&self) -> Option<Vec<NormalizedAsset>> {
        self.inner.cache.cached_assets().await
    }

    pub async fn cache_assets(&self, assets: &[NormalizedAsset]) {
        self.inner.cache.cache_assets(assets).await;
    }

    pub async fn clear_cache(&self) {
        self.inner.cache.clear().await;
    }

    // =========================================================================
    // Timer plumbing
    // =========================================================================

    fn start_timer(&self) {
        let period = read_lock(&self.inner.config)
            .update_interval
            .max(MIN_TIMER_INTERVAL);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a fresh interval fires immediately;
            // initialize/foreground already handled "refresh now".
            ticker.tick().await;
            let mut ticks: u64 = 0;
            loop {
                ticker.tick().await;
                ticks += 1;
                if Inner::refresh_due(&inner) {
                    Inner::spawn_cycle(&inner);
                }
                if ticks % MAINTENANCE_EVERY_TICKS == 0 {
                    inner.cache.optimize_memory().await;
                }
            }
        });
        if let Some(old) = lock(&self.inner.timer).replace(handle) {
            old.abort();
        }
    }

    fn stop_timer(&self) {
        if let Some(handle) = lock(&self.inner.timer).take() {
            handle.abort();
        }
    }
}

impl Inner {
    fn refresh_due(inner: &Arc<Inner>) -> bool {
        let last = lock(&inner.state)
            .last_successful_update
            .map(|ts| ts.with_timezone(&Local).naive_local());
        let hours = read_lock(&inner.config).market_hours;
        should_update(last, Local::now().naive_local(), &hours)
    }

    /// Run a cycle on its own task so timer teardown never cancels it.
    fn spawn_cycle(inner: &Arc<Inner>) {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            // Outcomes are logged and reported to the listener inside.
            let _ = Inner::run_cycle(inner).await;
        });
    }

    /// One full refresh cycle: fetch with retries, normalize, write
    /// through the cache, notify. Exhausted retries leave the cache as-is.
    async fn run_cycle(inner: Arc<Inner>) -> Result<(), SyncError> {
        if inner
            .updating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Refresh already in flight, trigger absorbed");
            return Ok(());
        }

        {
            let mut state = lock(&inner.state);
            state.phase = UpdatePhase::Updating;
            state.retry_count = 0;
        }

        let (attempt_budget, retry_delay) = {
            let config = read_lock(&inner.config);
            (config.max_retries.max(1), config.retry_delay)
        };

        let mut attempt: u32 = 0;
        let outcome = loop {
            attempt += 1;
            match inner.fetcher.fetch_asset_collection().await {
                Ok(raws) => break Ok(raws),
                Err(e) => {
                    warn!(attempt, error = %e, "Asset collection fetch failed");
                    if attempt >= attempt_budget {
                        break Err(e);
                    }
                    {
                        let mut state = lock(&inner.state);
                        state.phase = UpdatePhase::BackingOff;
                        state.retry_count = attempt;
                    }
                    let delay = next_delay(attempt - 1, retry_delay);
                    debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                    tokio::time::sleep(delay).await;
                    lock(&inner.state).phase = UpdatePhase::Updating;
                }
            }
        };

        match outcome {
            Ok(raws) => {
                let assets = normalize::normalize_collection(&raws);
                inner.cache.cache_assets(&assets).await;
                let now = Utc::now();
                inner.cache.set_last_update(now).await;
                {
                    let mut state = lock(&inner.state);
                    state.last_successful_update = Some(now);
                    state.retry_count = 0;
                    state.phase = UpdatePhase::Idle;
                }
                inner.updating.store(false, Ordering::SeqCst);
                info!(count = assets.len(), attempts = attempt, "Refresh cycle complete");

                let listener = read_lock(&inner.listener).clone();
                if let Some(listener) = listener {
                    listener.on_update(&assets);
                }
                Ok(())
            }
            Err(e) => {
                {
                    let mut state = lock(&inner.state);
                    state.retry_count = 0;
                    state.phase = UpdatePhase::Idle;
                }
                inner.updating.store(false, Ordering::SeqCst);

                let err = SyncError::RetriesExhausted {
                    attempts: attempt,
                    source: e,
                };
                error!(error = %err, "Refresh cycle abandoned, keeping cached data");

                let listener = read_lock(&inner.listener).clone();
                if let Some(listener) = listener {
                    listener.on_refresh_failed(&err);
                }
                Err(err)
            }
        }
    }
}

// Poison recovery: a panic while holding one of these locks is a bug, but
// the engine keeps serving the last consistent value instead of cascading.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read_lock<T>(rwlock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(rwlock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Tests
// ============================================================================
