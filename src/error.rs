use thiserror::Error;

use crate::fetch::FetchError;

/// Errors surfaced by the update scheduler.
///
/// Storage problems never appear here: the cache layer swallows them and
/// degrades to misses. Malformed records never appear either; the
/// normalizer replaces them with fallback values.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A refresh cycle used up its whole retry budget. Previously cached
    /// data is left untouched.
    #[error("Refresh failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: FetchError,
    },

    /// A single targeted fetch failed (no retry policy applies).
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The scheduler was used before `initialize` registered a listener.
    #[error("Scheduler is not initialized")]
    NotInitialized,
}
