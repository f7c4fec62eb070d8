//! Process-wide VAPID operations.
//!
//! Thin wrappers over a lazily built default [`VapidHeaderCache`]. Services that
//! want their own bounds or isolated counters should construct and inject a
//! cache instead.

use crate::error::VapidResult;
use crate::header_cache::VapidHeaderCache;
use crate::keys::VapidKeyPair;
use crate::stats::CacheStatsSnapshot;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

static DEFAULT_CACHE: Lazy<VapidHeaderCache> = Lazy::new(VapidHeaderCache::new);

/// The shared default header cache.
pub fn default_cache() -> &'static VapidHeaderCache {
    &DEFAULT_CACHE
}

/// Generate a new VAPID key pair.
///
/// # Errors
///
/// Returns [`VapidError::Entropy`](crate::VapidError::Entropy) if the random
/// source is unavailable.
pub fn generate_key_pair() -> VapidResult<VapidKeyPair> {
    VapidKeyPair::generate()
}

/// Get a VAPID `Authorization` header from the shared cache.
///
/// # Errors
///
/// See [`VapidHeaderCache::get_header`].
pub fn get_authorization_header(
    endpoint: &str,
    subscriber: &str,
    public_key: &str,
    private_key: &str,
    expiration: DateTime<Utc>,
) -> VapidResult<String> {
    DEFAULT_CACHE.get_header(endpoint, subscriber, public_key, private_key, expiration)
}

/// Hit/miss counters of the shared cache.
pub fn get_cache_stats() -> CacheStatsSnapshot {
    DEFAULT_CACHE.stats()
}

/// Zero the shared cache's counters.
pub fn reset_cache_stats() {
    DEFAULT_CACHE.reset_stats();
}
