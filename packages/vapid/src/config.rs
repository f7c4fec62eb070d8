//! Header cache configuration

use crate::error::{VapidError, VapidResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default lead time before expiry after which a header is no longer served.
pub const DEFAULT_CACHE_MARGIN: Duration = Duration::from_secs(30 * 60);

/// Default bound on cached headers.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default bound on parsed private keys.
pub const DEFAULT_MAX_PRIVATE_KEYS: usize = 1_024;

/// Default period of the background sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Tuning for [`VapidHeaderCache`](crate::VapidHeaderCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VapidCacheConfig {
    /// Safety window subtracted from a header's remaining lifetime.
    pub cache_margin: Duration,
    /// Maximum number of cached headers.
    pub max_entries: usize,
    /// Maximum number of parsed private keys.
    pub max_private_keys: usize,
    /// Period of the background sweep started by `start_sweeper`.
    pub sweep_interval: Duration,
}

impl Default for VapidCacheConfig {
    fn default() -> Self {
        Self {
            cache_margin: DEFAULT_CACHE_MARGIN,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_private_keys: DEFAULT_MAX_PRIVATE_KEYS,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl VapidCacheConfig {
    /// Check that bounds and intervals are usable.
    ///
    /// # Errors
    ///
    /// Returns [`VapidError::InvalidConfig`] for zero bounds, a zero sweep
    /// interval, or a margin that does not fit a signed timestamp delta.
    pub fn validate(&self) -> VapidResult<()> {
        if self.max_entries == 0 {
            return Err(VapidError::invalid_config("max_entries must be at least 1"));
        }
        if self.max_private_keys == 0 {
            return Err(VapidError::invalid_config(
                "max_private_keys must be at least 1",
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(VapidError::invalid_config("sweep_interval must be non-zero"));
        }
        if chrono::Duration::from_std(self.cache_margin).is_err() {
            return Err(VapidError::invalid_config("cache_margin is out of range"));
        }
        Ok(())
    }

    /// Margin as a chrono delta; out-of-range values saturate.
    pub(crate) fn margin(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.cache_margin).unwrap_or(chrono::Duration::MAX)
    }
}
