//! VAPID authorization header cache.
//!
//! Signing a VAPID token costs an ECDSA signature. A sender pushing to many
//! subscriptions on the same push service needs the same token each time, so
//! headers are memoized per (private key, public key, audience) and served
//! until they come within the safety margin of their expiry.
//!
//! Stale entries are removed when a lookup finds them. An optional background
//! sweep removes entries nobody asks for again, and both maps are bounded.

use crate::audience::Audience;
use crate::claims::VapidClaims;
use crate::codec::{decode_key, encode_key};
use crate::config::VapidCacheConfig;
use crate::error::{VapidError, VapidResult};
use crate::keys::VapidKeyPair;
use crate::private_key_cache::PrivateKeyCache;
use crate::signer;
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::{fingerprint, FastHasher};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Separator between cache key components; never valid in base64url or a URL origin.
const KEY_SEPARATOR: char = '|';

/// Entries inspected per eviction round when the cache is full.
const EVICTION_SAMPLE: usize = 64;

type HeaderMap = DashMap<String, CacheEntry, FastHasher>;

#[derive(Debug, Clone)]
struct CacheEntry {
    header: String,
    expiration: DateTime<Utc>,
}

impl CacheEntry {
    /// Fresh while `now + margin` is still before expiry.
    fn is_fresh(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        now.checked_add_signed(margin)
            .is_some_and(|deadline| deadline < self.expiration)
    }
}

/// Format the `Authorization` header value (RFC 8292 §3).
pub fn format_header(token: &str, public_key: &[u8]) -> String {
    let key_b64 = encode_key(public_key);
    let mut header = String::with_capacity(8 + token.len() + 4 + key_b64.len());
    header.push_str("vapid t=");
    header.push_str(token);
    header.push_str(", k=");
    header.push_str(&key_b64);
    header
}

fn cache_key(private_key: &str, public_key: &str, audience: &Audience) -> String {
    let audience = audience.as_str();
    let mut key = String::with_capacity(private_key.len() + public_key.len() + audience.len() + 2);
    key.push_str(private_key);
    key.push(KEY_SEPARATOR);
    key.push_str(public_key);
    key.push(KEY_SEPARATOR);
    key.push_str(audience);
    key
}

fn sweep_stale(
    headers: &HeaderMap,
    stats: &CacheStats,
    now: DateTime<Utc>,
    margin: chrono::Duration,
) -> usize {
    let before = headers.len();
    headers.retain(|_, entry| entry.is_fresh(now, margin));
    let removed = before.saturating_sub(headers.len());
    stats.record_evictions(removed as u64);
    removed
}

/// Memoizing issuer of VAPID `Authorization` headers.
///
/// Safe to share between threads; lookups on unrelated keys do not contend.
///
/// # Example
///
/// ```no_run
/// use chrono::{Duration, Utc};
/// use cryypt_vapid::{VapidHeaderCache, VapidKeyPair};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = VapidHeaderCache::new();
/// let keys = VapidKeyPair::generate()?;
///
/// let header = cache.get_header(
///     "https://fcm.googleapis.com/fcm/send/abc",
///     "ops@example.com",
///     keys.public_key(),
///     keys.private_key(),
///     Utc::now() + Duration::hours(12),
/// )?;
/// assert!(header.starts_with("vapid t="));
/// # Ok(())
/// # }
/// ```
pub struct VapidHeaderCache {
    headers: Arc<HeaderMap>,
    private_keys: PrivateKeyCache,
    stats: Arc<CacheStats>,
    config: VapidCacheConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl VapidHeaderCache {
    /// Create a cache with the default configuration.
    pub fn new() -> Self {
        Self::from_valid_config(VapidCacheConfig::default())
    }

    /// Create a cache with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VapidError::InvalidConfig`] if the configuration is invalid.
    pub fn with_config(config: VapidCacheConfig) -> VapidResult<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    /// Start building a cache.
    pub fn builder() -> VapidHeaderCacheBuilder {
        VapidHeaderCacheBuilder::default()
    }

    fn from_valid_config(config: VapidCacheConfig) -> Self {
        Self {
            headers: Arc::new(DashMap::with_hasher(FastHasher::default())),
            private_keys: PrivateKeyCache::new(config.max_private_keys),
            stats: Arc::new(CacheStats::default()),
            config,
            sweeper: Mutex::new(None),
        }
    }

    /// Return the VAPID `Authorization` header for a push endpoint.
    ///
    /// A cached header for the same key pair and endpoint origin is returned
    /// unchanged while `now + cache_margin` is before its expiration. Otherwise a
    /// new token is signed, cached and returned.
    ///
    /// # Errors
    ///
    /// - [`VapidError::InvalidEndpoint`] if `endpoint` is not an absolute URL with
    ///   a host; the cache is not consulted.
    /// - [`VapidError::KeyDecode`] / [`VapidError::InvalidKey`] for bad key text.
    /// - [`VapidError::Signing`] if ECDSA signing fails.
    ///
    /// Nothing is cached when an error is returned.
    pub fn get_header(
        &self,
        endpoint: &str,
        subscriber: &str,
        public_key: &str,
        private_key: &str,
        expiration: DateTime<Utc>,
    ) -> VapidResult<String> {
        let audience = Audience::from_endpoint(endpoint)?;
        let key = cache_key(private_key, public_key, &audience);
        let margin = self.config.margin();
        let now = Utc::now();

        // Clone out so no shard lock is held while signing or removing.
        let cached = self.headers.get(&key).map(|entry| entry.value().clone());
        if let Some(entry) = cached {
            if entry.is_fresh(now, margin) {
                self.stats.record_hit();
                tracing::trace!(
                    audience = audience.as_str(),
                    key_fingerprint = fingerprint(&key),
                    "VAPID header cache hit"
                );
                return Ok(entry.header);
            }

            if self.evict_if_stale(&key, now, margin) {
                tracing::debug!(
                    audience = audience.as_str(),
                    expiration = %entry.expiration,
                    "Evicted stale VAPID header"
                );
            }
        }

        self.stats.record_miss();
        let header = self.build_header(&audience, subscriber, public_key, private_key, expiration)?;

        if !self.headers.contains_key(&key) {
            self.make_room(now, margin);
        }
        self.headers.insert(
            key,
            CacheEntry {
                header: header.clone(),
                expiration,
            },
        );

        tracing::debug!(
            audience = audience.as_str(),
            expiration = %expiration,
            cached_headers = self.headers.len(),
            "Signed new VAPID header"
        );

        Ok(header)
    }

    /// [`get_header`](Self::get_header) for a [`VapidKeyPair`].
    ///
    /// # Errors
    ///
    /// Same as [`get_header`](Self::get_header).
    pub fn get_header_for(
        &self,
        keys: &VapidKeyPair,
        endpoint: &str,
        subscriber: &str,
        expiration: DateTime<Utc>,
    ) -> VapidResult<String> {
        self.get_header(
            endpoint,
            subscriber,
            keys.public_key(),
            keys.private_key(),
            expiration,
        )
    }

    /// Remove the entry under `key` only if it is still stale.
    ///
    /// Another caller may have regenerated it since it was read; that entry stays.
    fn evict_if_stale(&self, key: &str, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        let removed = self
            .headers
            .remove_if(key, |_, entry| !entry.is_fresh(now, margin))
            .is_some();
        if removed {
            self.stats.record_evictions(1);
        }
        removed
    }

    fn build_header(
        &self,
        audience: &Audience,
        subscriber: &str,
        public_key: &str,
        private_key: &str,
        expiration: DateTime<Utc>,
    ) -> VapidResult<String> {
        let claims = VapidClaims::new(audience.as_str(), subscriber, expiration);
        let signing_key = self.private_keys.get_or_parse(private_key)?;
        let token = signer::sign(&signing_key, &claims)?;
        let public_key_bytes = decode_key(public_key)?;

        Ok(format_header(&token, &public_key_bytes))
    }

    /// Evict from a bounded sample of entries until there is room for one more.
    ///
    /// Stale entries in the sample go first, otherwise the soonest-expiring one.
    fn make_room(&self, now: DateTime<Utc>, margin: chrono::Duration) {
        while self.headers.len() >= self.config.max_entries {
            let mut stale = Vec::new();
            let mut soonest: Option<(String, DateTime<Utc>)> = None;
            for entry in self.headers.iter().take(EVICTION_SAMPLE) {
                if !entry.value().is_fresh(now, margin) {
                    stale.push(entry.key().clone());
                } else if soonest
                    .as_ref()
                    .is_none_or(|(_, expiration)| entry.value().expiration < *expiration)
                {
                    soonest = Some((entry.key().clone(), entry.value().expiration));
                }
            }

            if !stale.is_empty() {
                let mut removed = 0;
                for key in &stale {
                    if self
                        .headers
                        .remove_if(key, |_, entry| !entry.is_fresh(now, margin))
                        .is_some()
                    {
                        removed += 1;
                    }
                }
                self.stats.record_evictions(removed);
                if removed > 0 {
                    tracing::debug!(removed, "Evicted stale VAPID headers to make room");
                    continue;
                }
            }

            let Some((victim, _)) = soonest else { break };
            if self.headers.remove(&victim).is_some() {
                self.stats.record_evictions(1);
                tracing::warn!(
                    max_entries = self.config.max_entries,
                    key_fingerprint = fingerprint(&victim),
                    "VAPID header cache full, evicted soonest-expiring header"
                );
            }
        }
    }

    /// Remove every header that is no longer safely valid.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        sweep_stale(&self.headers, &self.stats, Utc::now(), self.config.margin())
    }

    /// Spawn a task that calls [`sweep_expired`](Self::sweep_expired) every
    /// `sweep_interval`. A running sweeper is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`VapidError::Runtime`] when called outside a tokio runtime.
    pub fn start_sweeper(&self) -> VapidResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| VapidError::Runtime(format!("no tokio runtime for sweeper: {e}")))?;

        let headers = Arc::clone(&self.headers);
        let stats = Arc::clone(&self.stats);
        let margin = self.config.margin();
        let period = self.config.sweep_interval;

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = sweep_stale(&headers, &stats, Utc::now(), margin);
                if removed > 0 {
                    tracing::debug!(
                        removed,
                        remaining = headers.len(),
                        "Swept stale VAPID headers"
                    );
                }
            }
        });

        if let Some(previous) = self.lock_sweeper().replace(handle) {
            previous.abort();
        }
        tracing::info!(interval = ?period, "VAPID header sweeper started");
        Ok(())
    }

    /// Stop the background sweeper. Returns whether one was running.
    pub fn stop_sweeper(&self) -> bool {
        match self.lock_sweeper().take() {
            Some(handle) => {
                handle.abort();
                tracing::info!("VAPID header sweeper stopped");
                true
            }
            None => false,
        }
    }

    /// Whether a background sweeper is running.
    pub fn sweeper_running(&self) -> bool {
        self.lock_sweeper()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn lock_sweeper(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.sweeper.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hit/miss/eviction counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Zero the counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Number of cached headers.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether no header is cached.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Drop every cached header and parsed key.
    pub fn clear(&self) {
        self.headers.clear();
        self.private_keys.clear();
    }

    /// Parsed private key cache backing this instance.
    pub fn private_keys(&self) -> &PrivateKeyCache {
        &self.private_keys
    }

    /// Active configuration.
    pub fn config(&self) -> &VapidCacheConfig {
        &self.config
    }
}

impl Default for VapidHeaderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VapidHeaderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidHeaderCache")
            .field("headers", &self.headers.len())
            .field("private_keys", &self.private_keys)
            .field("stats", &self.stats.snapshot())
            .field("config", &self.config)
            .finish()
    }
}

impl Drop for VapidHeaderCache {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_sweeper().take() {
            handle.abort();
        }
    }
}

/// Builder for [`VapidHeaderCache`].
#[derive(Debug, Clone, Default)]
pub struct VapidHeaderCacheBuilder {
    config: VapidCacheConfig,
}

impl VapidHeaderCacheBuilder {
    /// Safety window before expiry after which headers are re-signed.
    pub fn cache_margin(mut self, margin: Duration) -> Self {
        self.config.cache_margin = margin;
        self
    }

    /// Maximum number of cached headers.
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.config.max_entries = max_entries;
        self
    }

    /// Maximum number of parsed private keys.
    pub fn max_private_keys(mut self, max_private_keys: usize) -> Self {
        self.config.max_private_keys = max_private_keys;
        self
    }

    /// Period of the background sweep.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Build the cache.
    ///
    /// # Errors
    ///
    /// Returns [`VapidError::InvalidConfig`] if the configuration is invalid.
    pub fn build(self) -> VapidResult<VapidHeaderCache> {
        VapidHeaderCache::with_config(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn keys() -> VapidKeyPair {
        VapidKeyPair::generate().expect("generate keys")
    }

    #[test]
    fn test_cache_key_layout() {
        let audience = Audience::from_endpoint("https://push.example.com/x").expect("audience");
        assert_eq!(
            cache_key("priv", "pub", &audience),
            "priv|pub|https://push.example.com"
        );
    }

    #[test]
    fn test_format_header() {
        assert_eq!(format_header("a.b.c", &[0xfb, 0xff]), "vapid t=a.b.c, k=-_8");
    }

    #[test]
    fn test_entry_freshness_respects_margin() {
        let now = Utc::now();
        let margin = ChronoDuration::minutes(30);
        let entry = |expiration| CacheEntry {
            header: String::new(),
            expiration,
        };

        assert!(entry(now + ChronoDuration::minutes(31)).is_fresh(now, margin));
        assert!(!entry(now + ChronoDuration::minutes(30)).is_fresh(now, margin));
        assert!(!entry(now + ChronoDuration::minutes(5)).is_fresh(now, margin));
        assert!(!entry(now - ChronoDuration::minutes(5)).is_fresh(now, margin));
        assert!(!entry(now).is_fresh(now, ChronoDuration::MAX));
    }

    #[test]
    fn test_header_embeds_public_key_and_valid_token() {
        let cache = VapidHeaderCache::new();
        let keys = keys();
        let expiration = Utc::now() + ChronoDuration::hours(12);

        let header = cache
            .get_header_for(
                &keys,
                "https://fcm.googleapis.com/fcm/send/x",
                "a@example.com",
                expiration,
            )
            .expect("header");

        let (token, public_key) = header
            .strip_prefix("vapid t=")
            .and_then(|rest| rest.split_once(", k="))
            .expect("header shape");
        assert_eq!(public_key, keys.public_key());

        let claims = signer::verify(token, &keys.public_key_bytes().expect("public bytes"))
            .expect("token verifies");
        assert_eq!(claims.aud, "https://fcm.googleapis.com");
        assert_eq!(claims.exp, expiration.timestamp());
        assert_eq!(claims.sub, "mailto:a@example.com");
    }

    #[test]
    fn test_padded_public_key_is_emitted_unpadded() {
        let cache = VapidHeaderCache::new();
        let keys = keys();
        let padded_public = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE,
            keys.public_key_bytes().expect("public bytes"),
        );
        assert!(padded_public.ends_with('='));

        let header = cache
            .get_header(
                "https://push.example.com/x",
                "a@example.com",
                &padded_public,
                keys.private_key(),
                Utc::now() + ChronoDuration::hours(1),
            )
            .expect("header");
        assert!(header.ends_with(&format!(", k={}", keys.public_key())));
    }

    #[test]
    fn test_bounded_entries_evict_soonest_expiring() {
        let cache = VapidHeaderCache::builder()
            .max_entries(2)
            .build()
            .expect("valid config");
        let keys = keys();
        let now = Utc::now();

        for (host, hours) in [("a", 3), ("b", 2), ("c", 4)] {
            cache
                .get_header_for(
                    &keys,
                    &format!("https://{host}.example.com/x"),
                    "a@example.com",
                    now + ChronoDuration::hours(hours),
                )
                .expect("header");
        }

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);

        // "b" expired soonest and was dropped; "a" is still served from cache.
        cache
            .get_header_for(
                &keys,
                "https://a.example.com/y",
                "a@example.com",
                now + ChronoDuration::hours(3),
            )
            .expect("header");
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_full_cache_evicts_stale_before_fresh() {
        let cache = VapidHeaderCache::builder()
            .max_entries(2)
            .build()
            .expect("valid config");
        let keys = keys();
        let now = Utc::now();

        for (host, minutes) in [("stale", 10), ("a", 180), ("b", 240)] {
            cache
                .get_header_for(
                    &keys,
                    &format!("https://{host}.example.com/x"),
                    "a@example.com",
                    now + ChronoDuration::minutes(minutes),
                )
                .expect("header");
        }

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);

        // Both fresh entries survived the stale one's eviction.
        for host in ["a", "b"] {
            cache
                .get_header_for(
                    &keys,
                    &format!("https://{host}.example.com/y"),
                    "a@example.com",
                    now + ChronoDuration::hours(3),
                )
                .expect("header");
        }
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn test_stale_removal_keeps_regenerated_entry() {
        let cache = VapidHeaderCache::new();
        let margin = cache.config().margin();
        let now = Utc::now();
        let key = "priv|pub|https://push.example.com".to_string();

        cache.headers.insert(
            key.clone(),
            CacheEntry {
                header: "vapid t=old, k=pub".to_string(),
                expiration: now + ChronoDuration::minutes(5),
            },
        );
        let stale = cache
            .headers
            .get(&key)
            .map(|entry| entry.value().clone())
            .expect("entry present");
        assert!(!stale.is_fresh(now, margin));

        // Another caller regenerates the header after the stale copy was read.
        cache.headers.insert(
            key.clone(),
            CacheEntry {
                header: "vapid t=new, k=pub".to_string(),
                expiration: now + ChronoDuration::hours(12),
            },
        );

        assert!(!cache.evict_if_stale(&key, now, margin));
        assert_eq!(
            cache.headers.get(&key).map(|entry| entry.value().header.clone()),
            Some("vapid t=new, k=pub".to_string())
        );
        assert_eq!(cache.stats().evictions, 0);

        // A stale entry under the same key is removed.
        cache.headers.insert(
            key.clone(),
            CacheEntry {
                header: "vapid t=old, k=pub".to_string(),
                expiration: now + ChronoDuration::minutes(5),
            },
        );
        assert!(cache.evict_if_stale(&key, now, margin));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_sweep_expired_removes_only_stale() {
        let cache = VapidHeaderCache::new();
        let keys = keys();
        let now = Utc::now();

        cache
            .get_header_for(
                &keys,
                "https://a.example.com/x",
                "a@example.com",
                now + ChronoDuration::minutes(10),
            )
            .expect("header");
        cache
            .get_header_for(
                &keys,
                "https://b.example.com/x",
                "a@example.com",
                now + ChronoDuration::hours(6),
            )
            .expect("header");

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_start_sweeper_requires_runtime() {
        let cache = VapidHeaderCache::new();
        assert!(matches!(cache.start_sweeper(), Err(VapidError::Runtime(_))));
        assert!(!cache.sweeper_running());
        assert!(!cache.stop_sweeper());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        assert!(VapidHeaderCache::builder().max_entries(0).build().is_err());
    }
}
