//! Parsed private key memoization.
//!
//! Turning key text into a [`SigningKey`] means a base64 decode plus a scalar
//! multiplication to recover the public point. Server identities are few, so
//! each raw key string is parsed once and the result shared.

use crate::codec::decode_key;
use crate::error::{VapidError, VapidResult};
use crate::{fingerprint, FastHasher};
use dashmap::DashMap;
use p256::ecdsa::SigningKey;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Concurrent memo table of parsed signing keys, keyed by raw key text.
pub struct PrivateKeyCache {
    keys: DashMap<String, Arc<SigningKey>, FastHasher>,
    max_keys: usize,
}

impl PrivateKeyCache {
    /// Create a cache holding at most `max_keys` parsed keys.
    pub fn new(max_keys: usize) -> Self {
        Self {
            keys: DashMap::with_hasher(FastHasher::default()),
            max_keys: max_keys.max(1),
        }
    }

    /// Return the parsed key for `raw_private_key`, parsing it on first use.
    ///
    /// Two callers racing on a never-seen key may both parse it; the results
    /// are identical and the later store wins.
    ///
    /// # Errors
    ///
    /// Returns [`VapidError::KeyDecode`] if the text is not URL-safe base64 and
    /// [`VapidError::InvalidKey`] if the bytes are not a valid P-256 scalar.
    /// Nothing is cached on failure.
    pub fn get_or_parse(&self, raw_private_key: &str) -> VapidResult<Arc<SigningKey>> {
        if let Some(cached) = self.keys.get(raw_private_key) {
            return Ok(Arc::clone(cached.value()));
        }

        let scalar = Zeroizing::new(decode_key(raw_private_key)?);
        let signing_key = SigningKey::from_slice(&scalar).map_err(|_| {
            VapidError::invalid_key(format!(
                "{} decoded bytes are not a valid P-256 scalar",
                scalar.len()
            ))
        })?;
        let signing_key = Arc::new(signing_key);

        self.make_room();
        self.keys
            .insert(raw_private_key.to_string(), Arc::clone(&signing_key));

        tracing::debug!(
            key_fingerprint = fingerprint(raw_private_key),
            cached_keys = self.keys.len(),
            "Parsed VAPID private key"
        );

        Ok(signing_key)
    }

    /// Number of parsed keys held.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key has been parsed yet.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether `raw_private_key` has already been parsed.
    pub fn contains(&self, raw_private_key: &str) -> bool {
        self.keys.contains_key(raw_private_key)
    }

    /// Drop every parsed key.
    pub fn clear(&self) {
        self.keys.clear();
    }

    fn make_room(&self) {
        while self.keys.len() >= self.max_keys {
            // The iterator holds a shard lock; take the key out before removing.
            let victim = self.keys.iter().next().map(|entry| entry.key().clone());
            let Some(victim) = victim else { break };

            self.keys.remove(&victim);
            tracing::warn!(
                max_keys = self.max_keys,
                key_fingerprint = fingerprint(&victim),
                "Private key cache full, dropped a parsed key"
            );
        }
    }
}

impl std::fmt::Debug for PrivateKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeyCache")
            .field("len", &self.keys.len())
            .field("max_keys", &self.max_keys)
            .finish()
    }
}
