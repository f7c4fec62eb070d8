//! VAPID (RFC 8292) authorization headers for Web Push
//!
//! This crate provides:
//! - P-256 key pair generation for server identity
//! - ES256 signing of the `aud`/`exp`/`sub` claim set
//! - A concurrent header cache keyed by key pair and push service origin
//! - Memoized private key parsing
//!
//! Headers come out as `vapid t=<JWT>, k=<public key>`, ready for the
//! `Authorization` header of a push request.

mod audience;
mod claims;
mod codec;
mod config;
mod error;
mod global;
mod header_cache;
mod keys;
mod private_key_cache;
mod signer;
mod stats;

use std::hash::{BuildHasher, BuildHasherDefault, Hasher};
use twox_hash::XxHash64;

pub use audience::Audience;
pub use claims::{normalize_subscriber, JwtHeader, VapidClaims, ES256};
pub use codec::{decode_key, encode_key};
pub use config::{
    VapidCacheConfig, DEFAULT_CACHE_MARGIN, DEFAULT_MAX_ENTRIES, DEFAULT_MAX_PRIVATE_KEYS,
    DEFAULT_SWEEP_INTERVAL,
};
pub use error::{VapidError, VapidResult};
pub use global::{
    default_cache, generate_key_pair, get_authorization_header, get_cache_stats,
    reset_cache_stats,
};
pub use header_cache::{format_header, VapidHeaderCache, VapidHeaderCacheBuilder};
pub use keys::{VapidKeyPair, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN};
pub use private_key_cache::PrivateKeyCache;
pub use signer::{sign, verify};
pub use stats::{CacheStats, CacheStatsSnapshot};

/// Hash builder for the cache maps.
pub(crate) type FastHasher = BuildHasherDefault<XxHash64>;

/// Non-reversible tag for key material in log events.
pub(crate) fn fingerprint(text: &str) -> u64 {
    let mut hasher = FastHasher::default().build_hasher();
    hasher.write(text.as_bytes());
    hasher.finish()
}
