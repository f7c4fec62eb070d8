//! VAPID key pair generation (RFC 8292 §3.2)

use crate::codec::{decode_key, encode_key};
use crate::error::{VapidError, VapidResult};
use p256::ecdsa::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Length of a raw P-256 private scalar.
pub const PRIVATE_KEY_LEN: usize = 32;

/// Length of an uncompressed SEC1 P-256 point (`0x04 || X || Y`).
pub const PUBLIC_KEY_LEN: usize = 65;

// A random 32-byte string is an invalid scalar with probability ~2^-128.
const MAX_KEYGEN_ATTEMPTS: usize = 8;

/// Server identity key pair for VAPID.
///
/// Both halves are unpadded base64url text: the private key is the raw 32-byte
/// scalar and the public key the 65-byte uncompressed point.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VapidKeyPair {
    private_key: String,
    public_key: String,
}

impl VapidKeyPair {
    /// Generate a fresh P-256 key pair from the operating system's CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`VapidError::Entropy`] if the random source is unavailable.
    pub fn generate() -> VapidResult<Self> {
        for _ in 0..MAX_KEYGEN_ATTEMPTS {
            let mut scalar = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
            getrandom::fill(&mut *scalar).map_err(|e| VapidError::Entropy(e.to_string()))?;

            if let Ok(signing_key) = SigningKey::from_slice(&*scalar) {
                return Ok(Self::from_signing_key(&signing_key));
            }
        }

        Err(VapidError::Entropy(
            "random source produced no valid P-256 scalar".to_string(),
        ))
    }

    /// Build a key pair from an existing signing key.
    pub fn from_signing_key(signing_key: &SigningKey) -> Self {
        let public_point = signing_key.verifying_key().to_encoded_point(false);
        let scalar = Zeroizing::new(signing_key.to_bytes().to_vec());

        Self {
            private_key: encode_key(&scalar),
            public_key: encode_key(public_point.as_bytes()),
        }
    }

    /// Reconstruct a key pair from externally supplied key text.
    ///
    /// Accepts padded or unpadded base64url. The public key must be an
    /// uncompressed P-256 point matching the private scalar. The stored form is
    /// normalized to unpadded base64url.
    ///
    /// # Errors
    ///
    /// Returns [`VapidError::KeyDecode`] for undecodable text and
    /// [`VapidError::InvalidKey`] for key material that does not form a pair.
    pub fn from_base64url(public_key: &str, private_key: &str) -> VapidResult<Self> {
        let public_bytes = decode_key(public_key)?;
        if public_bytes.len() != PUBLIC_KEY_LEN || public_bytes[0] != 0x04 {
            return Err(VapidError::invalid_key(format!(
                "public key must be a {PUBLIC_KEY_LEN}-byte uncompressed P-256 point, got {} bytes",
                public_bytes.len()
            )));
        }
        VerifyingKey::from_sec1_bytes(&public_bytes)
            .map_err(|_| VapidError::invalid_key("public key is not a point on P-256"))?;

        let private_bytes = Zeroizing::new(decode_key(private_key)?);
        if private_bytes.len() != PRIVATE_KEY_LEN {
            return Err(VapidError::invalid_key(format!(
                "private key must be a {PRIVATE_KEY_LEN}-byte P-256 scalar, got {} bytes",
                private_bytes.len()
            )));
        }
        let signing_key = SigningKey::from_slice(&private_bytes)
            .map_err(|_| VapidError::invalid_key("private key is not a valid P-256 scalar"))?;

        let derived = signing_key.verifying_key().to_encoded_point(false);
        if derived.as_bytes() != public_bytes.as_slice() {
            return Err(VapidError::invalid_key(
                "public key does not belong to private key",
            ));
        }

        Ok(Self::from_signing_key(&signing_key))
    }

    /// Unpadded base64url private scalar.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// Unpadded base64url uncompressed public key.
    ///
    /// This is the `applicationServerKey` handed to browsers.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Uncompressed public key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VapidError::KeyDecode`] if the stored text is corrupt.
    pub fn public_key_bytes(&self) -> VapidResult<Vec<u8>> {
        decode_key(&self.public_key)
    }

    /// Split into `(private_key, public_key)`.
    pub fn into_parts(self) -> (String, String) {
        (self.private_key, self.public_key)
    }
}

impl fmt::Debug for VapidKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VapidKeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}
