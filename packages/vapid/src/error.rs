//! Error handling for VAPID header generation

use thiserror::Error;

/// VAPID-specific errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VapidError {
    /// Push endpoint is not an absolute URL with a host
    #[error("Invalid push endpoint: {0}")]
    InvalidEndpoint(String),

    /// Key text is neither padded nor unpadded URL-safe base64
    #[error("Key decode error: {0}")]
    KeyDecode(String),

    /// Decoded key bytes are not valid P-256 key material
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// ECDSA signing failed
    #[error("Signing error: {0}")]
    Signing(String),

    /// JSON encoding or decoding of a token segment failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Token is not a well-formed ES256 compact JWT
    #[error("Invalid VAPID token: {0}")]
    InvalidToken(String),

    /// Token signature does not match the public key
    #[error("Invalid VAPID token signature")]
    InvalidSignature,

    /// Operating system random source is unavailable
    #[error("Random source unavailable: {0}")]
    Entropy(String),

    /// Cache configuration is out of range
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// Background sweeper could not be scheduled
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl VapidError {
    /// Create an invalid endpoint error
    pub fn invalid_endpoint(msg: impl Into<String>) -> Self {
        Self::InvalidEndpoint(msg.into())
    }

    /// Create a key decode error
    pub fn key_decode(msg: impl Into<String>) -> Self {
        Self::KeyDecode(msg.into())
    }

    /// Create an invalid key error
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create a signing error
    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an invalid token error
    pub fn invalid_token(msg: impl Into<String>) -> Self {
        Self::InvalidToken(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Result type for VAPID operations
pub type VapidResult<T> = std::result::Result<T, VapidError>;
