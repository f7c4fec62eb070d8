//! Key text codec
//!
//! VAPID keys arrive from outside in either padded or unpadded URL-safe base64.
//! Decoding tries the padded alphabet first and falls back to the unpadded one;
//! the format is never guessed from content since many inputs are valid in both.

use crate::error::{VapidError, VapidResult};
use base64::{
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};

/// Decode a key from padded or unpadded URL-safe base64.
///
/// # Errors
///
/// Returns [`VapidError::KeyDecode`] when neither variant accepts the input.
pub fn decode_key(text: &str) -> VapidResult<Vec<u8>> {
    match URL_SAFE.decode(text) {
        Ok(bytes) => Ok(bytes),
        Err(_) => URL_SAFE_NO_PAD
            .decode(text)
            .map_err(|e| VapidError::key_decode(format!("not URL-safe base64: {e}"))),
    }
}

/// Encode bytes as unpadded URL-safe base64 (RFC 7515 §2).
#[inline]
pub fn encode_key(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}
