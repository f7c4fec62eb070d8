//! ES256 signing and verification of VAPID tokens

use crate::claims::{JwtHeader, VapidClaims, ES256};
use crate::codec::encode_key;
use crate::error::{VapidError, VapidResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use p256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use serde::Serialize;

fn encode_segment<T: Serialize>(value: &T) -> VapidResult<String> {
    let json = serde_json::to_vec(value).map_err(|e| VapidError::serialization(e.to_string()))?;
    Ok(encode_key(&json))
}

/// Sign VAPID claims into a compact ES256 JWT.
///
/// The signature segment is the 64-byte fixed-size `r || s` encoding required
/// by RFC 7518 §3.4, not DER.
///
/// # Errors
///
/// Returns [`VapidError::Serialization`] if a segment cannot be encoded and
/// [`VapidError::Signing`] if ECDSA signing fails.
pub fn sign(signing_key: &SigningKey, claims: &VapidClaims) -> VapidResult<String> {
    let header_b64 = encode_segment(&JwtHeader::es256())?;
    let claims_b64 = encode_segment(claims)?;

    let mut signing_input = String::with_capacity(header_b64.len() + 1 + claims_b64.len());
    signing_input.push_str(&header_b64);
    signing_input.push('.');
    signing_input.push_str(&claims_b64);

    let signature: Signature = signing_key
        .try_sign(signing_input.as_bytes())
        .map_err(|e| VapidError::signing(e.to_string()))?;
    let signature_b64 = encode_key(&signature.to_bytes());

    let mut jwt = String::with_capacity(signing_input.len() + 1 + signature_b64.len());
    jwt.push_str(&signing_input);
    jwt.push('.');
    jwt.push_str(&signature_b64);

    Ok(jwt)
}

/// Verify a VAPID token against an uncompressed P-256 public key.
///
/// Only the signature and structure are checked; expiry is left to the
/// caller, since a push service compares it against its own clock.
///
/// # Errors
///
/// Returns [`VapidError::InvalidToken`] for structural problems,
/// [`VapidError::InvalidKey`] for a bad public key and
/// [`VapidError::InvalidSignature`] when the signature does not verify.
pub fn verify(token: &str, public_key: &[u8]) -> VapidResult<VapidClaims> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(VapidError::invalid_token("expected three segments"));
    };

    let header_json = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| VapidError::invalid_token("header is not base64url"))?;
    let header: JwtHeader = serde_json::from_slice(&header_json)
        .map_err(|e| VapidError::invalid_token(format!("header: {e}")))?;
    if header.alg != ES256 {
        return Err(VapidError::invalid_token(format!(
            "unsupported algorithm {}",
            header.alg
        )));
    }

    let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|_| VapidError::invalid_key("public key is not a SEC1 P-256 point"))?;

    let signature_bytes = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| VapidError::InvalidSignature)?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| VapidError::InvalidSignature)?;

    let signing_input_len = header_b64.len() + 1 + claims_b64.len();
    verifying_key
        .verify(&token.as_bytes()[..signing_input_len], &signature)
        .map_err(|_| VapidError::InvalidSignature)?;

    let claims_json = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|_| VapidError::invalid_token("claims are not base64url"))?;
    serde_json::from_slice(&claims_json)
        .map_err(|e| VapidError::invalid_token(format!("claims: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    fn test_key() -> SigningKey {
        SigningKey::from_slice(&[7u8; 32]).expect("constant scalar is valid")
    }

    fn public_bytes(key: &SigningKey) -> Vec<u8> {
        key.verifying_key()
            .as_affine()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    #[test]
    fn test_sign_produces_compact_jwt() {
        let key = test_key();
        let claims = VapidClaims::new(
            "https://fcm.googleapis.com",
            "test@example.com",
            Utc::now() + Duration::hours(12),
        );

        let token = sign(&key, &claims).expect("signing should succeed");
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(!token.contains('='));

        let signature = URL_SAFE_NO_PAD.decode(parts[2]).expect("signature segment");
        assert_eq!(signature.len(), 64, "ES256 signatures are r || s");
    }

    #[test]
    fn test_sign_then_verify() {
        let key = test_key();
        let claims = VapidClaims::new(
            "https://updates.push.services.mozilla.com",
            "https://example.com/contact",
            Utc::now() + Duration::hours(1),
        );

        let token = sign(&key, &claims).expect("signing should succeed");
        let verified = verify(&token, &public_bytes(&key)).expect("token should verify");
        assert_eq!(verified, claims);
        assert_eq!(verified.sub, "https://example.com/contact");
    }

    #[test]
    fn test_verify_rejects_other_key() {
        let key = test_key();
        let other = SigningKey::from_slice(&[9u8; 32]).expect("constant scalar is valid");
        let claims = VapidClaims::new("https://a.example", "a@example.com", Utc::now());

        let token = sign(&key, &claims).expect("signing should succeed");
        assert_eq!(
            verify(&token, &public_bytes(&other)),
            Err(VapidError::InvalidSignature)
        );
    }

    #[test]
    fn test_verify_rejects_tampered_claims() {
        let key = test_key();
        let claims = VapidClaims::new("https://a.example", "a@example.com", Utc::now());
        let token = sign(&key, &claims).expect("signing should succeed");

        let forged = VapidClaims::new("https://b.example", "a@example.com", Utc::now());
        let forged_b64 = encode_segment(&forged).expect("encode forged claims");
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &forged_b64;
        let tampered = parts.join(".");

        assert_eq!(
            verify(&tampered, &public_bytes(&key)),
            Err(VapidError::InvalidSignature)
        );
    }

    #[test]
    fn test_verify_rejects_malformed_tokens() {
        let public = public_bytes(&test_key());
        assert!(matches!(verify("", &public), Err(VapidError::InvalidToken(_))));
        assert!(matches!(verify("a.b", &public), Err(VapidError::InvalidToken(_))));
        assert!(matches!(verify("a.b.c.d", &public), Err(VapidError::InvalidToken(_))));
    }
}
