//! VAPID JWT header and claim set

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JWT `alg` value for ECDSA P-256 with SHA-256.
pub const ES256: &str = "ES256";

/// JOSE header of a VAPID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    /// Signing algorithm, always `ES256` for VAPID.
    pub alg: String,
    /// Token type.
    pub typ: String,
}

impl JwtHeader {
    /// ES256 JWT header.
    #[must_use]
    pub fn es256() -> Self {
        Self {
            alg: ES256.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Claims carried by a VAPID token (RFC 8292 §2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VapidClaims {
    /// Origin of the push service.
    pub aud: String,
    /// Expiry (unix seconds).
    pub exp: i64,
    /// Contact URI of the application server operator.
    pub sub: String,
}

impl VapidClaims {
    /// Build claims, normalizing the subscriber contact.
    pub fn new(
        audience: impl Into<String>,
        subscriber: &str,
        expiration: DateTime<Utc>,
    ) -> Self {
        Self {
            aud: audience.into(),
            exp: expiration.timestamp(),
            sub: normalize_subscriber(subscriber),
        }
    }
}

/// Turn a subscriber contact into a `sub` URI.
///
/// Values already starting with `https:` pass through; anything else is taken
/// as an e-mail address and gets a `mailto:` prefix.
pub fn normalize_subscriber(subscriber: &str) -> String {
    if subscriber.starts_with("https:") {
        subscriber.to_string()
    } else {
        format!("mailto:{subscriber}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_email_gets_mailto_prefix() {
        assert_eq!(
            normalize_subscriber("user@example.com"),
            "mailto:user@example.com"
        );
    }

    #[test]
    fn test_https_contact_is_unchanged() {
        assert_eq!(
            normalize_subscriber("https://example.com/contact"),
            "https://example.com/contact"
        );
    }

    #[test]
    fn test_plain_http_is_not_treated_as_url() {
        assert_eq!(
            normalize_subscriber("http://example.com"),
            "mailto:http://example.com"
        );
    }

    #[test]
    fn test_claims_serialize_in_stable_order() {
        let expiration = Utc
            .timestamp_opt(1_700_000_000, 0)
            .single()
            .expect("valid timestamp");
        let claims = VapidClaims::new("https://fcm.googleapis.com", "ops@example.com", expiration);

        let json = serde_json::to_string(&claims).expect("serialize claims");
        assert_eq!(
            json,
            r#"{"aud":"https://fcm.googleapis.com","exp":1700000000,"sub":"mailto:ops@example.com"}"#
        );
    }

    #[test]
    fn test_header_json() {
        let json = serde_json::to_string(&JwtHeader::es256()).expect("serialize header");
        assert_eq!(json, r#"{"alg":"ES256","typ":"JWT"}"#);
    }
}
