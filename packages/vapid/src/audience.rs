//! Push endpoint audience (`aud` claim)

use crate::error::{VapidError, VapidResult};
use std::fmt;
use url::Url;

/// Origin of a push endpoint, `scheme://host`.
///
/// The path and query are discarded, so every subscription on one push service
/// maps to the same audience. The host is kept exactly as the endpoint writes
/// it, port included; only userinfo is removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Audience(String);

impl Audience {
    /// Derive the audience from an absolute push endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns [`VapidError::InvalidEndpoint`] if the endpoint does not parse or
    /// carries no host.
    pub fn from_endpoint(endpoint: &str) -> VapidResult<Self> {
        let url = Url::parse(endpoint)
            .map_err(|e| VapidError::invalid_endpoint(format!("{endpoint:?}: {e}")))?;

        if url.host_str().is_none() {
            return Err(VapidError::invalid_endpoint(format!("{endpoint:?} has no host")));
        }

        let host = raw_host(endpoint)
            .ok_or_else(|| VapidError::invalid_endpoint(format!("{endpoint:?} has no host")))?;

        Ok(Self(format!("{}://{host}", url.scheme())))
    }

    /// Audience as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Host and port text as written between `://` and the path, minus userinfo.
///
/// The URL parser folds case, drops default ports and applies IDNA, all of
/// which would change the `aud` claim.
fn raw_host(endpoint: &str) -> Option<&str> {
    let (_, rest) = endpoint.trim().split_once("://")?;
    let end = rest
        .find(|c: char| matches!(c, '/' | '?' | '#' | '\\'))
        .unwrap_or(rest.len());
    let authority = &rest[..end];
    let host = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);
    (!host.is_empty()).then_some(host)
}

impl AsRef<str> for Audience {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Audience> for String {
    fn from(audience: Audience) -> Self {
        audience.0
    }
}
