//! Request identity and response payloads.
//!
//! A cache entry maps a [`RequestKey`] (method + absolute URL) to an
//! [`AssetResponse`]. The same response type carries network results, so a
//! response read from a store and one fetched live are indistinguishable to
//! callers.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

/// Identity of a request within a cache store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    /// Upper-cased HTTP method.
    pub method: String,
    /// Absolute URL without fragment.
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.to_ascii_uppercase(),
            url: url.into(),
        }
    }

    /// `GET` identity for a URL.
    pub fn get(url: &Url) -> Self {
        Self::new("GET", url)
    }

    /// Resolve a (possibly relative) reference against a scope URL.
    pub fn resolve(method: &str, scope: &Url, reference: &str) -> Result<Self, url::ParseError> {
        let url = scope.join(reference)?;
        Ok(Self::new(method, &url))
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// An outbound request as seen by the agent.
#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub key: RequestKey,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl AssetRequest {
    /// A bodiless `GET` with no extra headers.
    pub fn get(url: &Url) -> Self {
        Self {
            key: RequestKey::get(url),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_key(key: RequestKey) -> Self {
        Self {
            key,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn method(&self) -> &str {
        &self.key.method
    }

    pub fn url(&self) -> &str {
        &self.key.url
    }
}

/// A response payload, either stored or fresh from the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl AssetResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether the status is in the 2xx range.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
