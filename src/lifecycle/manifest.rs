//! The fixed list of assets needed for offline operation.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::entry::RequestKey;

/// Assets the application ships with, relative to its origin.
const DEFAULT_ASSETS: &[&str] = &[
    "./",
    "./index.css",
    "./index.html",
    "./index.js",
    "./index.js.map",
    "./jszip.js",
    "./manifest.json",
    "./static/icons/logo-192.png",
    "./static/icons/logo-512.png",
    "./static/images/screenshot-narrow.jpg",
    "./static/images/screenshot-wide.jpg",
    "./static/lib/lodepng/lodepng.js",
    "./static/lib/lodepng/lodepng.wasm",
];

/// Ordered asset URLs. Order only matters for indexed failure reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetManifest(Vec<String>);

impl Default for AssetManifest {
    fn default() -> Self {
        Self(DEFAULT_ASSETS.iter().map(|s| s.to_string()).collect())
    }
}

impl AssetManifest {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(urls.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// `GET` identity of every entry, resolved against `scope`.
    pub fn resolve(&self, scope: &Url) -> Vec<Result<RequestKey, url::ParseError>> {
        self.iter()
            .map(|reference| RequestKey::resolve("GET", scope, reference))
            .collect()
    }
}
