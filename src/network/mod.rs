//! Access to the real network.
//!
//! - [`http`]: reqwest-backed implementation used by the binary
//! - [`static_routes`]: in-process routing table, no sockets
//!
//! The lifecycle code only sees the [`Network`] trait, so tests substitute
//! scripted implementations.

pub mod http;
pub mod static_routes;

use async_trait::async_trait;
use thiserror::Error;

use crate::cache::entry::{AssetRequest, AssetResponse};

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Network unavailable: {0}")]
    Unavailable(String),
}

/// Performs a request against the network and returns whatever it produced.
///
/// Non-2xx statuses are successful fetches; only transport failures are errors.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, NetworkError>;
}
