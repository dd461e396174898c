//! HTTP network backend built on reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::debug;

use crate::cache::entry::{AssetRequest, AssetResponse};
use crate::config::UpstreamConfig;
use crate::network::{Network, NetworkError};

/// Fetches requests over HTTP with a shared connection pool.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new(config: &UpstreamConfig) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, NetworkError> {
        let method = Method::from_bytes(request.method().as_bytes())
            .map_err(|_| NetworkError::InvalidMethod(request.method().to_string()))?;

        let mut builder = self.client.request(method, request.url());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        debug!(
            method = request.method(),
            url = request.url(),
            status,
            size = body.len(),
            "Network fetch complete"
        );

        Ok(AssetResponse {
            status,
            headers,
            body,
        })
    }
}
