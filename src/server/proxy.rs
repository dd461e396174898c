//! Offline-first reverse proxy.
//!
//! The proxy root maps onto the agent's scope URL: `GET /index.js` becomes a
//! request for `<scope>/index.js`, served cache-first by the agent.
//!
//! - GET /__agent/status
//! - GET /__agent/metrics
//! - anything else: intercepted fetch

use std::sync::Arc;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn, Instrument};
use url::Url;
use uuid::Uuid;

use crate::cache::entry::{AssetRequest, AssetResponse, RequestKey};
use crate::cache::store::CacheStorage;
use crate::lifecycle::agent::{Agent, AgentStatus};
use crate::network::Network;

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Application state shared across handlers.
pub struct AppState<S, N> {
    pub agent: Agent<S, N>,
    pub max_body_bytes: usize,
    pub start_time: Instant,
}

/// Build the axum router for an agent.
pub fn build_router<S, N>(state: Arc<AppState<S, N>>) -> Router
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    Router::new()
        .route("/__agent/status", get(status::<S, N>))
        .route("/__agent/metrics", get(metrics::<S, N>))
        .fallback(intercept::<S, N>)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Conversions ───────────────────────────────────────────────────────────

/// Why an incoming request could not be mapped into the scope.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Request resolves outside the proxied scope: {0}")]
    OutsideScope(String),
}

/// Turn an incoming request into the agent's request type.
///
/// The resolved URL must keep the scope's origin and stay under its path.
pub fn to_asset_request(
    scope: &Url,
    parts: &Parts,
    body: Bytes,
) -> Result<AssetRequest, RequestError> {
    let reference = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .trim_start_matches('/');
    let url = scope.join(reference)?;
    if url.origin() != scope.origin() || !url.path().starts_with(scope.path()) {
        return Err(RequestError::OutsideScope(url.into()));
    }
    let key = RequestKey::new(parts.method.as_str(), &url);

    let headers = parts
        .headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    Ok(AssetRequest { key, headers, body })
}

/// Write an agent response back to the client.
pub fn into_http_response(asset: AssetResponse) -> Response {
    let status = StatusCode::from_u16(asset.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::new(Body::from(asset.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in &asset.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => debug!(header = %name, "Dropping invalid response header"),
        }
    }
    response
}

// ─── Route Handlers ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StatusResponse {
    uptime_secs: u64,
    #[serde(flatten)]
    agent: AgentStatus,
}

async fn status<S, N>(State(state): State<Arc<AppState<S, N>>>) -> Response
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    match state.agent.status().await {
        Ok(agent) => Json(StatusResponse {
            uptime_secs: state.start_time.elapsed().as_secs(),
            agent,
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to read cache status");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn metrics<S, N>(State(state): State<Arc<AppState<S, N>>>) -> Response
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    match state.agent.metrics().render() {
        Ok(text) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn intercept<S, N>(State(state): State<Arc<AppState<S, N>>>, request: Request) -> Response
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("fetch", request_id = %request_id);

    async move {
        let (parts, body) = request.into_parts();
        let body = match to_bytes(body, state.max_body_bytes).await {
            Ok(body) => body,
            Err(_) => {
                return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response()
            }
        };

        let asset_request = match to_asset_request(state.agent.scope(), &parts, body) {
            Ok(r) => r,
            Err(e) => {
                warn!(uri = %parts.uri, error = %e, "Rejected request");
                return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
            }
        };

        match state.agent.on_fetch(&asset_request).await {
            Ok(outcome) => {
                debug!(
                    request = %asset_request.key,
                    source = %outcome.source,
                    status = outcome.response.status,
                    "Served"
                );
                into_http_response(outcome.response)
            }
            Err(e) => {
                warn!(request = %asset_request.key, error = %e, "Request failed");
                (StatusCode::BAD_GATEWAY, format!("upstream request failed: {e}")).into_response()
            }
        }
    }
    .instrument(span)
    .await
}
