//! In-process network that answers from a fixed routing table.
//!
//! Used by tests and by embedders that want to drive the lifecycle without
//! sockets. Every call is recorded so callers can assert on network traffic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::cache::entry::{AssetRequest, AssetResponse, RequestKey};
use crate::network::{Network, NetworkError};

#[derive(Debug, Default)]
struct Routes {
    responses: HashMap<String, AssetResponse>,
    failing: HashMap<String, String>,
    calls: Vec<RequestKey>,
}

/// Routing-table network. Clones share routes and the call log.
#[derive(Debug, Clone, Default)]
pub struct StaticNetwork {
    routes: Arc<Mutex<Routes>>,
    offline: Arc<AtomicBool>,
}

impl StaticNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_routes<T>(&self, f: impl FnOnce(&mut Routes) -> T) -> T {
        let mut routes = match self.routes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut routes)
    }

    /// Answer requests for `url` with `response`.
    pub fn route(&self, url: impl Into<String>, response: AssetResponse) -> &Self {
        let url = url.into();
        self.with_routes(|r| {
            r.failing.remove(&url);
            r.responses.insert(url, response);
        });
        self
    }

    /// Fail requests for `url` with a transport error.
    pub fn fail(&self, url: impl Into<String>, reason: impl Into<String>) -> &Self {
        let url = url.into();
        self.with_routes(|r| {
            r.responses.remove(&url);
            r.failing.insert(url, reason.into());
        });
        self
    }

    /// Fail every request while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every request seen so far, in arrival order.
    pub fn calls(&self) -> Vec<RequestKey> {
        self.with_routes(|r| r.calls.clone())
    }

    pub fn call_count(&self) -> usize {
        self.with_routes(|r| r.calls.len())
    }
}

#[async_trait]
impl Network for StaticNetwork {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, NetworkError> {
        let offline = self.offline.load(Ordering::SeqCst);
        self.with_routes(|r| {
            r.calls.push(request.key.clone());
            if offline {
                return Err(NetworkError::Unavailable("offline".to_string()));
            }
            if let Some(reason) = r.failing.get(request.url()) {
                return Err(NetworkError::Unavailable(reason.clone()));
            }
            Ok(r
                .responses
                .get(request.url())
                .cloned()
                .unwrap_or_else(|| AssetResponse::new(404, "not found")))
        })
    }
}
