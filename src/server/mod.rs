//! HTTP server fronting the application origin.
//!
//! - [`proxy`]: router, status/metrics handlers and the intercepted fallback

pub mod proxy;
