//! asset-cache-agent: offline availability and update safety for
//! single-page applications.
//!
//! An agent sits between the application and the network and keeps one cache
//! generation per application version:
//!   install (fill the generation from the asset manifest) → activate (drop
//!   every older generation) → fetch (serve cache-first, fall back to network)
//!
//! The binary runs the agent as a local reverse proxy in front of the
//! application's origin.

pub mod cache;
pub mod config;
pub mod lifecycle;
pub mod metrics;
pub mod network;
pub mod server;
