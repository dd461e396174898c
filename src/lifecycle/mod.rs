//! Generation lifecycle: install, activate, fetch.
//!
//! - [`manifest`]: the fixed asset list
//! - [`prepopulator`]: install-phase population with per-asset failure tolerance
//! - [`collector`]: activate-phase deletion of superseded generations
//! - [`interceptor`]: cache-first, network-fallback request handling
//! - [`agent`]: handler table and phase tracking
//! - [`host`]: startup sequencing

pub mod agent;
pub mod collector;
pub mod host;
pub mod interceptor;
pub mod manifest;
pub mod prepopulator;
