//! Versioned asset cache storage.
//!
//! - [`generation`]: VersionTag, CacheKey and the immutable Generation
//! - [`entry`]: request identity and response payloads
//! - [`store`]: CacheStorage / CacheStore traits and the in-memory backend
//! - [`disk`]: durable filesystem backend

pub mod disk;
pub mod entry;
pub mod generation;
pub mod store;
