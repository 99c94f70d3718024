//! Stash - A caching DNS forwarding resolver.
//!
//! Answers queries from a TTL-bounded record store and forwards misses to a
//! single upstream server. The library exposes the codec, store, resolver
//! and transports for benchmarking and testing.

pub mod cache;
pub mod dns;
pub mod error;
pub mod proxy;
pub mod resolver;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
