//! Event-debounced CDN purge relay.
//!
//! Listens for content publication events and turns them into coalesced,
//! rate-limited, retried full-cache purges against an injected backend.

pub mod config;
pub mod domain;
pub mod infra;
pub mod purge;
