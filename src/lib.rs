//! Metafetch - resilient fetch layer for scraping Douban media metadata.
//!
//! Requests flow through a middleware chain that keeps session cookies in
//! sync with configuration, heals proof-of-work challenge pages and holds
//! every request to a shared rate budget. Lookups on top of the chain are
//! cached per resource.

pub mod cache;
pub mod challenge;
pub mod config;
pub mod douban;
pub mod http_client;
pub mod rate_limit;
pub mod session;

pub use config::{LiveSettings, Settings};
pub use douban::DoubanApi;
pub use http_client::{FetchError, FetchPipeline};
