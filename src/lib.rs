//! ThreatLens
//!
//! A service for searching, enriching, and monitoring threat indicators.
//! The library half implements the lookup workflow (classify a query, search
//! the indicator database, enrich IPs with GeoIP and blocklist data through
//! a read-through cache); the binary serves the dashboard API behind it.

pub mod api;
pub mod classify;
pub mod client;
pub mod collectors;
pub mod cve_feed;
pub mod enrichment;
pub mod lookup;
pub mod models;
pub mod storage;

pub use classify::classify;
pub use client::{DashboardClient, SearchError};
pub use lookup::LookupService;
pub use models::LookupResult;
