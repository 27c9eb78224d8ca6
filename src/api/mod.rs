//! Statistics API access.
//!
//! This module builds endpoint queries and fetches raw response bodies.

pub mod client;
pub mod query;

pub use client::{Fetch, HttpFetcher};
pub use query::{EndpointQuery, LanguageFilter, RegionSelector, Scope};
