//! Filtering, accumulation and totals.

pub mod aggregator;
pub mod coerce;

pub use aggregator::*;
pub use coerce::EstimatePolicy;
