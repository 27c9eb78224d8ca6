//! Data models for the tally pipeline.
//!
//! This module contains the typed rows, the accumulated table, per-region
//! outcomes and the final report structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A table row projected to the two fields the tally needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateRow {
    /// Region name, e.g. "Alabama".
    pub name: String,
    /// Raw estimate text; `None` when the API returned `null`.
    pub estimate: Option<String>,
}

impl EstimateRow {
    pub fn new(name: impl Into<String>, estimate: Option<&str>) -> Self {
        Self {
            name: name.into(),
            estimate: estimate.map(String::from),
        }
    }
}

/// Rows collected across regions, in region order then source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatedTable {
    rows: Vec<EstimateRow>,
}

impl AccumulatedTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one region's rows after everything collected so far.
    pub fn append(&mut self, rows: impl IntoIterator<Item = EstimateRow>) {
        self.rows.extend(rows);
    }

    pub fn rows(&self) -> &[EstimateRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FromIterator<EstimateRow> for AccumulatedTable {
    fn from_iter<I: IntoIterator<Item = EstimateRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// A row whose estimate has been coerced to an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TalliedRow {
    pub name: String,
    pub estimate: i64,
}

/// Coerced rows and their sum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub rows: Vec<TalliedRow>,
    pub total: i64,
}

/// Pipeline stage at which a region was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipStage {
    Fetch,
    Parse,
}

/// What happened to one region during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RegionStatus {
    /// The region was fetched and `rows` matching rows were appended.
    Appended { rows: usize },
    /// The region was skipped; the run carried on.
    Skipped { stage: SkipStage, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOutcome {
    /// Value of the `for` parameter, e.g. "state:6".
    pub region: String,
    #[serde(flatten)]
    pub status: RegionStatus,
}

impl RegionOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, RegionStatus::Skipped { .. })
    }

    /// Returns whether the request for this region never got a response.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self.status,
            RegionStatus::Skipped {
                stage: SkipStage::Fetch,
                ..
            }
        )
    }
}

impl fmt::Display for RegionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            RegionStatus::Appended { rows } => write!(f, "{}: {} rows", self.region, rows),
            RegionStatus::Skipped { reason, .. } => write!(f, "{}: skipped ({})", self.region, reason),
        }
    }
}

/// Metadata about a tally run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Endpoint the regions were fetched from.
    pub base_url: String,
    /// Language filter, e.g. "625" or "625:650".
    pub language: String,
    /// Geography scope of the run.
    pub scope: String,
    /// Region id range, for state scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<String>,
    /// Policy applied to non-numeric estimates.
    pub estimate_policy: String,
    /// When the run finished.
    pub generated_at: DateTime<Utc>,
    /// Wall time of the run in seconds.
    pub duration_seconds: f64,
    pub regions_attempted: usize,
    pub regions_appended: usize,
    pub regions_skipped: usize,
}

/// The complete result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: ReportMetadata,
    /// Accumulated rows with coerced estimates, in region order.
    pub rows: Vec<TalliedRow>,
    /// One entry per attempted region, in region order.
    pub outcomes: Vec<RegionOutcome>,
    /// Sum of the estimate column.
    pub total: i64,
}

impl RunReport {
    /// Rows ordered by estimate, largest first. Ties keep region order.
    pub fn rows_by_estimate(&self) -> Vec<TalliedRow> {
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| b.estimate.cmp(&a.estimate));
        rows
    }

    pub fn skipped(&self) -> impl Iterator<Item = &RegionOutcome> {
        self.outcomes.iter().filter(|o| o.is_skipped())
    }
}
