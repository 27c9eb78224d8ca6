//! Estimate coercion and summation.

use crate::error::CoercionError;
use crate::models::{AccumulatedTable, Tally, TalliedRow};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// What to do with an estimate that is present but not an integer.
///
/// Absent estimates always count as zero; this only governs text such as
/// `"N/A"` or `"12.5"`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum EstimatePolicy {
    /// Abort the summation with an error
    #[default]
    Strict,
    /// Log a warning and count the value as zero
    Zero,
}

impl fmt::Display for EstimatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimatePolicy::Strict => write!(f, "strict"),
            EstimatePolicy::Zero => write!(f, "zero"),
        }
    }
}

/// Parse one estimate cell. Absent is zero; present text must be a
/// base-10 integer, surrounding whitespace allowed.
pub fn coerce_estimate(raw: Option<&str>) -> Result<i64, std::num::ParseIntError> {
    match raw {
        None => Ok(0),
        Some(text) => text.trim().parse::<i64>(),
    }
}

/// Coerce every estimate of `table` and sum them.
pub fn tally(table: &AccumulatedTable, policy: EstimatePolicy) -> Result<Tally, CoercionError> {
    let mut rows = Vec::with_capacity(table.len());
    let mut total: i64 = 0;

    for (index, row) in table.rows().iter().enumerate() {
        let estimate = match coerce_estimate(row.estimate.as_deref()) {
            Ok(value) => value,
            Err(_) => {
                let value = row.estimate.clone().unwrap_or_default();
                match policy {
                    EstimatePolicy::Strict => {
                        return Err(CoercionError::NotAnInteger {
                            row: index,
                            name: row.name.clone(),
                            value,
                        })
                    }
                    EstimatePolicy::Zero => {
                        warn!(
                            "Row {} ({}): estimate '{}' is not an integer, counting 0",
                            index, row.name, value
                        );
                        0
                    }
                }
            }
        };

        total = total
            .checked_add(estimate)
            .ok_or_else(|| CoercionError::Overflow {
                row: index,
                name: row.name.clone(),
            })?;

        rows.push(TalliedRow {
            name: row.name.clone(),
            estimate,
        });
    }

    Ok(Tally { rows, total })
}
