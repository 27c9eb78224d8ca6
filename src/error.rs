//! Error types for the fetch, build and tally stages.
//!
//! Fetch and parse failures are local to one region and downgrade to a
//! skip. Coercion failures belong to the final summation step.

use thiserror::Error;

/// A network-level failure while talking to the statistics API.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be sent or no response arrived.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request did not complete within the client timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The response arrived but its body could not be read.
    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Classify a send error from reqwest.
    pub fn from_send(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Request {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// The payload is not a header-plus-rows JSON table.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("payload is not a JSON array")]
    NotArray,

    #[error("payload is empty, expected a header row")]
    Empty,

    #[error("payload element {index} is not an array")]
    RowNotArray { index: usize },

    #[error("header cell {index} is not a string")]
    HeaderCell { index: usize },

    #[error("duplicate header field '{0}'")]
    DuplicateHeader(String),

    #[error("row {row} has {found} values but the header has {expected}")]
    RowLength {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row} holds a nested value in field '{field}'")]
    NestedValue { row: usize, field: String },

    #[error("column '{0}' is not present in the header")]
    MissingColumn(String),
}

/// The estimate column could not be turned into an integer total.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoercionError {
    #[error("row {row} ({name}): estimate '{value}' is not a base-10 integer")]
    NotAnInteger {
        row: usize,
        name: String,
        value: String,
    },

    #[error("row {row} ({name}): total overflowed")]
    Overflow { row: usize, name: String },
}

/// A run that produced no usable total.
#[derive(Debug, Error)]
pub enum RunError {
    /// Every region request failed at the network level.
    #[error("could not reach {base_url}: all {attempted} region requests failed")]
    Unreachable { base_url: String, attempted: usize },

    #[error(transparent)]
    Coercion(#[from] CoercionError),
}
