//! Endpoint query construction.
//!
//! A query names the fields to return, the language filter and the
//! geography selector. Values end up URL-encoded in the `get`, `LAN` and
//! `for` parameters.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which geography a run covers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// One request per state id in the configured range
    #[default]
    State,
    /// A single `state:*` request
    AllStates,
    /// A single `us:*` request for national totals
    Nation,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::State => write!(f, "state"),
            Scope::AllStates => write!(f, "all-states"),
            Scope::Nation => write!(f, "nation"),
        }
    }
}

/// Value of the `for` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSelector {
    State(u32),
    AllStates,
    Nation,
}

impl fmt::Display for RegionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionSelector::State(id) => write!(f, "state:{}", id),
            RegionSelector::AllStates => write!(f, "state:*"),
            RegionSelector::Nation => write!(f, "us:*"),
        }
    }
}

/// Value of the `LAN` parameter: one language code or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageFilter {
    Code(u32),
    Range(u32, u32),
}

impl LanguageFilter {
    /// Returns whether a row's language cell falls under this filter.
    ///
    /// A single code matches the cell text exactly; a range matches any
    /// cell that parses to a code inside it.
    pub fn matches(&self, value: &str) -> bool {
        match *self {
            LanguageFilter::Code(c) => value == c.to_string(),
            LanguageFilter::Range(start, end) => value
                .parse::<u32>()
                .is_ok_and(|code| (start..=end).contains(&code)),
        }
    }
}

impl FromStr for LanguageFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| format!("Invalid language code '{}'", part.trim()))
        };

        match s.split_once(':') {
            None => Ok(LanguageFilter::Code(parse(s)?)),
            Some((start, end)) => {
                let (start, end) = (parse(start)?, parse(end)?);
                if start > end {
                    return Err(format!("Language range {}:{} is reversed", start, end));
                }
                Ok(LanguageFilter::Range(start, end))
            }
        }
    }
}

impl fmt::Display for LanguageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageFilter::Code(c) => write!(f, "{}", c),
            LanguageFilter::Range(start, end) => write!(f, "{}:{}", start, end),
        }
    }
}

/// One fully specified request against the statistics endpoint.
#[derive(Debug, Clone)]
pub struct EndpointQuery<'a> {
    pub base_url: &'a Url,
    pub fields: &'a [String],
    pub language: LanguageFilter,
    pub region: RegionSelector,
}

impl EndpointQuery<'_> {
    /// Render the request URL.
    pub fn url(&self) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("get", &self.fields.join(","))
            .append_pair("LAN", &self.language.to_string())
            .append_pair("for", &self.region.to_string());
        url
    }
}
