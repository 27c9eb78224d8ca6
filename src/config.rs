//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.langtally.toml` files.

use crate::analysis::EstimatePolicy;
use crate::api::Scope;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".langtally.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Endpoint settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// What to ask for.
    #[serde(default)]
    pub query: QueryConfig,

    /// How to filter and total.
    #[serde(default)]
    pub aggregate: AggregateConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl GeneralConfig {
    /// Log level after merging with the CLI. `--quiet` wins over a verbose
    /// config file.
    pub fn log_level(&self, quiet: bool) -> tracing::Level {
        if quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

/// Statistics API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Endpoint URL without query parameters.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Fields passed in the `get` parameter.
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,

    /// Request timeout in seconds. Unset means the HTTP client default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            fields: default_fields(),
            timeout_seconds: None,
        }
    }
}

fn default_base_url() -> String {
    "http://api.census.gov/data/2013/language".to_string()
}

fn default_fields() -> Vec<String> {
    vec!["EST", "LANLABEL", "NAME"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Query settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Language code or range, e.g. "625" or "625:650".
    #[serde(default = "default_language")]
    pub language: String,

    /// First region id (inclusive).
    #[serde(default = "default_from")]
    pub from: u32,

    /// Last region id (inclusive).
    #[serde(default = "default_to")]
    pub to: u32,

    /// Geography scope.
    #[serde(default)]
    pub scope: Scope,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            from: default_from(),
            to: default_to(),
            scope: Scope::default(),
        }
    }
}

fn default_language() -> String {
    "625".to_string() // Spanish
}

fn default_from() -> u32 {
    1
}

fn default_to() -> u32 {
    50
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConfig {
    /// Policy for estimates that are present but not integers.
    #[serde(default)]
    pub on_invalid: EstimatePolicy,

    /// Maximum requests in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_name_column")]
    pub name_column: String,

    #[serde(default = "default_estimate_column")]
    pub estimate_column: String,

    #[serde(default = "default_language_column")]
    pub language_column: String,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            on_invalid: EstimatePolicy::default(),
            concurrency: default_concurrency(),
            name_column: default_name_column(),
            estimate_column: default_estimate_column(),
            language_column: default_language_column(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_name_column() -> String {
    "NAME".to_string()
}

fn default_estimate_column() -> String {
    "EST".to_string()
}

fn default_language_column() -> String {
    "LAN".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Find the configuration for a run.
    ///
    /// An explicit path must load. Otherwise `.langtally.toml` in `dir` is
    /// used when present, and defaults when not. A file that exists but
    /// fails to parse is an error either way. Also returns the path that
    /// was loaded, if any.
    pub fn resolve(explicit: Option<&Path>, dir: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        Ok(match Self::load_from_dir(dir)? {
            Some(config) => (config, Some(dir.join(CONFIG_FILE))),
            None => (Self::default(), None),
        })
    }

    /// Try to load `.langtally.toml` from a directory.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only flags the user actually passed override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref base_url) = args.base_url {
            self.api.base_url = base_url.clone();
        }
        if let Some(ref fields) = args.fields {
            self.api.fields = fields.clone();
        }
        if let Some(timeout) = args.timeout {
            self.api.timeout_seconds = Some(timeout);
        }

        if let Some(ref language) = args.language {
            self.query.language = language.clone();
        }
        if let Some(from) = args.from_region {
            self.query.from = from;
        }
        if let Some(to) = args.to_region {
            self.query.to = to;
        }
        if let Some(scope) = args.scope {
            self.query.scope = scope;
        }

        if let Some(policy) = args.on_invalid {
            self.aggregate.on_invalid = policy;
        }
        if let Some(concurrency) = args.concurrency {
            self.aggregate.concurrency = concurrency;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
