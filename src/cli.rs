//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Query and aggregation flags are optional so that
//! values from `.langtally.toml` survive unless a flag overrides them.

use crate::analysis::EstimatePolicy;
use crate::api::{LanguageFilter, Scope};
use clap::Parser;
use std::path::PathBuf;

/// langtally - total language-use estimates across regions
///
/// Queries the statistics API once per region, keeps the rows for one
/// language and sums their estimates.
///
/// Examples:
///   langtally
///   langtally --language 625 --from 1 --to 50
///   langtally --scope all-states --format json -o spanish.json
///   langtally --on-invalid zero --sort
///   langtally --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Statistics API endpoint
    #[arg(long, value_name = "URL", env = "LANGTALLY_BASE_URL")]
    pub base_url: Option<String>,

    /// Language code or range to query and keep (e.g. 625 or 625:650)
    #[arg(short, long, value_name = "CODE")]
    pub language: Option<String>,

    /// Fields to request (comma-separated)
    ///
    /// Must include the name and estimate columns.
    #[arg(long, value_name = "FIELDS", value_delimiter = ',')]
    pub fields: Option<Vec<String>>,

    /// First region id (inclusive)
    #[arg(long = "from", value_name = "ID")]
    pub from_region: Option<u32>,

    /// Last region id (inclusive)
    #[arg(long = "to", value_name = "ID")]
    pub to_region: Option<u32>,

    /// Geography scope (state, all-states, nation)
    #[arg(long, value_name = "SCOPE")]
    pub scope: Option<Scope>,

    /// What to do with estimates that are not integers (strict, zero)
    ///
    /// Null estimates always count as zero. With `strict` any other
    /// non-numeric estimate aborts the run.
    #[arg(long, value_name = "POLICY")]
    pub on_invalid: Option<EstimatePolicy>,

    /// Maximum requests in flight
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print rows sorted by estimate, largest first
    #[arg(long)]
    pub sort: bool,

    /// Output format (text, markdown, json)
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .langtally.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .langtally.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain text table (default)
    #[default]
    Text,
    /// Markdown format
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref language) = self.language {
            language.parse::<LanguageFilter>()?;
        }

        if let Some(ref fields) = self.fields {
            if fields.iter().all(|f| f.trim().is_empty()) {
                return Err("At least one field must be requested".to_string());
            }
        }

        if self.from_region == Some(0) {
            return Err("Region ids start at 1".to_string());
        }

        if let (Some(from), Some(to)) = (self.from_region, self.to_region) {
            if from > to {
                return Err(format!("--from {} is greater than --to {}", from, to));
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }
}
