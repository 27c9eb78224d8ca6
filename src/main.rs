//! langtally - language-use estimate tally
//!
//! A CLI tool that queries the statistics API region by region, keeps the
//! rows for one language and totals their estimates.
//!
//! Exit codes:
//!   0 - Every region was attempted (skipped regions included)
//!   1 - Fatal error (arguments, config, base URL, endpoint unreachable
//!       for every region, non-numeric estimate under the strict policy,
//!       output file)

mod analysis;
mod api;
mod cli;
mod config;
mod error;
mod models;
mod report;
mod table;

use analysis::{Aggregator, AggregatorConfig};
use anyhow::{Context, Result};
use api::{HttpFetcher, Scope};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use models::{ReportMetadata, RunReport};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config decides the log level, so it loads before logging starts
    let (mut config, source) = match Config::resolve(args.config.as_deref(), Path::new(".")) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(config.general.log_level(args.quiet));

    info!("langtally v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    match source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    match run_tally(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Tally failed: {:#}", e);
            eprintln!("\nError: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .langtally.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("Created {} with default settings.", CONFIG_FILE);
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete tally. Returns the process exit code.
async fn run_tally(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let mut settings = AggregatorConfig::try_from(&config)?;
    settings.show_progress = !args.quiet;

    let fetcher = HttpFetcher::new(config.api.timeout_seconds.map(Duration::from_secs))?;

    info!("Endpoint: {}", settings.base_url);
    info!(
        "Language {}, scope {}, policy {}, concurrency {}",
        settings.language, settings.scope, settings.policy, settings.concurrency
    );

    let aggregator = Aggregator::new(settings, fetcher);
    let outcome = aggregator
        .run()
        .await
        .context("Tally run failed")?;

    if outcome.accumulated.is_empty() {
        warn!("No rows matched language {}", aggregator.config().language);
    }

    let settings = aggregator.config();
    let skipped = outcome.outcomes.iter().filter(|o| o.is_skipped()).count();

    let metadata = ReportMetadata {
        base_url: settings.base_url.to_string(),
        language: settings.language.to_string(),
        scope: settings.scope.to_string(),
        regions: (settings.scope == Scope::State).then(|| {
            format!("{}..={}", settings.regions.start(), settings.regions.end())
        }),
        estimate_policy: settings.policy.to_string(),
        generated_at: Utc::now(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
        regions_attempted: outcome.outcomes.len(),
        regions_appended: outcome.outcomes.len() - skipped,
        regions_skipped: skipped,
    };

    let report = RunReport {
        metadata,
        rows: outcome.tally.rows,
        outcomes: outcome.outcomes,
        total: outcome.tally.total,
    };

    let output = match args.format {
        OutputFormat::Text => report::generate_text_report(&report, args.sort),
        OutputFormat::Markdown => report::generate_markdown_report(&report, args.sort),
        OutputFormat::Json => report::generate_json_report(&report)?,
    };

    match args.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report saved to {}", path.display());
        }
        None => print!("{}", output),
    }

    Ok(0)
}
