//! Region-by-region accumulation.
//!
//! The aggregator walks the configured regions in ascending order, fetches
//! each one, keeps the rows for the configured language and appends them
//! to one accumulated table. A region that cannot be fetched or parsed is
//! skipped and the walk continues. Once every region has been attempted
//! the estimate column is coerced and summed. A run in which no region
//! request got any response at all is an error rather than a zero total.

use super::coerce::{self, EstimatePolicy};
use crate::api::{EndpointQuery, Fetch, LanguageFilter, RegionSelector, Scope};
use crate::config::Config;
use crate::error::{FetchError, ParseError, RunError};
use crate::models::{
    AccumulatedTable, EstimateRow, RegionOutcome, RegionStatus, SkipStage, Tally,
};
use crate::table::{self, Table};
use anyhow::{bail, Context};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use std::ops::RangeInclusive;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Header names of the columns the tally reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    pub name: String,
    pub estimate: String,
    pub language: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            name: "NAME".to_string(),
            estimate: "EST".to_string(),
            language: "LAN".to_string(),
        }
    }
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub base_url: Url,
    pub fields: Vec<String>,
    pub language: LanguageFilter,
    pub scope: Scope,
    /// Region ids walked when `scope` is [`Scope::State`].
    pub regions: RangeInclusive<u32>,
    pub columns: Columns,
    pub policy: EstimatePolicy,
    /// Maximum requests in flight. 1 means strictly sequential.
    pub concurrency: usize,
    pub show_progress: bool,
}

impl TryFrom<&Config> for AggregatorConfig {
    type Error = anyhow::Error;

    fn try_from(config: &Config) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.api.base_url)
            .with_context(|| format!("Invalid base URL: {}", config.api.base_url))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!("Base URL must use http or https: {}", base_url);
        }

        let language: LanguageFilter = config
            .query
            .language
            .parse()
            .map_err(anyhow::Error::msg)?;

        let (from, to) = (config.query.from, config.query.to);
        if from == 0 || from > to {
            bail!("Invalid region range {}..{}", from, to);
        }

        if config.aggregate.concurrency == 0 {
            bail!("Concurrency must be at least 1");
        }

        if config.api.timeout_seconds == Some(0) {
            bail!("Timeout must be at least 1 second");
        }

        let fields: Vec<String> = config
            .api
            .fields
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .map(String::from)
            .collect();

        let columns = Columns {
            name: config.aggregate.name_column.clone(),
            estimate: config.aggregate.estimate_column.clone(),
            language: config.aggregate.language_column.clone(),
        };

        for column in [&columns.name, &columns.estimate] {
            if !fields.contains(column) {
                bail!(
                    "Requested fields {:?} do not include the '{}' column",
                    fields,
                    column
                );
            }
        }

        Ok(Self {
            base_url,
            fields,
            language,
            scope: config.query.scope,
            regions: from..=to,
            columns,
            policy: config.aggregate.on_invalid,
            concurrency: config.aggregate.concurrency,
            show_progress: true,
        })
    }
}

/// Why a region contributed nothing.
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl SkipReason {
    pub fn stage(&self) -> SkipStage {
        match self {
            SkipReason::Fetch(_) => SkipStage::Fetch,
            SkipReason::Parse(_) => SkipStage::Parse,
        }
    }
}

/// Result of fetching and building one region's table.
#[derive(Debug)]
pub enum RegionResult {
    Fetched(Table),
    Skipped(SkipReason),
}

/// Keep the rows whose language column matches and project them to
/// `{name, estimate}`. The table is only read.
pub fn filter_project(
    table: &Table,
    columns: &Columns,
    language: &LanguageFilter,
) -> Result<Vec<EstimateRow>, ParseError> {
    table.require_column(&columns.language)?;
    table.require_column(&columns.name)?;
    table.require_column(&columns.estimate)?;

    let rows = table
        .rows()
        .iter()
        .filter(|row| {
            row.value(&columns.language)
                .is_some_and(|code| language.matches(code))
        })
        .map(|row| {
            EstimateRow::new(
                row.value(&columns.name).unwrap_or_default(),
                row.value(&columns.estimate),
            )
        })
        .collect();

    Ok(rows)
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub accumulated: AccumulatedTable,
    pub outcomes: Vec<RegionOutcome>,
    pub tally: Tally,
}

/// Drives fetch, build, filter and append over all regions.
pub struct Aggregator<F> {
    config: AggregatorConfig,
    fetcher: F,
}

impl<F: Fetch> Aggregator<F> {
    pub fn new(config: AggregatorConfig, fetcher: F) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Region selectors in the order they are attempted.
    pub fn selectors(&self) -> Vec<RegionSelector> {
        match self.config.scope {
            Scope::State => self
                .config
                .regions
                .clone()
                .map(RegionSelector::State)
                .collect(),
            Scope::AllStates => vec![RegionSelector::AllStates],
            Scope::Nation => vec![RegionSelector::Nation],
        }
    }

    /// Fetch one region and build its table.
    pub async fn fetch_region(&self, region: RegionSelector) -> RegionResult {
        let url = EndpointQuery {
            base_url: &self.config.base_url,
            fields: &self.config.fields,
            language: self.config.language,
            region,
        }
        .url();

        debug!("Fetching {}", url);

        let fetched = match self.fetcher.fetch(&url).await {
            Ok(fetched) => fetched,
            Err(e) => return RegionResult::Skipped(e.into()),
        };

        if !fetched.is_success() {
            warn!("{} answered with HTTP status {}", region, fetched.status);
        }

        match table::build(&fetched.body) {
            Ok(table) => {
                debug!("{}: header {:?}, {} rows", region, table.header(), table.len());
                RegionResult::Fetched(table)
            }
            Err(e) => RegionResult::Skipped(e.into()),
        }
    }

    fn select_rows(&self, result: RegionResult) -> Result<Vec<EstimateRow>, SkipReason> {
        match result {
            RegionResult::Fetched(table) => {
                Ok(filter_project(&table, &self.config.columns, &self.config.language)?)
            }
            RegionResult::Skipped(reason) => Err(reason),
        }
    }

    /// Attempt every region and accumulate the matching rows.
    ///
    /// Results are merged in region order even when several requests are
    /// in flight.
    pub async fn collect(&self) -> (AccumulatedTable, Vec<RegionOutcome>) {
        let selectors = self.selectors();
        let progress = self.progress_bar(selectors.len() as u64);

        let mut accumulated = AccumulatedTable::new();
        let mut outcomes = Vec::with_capacity(selectors.len());

        let results = stream::iter(selectors)
            .map(|region| async move { (region, self.fetch_region(region).await) })
            .buffered(self.config.concurrency.max(1));
        let mut results = std::pin::pin!(results);

        while let Some((region, result)) = results.next().await {
            let status = match self.select_rows(result) {
                Ok(rows) => {
                    let count = rows.len();
                    debug!("{}: appending {} rows", region, count);
                    accumulated.append(rows);
                    RegionStatus::Appended { rows: count }
                }
                Err(reason) => {
                    progress.suspend(|| warn!("Skipping {}: {}", region, reason));
                    RegionStatus::Skipped {
                        stage: reason.stage(),
                        reason: reason.to_string(),
                    }
                }
            };

            outcomes.push(RegionOutcome {
                region: region.to_string(),
                status,
            });
            progress.inc(1);
        }

        progress.finish_and_clear();

        (accumulated, outcomes)
    }

    /// Run the whole pipeline and total the estimate column.
    pub async fn run(&self) -> Result<RunOutcome, RunError> {
        let (accumulated, outcomes) = self.collect().await;

        if !outcomes.is_empty() && outcomes.iter().all(RegionOutcome::is_unreachable) {
            return Err(RunError::Unreachable {
                base_url: self.config.base_url.to_string(),
                attempted: outcomes.len(),
            });
        }

        let skipped = outcomes.iter().filter(|o| o.is_skipped()).count();
        info!(
            "Attempted {} regions: {} appended, {} skipped, {} rows",
            outcomes.len(),
            outcomes.len() - skipped,
            skipped,
            accumulated.len()
        );

        let tally = coerce::tally(&accumulated, self.config.policy)?;
        info!("Total estimate: {}", tally.total);

        Ok(RunOutcome {
            accumulated,
            outcomes,
            tally,
        })
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} regions")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::Fetched;
    use crate::error::CoercionError;
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves canned bodies keyed by the `for` parameter. Unknown regions
    /// fail with a timeout.
    #[derive(Default)]
    struct FixtureFetcher {
        bodies: HashMap<String, (u16, String)>,
        delays: HashMap<String, u64>,
        calls: Mutex<Vec<String>>,
    }

    impl FixtureFetcher {
        fn with(mut self, region: &str, body: &str) -> Self {
            self.bodies
                .insert(region.to_string(), (200, body.to_string()));
            self
        }

        fn with_status(mut self, region: &str, status: u16, body: &str) -> Self {
            self.bodies
                .insert(region.to_string(), (status, body.to_string()));
            self
        }

        fn delayed(mut self, region: &str, millis: u64) -> Self {
            self.delays.insert(region.to_string(), millis);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Fetch for FixtureFetcher {
        fn fetch(&self, url: &Url) -> impl Future<Output = Result<Fetched, FetchError>> + Send {
            let region = url
                .query_pairs()
                .find(|(k, _)| k == "for")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default();
            self.calls.lock().unwrap().push(region.clone());

            let delay = self.delays.get(&region).copied().unwrap_or(0);
            let result = match self.bodies.get(&region) {
                Some((status, body)) => Ok(Fetched {
                    status: *status,
                    body: body.clone(),
                }),
                None => Err(FetchError::Timeout {
                    url: url.to_string(),
                }),
            };

            async move {
                if delay > 0 {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                result
            }
        }
    }

    fn settings(regions: RangeInclusive<u32>) -> AggregatorConfig {
        AggregatorConfig {
            base_url: Url::parse("http://api.census.gov/data/2013/language").unwrap(),
            fields: vec!["EST".to_string(), "LANLABEL".to_string(), "NAME".to_string()],
            language: LanguageFilter::Code(625),
            scope: Scope::State,
            regions,
            columns: Columns::default(),
            policy: EstimatePolicy::Strict,
            concurrency: 1,
            show_progress: false,
        }
    }

    fn names(table: &AccumulatedTable) -> Vec<&str> {
        table.rows().iter().map(|r| r.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_region_and_continues() {
        let fetcher = FixtureFetcher::default()
            .with("state:1", r#"[["NAME","EST","LAN"],["Alabama","151385","625"]]"#)
            .with("state:3", r#"[["NAME","EST","LAN"]]"#);
        let aggregator = Aggregator::new(settings(1..=3), fetcher);

        let outcome = aggregator.run().await.unwrap();

        assert_eq!(
            outcome.accumulated.rows(),
            [EstimateRow::new("Alabama", Some("151385"))]
        );
        assert_eq!(aggregator.fetcher.calls(), ["state:1", "state:2", "state:3"]);
        assert_eq!(outcome.outcomes.len(), 3);
        assert!(!outcome.outcomes[0].is_skipped());
        assert!(outcome.outcomes[1].is_skipped());
        assert_eq!(
            outcome.outcomes[2].status,
            RegionStatus::Appended { rows: 0 }
        );
        assert_eq!(outcome.tally.total, 151385);
    }

    #[tokio::test]
    async fn test_null_estimate_counts_zero() {
        let fetcher = FixtureFetcher::default()
            .with("state:1", r#"[["NAME","EST","LAN"],["Alabama","151385","625"]]"#)
            .with("state:2", r#"[["NAME","EST","LAN"],["Alaska",null,"625"]]"#);
        let aggregator = Aggregator::new(settings(1..=2), fetcher);

        let outcome = aggregator.run().await.unwrap();

        assert_eq!(outcome.accumulated.rows()[1].estimate, None);
        assert_eq!(outcome.tally.rows[1].estimate, 0);
        assert_eq!(outcome.tally.total, 151385);
    }

    #[tokio::test]
    async fn test_parse_failure_skips_region() {
        let fetcher = FixtureFetcher::default()
            .with("state:1", "error: unknown variable")
            .with("state:2", r#"[["NAME","EST","LAN"],["Alaska","22425"]]"#)
            .with("state:3", r#"[["NAME","EST"],["Arizona","1230730"]]"#)
            .with("state:4", r#"[["NAME","EST","LAN"],["Arkansas","143540","625"]]"#);
        let aggregator = Aggregator::new(settings(1..=4), fetcher);

        let outcome = aggregator.run().await.unwrap();

        assert_eq!(names(&outcome.accumulated), ["Arkansas"]);
        let skipped: Vec<_> = outcome
            .outcomes
            .iter()
            .filter(|o| o.is_skipped())
            .map(|o| o.region.as_str())
            .collect();
        assert_eq!(skipped, ["state:1", "state:2", "state:3"]);
    }

    #[tokio::test]
    async fn test_filters_language_and_keeps_duplicates() {
        let fetcher = FixtureFetcher::default().with(
            "state:1",
            r#"[["EST","LANLABEL","NAME","LAN","state"],
                ["151385","Spanish","Alabama","625","01"],
                ["900","Ladino","Alabama","626","01"],
                ["151385","Spanish","Alabama","625","01"]]"#,
        );
        let aggregator = Aggregator::new(settings(1..=1), fetcher);

        let outcome = aggregator.run().await.unwrap();

        assert_eq!(outcome.accumulated.len(), 2);
        assert_eq!(outcome.tally.total, 302770);
    }

    #[tokio::test]
    async fn test_order_follows_region_ids_under_concurrency() {
        let fetcher = FixtureFetcher::default()
            .with(
                "state:1",
                r#"[["NAME","EST","LAN"],["Alabama","151385","625"],["Alabama-2","1","625"]]"#,
            )
            .with("state:2", r#"[["NAME","EST","LAN"],["Alaska","22425","625"]]"#)
            .with("state:4", r#"[["NAME","EST","LAN"],["Arizona","1230730","625"]]"#)
            .delayed("state:1", 60)
            .delayed("state:2", 30);

        let mut config = settings(1..=4);
        config.concurrency = 4;
        let aggregator = Aggregator::new(config, fetcher);

        let outcome = aggregator.run().await.unwrap();

        assert_eq!(
            names(&outcome.accumulated),
            ["Alabama", "Alabama-2", "Alaska", "Arizona"]
        );
        let regions: Vec<_> = outcome.outcomes.iter().map(|o| o.region.as_str()).collect();
        assert_eq!(regions, ["state:1", "state:2", "state:3", "state:4"]);
    }

    #[test]
    fn test_strict_policy_aborts_on_text_estimate() {
        let fetcher = FixtureFetcher::default()
            .with("state:1", r#"[["NAME","EST","LAN"],["Alabama","N/A","625"]]"#);
        let aggregator = Aggregator::new(settings(1..=1), fetcher);

        let err = tokio_test::block_on(aggregator.run()).unwrap_err();
        assert!(matches!(
            err,
            RunError::Coercion(CoercionError::NotAnInteger { row: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_fatal() {
        let aggregator = Aggregator::new(settings(1..=3), FixtureFetcher::default());

        let err = aggregator.run().await.unwrap_err();

        assert!(matches!(err, RunError::Unreachable { attempted: 3, .. }));
        assert_eq!(aggregator.fetcher.calls(), ["state:1", "state:2", "state:3"]);
    }

    #[tokio::test]
    async fn test_parse_skip_keeps_run_alive_when_others_fail() {
        let fetcher = FixtureFetcher::default().with("state:2", "error: unknown variable");
        let aggregator = Aggregator::new(settings(1..=3), fetcher);

        let outcome = aggregator.run().await.unwrap();

        assert_eq!(outcome.tally.total, 0);
        assert!(outcome.outcomes.iter().all(|o| o.is_skipped()));
        assert!(!outcome.outcomes[1].is_unreachable());
    }

    #[tokio::test]
    async fn test_zero_policy_absorbs_text_estimate() {
        let fetcher = FixtureFetcher::default().with(
            "state:1",
            r#"[["NAME","EST","LAN"],["Alabama","N/A","625"],["Alabama","5","625"]]"#,
        );
        let mut config = settings(1..=1);
        config.policy = EstimatePolicy::Zero;
        let aggregator = Aggregator::new(config, fetcher);

        let outcome = aggregator.run().await.unwrap();
        assert_eq!(outcome.tally.total, 5);
    }

    #[tokio::test]
    async fn test_error_status_with_table_body_is_used() {
        let fetcher = FixtureFetcher::default().with_status(
            "state:1",
            500,
            r#"[["NAME","EST","LAN"],["Alabama","151385","625"]]"#,
        );
        let aggregator = Aggregator::new(settings(1..=1), fetcher);

        let outcome = aggregator.run().await.unwrap();
        assert_eq!(outcome.accumulated.len(), 1);
    }

    #[tokio::test]
    async fn test_all_states_scope_single_request() {
        let fetcher = FixtureFetcher::default().with(
            "state:*",
            r#"[["NAME","EST","LAN","state"],
                ["Alabama","151385","625","01"],
                ["Alaska","22425","625","02"]]"#,
        );
        let mut config = settings(1..=50);
        config.scope = Scope::AllStates;
        let aggregator = Aggregator::new(config, fetcher);

        assert_eq!(aggregator.selectors(), [RegionSelector::AllStates]);

        let outcome = aggregator.run().await.unwrap();
        assert_eq!(outcome.tally.total, 173810);
        assert_eq!(aggregator.fetcher.calls(), ["state:*"]);
    }

    #[test]
    fn test_selectors_for_state_scope() {
        let aggregator = Aggregator::new(settings(1..=50), FixtureFetcher::default());
        let selectors = aggregator.selectors();

        assert_eq!(selectors.len(), 50);
        assert_eq!(selectors[0], RegionSelector::State(1));
        assert_eq!(selectors[49], RegionSelector::State(50));
    }

    #[test]
    fn test_filter_project_is_idempotent() {
        let table = table::build(
            r#"[["NAME","EST","LAN"],["Alabama","151385","625"],["Alabama","9","626"]]"#,
        )
        .unwrap();
        let before = table.clone();
        let columns = Columns::default();
        let language = LanguageFilter::Code(625);

        let first = filter_project(&table, &columns, &language).unwrap();
        let second = filter_project(&table, &columns, &language).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, [EstimateRow::new("Alabama", Some("151385"))]);
        assert_eq!(table, before);
    }

    #[test]
    fn test_filter_project_matches_language_text_exactly() {
        let table = table::build(
            r#"[["NAME","EST","LAN"],
                ["A","1","0625"],
                ["B","2"," 625"],
                ["C","3","625.0"],
                ["D","4","625"]]"#,
        )
        .unwrap();

        let rows = filter_project(&table, &Columns::default(), &LanguageFilter::Code(625)).unwrap();
        assert_eq!(rows, [EstimateRow::new("D", Some("4"))]);
    }

    #[test]
    fn test_filter_project_missing_column() {
        let table = table::build(r#"[["NAME","EST"],["Alabama","151385"]]"#).unwrap();
        let err = filter_project(&table, &Columns::default(), &LanguageFilter::Code(625))
            .unwrap_err();
        assert!(matches!(err, ParseError::MissingColumn(c) if c == "LAN"));
    }

    #[test]
    fn test_config_conversion() {
        let config = Config::default();
        let settings = AggregatorConfig::try_from(&config).unwrap();

        assert_eq!(settings.regions, 1..=50);
        assert_eq!(settings.language, LanguageFilter::Code(625));
        assert_eq!(settings.policy, EstimatePolicy::Strict);
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.base_url.host_str(), Some("api.census.gov"));
    }

    #[test]
    fn test_config_conversion_rejects_bad_values() {
        let mut config = Config::default();
        config.api.base_url = "not a url".to_string();
        assert!(AggregatorConfig::try_from(&config).is_err());

        let mut config = Config::default();
        config.api.base_url = "ftp://api.census.gov/data".to_string();
        assert!(AggregatorConfig::try_from(&config).is_err());

        let mut config = Config::default();
        config.query.from = 10;
        config.query.to = 5;
        assert!(AggregatorConfig::try_from(&config).is_err());

        let mut config = Config::default();
        config.query.language = "spanish".to_string();
        assert!(AggregatorConfig::try_from(&config).is_err());

        let mut config = Config::default();
        config.api.fields = vec!["LANLABEL".to_string()];
        assert!(AggregatorConfig::try_from(&config).is_err());

        let config: Config = toml::from_str("[api]\ntimeout_seconds = 0\n").unwrap();
        assert!(AggregatorConfig::try_from(&config).is_err());

        let mut config = Config::default();
        config.aggregate.concurrency = 0;
        assert!(AggregatorConfig::try_from(&config).is_err());
    }

    #[test]
    fn test_config_conversion_trims_fields() {
        let mut config = Config::default();
        config.api.fields = vec![" EST".to_string(), "NAME ".to_string(), " ".to_string()];

        let settings = AggregatorConfig::try_from(&config).unwrap();
        assert_eq!(settings.fields, ["EST", "NAME"]);
    }
}
