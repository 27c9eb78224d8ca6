//! Report rendering.
//!
//! Turns a [`RunReport`] into a plain text table, a Markdown document or
//! pretty-printed JSON.

use crate::models::{RegionOutcome, ReportMetadata, RunReport, TalliedRow};
use anyhow::Result;

/// Render the rows in region order or sorted by estimate.
fn ordered_rows(report: &RunReport, sort: bool) -> Vec<TalliedRow> {
    if sort {
        report.rows_by_estimate()
    } else {
        report.rows.clone()
    }
}

/// Generate a plain text report: a two-column table followed by the total.
pub fn generate_text_report(report: &RunReport, sort: bool) -> String {
    let rows = ordered_rows(report, sort);

    let name_width = rows
        .iter()
        .map(|r| r.name.len())
        .chain(std::iter::once("NAME".len()))
        .max()
        .unwrap_or(4);
    let est_width = rows
        .iter()
        .map(|r| r.estimate.to_string().len())
        .chain(std::iter::once("EST".len()))
        .max()
        .unwrap_or(3);

    let mut output = String::new();

    output.push_str(&format!(
        "{:>nw$}  {:>ew$}\n",
        "NAME",
        "EST",
        nw = name_width,
        ew = est_width
    ));
    for row in &rows {
        output.push_str(&format!(
            "{:>nw$}  {:>ew$}\n",
            row.name,
            row.estimate,
            nw = name_width,
            ew = est_width
        ));
    }

    let skipped: Vec<&RegionOutcome> = report.skipped().collect();
    if !skipped.is_empty() {
        output.push_str(&format!("\nSkipped regions ({}):\n", skipped.len()));
        for outcome in skipped {
            output.push_str(&format!("  {}\n", outcome));
        }
    }

    output.push_str(&format!(
        "\nTotal ({} language {}): {}\n",
        report.metadata.scope, report.metadata.language, report.total
    ));

    output
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &RunReport, sort: bool) -> String {
    let mut output = String::new();

    output.push_str("# Language Tally\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&format!("**Total:** {}\n\n", report.total));
    output.push_str(&generate_rows_section(&ordered_rows(report, sort)));
    output.push_str(&generate_regions_section(&report.outcomes));

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Endpoint:** {}\n", metadata.base_url));
    section.push_str(&format!("- **Language:** {}\n", metadata.language));
    section.push_str(&format!("- **Scope:** {}\n", metadata.scope));
    if let Some(ref regions) = metadata.regions {
        section.push_str(&format!("- **Region Range:** {}\n", regions));
    }
    section.push_str(&format!(
        "- **Estimate Policy:** {}\n",
        metadata.estimate_policy
    ));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Regions:** {} attempted, {} appended, {} skipped\n",
        metadata.regions_attempted, metadata.regions_appended, metadata.regions_skipped
    ));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_rows_section(rows: &[TalliedRow]) -> String {
    let mut section = String::new();

    section.push_str("## Rows\n\n");

    if rows.is_empty() {
        section.push_str("No rows matched the language filter.\n\n");
        return section;
    }

    section.push_str("| Name | Estimate |\n");
    section.push_str("|------|---------:|\n");
    for row in rows {
        section.push_str(&format!("| {} | {} |\n", row.name, row.estimate));
    }
    section.push('\n');

    section
}

fn generate_regions_section(outcomes: &[RegionOutcome]) -> String {
    let skipped: Vec<_> = outcomes.iter().filter(|o| o.is_skipped()).collect();
    if skipped.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Skipped Regions\n\n");
    for outcome in skipped {
        section.push_str(&format!("- {}\n", outcome));
    }
    section.push('\n');

    section
}

/// Generate a JSON report.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
