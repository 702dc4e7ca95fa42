//! Report assembly and artifact writing

pub mod accuracy;
pub mod aggregator;

pub use accuracy::{evaluate, AccuracyReport};
pub use aggregator::{build_report, deduplicate, AnomalyReport};

use crate::llm::UsageReport;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

fn write_json<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Report written");
    Ok(())
}

/// Write all run artifacts into the output directory. The accuracy report
/// is optional: a run without a planted manifest still produces the rest.
pub fn write_artifacts<P: AsRef<Path>>(
    output_dir: P,
    anomaly_report: &AnomalyReport,
    accuracy_report: Option<&AccuracyReport>,
    executive_summary: &str,
    usage_report: &UsageReport,
) -> Result<()> {
    let dir = output_dir.as_ref();
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    write_json(dir.join("anomaly_report.json"), anomaly_report)?;
    if let Some(accuracy) = accuracy_report {
        write_json(dir.join("accuracy_report.json"), accuracy)?;
    }
    write_json(dir.join("llm_usage_report.json"), usage_report)?;

    let summary = format!(
        "# Executive Summary: Trade Shipment Anomaly Analysis\n\n*Generated: {}*\n\n---\n\n{}",
        Utc::now().format("%B %d, %Y"),
        executive_summary
    );
    let summary_path = dir.join("executive_summary.md");
    fs::write(&summary_path, summary)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;
    info!(path = %summary_path.display(), "Report written");

    Ok(())
}
