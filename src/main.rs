//! Trade Anomaly Pipeline - Main Entry Point
//!
//! Loads the shipment dataset, runs all three detection layers, merges the
//! findings into a ranked report, and writes the run artifacts. Each layer
//! degrades to zero findings on failure instead of aborting the run.

use anyhow::Result;
use trade_anomaly_pipeline::{
    config::AppConfig,
    dataset::{self, Dataset},
    detectors,
    llm::{GeminiClient, UsageLedger},
    report,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        format!("trade_anomaly_pipeline={}", config.logging.level).parse()?,
    );
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting Trade Anomaly Pipeline");
    info!(
        z_threshold = config.detection.z_threshold,
        min_group_size = config.detection.min_group_size,
        model = %config.llm.model,
        "Configuration loaded"
    );

    let dataset = Dataset::load_from_dir(&config.data.data_dir)?;
    let total_shipments = dataset.shipments.len();

    // Layer 1: deterministic rule checks
    let rule_anomalies = detectors::run_rule_checks(&dataset.shipments, &config.detection);
    info!(count = rule_anomalies.len(), "Rule layer finished");

    // Layer 2: grouped statistics, trend, and smart volume heuristics
    let stat_anomalies = detectors::run_statistical_checks(
        &dataset.shipments,
        &dataset.references,
        &config.detection,
        &config.volume,
    );
    info!(count = stat_anomalies.len(), "Statistical layer finished");

    // Layer 3: LLM HS code validation; a missing key or dead API means
    // zero findings, never a failed run
    let mut ledger = UsageLedger::new("Google AI Studio", &config.llm.model);
    let client = GeminiClient::from_config(&config.llm);
    let llm_anomalies = match &client {
        Ok(generator) => {
            detectors::validate_hs_codes(
                &dataset.shipments,
                generator,
                &config.llm.model,
                &mut ledger,
            )
            .await
        }
        Err(failure) => {
            warn!(error = %failure, "LLM layer degraded to zero findings");
            ledger.note(format!("LLM layer skipped: {}", failure));
            Vec::new()
        }
    };
    info!(count = llm_anomalies.len(), "LLM layer finished");

    let mut all_anomalies = rule_anomalies;
    all_anomalies.extend(stat_anomalies);
    all_anomalies.extend(llm_anomalies);

    let anomaly_report =
        report::build_report(total_shipments, all_anomalies, &config.aggregator);

    let executive_summary = match &client {
        Ok(generator) => {
            detectors::generate_executive_summary(
                total_shipments,
                &anomaly_report.anomalies,
                generator,
                &mut ledger,
            )
            .await
        }
        Err(failure) => format!("## Executive Summary\n\nLLM unavailable: {}\n", failure),
    };

    // Accuracy evaluation only applies to datasets shipped with a planted
    // manifest; its absence is not an error
    let manifest_path = std::path::Path::new(&config.data.data_dir).join("planted_anomalies.json");
    let accuracy_report = match dataset::load_planted_manifest(&manifest_path) {
        Ok(planted) => Some(report::evaluate(&anomaly_report.anomalies, &planted)),
        Err(e) => {
            warn!(error = %e, "Skipping accuracy evaluation");
            None
        }
    };

    report::write_artifacts(
        &config.data.output_dir,
        &anomaly_report,
        accuracy_report.as_ref(),
        &executive_summary,
        &ledger.report(),
    )?;

    info!(
        total_anomalies = anomaly_report.total_anomalies,
        penalty_usd = anomaly_report.total_estimated_penalty_usd,
        llm_calls = ledger.total_calls(),
        "Pipeline finished"
    );

    Ok(())
}
