//! Merges findings from all layers into the final anomaly report.
//!
//! Deduplication keeps one finding per (shipment_id, sub_type), preferring
//! the most authoritative layer per the configured priority order. The
//! aggregator owns the triage fields: risk_score and confidence are filled
//! in here, never by the detectors.

use crate::config::AggregatorConfig;
use crate::types::{Anomaly, Layer, Severity};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::info;
use uuid::Uuid;

/// Final report shape written to anomaly_report.json
#[derive(Debug, Serialize)]
pub struct AnomalyReport {
    pub report_id: String,
    pub report_generated_at: String,
    pub total_shipments: usize,
    pub total_anomalies: usize,
    pub anomalies_by_category: BTreeMap<String, u32>,
    pub anomalies_by_severity: BTreeMap<String, u32>,
    pub anomalies_by_confidence: BTreeMap<String, u32>,
    pub total_estimated_penalty_usd: f64,
    pub total_estimated_penalty_inr: f64,
    pub anomalies: Vec<Anomaly>,
}

fn layer_rank(layer: Layer, priority: &[Layer]) -> usize {
    priority
        .iter()
        .position(|l| *l == layer)
        .unwrap_or(priority.len())
}

/// Keep one finding per (shipment_id, sub_type). A later finding replaces
/// an earlier one only when its layer is strictly more authoritative;
/// ties keep the first seen, so input order stays deterministic.
pub fn deduplicate(anomalies: Vec<Anomaly>, priority: &[Layer]) -> Vec<Anomaly> {
    let mut kept: Vec<Anomaly> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for anomaly in anomalies {
        let key = (anomaly.shipment_id.clone(), anomaly.sub_type.clone());
        match index.get(&key) {
            Some(&pos) => {
                if layer_rank(anomaly.layer, priority) < layer_rank(kept[pos].layer, priority) {
                    kept[pos] = anomaly;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(anomaly);
            }
        }
    }
    kept
}

/// Triage score: severity weight × 25 plus penalty capped at 25 points.
/// Range is 26 (low, no penalty) to 125 (critical, ≥ $25K exposure).
pub fn risk_score(anomaly: &Anomaly) -> f64 {
    anomaly.severity.weight() * 25.0 + (anomaly.estimated_penalty_usd / 1000.0).min(25.0)
}

/// Layer-reliability confidence in [0, 1]. Deterministic rules are trusted
/// most; grouped statistics least. Severity and evidence richness nudge
/// the base either way.
pub fn confidence(anomaly: &Anomaly) -> f64 {
    let base: f64 = match anomaly.layer {
        Layer::RuleBased => 0.90,
        Layer::Llm => 0.80,
        Layer::Trend => 0.75,
        Layer::Statistical => 0.65,
    };
    let severity_adj = match anomaly.severity {
        Severity::Critical => 0.10,
        Severity::Medium => -0.10,
        _ => 0.0,
    };
    let evidence_adj = if anomaly.evidence.len() >= 5 { 0.05 } else { 0.0 };
    (base + severity_adj + evidence_adj).clamp(0.0, 1.0)
}

/// Bucket a confidence value for report tallies
pub fn confidence_level(value: f64) -> &'static str {
    if value >= 0.75 {
        "high"
    } else if value >= 0.55 {
        "medium"
    } else {
        "low"
    }
}

/// Deduplicate, score, tally, and sort the merged findings into the final
/// report. Anomalies are ordered by descending risk score, ties broken by
/// anomaly id so output is stable.
pub fn build_report(
    total_shipments: usize,
    anomalies: Vec<Anomaly>,
    config: &AggregatorConfig,
) -> AnomalyReport {
    let mut anomalies = deduplicate(anomalies, &config.layer_priority);

    let mut by_category: BTreeMap<String, u32> = BTreeMap::new();
    let mut by_severity: BTreeMap<String, u32> = BTreeMap::new();
    let mut by_confidence: BTreeMap<String, u32> = BTreeMap::new();
    let mut total_penalty = 0.0;

    for anomaly in &mut anomalies {
        let score = risk_score(anomaly);
        let conf = confidence(anomaly);
        anomaly.risk_score = Some(score);
        anomaly.confidence = Some(conf);

        *by_category
            .entry(anomaly.category.as_str().to_string())
            .or_default() += 1;
        *by_severity
            .entry(anomaly.severity.as_str().to_string())
            .or_default() += 1;
        *by_confidence
            .entry(confidence_level(conf).to_string())
            .or_default() += 1;
        total_penalty += anomaly.estimated_penalty_usd;
    }

    anomalies.sort_by(|a, b| {
        b.risk_score
            .partial_cmp(&a.risk_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.anomaly_id.cmp(&b.anomaly_id))
    });

    info!(
        total = anomalies.len(),
        penalty_usd = total_penalty,
        "Anomaly report assembled"
    );

    AnomalyReport {
        report_id: Uuid::new_v4().to_string(),
        report_generated_at: Utc::now().to_rfc3339(),
        total_shipments,
        total_anomalies: anomalies.len(),
        anomalies_by_category: by_category,
        anomalies_by_severity: by_severity,
        anomalies_by_confidence: by_confidence,
        total_estimated_penalty_usd: total_penalty,
        total_estimated_penalty_inr: total_penalty * config.usd_to_inr,
        anomalies,
    }
}
