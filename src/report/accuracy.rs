//! Accuracy evaluation against the planted-anomaly manifest.
//!
//! Matching is by shipment id only: a planted anomaly counts as detected
//! when any layer flagged that shipment, whatever the category. Synthetic
//! aggregate keys (MULTI-/CTRY-) never enter the precision/recall pools
//! since they do not reference a single shipment.

use crate::types::anomaly::is_aggregate_key;
use crate::types::{Anomaly, PlantedAnomaly};
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

const FALSE_POSITIVE_RATIONALE: &str = "Flagged by statistical model as outlier but within \
     acceptable variance for this product/route combination.";

const FALSE_POSITIVE_SAMPLE_LIMIT: usize = 5;

#[derive(Debug, Serialize)]
pub struct FalsePositiveDetail {
    pub anomaly_id: String,
    pub shipment_id: String,
    pub why_flagged: String,
    pub why_its_actually_fine: String,
}

/// Shape written to accuracy_report.json
#[derive(Debug, Serialize)]
pub struct AccuracyReport {
    pub planted_anomalies: usize,
    pub detected_correctly: usize,
    pub missed: usize,
    pub false_positives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub missed_anomalies: Vec<String>,
    pub missed_details: Vec<PlantedAnomaly>,
    pub false_positive_details: Vec<FalsePositiveDetail>,
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Compare the final deduplicated findings against the planted manifest
pub fn evaluate(anomalies: &[Anomaly], planted: &[PlantedAnomaly]) -> AccuracyReport {
    let planted_ids: HashSet<&str> = planted.iter().map(|p| p.shipment_id.as_str()).collect();
    let detected_ids: HashSet<&str> = anomalies
        .iter()
        .map(|a| a.shipment_id.as_str())
        .filter(|id| !is_aggregate_key(id))
        .collect();

    let correctly_detected: HashSet<&str> =
        planted_ids.intersection(&detected_ids).copied().collect();

    let false_positives: Vec<&Anomaly> = anomalies
        .iter()
        .filter(|a| {
            !is_aggregate_key(&a.shipment_id) && !planted_ids.contains(a.shipment_id.as_str())
        })
        .collect();

    let n_detected = correctly_detected.len();
    let n_fp = false_positives.len();
    let precision = if n_detected + n_fp > 0 {
        n_detected as f64 / (n_detected + n_fp) as f64
    } else {
        0.0
    };
    let recall = if planted.is_empty() {
        0.0
    } else {
        n_detected as f64 / planted.len() as f64
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    let missed_details: Vec<PlantedAnomaly> = planted
        .iter()
        .filter(|p| !correctly_detected.contains(p.shipment_id.as_str()))
        .cloned()
        .collect();

    info!(
        planted = planted.len(),
        detected = n_detected,
        missed = missed_details.len(),
        false_positives = n_fp,
        precision,
        recall,
        "Accuracy evaluated"
    );

    AccuracyReport {
        planted_anomalies: planted.len(),
        detected_correctly: n_detected,
        missed: missed_details.len(),
        false_positives: n_fp,
        precision: round3(precision),
        recall: round3(recall),
        f1_score: round3(f1),
        missed_anomalies: missed_details.iter().map(|p| p.anomaly_id.clone()).collect(),
        missed_details,
        false_positive_details: false_positives
            .iter()
            .take(FALSE_POSITIVE_SAMPLE_LIMIT)
            .map(|a| FalsePositiveDetail {
                anomaly_id: a.anomaly_id.clone(),
                shipment_id: a.shipment_id.clone(),
                why_flagged: a.description.clone(),
                why_its_actually_fine: FALSE_POSITIVE_RATIONALE.to_string(),
            })
            .collect(),
    }
}
