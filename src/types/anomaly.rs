//! Anomaly data structures shared by all detection layers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Detection layer that produced an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    RuleBased,
    Statistical,
    Trend,
    Llm,
}

/// Anomaly category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Pricing,
    Compliance,
    Payment,
    RouteLogistics,
    Volume,
    CrossField,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Pricing => "pricing",
            Category::Compliance => "compliance",
            Category::Payment => "payment",
            Category::RouteLogistics => "route_logistics",
            Category::Volume => "volume",
            Category::CrossField => "cross_field",
        }
    }
}

/// Severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used by the risk score (critical=4 .. low=1)
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Critical => 4.0,
            Severity::High => 3.0,
            Severity::Medium => 2.0,
            Severity::Low => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

/// A single evidence value. Closed set so report serialization stays
/// deterministic regardless of which layer produced the finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvidenceValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Null,
}

impl From<f64> for EvidenceValue {
    fn from(v: f64) -> Self {
        EvidenceValue::Number(v)
    }
}

impl From<u64> for EvidenceValue {
    fn from(v: u64) -> Self {
        EvidenceValue::Number(v as f64)
    }
}

impl From<u32> for EvidenceValue {
    fn from(v: u32) -> Self {
        EvidenceValue::Number(v as f64)
    }
}

impl From<&str> for EvidenceValue {
    fn from(v: &str) -> Self {
        EvidenceValue::Text(v.to_string())
    }
}

impl From<String> for EvidenceValue {
    fn from(v: String) -> Self {
        EvidenceValue::Text(v)
    }
}

impl From<bool> for EvidenceValue {
    fn from(v: bool) -> Self {
        EvidenceValue::Bool(v)
    }
}

/// Evidence mapping: field name → value. BTreeMap keeps key order stable.
pub type Evidence = BTreeMap<String, EvidenceValue>;

/// Synthetic shipment-id prefixes for group-level findings that do not map
/// to a single shipment (buyer aggregates, country-month aggregates).
pub const AGGREGATE_KEY_PREFIXES: [&str; 2] = ["MULTI-", "CTRY-"];

/// True when an anomaly's shipment id is a synthetic aggregate key
pub fn is_aggregate_key(shipment_id: &str) -> bool {
    AGGREGATE_KEY_PREFIXES
        .iter()
        .any(|p| shipment_id.starts_with(p))
}

/// A finding produced by exactly one detection layer.
///
/// Immutable once emitted, except for `risk_score` and `confidence`, which
/// the aggregator fills in when assembling the final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    /// Layer-prefixed sequence id (RULE-001, STAT-014, TREND-001, LLM-002)
    pub anomaly_id: String,

    /// Layer that produced the finding
    pub layer: Layer,

    /// Referenced shipment id, or a synthetic aggregate key (MULTI-/CTRY-)
    pub shipment_id: String,

    /// Anomaly category
    pub category: Category,

    /// Specific check name (e.g. fob_math_error)
    pub sub_type: String,

    /// Human-readable description
    pub description: String,

    /// Field → value evidence used for auditability
    pub evidence: Evidence,

    /// Severity classification
    pub severity: Severity,

    /// Recommended operator action
    pub recommendation: String,

    /// Estimated monetary penalty exposure in USD
    pub estimated_penalty_usd: f64,

    /// Label describing how the anomaly was detected
    pub detection_method: String,

    /// Triage score, set by the aggregator (severity × 25 + capped penalty)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,

    /// Layer-reliability confidence in [0, 1], set by the aggregator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Anomaly {
    /// Create an anomaly with the aggregator-owned fields unset
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        anomaly_id: String,
        layer: Layer,
        shipment_id: String,
        category: Category,
        sub_type: &str,
        description: String,
        evidence: Evidence,
        severity: Severity,
        recommendation: String,
        estimated_penalty_usd: f64,
        detection_method: &str,
    ) -> Self {
        Self {
            anomaly_id,
            layer,
            shipment_id,
            category,
            sub_type: sub_type.to_string(),
            description,
            evidence,
            severity,
            recommendation,
            estimated_penalty_usd,
            detection_method: detection_method.to_string(),
            risk_score: None,
            confidence: None,
        }
    }
}

/// Sequential id factory for one detection pass (RULE-001, RULE-002, ...)
pub struct AnomalyIdSeq {
    prefix: &'static str,
    counter: u32,
}

impl AnomalyIdSeq {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix, counter: 0 }
    }

    pub fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("{}-{:03}", self.prefix, self.counter)
    }
}

/// Convenience macro-free builder for evidence maps
pub fn evidence_from(pairs: Vec<(&str, EvidenceValue)>) -> Evidence {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// A planted ground-truth anomaly; consumed only by the accuracy evaluator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantedAnomaly {
    pub anomaly_id: String,
    pub shipment_id: String,
    pub category: String,
    pub sub_type: String,
    pub description: String,
    #[serde(default)]
    pub why_this_matters: String,
    pub estimated_penalty_usd: f64,
    pub severity: String,
}
