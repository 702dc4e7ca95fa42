//! Configuration management for the trade anomaly pipeline

use crate::types::Layer;
use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data: DataConfig,
    pub detection: DetectionConfig,
    pub volume: VolumeConfig,
    pub aggregator: AggregatorConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

/// Input/output locations
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Directory containing shipments.csv and the reference tables
    pub data_dir: String,
    /// Directory the report artifacts are written to
    pub output_dir: String,
}

/// Thresholds for the rule engine and statistical detector
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Z-score magnitude above which a grouped value is an outlier
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
    /// Groups smaller than this are skipped (no meaningful Z-score)
    #[serde(default = "default_min_group_size")]
    pub min_group_size: usize,
    /// Rounding tolerance for the FOB consistency check, in USD
    #[serde(default = "default_fob_tolerance")]
    pub fob_tolerance_usd: f64,
    /// Insurance rate band as percent of FOB
    #[serde(default = "default_insurance_rate_max")]
    pub insurance_rate_max_pct: f64,
    #[serde(default = "default_insurance_rate_min")]
    pub insurance_rate_min_pct: f64,
    /// Absolute days above buyer average required before a payment delay fires
    #[serde(default = "default_payment_buffer")]
    pub payment_delay_buffer_days: f64,
    /// Rolling window of recent paid shipments for the trend heuristic
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    /// Trend fires only past all three of these gates
    #[serde(default = "default_trend_min_slowdown_days")]
    pub trend_min_slowdown_days: f64,
    #[serde(default = "default_trend_min_slowdown_pct")]
    pub trend_min_slowdown_pct: f64,
    #[serde(default = "default_trend_baseline_multiplier")]
    pub trend_baseline_multiplier: f64,
    /// Per-credit-rating Z-score thresholds for payment delays.
    /// A-rated buyers need a much larger deviation to trigger than C-rated.
    #[serde(default = "default_credit_rating_thresholds")]
    pub credit_rating_thresholds: HashMap<String, f64>,
}

fn default_z_threshold() -> f64 {
    2.5
}

fn default_min_group_size() -> usize {
    3
}

fn default_fob_tolerance() -> f64 {
    0.05
}

fn default_insurance_rate_max() -> f64 {
    0.8
}

fn default_insurance_rate_min() -> f64 {
    0.05
}

fn default_payment_buffer() -> f64 {
    30.0
}

fn default_trend_window() -> usize {
    3
}

fn default_trend_min_slowdown_days() -> f64 {
    14.0
}

fn default_trend_min_slowdown_pct() -> f64 {
    40.0
}

fn default_trend_baseline_multiplier() -> f64 {
    1.5
}

fn default_credit_rating_thresholds() -> HashMap<String, f64> {
    let mut thresholds = HashMap::new();
    thresholds.insert("A".to_string(), 4.5);
    thresholds.insert("B".to_string(), 3.5);
    thresholds.insert("C".to_string(), 2.5);
    thresholds
}

/// Smart volume spike detection
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeConfig {
    /// Order value vs buyer average ratio that triggers on its own
    #[serde(default = "default_spike_ratio")]
    pub spike_ratio: f64,
    /// Absolute order value floor for the ratio-only branch, in USD
    #[serde(default = "default_value_floor")]
    pub value_floor_usd: f64,
    /// Lower ratio that suffices when the product itself is high-risk
    #[serde(default = "default_high_risk_ratio")]
    pub high_risk_ratio: f64,
    /// Product description → export risk factor (re-export/sanctions
    /// exposure). Factors ≥ 3 enable the lower-ratio branch.
    #[serde(default = "default_risk_factors")]
    pub risk_factors: HashMap<String, u32>,
}

fn default_spike_ratio() -> f64 {
    8.0
}

fn default_value_floor() -> f64 {
    100_000.0
}

fn default_high_risk_ratio() -> f64 {
    5.0
}

fn default_risk_factors() -> HashMap<String, u32> {
    let mut factors = HashMap::new();
    factors.insert("Basmati Rice Premium Grade".to_string(), 3);
    factors.insert("Pharmaceutical Tablets Generic".to_string(), 4);
    factors.insert("Polypropylene Granules Industrial".to_string(), 2);
    factors
}

/// Aggregation and scoring policy
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// Deduplication priority, most authoritative layer first
    #[serde(default = "default_layer_priority")]
    pub layer_priority: Vec<Layer>,
    /// Fixed conversion rate for the INR penalty total
    #[serde(default = "default_usd_to_inr")]
    pub usd_to_inr: f64,
}

fn default_layer_priority() -> Vec<Layer> {
    vec![Layer::Llm, Layer::Trend, Layer::Statistical, Layer::RuleBased]
}

fn default_usd_to_inr() -> f64 {
    83.0
}

/// External text-generation capability
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// API base endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Attempts before the layer degrades to zero findings
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_llm_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_llm_timeout() -> u64 {
    60
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataConfig {
                data_dir: "data".to_string(),
                output_dir: "output".to_string(),
            },
            detection: DetectionConfig {
                z_threshold: default_z_threshold(),
                min_group_size: default_min_group_size(),
                fob_tolerance_usd: default_fob_tolerance(),
                insurance_rate_max_pct: default_insurance_rate_max(),
                insurance_rate_min_pct: default_insurance_rate_min(),
                payment_delay_buffer_days: default_payment_buffer(),
                trend_window: default_trend_window(),
                trend_min_slowdown_days: default_trend_min_slowdown_days(),
                trend_min_slowdown_pct: default_trend_min_slowdown_pct(),
                trend_baseline_multiplier: default_trend_baseline_multiplier(),
                credit_rating_thresholds: default_credit_rating_thresholds(),
            },
            volume: VolumeConfig {
                spike_ratio: default_spike_ratio(),
                value_floor_usd: default_value_floor(),
                high_risk_ratio: default_high_risk_ratio(),
                risk_factors: default_risk_factors(),
            },
            aggregator: AggregatorConfig {
                layer_priority: default_layer_priority(),
                usd_to_inr: default_usd_to_inr(),
            },
            llm: LlmConfig {
                model: default_llm_model(),
                endpoint: default_llm_endpoint(),
                api_key_env: default_api_key_env(),
                max_retries: default_max_retries(),
                timeout_secs: default_llm_timeout(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.detection.z_threshold, 2.5);
        assert_eq!(config.detection.min_group_size, 3);
        assert_eq!(config.detection.fob_tolerance_usd, 0.05);
        assert_eq!(config.aggregator.usd_to_inr, 83.0);
        assert_eq!(config.volume.risk_factors.len(), 3);
    }

    #[test]
    fn test_default_layer_priority() {
        let priority = default_layer_priority();
        assert_eq!(
            priority,
            vec![Layer::Llm, Layer::Trend, Layer::Statistical, Layer::RuleBased]
        );
    }

    #[test]
    fn test_credit_rating_thresholds() {
        let thresholds = default_credit_rating_thresholds();
        assert_eq!(thresholds.get("A"), Some(&4.5));
        assert_eq!(thresholds.get("C"), Some(&2.5));
    }
}
