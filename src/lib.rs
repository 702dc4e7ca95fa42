//! Trade Anomaly Pipeline Library
//!
//! Three-layer anomaly detection over export shipment data: deterministic
//! rule checks, grouped statistical outlier scans, and LLM-assisted HS code
//! validation, merged into a single ranked report.

pub mod config;
pub mod dataset;
pub mod detectors;
pub mod llm;
pub mod report;
pub mod stats;
pub mod types;

pub use config::AppConfig;
pub use dataset::Dataset;
pub use llm::{GeminiClient, TextGenerator, UsageLedger};
pub use report::{AccuracyReport, AnomalyReport};
pub use types::{Anomaly, Shipment};
