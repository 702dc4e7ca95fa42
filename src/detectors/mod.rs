//! Detection layers: deterministic rules, statistical scans, LLM checks

pub mod hs_validation;
pub mod rules;
pub mod statistical;

pub use hs_validation::{generate_executive_summary, validate_hs_codes};
pub use rules::run_rule_checks;
pub use statistical::run_statistical_checks;
