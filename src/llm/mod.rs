//! External LLM integration: Gemini client and usage accounting

pub mod client;
pub mod usage;

pub use client::{GeminiClient, LlmFailure, TextGenerator};
pub use usage::{UsageLedger, UsageReport};
