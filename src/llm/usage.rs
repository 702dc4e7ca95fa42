//! LLM usage accounting.
//!
//! One ledger per pipeline run, passed explicitly to every call site.
//! Token counts are estimated from word counts since the API response does
//! not always carry usage metadata.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;

// gemini-1.5-flash list price per 1M tokens
const INPUT_COST_PER_MTOK: f64 = 0.075;
const OUTPUT_COST_PER_MTOK: f64 = 0.30;

/// Estimate tokens from text: roughly 4 tokens per 3 words
pub fn estimate_tokens(text: &str) -> u64 {
    let words = text.split_whitespace().count() as u64;
    words * 4 / 3
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskUsage {
    pub calls: u32,
    pub tokens: u64,
    pub description: String,
}

/// Per-run accounting of every LLM call
#[derive(Debug)]
pub struct UsageLedger {
    provider: String,
    model: String,
    total_calls: u32,
    tokens: TokenTotals,
    breakdown_by_task: BTreeMap<String, TaskUsage>,
    latencies_ms: Vec<u64>,
    notes: Vec<String>,
}

/// Serializable snapshot written to llm_usage_report.json
#[derive(Debug, Serialize)]
pub struct UsageReport {
    pub provider: String,
    pub model: String,
    pub total_calls: u32,
    pub tokens: TokenTotals,
    pub breakdown_by_task: BTreeMap<String, TaskUsage>,
    pub avg_latency_ms: f64,
    pub estimated_cost_usd: f64,
    pub timestamp: String,
    pub notes: Vec<String>,
}

impl UsageLedger {
    pub fn new(provider: &str, model: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            total_calls: 0,
            tokens: TokenTotals::default(),
            breakdown_by_task: BTreeMap::new(),
            latencies_ms: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Record one completed call
    pub fn record_call(
        &mut self,
        task: &str,
        description: &str,
        prompt: &str,
        response: &str,
        latency_ms: u64,
    ) {
        let input = estimate_tokens(prompt);
        let output = estimate_tokens(response);

        self.total_calls += 1;
        self.tokens.input += input;
        self.tokens.output += output;
        self.tokens.total += input + output;
        self.latencies_ms.push(latency_ms);

        let entry = self
            .breakdown_by_task
            .entry(task.to_string())
            .or_insert_with(|| TaskUsage {
                calls: 0,
                tokens: 0,
                description: description.to_string(),
            });
        entry.calls += 1;
        entry.tokens += input + output;
    }

    /// Record a run-level note (e.g. degraded layer, missing key)
    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }

    pub fn total_calls(&self) -> u32 {
        self.total_calls
    }

    fn estimated_cost_usd(&self) -> f64 {
        let input = self.tokens.input as f64 / 1_000_000.0 * INPUT_COST_PER_MTOK;
        let output = self.tokens.output as f64 / 1_000_000.0 * OUTPUT_COST_PER_MTOK;
        input + output
    }

    /// Snapshot the ledger for serialization
    pub fn report(&self) -> UsageReport {
        let avg_latency_ms = if self.latencies_ms.is_empty() {
            0.0
        } else {
            self.latencies_ms.iter().sum::<u64>() as f64 / self.latencies_ms.len() as f64
        };

        UsageReport {
            provider: self.provider.clone(),
            model: self.model.clone(),
            total_calls: self.total_calls,
            tokens: self.tokens,
            breakdown_by_task: self.breakdown_by_task.clone(),
            avg_latency_ms,
            estimated_cost_usd: self.estimated_cost_usd(),
            timestamp: Utc::now().to_rfc3339(),
            notes: self.notes.clone(),
        }
    }
}
