//! Layer 3: LLM-based HS code validation and executive summary generation.
//!
//! The LLM never gets to break the pipeline: a failed call or an
//! unparseable response degrades to zero findings, and response parsing
//! falls back through progressively looser strategies before giving up.

use crate::llm::{LlmFailure, TextGenerator, UsageLedger};
use crate::types::anomaly::{evidence_from, AnomalyIdSeq};
use crate::types::{Anomaly, Category, Layer, Severity, Shipment};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{info, warn};

fn default_true() -> bool {
    true
}

/// One verdict line from the model
#[derive(Debug, Clone, Deserialize)]
struct HsVerdict {
    #[serde(default)]
    shipment_id: String,
    hs_code: String,
    product: String,
    #[serde(default = "default_true")]
    is_correct: bool,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    correct_hs_chapter: Option<String>,
}

/// Strip a markdown code fence, tolerating a leading language tag
fn strip_fences(response: &str) -> String {
    let trimmed = response.trim();
    if !trimmed.contains("```") {
        return trimmed.to_string();
    }
    let inner = trimmed.split("```").nth(1).unwrap_or(trimmed);
    inner.trim_start_matches("json").trim().to_string()
}

/// Parse model output into verdicts. Tries, in order: direct JSON, the
/// bracketed substring, then per-field regex extraction. Returns an empty
/// list when nothing salvageable remains.
fn parse_verdicts(response: &str) -> Vec<HsVerdict> {
    let clean = strip_fences(response);

    if let Ok(verdicts) = serde_json::from_str::<Vec<HsVerdict>>(&clean) {
        return verdicts;
    }
    if let Ok(single) = serde_json::from_str::<HsVerdict>(&clean) {
        return vec![single];
    }

    // the array may be embedded in surrounding prose
    if let (Some(start), Some(end)) = (clean.find('['), clean.rfind(']')) {
        if start < end {
            if let Ok(verdicts) = serde_json::from_str::<Vec<HsVerdict>>(&clean[start..=end]) {
                return verdicts;
            }
        }
    }

    // last resort: pull fields out of whatever object-shaped fragments exist
    extract_verdicts_by_field(&clean)
}

fn extract_verdicts_by_field(text: &str) -> Vec<HsVerdict> {
    let object_re = match Regex::new(r"\{[^{}]*\}") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    let field = |name: &str| Regex::new(&format!(r#""{}"\s*:\s*"([^"]*)""#, name));
    let (id_re, hs_re, product_re, reason_re, chapter_re) = match (
        field("shipment_id"),
        field("hs_code"),
        field("product"),
        field("reason"),
        field("correct_hs_chapter"),
    ) {
        (Ok(a), Ok(b), Ok(c), Ok(d), Ok(e)) => (a, b, c, d, e),
        _ => return Vec::new(),
    };
    let correct_re = match Regex::new(r#""is_correct"\s*:\s*(true|false)"#) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let grab = |re: &Regex, obj: &str| -> String {
        re.captures(obj)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    };

    let mut verdicts = Vec::new();
    for obj in object_re.find_iter(text) {
        let obj = obj.as_str();
        let hs_code = grab(&hs_re, obj);
        let product = grab(&product_re, obj);
        if hs_code.is_empty() || product.is_empty() {
            continue;
        }
        let is_correct = correct_re
            .captures(obj)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str() == "true")
            .unwrap_or(true);
        let chapter = grab(&chapter_re, obj);
        verdicts.push(HsVerdict {
            shipment_id: grab(&id_re, obj),
            hs_code,
            product,
            is_correct,
            reason: grab(&reason_re, obj),
            correct_hs_chapter: if chapter.is_empty() { None } else { Some(chapter) },
        });
    }
    verdicts
}

fn hs_prompt(combos: &[(&str, &str, &str)]) -> String {
    let combos_text: String = combos
        .iter()
        .map(|(id, hs, product)| format!("- ID:{} | HS:{} | Product: {}\n", id, hs, product))
        .collect();

    format!(
        "Indian customs expert: Review HS codes.\n\
         \n\
         Rules:\n\
         - Ch 61: Knitted clothing (61091000 = T-shirts)\n\
         - Ch 62: Woven clothing (62114900 = sarees)\n\
         - Ch 84: Machinery (84713000 = laptops)\n\
         - Ch 87: Auto parts (87083010 = brake pads)\n\
         - Ch 42: Leather (42021200 = wallets, 42031000 = apparel accessories)\n\
         - Ch 09: Spices (09041100 = black pepper, 09042110 = chili/capsicum)\n\
         - Ch 10: Cereals (10063020 = rice)\n\
         \n\
         Check:\n\
         {}\n\
         Return ONLY valid JSON array:\n\
         [{{\"shipment_id\":\"...\",\"hs_code\":\"...\",\"product\":\"...\",\
         \"is_correct\":true/false,\"reason\":\"...\",\"correct_hs_chapter\":\"...\"}}]\n\
         \n\
         No markdown, no backticks.",
        combos_text
    )
}

/// Validate HS code / product description pairs against the model.
///
/// Each distinct (hs_code, product) pair is sent once; a negative verdict
/// fans out to every shipment carrying that pair.
pub async fn validate_hs_codes<G: TextGenerator>(
    shipments: &[Shipment],
    generator: &G,
    model: &str,
    ledger: &mut UsageLedger,
) -> Vec<Anomaly> {
    let mut seen = HashSet::new();
    let combos: Vec<(&str, &str, &str)> = shipments
        .iter()
        .filter(|s| seen.insert((s.hs_code.clone(), s.product_description.clone())))
        .map(|s| {
            (
                s.shipment_id.as_str(),
                s.hs_code.as_str(),
                s.product_description.as_str(),
            )
        })
        .collect();

    if combos.is_empty() {
        return Vec::new();
    }
    info!(combos = combos.len(), "Validating unique HS combinations");

    let prompt = hs_prompt(&combos);
    let started = Instant::now();
    let response = match generator.generate(&prompt).await {
        Ok(text) => text,
        Err(failure) => {
            warn!(error = %failure, "HS validation degraded to zero findings");
            ledger.note(format!("HS validation skipped: {}", failure));
            return Vec::new();
        }
    };
    ledger.record_call(
        "hs_code_validation",
        "HS code validation",
        &prompt,
        &response,
        started.elapsed().as_millis() as u64,
    );

    let detection_method = format!("LLM: {} HS check", model);
    let mut ids = AnomalyIdSeq::new("LLM");
    let mut anomalies = Vec::new();

    for verdict in parse_verdicts(&response) {
        if verdict.is_correct {
            continue;
        }
        let chapter = verdict
            .correct_hs_chapter
            .clone()
            .unwrap_or_else(|| "Unknown".to_string());

        let affected: Vec<&Shipment> = shipments
            .iter()
            .filter(|s| {
                s.hs_code == verdict.hs_code && s.product_description == verdict.product
            })
            .collect();

        let mut emit = |shipment_id: String| {
            anomalies.push(Anomaly::new(
                ids.next_id(),
                Layer::Llm,
                shipment_id,
                Category::Compliance,
                "hs_code_mismatch",
                format!(
                    "HS {} wrong for '{}'. {}",
                    verdict.hs_code, verdict.product, verdict.reason
                ),
                evidence_from(vec![
                    ("hs_code_used", verdict.hs_code.as_str().into()),
                    ("product", verdict.product.as_str().into()),
                    ("llm_verdict", "INCORRECT".into()),
                    ("correct_chapter", chapter.as_str().into()),
                    ("llm_reason", verdict.reason.as_str().into()),
                ]),
                Severity::Critical,
                format!("Re-classify: {}. Penalty: ₹50K-2L.", chapter),
                6000.0,
                &detection_method,
            ));
        };

        if affected.is_empty() {
            // the model may echo an id we can still act on
            if !verdict.shipment_id.is_empty() {
                emit(verdict.shipment_id.clone());
            }
        } else {
            for s in affected {
                emit(s.shipment_id.clone());
            }
        }
    }

    info!(count = anomalies.len(), "HS mismatches found");
    anomalies
}

/// Ask the model for an executive summary of the final findings. Returns
/// a placeholder section when the model is unavailable.
pub async fn generate_executive_summary<G: TextGenerator>(
    total_shipments: usize,
    anomalies: &[Anomaly],
    generator: &G,
    ledger: &mut UsageLedger,
) -> String {
    let mut by_severity: std::collections::BTreeMap<&str, u32> = Default::default();
    let mut by_category: std::collections::BTreeMap<&str, u32> = Default::default();
    let mut total_penalty = 0.0;
    for a in anomalies {
        *by_severity.entry(a.severity.as_str()).or_default() += 1;
        *by_category.entry(a.category.as_str()).or_default() += 1;
        total_penalty += a.estimated_penalty_usd;
    }

    let mut top: Vec<&Anomaly> = anomalies.iter().collect();
    top.sort_by(|a, b| {
        b.estimated_penalty_usd
            .partial_cmp(&a.estimated_penalty_usd)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let top_desc: String = top
        .iter()
        .take(5)
        .map(|a| {
            let desc: String = a.description.chars().take(120).collect();
            format!(
                "- [{}] {}: {}\n",
                a.severity.as_str().to_uppercase(),
                a.shipment_id,
                desc
            )
        })
        .collect();

    let prompt = format!(
        "Trade compliance consultant: Write executive summary for Operations Head.\n\
         \n\
         Data:\n\
         - Shipments: {}\n\
         - Anomalies: {}\n\
         - Penalty risk: ${:.0}\n\
         - By severity: {}\n\
         - By category: {}\n\
         \n\
         Top 5 issues:\n\
         {}\n\
         Write 300-400 words:\n\
         1. Executive Overview (2-3 sentences)\n\
         2. Top 3 Urgent Issues (shipment IDs, INR impact where 1 USD = ₹83)\n\
         3. Trends\n\
         4. Financial Exposure\n\
         5. Immediate Actions (3-4 bullets)\n\
         \n\
         Professional, non-technical.",
        total_shipments,
        anomalies.len(),
        total_penalty,
        serde_json::to_string(&by_severity).unwrap_or_default(),
        serde_json::to_string(&by_category).unwrap_or_default(),
        top_desc
    );

    let started = Instant::now();
    match generator.generate(&prompt).await {
        Ok(summary) => {
            ledger.record_call(
                "executive_summary",
                "Executive summary",
                &prompt,
                &summary,
                started.elapsed().as_millis() as u64,
            );
            summary
        }
        Err(failure) => {
            warn!(error = %failure, "Executive summary degraded to placeholder");
            ledger.note(format!("Executive summary skipped: {}", failure));
            format!("## Executive Summary\n\nLLM unavailable: {}\n", failure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EvidenceValue;

    struct Canned(&'static str);

    impl TextGenerator for Canned {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmFailure> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    impl TextGenerator for Failing {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmFailure> {
            Err(LlmFailure::RetriesExhausted(3))
        }
    }

    fn laptop_shipment(id: &str) -> Shipment {
        let mut s = Shipment::new(id, 50, 450.0, 22500.0);
        s.hs_code = "61091000".to_string();
        s.product_description = "Laptop Computers Refurbished".to_string();
        s
    }

    const BAD_VERDICT: &str = r#"[{"shipment_id":"SHP-1","hs_code":"61091000","product":"Laptop Computers Refurbished","is_correct":false,"reason":"Ch 61 is knitted apparel; laptops belong in Ch 84.","correct_hs_chapter":"84713000"}]"#;

    #[tokio::test]
    async fn test_mismatch_fans_out_to_all_affected_shipments() {
        let shipments = vec![
            laptop_shipment("SHP-1"),
            laptop_shipment("SHP-2"),
            Shipment::new("SHP-3", 2000, 4.5, 9000.0), // correct combo, untouched
        ];
        let mut ledger = UsageLedger::new("google", "gemini-1.5-flash");
        let anomalies = validate_hs_codes(
            &shipments,
            &Canned(BAD_VERDICT),
            "gemini-1.5-flash",
            &mut ledger,
        )
        .await;

        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[0].anomaly_id, "LLM-001");
        assert_eq!(anomalies[1].anomaly_id, "LLM-002");
        assert_eq!(anomalies[0].shipment_id, "SHP-1");
        assert_eq!(anomalies[1].shipment_id, "SHP-2");
        assert_eq!(anomalies[0].severity, Severity::Critical);
        assert_eq!(anomalies[0].estimated_penalty_usd, 6000.0);
        assert_eq!(
            anomalies[0].evidence.get("llm_verdict"),
            Some(&EvidenceValue::Text("INCORRECT".to_string()))
        );
        assert_eq!(ledger.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_fenced_response_is_parsed() {
        let fenced = format!("```json\n{}\n```", BAD_VERDICT);
        let fenced: &'static str = Box::leak(fenced.into_boxed_str());
        let shipments = vec![laptop_shipment("SHP-1")];
        let mut ledger = UsageLedger::new("google", "gemini-1.5-flash");
        let anomalies =
            validate_hs_codes(&shipments, &Canned(fenced), "gemini-1.5-flash", &mut ledger).await;
        assert_eq!(anomalies.len(), 1);
    }

    #[tokio::test]
    async fn test_array_embedded_in_prose_is_parsed() {
        let wrapped = format!("Here are the results:\n{}\nLet me know!", BAD_VERDICT);
        let wrapped: &'static str = Box::leak(wrapped.into_boxed_str());
        let shipments = vec![laptop_shipment("SHP-1")];
        let mut ledger = UsageLedger::new("google", "gemini-1.5-flash");
        let anomalies =
            validate_hs_codes(&shipments, &Canned(wrapped), "gemini-1.5-flash", &mut ledger).await;
        assert_eq!(anomalies.len(), 1);
    }

    #[tokio::test]
    async fn test_garbage_response_yields_empty_list() {
        let shipments = vec![laptop_shipment("SHP-1")];
        let mut ledger = UsageLedger::new("google", "gemini-1.5-flash");
        let anomalies = validate_hs_codes(
            &shipments,
            &Canned("I could not determine anything useful."),
            "gemini-1.5-flash",
            &mut ledger,
        )
        .await;
        assert!(anomalies.is_empty());
    }

    #[tokio::test]
    async fn test_llm_failure_degrades_to_zero_findings() {
        let shipments = vec![laptop_shipment("SHP-1")];
        let mut ledger = UsageLedger::new("google", "gemini-1.5-flash");
        let anomalies =
            validate_hs_codes(&shipments, &Failing, "gemini-1.5-flash", &mut ledger).await;
        assert!(anomalies.is_empty());
        assert_eq!(ledger.total_calls(), 0);
        assert_eq!(ledger.report().notes.len(), 1);
    }

    #[tokio::test]
    async fn test_correct_verdicts_emit_nothing() {
        let good = r#"[{"shipment_id":"SHP-1","hs_code":"61091000","product":"Cotton T-Shirts Export Quality","is_correct":true,"reason":"matches","correct_hs_chapter":"61"}]"#;
        let shipments = vec![Shipment::new("SHP-1", 2000, 4.5, 9000.0)];
        let mut ledger = UsageLedger::new("google", "gemini-1.5-flash");
        let anomalies =
            validate_hs_codes(&shipments, &Canned(good), "gemini-1.5-flash", &mut ledger).await;
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_field_level_extraction_fallback() {
        // broken JSON (trailing comma) forces the regex path
        let broken = r#"[{"shipment_id":"SHP-9","hs_code":"61091000","product":"Laptops","is_correct":false,"reason":"wrong chapter","correct_hs_chapter":"8471",}]"#;
        let verdicts = parse_verdicts(broken);
        assert_eq!(verdicts.len(), 1);
        assert!(!verdicts[0].is_correct);
        assert_eq!(verdicts[0].hs_code, "61091000");
        assert_eq!(verdicts[0].correct_hs_chapter.as_deref(), Some("8471"));
    }

    #[tokio::test]
    async fn test_summary_placeholder_on_failure() {
        let mut ledger = UsageLedger::new("google", "gemini-1.5-flash");
        let summary = generate_executive_summary(250, &[], &Failing, &mut ledger).await;
        assert!(summary.contains("LLM unavailable"));
    }
}
