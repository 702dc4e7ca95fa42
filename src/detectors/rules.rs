//! Layer 1: deterministic rule-based anomaly detection.
//!
//! No statistics, no external reasoning. Each check is an independent
//! arithmetic/logic test over a single shipment; a shipment can collect
//! several rule anomalies in one pass.

use crate::config::DetectionConfig;
use crate::types::anomaly::{evidence_from, AnomalyIdSeq};
use crate::types::{
    Anomaly, Category, CustomsStatus, EvidenceValue, Incoterm, Layer, PaymentStatus, Severity,
    Shipment,
};
use tracing::info;

const DETECTION_METHOD: &str = "Rule-based arithmetic/logic check";

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Run all rule-based checks. Pure function over the input; emission order
/// follows the input order, check by check.
pub fn run_rule_checks(shipments: &[Shipment], config: &DetectionConfig) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    let mut ids = AnomalyIdSeq::new("RULE");

    check_fob_consistency(shipments, config, &mut ids, &mut anomalies);
    check_drawback_on_rejected(shipments, &mut ids, &mut anomalies);
    check_received_null_days(shipments, &mut ids, &mut anomalies);
    check_cif_zero_freight(shipments, &mut ids, &mut anomalies);
    check_insurance_rate(shipments, config, &mut ids, &mut anomalies);

    info!(count = anomalies.len(), "Rule-based layer complete");
    anomalies
}

/// CHECK 1: declared FOB must equal quantity × unit price within tolerance
fn check_fob_consistency(
    shipments: &[Shipment],
    config: &DetectionConfig,
    ids: &mut AnomalyIdSeq,
    out: &mut Vec<Anomaly>,
) {
    for s in shipments {
        let expected = round2(s.quantity as f64 * s.unit_price_usd);
        let diff = (s.total_fob_usd - expected).abs();
        if diff > config.fob_tolerance_usd {
            out.push(Anomaly::new(
                ids.next_id(),
                Layer::RuleBased,
                s.shipment_id.clone(),
                Category::Pricing,
                "fob_math_error",
                format!(
                    "FOB mismatch: reported ${:.2} ≠ calculated ${:.2}",
                    s.total_fob_usd, expected
                ),
                evidence_from(vec![
                    ("reported_fob", s.total_fob_usd.into()),
                    ("quantity", s.quantity.into()),
                    ("unit_price", s.unit_price_usd.into()),
                    ("calculated_fob", expected.into()),
                    ("difference", diff.into()),
                ]),
                Severity::Critical,
                "Verify invoice with buyer. Correct FOB before drawback claim submission."
                    .to_string(),
                5000.0,
                DETECTION_METHOD,
            ));
        }
    }
}

/// CHECK 2: drawback claimed on a customs-rejected shipment
fn check_drawback_on_rejected(
    shipments: &[Shipment],
    ids: &mut AnomalyIdSeq,
    out: &mut Vec<Anomaly>,
) {
    for s in shipments {
        if s.customs_status == CustomsStatus::Rejected && s.drawback_amount_usd > 0.0 {
            out.push(Anomaly::new(
                ids.next_id(),
                Layer::RuleBased,
                s.shipment_id.clone(),
                Category::Compliance,
                "drawback_on_rejected",
                format!(
                    "Drawback of ${:.2} claimed but customs_status is REJECTED.",
                    s.drawback_amount_usd
                ),
                evidence_from(vec![
                    ("customs_status", "rejected".into()),
                    ("drawback_amount", s.drawback_amount_usd.into()),
                    ("drawback_rate_pct", s.drawback_rate_pct.into()),
                ]),
                Severity::Critical,
                "Reverse drawback claim immediately. File amendment with DGFT.".to_string(),
                s.drawback_amount_usd * 3.0,
                DETECTION_METHOD,
            ));
        }
    }
}

/// CHECK 3: payment marked received but days_to_payment is missing
fn check_received_null_days(
    shipments: &[Shipment],
    ids: &mut AnomalyIdSeq,
    out: &mut Vec<Anomaly>,
) {
    for s in shipments {
        if s.payment_status == PaymentStatus::Received && s.days_to_payment.is_none() {
            out.push(Anomaly::new(
                ids.next_id(),
                Layer::RuleBased,
                s.shipment_id.clone(),
                Category::Payment,
                "received_null_days",
                "Payment status = 'received' but days_to_payment is NULL. Contradictory record."
                    .to_string(),
                evidence_from(vec![
                    ("payment_status", "received".into()),
                    ("days_to_payment", EvidenceValue::Null),
                    ("buyer", s.buyer_name.as_str().into()),
                ]),
                Severity::Medium,
                "Investigate with accounts team. Update payment date in ERP.".to_string(),
                500.0,
                DETECTION_METHOD,
            ));
        }
    }
}

/// CHECK 4: CIF incoterm requires seller-paid freight
fn check_cif_zero_freight(
    shipments: &[Shipment],
    ids: &mut AnomalyIdSeq,
    out: &mut Vec<Anomaly>,
) {
    for s in shipments {
        if s.incoterm == Incoterm::Cif && s.freight_cost_usd == 0.0 {
            out.push(Anomaly::new(
                ids.next_id(),
                Layer::RuleBased,
                s.shipment_id.clone(),
                Category::CrossField,
                "cif_zero_freight",
                "Incoterm is CIF (seller pays freight+insurance) but freight_cost_usd = 0."
                    .to_string(),
                evidence_from(vec![
                    ("incoterm", "CIF".into()),
                    ("freight_cost_usd", s.freight_cost_usd.into()),
                    ("total_fob", s.total_fob_usd.into()),
                ]),
                Severity::High,
                "Check if freight was invoiced separately. Update freight_cost_usd or change incoterm."
                    .to_string(),
                2500.0,
                DETECTION_METHOD,
            ));
        }
    }
}

/// CHECK 5: insurance should run ~0.1%-0.4% of FOB; flag outside the band
fn check_insurance_rate(
    shipments: &[Shipment],
    config: &DetectionConfig,
    ids: &mut AnomalyIdSeq,
    out: &mut Vec<Anomaly>,
) {
    for s in shipments {
        if s.total_fob_usd <= 0.0 {
            continue;
        }
        let rate_pct = s.insurance_usd / s.total_fob_usd * 100.0;
        let overcharged = rate_pct > config.insurance_rate_max_pct;
        let suspiciously_low = rate_pct < config.insurance_rate_min_pct && s.insurance_usd > 0.0;
        if !overcharged && !suspiciously_low {
            continue;
        }
        let direction = if overcharged {
            "OVERCHARGED"
        } else {
            "SUSPICIOUSLY LOW"
        };
        out.push(Anomaly::new(
            ids.next_id(),
            Layer::RuleBased,
            s.shipment_id.clone(),
            Category::CrossField,
            "insurance_rate_error",
            format!(
                "Insurance rate = {:.3}% of FOB. Normal is 0.1-0.4%. {}.",
                rate_pct, direction
            ),
            evidence_from(vec![
                ("insurance_usd", s.insurance_usd.into()),
                ("total_fob_usd", s.total_fob_usd.into()),
                ("calculated_rate_pct", ((rate_pct * 10000.0).round() / 10000.0).into()),
                ("expected_range", "0.1% - 0.4%".into()),
            ]),
            if overcharged {
                Severity::Medium
            } else {
                Severity::Low
            },
            "Verify insurance policy. Standard marine cargo insurance = 0.1-0.3% of CIF value."
                .to_string(),
            500.0,
            DETECTION_METHOD,
        ));
    }
}
