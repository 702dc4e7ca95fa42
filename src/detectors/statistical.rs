//! Layer 2: statistical anomaly detection.
//!
//! Six grouped Z-score scans plus two context-aware heuristics (payment
//! trend deterioration, smart volume spikes). Groups below the minimum
//! size are skipped silently: no valid Z-score exists for them.
//!
//! Group iteration uses BTreeMap so anomaly ids are stable across runs.

use crate::config::{DetectionConfig, VolumeConfig};
use crate::stats::{mean, percentile, sample_std, zscores};
use crate::types::anomaly::{evidence_from, AnomalyIdSeq};
use crate::types::{Anomaly, Category, Layer, ReferenceData, Severity, Shipment};
use std::collections::BTreeMap;
use tracing::info;

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// First `n` characters of a name, used in synthetic aggregate keys
fn key_prefix(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Run all statistical scans and both heuristics.
pub fn run_statistical_checks(
    shipments: &[Shipment],
    references: &ReferenceData,
    detection: &DetectionConfig,
    volume: &VolumeConfig,
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    let mut stat_ids = AnomalyIdSeq::new("STAT");
    scan_price_outliers(shipments, references, detection, &mut stat_ids, &mut anomalies);
    scan_transit_outliers(shipments, detection, &mut stat_ids, &mut anomalies);
    scan_freight_outliers(shipments, detection, &mut stat_ids, &mut anomalies);
    scan_payment_delays(shipments, references, detection, &mut stat_ids, &mut anomalies);
    scan_buyer_volume_spikes(shipments, detection, &mut stat_ids, &mut anomalies);
    scan_country_volume_spikes(shipments, detection, &mut stat_ids, &mut anomalies);
    info!(count = anomalies.len(), "Statistical layer complete");

    let trend = detect_payment_trend(shipments, references, detection);
    info!(count = trend.len(), "Trend analysis complete");
    anomalies.extend(trend);

    let smart = detect_volume_spikes_smart(shipments, volume);
    info!(count = smart.len(), "Smart volume analysis complete");
    anomalies.extend(smart);

    anomalies
}

fn group_by<'a, K: Ord>(
    shipments: &'a [Shipment],
    key: impl Fn(&Shipment) -> K,
) -> BTreeMap<K, Vec<&'a Shipment>> {
    let mut groups: BTreeMap<K, Vec<&Shipment>> = BTreeMap::new();
    for s in shipments {
        groups.entry(key(s)).or_default().push(s);
    }
    groups
}

/// STAT-1: unit price outliers per product
fn scan_price_outliers(
    shipments: &[Shipment],
    references: &ReferenceData,
    config: &DetectionConfig,
    ids: &mut AnomalyIdSeq,
    out: &mut Vec<Anomaly>,
) {
    let method = format!("Z-score (threshold={})", config.z_threshold);
    for (product, group) in group_by(shipments, |s| s.product_description.clone()) {
        if group.len() < config.min_group_size {
            continue;
        }
        let prices: Vec<f64> = group.iter().map(|s| s.unit_price_usd).collect();
        let group_mean = mean(&prices);
        let group_std = sample_std(&prices);
        let catalog_range = references
            .product(&product)
            .map(|p| format!("${} - ${}", p.price_range_min, p.price_range_max))
            .unwrap_or_else(|| "$? - $?".to_string());

        for (s, z) in group.iter().zip(zscores(&prices)) {
            if z.abs() <= config.z_threshold {
                continue;
            }
            let direction = if z > 0.0 { "HIGH" } else { "LOW" };
            out.push(Anomaly::new(
                ids.next_id(),
                Layer::Statistical,
                s.shipment_id.clone(),
                Category::Pricing,
                "price_outlier",
                format!(
                    "{}: unit_price ${:.2} is {:.1}σ {} from mean ${:.2}.",
                    product,
                    s.unit_price_usd,
                    z.abs(),
                    direction,
                    group_mean
                ),
                evidence_from(vec![
                    ("unit_price", s.unit_price_usd.into()),
                    ("product_mean", round2(group_mean).into()),
                    ("product_std", round2(group_std).into()),
                    ("z_score", round2(z).into()),
                    ("catalog_range", catalog_range.clone().into()),
                    ("buyer", s.buyer_name.as_str().into()),
                ]),
                if z.abs() > 4.0 {
                    Severity::Critical
                } else {
                    Severity::High
                },
                format!(
                    "Review pricing with {}. Check for under/over-invoicing.",
                    s.buyer_name
                ),
                // under-invoicing carries the larger exposure
                if direction == "LOW" { 8000.0 } else { 2000.0 },
                &method,
            ));
        }
    }
}

/// STAT-2: transit time outliers per route
fn scan_transit_outliers(
    shipments: &[Shipment],
    config: &DetectionConfig,
    ids: &mut AnomalyIdSeq,
    out: &mut Vec<Anomaly>,
) {
    let method = format!("Z-score (threshold={})", config.z_threshold);
    for ((pol, pod), group) in group_by(shipments, |s| {
        (s.port_of_loading.clone(), s.port_of_discharge.clone())
    }) {
        if group.len() < config.min_group_size {
            continue;
        }
        let days: Vec<f64> = group.iter().map(|s| s.transit_days as f64).collect();
        let route_mean = mean(&days);
        let route_std = sample_std(&days);

        for (s, z) in group.iter().zip(zscores(&days)) {
            if z.abs() <= config.z_threshold {
                continue;
            }
            out.push(Anomaly::new(
                ids.next_id(),
                Layer::Statistical,
                s.shipment_id.clone(),
                Category::RouteLogistics,
                "transit_days_outlier",
                format!(
                    "Route {}→{}: transit {} days is {:.1}σ from route mean {:.0} days.",
                    pol,
                    pod,
                    s.transit_days,
                    z.abs(),
                    route_mean
                ),
                evidence_from(vec![
                    ("transit_days", s.transit_days.into()),
                    ("route_mean", round1(route_mean).into()),
                    ("route_std", round1(route_std).into()),
                    ("z_score", round2(z).into()),
                    ("route", format!("{} → {}", pol, pod).into()),
                ]),
                if z.abs() > 4.0 {
                    Severity::High
                } else {
                    Severity::Medium
                },
                "Contact freight forwarder. Verify vessel tracking. Check for detention/demurrage."
                    .to_string(),
                3000.0,
                &method,
            ));
        }
    }
}

/// STAT-3: freight cost outliers per route and container type.
/// Zero-freight rows are excluded before grouping (they are the CIF rule
/// check's business, not a statistical signal).
fn scan_freight_outliers(
    shipments: &[Shipment],
    config: &DetectionConfig,
    ids: &mut AnomalyIdSeq,
    out: &mut Vec<Anomaly>,
) {
    let method = format!("Z-score (threshold={})", config.z_threshold);
    for ((pol, pod, ctype), group) in group_by(shipments, |s| {
        (
            s.port_of_loading.clone(),
            s.port_of_discharge.clone(),
            s.container_type.clone(),
        )
    }) {
        if group.len() < config.min_group_size {
            continue;
        }
        let valid: Vec<&&Shipment> = group.iter().filter(|s| s.freight_cost_usd > 0.0).collect();
        if valid.len() < config.min_group_size {
            continue;
        }
        let costs: Vec<f64> = valid.iter().map(|s| s.freight_cost_usd).collect();
        let route_avg = mean(&costs);
        let route_std = sample_std(&costs);

        for (s, z) in valid.iter().zip(zscores(&costs)) {
            if z.abs() <= config.z_threshold {
                continue;
            }
            let direction = if z > 0.0 { "HIGH" } else { "LOW" };
            out.push(Anomaly::new(
                ids.next_id(),
                Layer::Statistical,
                s.shipment_id.clone(),
                Category::RouteLogistics,
                "freight_cost_outlier",
                format!(
                    "Freight cost ${:.0} for {}→{} ({}) is {:.1}σ {} from route avg ${:.0}.",
                    s.freight_cost_usd,
                    pol,
                    pod,
                    ctype,
                    z.abs(),
                    direction,
                    route_avg
                ),
                evidence_from(vec![
                    ("freight_cost", s.freight_cost_usd.into()),
                    ("route_avg_freight", round2(route_avg).into()),
                    ("route_std", round2(route_std).into()),
                    ("z_score", round2(z).into()),
                    ("route", format!("{} → {}", pol, pod).into()),
                    ("container_type", ctype.as_str().into()),
                ]),
                if z > 3.0 {
                    Severity::High
                } else {
                    Severity::Medium
                },
                "Verify with freight forwarder. Get 2 competitive quotes. Check for kickback arrangements."
                    .to_string(),
                if direction == "HIGH" { 5000.0 } else { 0.0 },
                &method,
            ));
        }
    }
}

/// STAT-4: payment delays per buyer with credit-rating-dependent thresholds.
/// A pure Z-score trigger is too noisy for reliable buyers, so the delay
/// must also exceed the buyer's historical average by a fixed buffer.
fn scan_payment_delays(
    shipments: &[Shipment],
    references: &ReferenceData,
    config: &DetectionConfig,
    ids: &mut AnomalyIdSeq,
    out: &mut Vec<Anomaly>,
) {
    let method = format!("Z-score (threshold={})", config.z_threshold);
    let paid: Vec<&Shipment> = shipments
        .iter()
        .filter(|s| s.days_to_payment.is_some())
        .collect();

    let mut groups: BTreeMap<String, Vec<&Shipment>> = BTreeMap::new();
    for s in paid {
        groups.entry(s.buyer_name.clone()).or_default().push(s);
    }

    for (buyer, group) in groups {
        if group.len() < config.min_group_size {
            continue;
        }
        let days: Vec<f64> = group.iter().map(|s| s.days_to_payment.unwrap()).collect();
        let buyer_info = references.buyer(&buyer);
        let historical_avg = buyer_info
            .map(|b| b.avg_payment_days)
            .unwrap_or_else(|| mean(&days));
        let credit_rating = buyer_info
            .map(|b| b.credit_rating.clone())
            .unwrap_or_else(|| "B".to_string());
        let rating_threshold = config
            .credit_rating_thresholds
            .get(&credit_rating)
            .copied()
            .unwrap_or(2.5);

        for (s, z) in group.iter().zip(zscores(&days)) {
            if z.abs() <= config.z_threshold {
                continue;
            }
            let days_to_payment = s.days_to_payment.unwrap();
            let days_above_avg = days_to_payment - historical_avg;

            if z > rating_threshold && days_above_avg > config.payment_delay_buffer_days {
                out.push(Anomaly::new(
                    ids.next_id(),
                    Layer::Statistical,
                    s.shipment_id.clone(),
                    Category::Payment,
                    "payment_delay",
                    format!(
                        "{} (Rating: {}) paid in {:.0} days — {:.0} days above their avg of {:.0}. \
                         Pattern suggests working capital stress.",
                        buyer, credit_rating, days_to_payment, days_above_avg, historical_avg
                    ),
                    evidence_from(vec![
                        ("days_to_payment", days_to_payment.into()),
                        ("buyer_historical_avg", historical_avg.into()),
                        ("days_above_avg", days_above_avg.into()),
                        ("z_score", round2(z).into()),
                        ("buyer", buyer.as_str().into()),
                        ("credit_rating", credit_rating.as_str().into()),
                        ("threshold_applied", rating_threshold.into()),
                    ]),
                    if credit_rating == "B" || credit_rating == "C" {
                        Severity::High
                    } else {
                        Severity::Medium
                    },
                    format!(
                        "Flag {} (Rating {}) for credit review. Monitor next 2-3 shipments for trend.",
                        buyer, credit_rating
                    ),
                    if credit_rating == "A" { 2000.0 } else { 3000.0 },
                    &method,
                ));
            }
        }
    }
}

/// STAT-5: buyer monthly volume spikes. Only positive-direction outliers
/// are a compliance signal; a quiet month is not flagged.
fn scan_buyer_volume_spikes(
    shipments: &[Shipment],
    config: &DetectionConfig,
    ids: &mut AnomalyIdSeq,
    out: &mut Vec<Anomaly>,
) {
    let method = format!("Z-score (threshold={})", config.z_threshold);
    let mut monthly: BTreeMap<(String, String), f64> = BTreeMap::new();
    for s in shipments {
        *monthly
            .entry((s.buyer_name.clone(), s.year_month()))
            .or_default() += s.total_fob_usd;
    }

    let mut per_buyer: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
    for ((buyer, month), total) in monthly {
        per_buyer.entry(buyer).or_default().push((month, total));
    }

    for (buyer, months) in per_buyer {
        if months.len() < config.min_group_size {
            continue;
        }
        let totals: Vec<f64> = months.iter().map(|(_, t)| *t).collect();
        let avg = mean(&totals);
        for ((month, total), z) in months.iter().zip(zscores(&totals)) {
            if z <= config.z_threshold {
                continue;
            }
            out.push(Anomaly::new(
                ids.next_id(),
                Layer::Statistical,
                format!("MULTI-{}", key_prefix(&buyer, 10)),
                Category::Volume,
                "buyer_volume_spike",
                format!(
                    "{} in {}: ${:.0} FOB — {:.1}σ above their monthly average.",
                    buyer, month, total, z
                ),
                evidence_from(vec![
                    ("buyer", buyer.as_str().into()),
                    ("month", month.as_str().into()),
                    ("month_fob", (*total).into()),
                    ("buyer_avg_monthly", round2(avg).into()),
                    ("z_score", round2(z).into()),
                ]),
                if z > 4.0 {
                    Severity::Critical
                } else {
                    Severity::High
                },
                format!(
                    "Request end-user certificate from {}. Verify business justification.",
                    buyer
                ),
                10000.0,
                &method,
            ));
        }
    }
}

/// STAT-6: country monthly volume spikes
fn scan_country_volume_spikes(
    shipments: &[Shipment],
    config: &DetectionConfig,
    ids: &mut AnomalyIdSeq,
    out: &mut Vec<Anomaly>,
) {
    let method = format!("Z-score (threshold={})", config.z_threshold);
    let mut monthly: BTreeMap<(String, String), f64> = BTreeMap::new();
    for s in shipments {
        *monthly
            .entry((s.buyer_country.clone(), s.year_month()))
            .or_default() += s.total_fob_usd;
    }

    let mut per_country: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
    for ((country, month), total) in monthly {
        per_country.entry(country).or_default().push((month, total));
    }

    for (country, months) in per_country {
        if months.len() < config.min_group_size {
            continue;
        }
        let totals: Vec<f64> = months.iter().map(|(_, t)| *t).collect();
        let avg = mean(&totals);
        for ((month, total), z) in months.iter().zip(zscores(&totals)) {
            if z <= config.z_threshold {
                continue;
            }
            out.push(Anomaly::new(
                ids.next_id(),
                Layer::Statistical,
                format!("CTRY-{}-{}", key_prefix(&country, 5), month),
                Category::Volume,
                "country_volume_spike",
                format!(
                    "Exports to {} in {}: ${:.0} — {:.1}σ above monthly average.",
                    country, month, total, z
                ),
                evidence_from(vec![
                    ("country", country.as_str().into()),
                    ("month", month.as_str().into()),
                    ("month_fob", (*total).into()),
                    ("country_avg_monthly", round2(avg).into()),
                    ("z_score", round2(z).into()),
                ]),
                Severity::High,
                format!(
                    "Review all {} shipments in this month. Check for re-export patterns.",
                    country
                ),
                5000.0,
                &method,
            ));
        }
    }
}

/// Trend heuristic: is a buyer's payment behavior deteriorating?
///
/// Flags only sustained slowdown, never a single late payment. All three
/// gates must pass: recent window mean at least `trend_min_slowdown_days`
/// above the prior mean, slowdown above `trend_min_slowdown_pct` of the
/// buyer's baseline, and the recent mean past `trend_baseline_multiplier`
/// times the baseline.
pub fn detect_payment_trend(
    shipments: &[Shipment],
    references: &ReferenceData,
    config: &DetectionConfig,
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    let mut ids = AnomalyIdSeq::new("TREND");
    let window = config.trend_window;

    let mut paid: Vec<&Shipment> = shipments
        .iter()
        .filter(|s| s.days_to_payment.is_some())
        .collect();
    paid.sort_by_key(|s| s.date);

    let mut groups: BTreeMap<String, Vec<&Shipment>> = BTreeMap::new();
    for s in paid {
        groups.entry(s.buyer_name.clone()).or_default().push(s);
    }

    for (buyer, group) in groups {
        if group.len() < window {
            continue;
        }
        let days: Vec<f64> = group.iter().map(|s| s.days_to_payment.unwrap()).collect();
        let buyer_info = references.buyer(&buyer);
        let historical_avg = buyer_info
            .map(|b| b.avg_payment_days)
            .unwrap_or_else(|| mean(&days));
        let credit_rating = buyer_info
            .map(|b| b.credit_rating.clone())
            .unwrap_or_else(|| "N/A".to_string());

        let recent_avg = mean(&days[days.len() - window..]);
        let older = &days[..days.len() - window];
        let older_avg = if older.is_empty() {
            historical_avg
        } else {
            mean(older)
        };

        let slowdown = recent_avg - older_avg;
        let slowdown_pct = if historical_avg > 0.0 {
            slowdown / historical_avg * 100.0
        } else {
            0.0
        };

        if slowdown >= config.trend_min_slowdown_days
            && slowdown_pct > config.trend_min_slowdown_pct
            && recent_avg > historical_avg * config.trend_baseline_multiplier
        {
            anomalies.push(Anomaly::new(
                ids.next_id(),
                Layer::Trend,
                format!("MULTI-{}", key_prefix(&buyer, 10)),
                Category::Payment,
                "payment_deterioration_trend",
                format!(
                    "{}: Payment behavior DETERIORATING. Last {} shipments avg {:.0} days vs \
                     historical {:.0} days (+{:.0}% slower).",
                    buyer, window, recent_avg, historical_avg, slowdown_pct
                ),
                evidence_from(vec![
                    ("buyer", buyer.as_str().into()),
                    ("historical_avg_days", historical_avg.into()),
                    ("recent_avg_days", round1(recent_avg).into()),
                    ("trend_slowdown_days", round1(slowdown).into()),
                    ("trend_slowdown_pct", round1(slowdown_pct).into()),
                    ("window_shipments", (window as u64).into()),
                    ("credit_rating", credit_rating.as_str().into()),
                ]),
                if credit_rating == "C" {
                    Severity::Critical
                } else {
                    Severity::High
                },
                format!(
                    "URGENT: {} showing deteriorating payment pattern. Recommend: (1) Reduce credit \
                     terms to LC instead of Open Account, (2) Reduce shipment sizes, (3) Request \
                     payment guarantee.",
                    buyer
                ),
                5000.0,
                "Trend analysis: recent payment pattern vs historical",
            ));
        }
    }

    anomalies
}

/// Smart volume heuristic: a single order far outside the buyer's own
/// history. The second branch lets lower-magnitude spikes trigger when the
/// product carries re-export/sanctions exposure.
pub fn detect_volume_spikes_smart(shipments: &[Shipment], config: &VolumeConfig) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    let mut ids = AnomalyIdSeq::new("VOL");

    let mut buyer_fobs: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for s in shipments {
        buyer_fobs
            .entry(s.buyer_name.as_str())
            .or_default()
            .push(s.total_fob_usd);
    }

    for s in shipments {
        let orders = &buyer_fobs[s.buyer_name.as_str()];
        let buyer_avg = mean(orders);
        let buyer_max = percentile(orders, 0.95);
        let spike_ratio = if buyer_avg > 0.0 {
            s.total_fob_usd / buyer_avg
        } else {
            1.0
        };
        let risk_factor = config
            .risk_factors
            .get(&s.product_description)
            .copied()
            .unwrap_or(1);

        let ratio_branch =
            spike_ratio > config.spike_ratio && s.total_fob_usd > config.value_floor_usd;
        let risk_branch = risk_factor >= 3 && spike_ratio > config.high_risk_ratio;
        if !(ratio_branch || risk_branch) {
            continue;
        }

        anomalies.push(Anomaly::new(
            ids.next_id(),
            Layer::Statistical,
            s.shipment_id.clone(),
            Category::Volume,
            "suspicious_large_order",
            format!(
                "{} ({}): Order of ${:.0} ({} units) is {:.1}x their average. Product: {} (risk=HIGH).",
                s.buyer_name,
                s.buyer_country,
                s.total_fob_usd,
                s.quantity,
                spike_ratio,
                s.product_description
            ),
            evidence_from(vec![
                ("buyer", s.buyer_name.as_str().into()),
                ("buyer_country", s.buyer_country.as_str().into()),
                ("order_value", s.total_fob_usd.into()),
                ("buyer_typical_avg", buyer_avg.round().into()),
                ("buyer_typical_max", buyer_max.round().into()),
                ("spike_ratio", round1(spike_ratio).into()),
                ("quantity", s.quantity.into()),
                ("product", s.product_description.as_str().into()),
                ("risk_factor", (risk_factor as u64).into()),
            ]),
            Severity::Critical,
            format!(
                "URGENT: Request end-use certificate from {}. Verify final destination (not \
                 re-export). Consider: (1) Reducing order size, (2) Requesting advance payment, \
                 (3) Checking for sanctions on buyer.",
                s.buyer_name
            ),
            20000.0,
            "Volume spike + product risk analysis",
        ));
    }

    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::types::{Buyer, EvidenceValue};
    use chrono::NaiveDate;

    fn detection() -> DetectionConfig {
        AppConfig::default().detection
    }

    fn volume() -> VolumeConfig {
        AppConfig::default().volume
    }

    fn buyer(name: &str, rating: &str, avg_payment_days: f64) -> Buyer {
        Buyer {
            buyer_name: name.to_string(),
            buyer_country: "Germany".to_string(),
            avg_order_value_usd: 48000.0,
            avg_payment_days,
            credit_rating: rating.to_string(),
            total_shipments_historical: 185,
        }
    }

    fn priced_shipment(id: &str, price: f64) -> Shipment {
        Shipment::new(id, 1000, price, 1000.0 * price)
    }

    #[test]
    fn test_price_outlier_needs_minimum_group() {
        // two shipments: below the minimum group size, never flagged
        let shipments = vec![priced_shipment("SHP-1", 4.0), priced_shipment("SHP-2", 400.0)];
        let anomalies = run_statistical_checks(
            &shipments,
            &ReferenceData::default(),
            &detection(),
            &volume(),
        );
        assert!(anomalies.iter().all(|a| a.sub_type != "price_outlier"));
    }

    #[test]
    fn test_price_outlier_fires_above_threshold() {
        // ten at $4.50 ± small jitter, one at $45: a clear outlier
        let mut shipments: Vec<Shipment> = (0..10)
            .map(|i| priced_shipment(&format!("SHP-{:02}", i), 4.3 + 0.05 * i as f64))
            .collect();
        shipments.push(priced_shipment("SHP-HOT", 45.0));

        let anomalies = run_statistical_checks(
            &shipments,
            &ReferenceData::default(),
            &detection(),
            &volume(),
        );
        let hits: Vec<_> = anomalies
            .iter()
            .filter(|a| a.sub_type == "price_outlier")
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].shipment_id, "SHP-HOT");
        assert_eq!(hits[0].layer, Layer::Statistical);
        // direction HIGH → lower penalty than under-invoicing
        assert_eq!(hits[0].estimated_penalty_usd, 2000.0);
    }

    #[test]
    fn test_zero_variance_group_emits_nothing() {
        let shipments: Vec<Shipment> = (0..5)
            .map(|i| priced_shipment(&format!("SHP-{}", i), 4.5))
            .collect();
        let anomalies = run_statistical_checks(
            &shipments,
            &ReferenceData::default(),
            &detection(),
            &volume(),
        );
        assert!(anomalies.iter().all(|a| a.sub_type != "price_outlier"));
    }

    #[test]
    fn test_freight_prefilter_excludes_zero_cost() {
        // two zero-freight rows leave only two valid rows: below minimum
        let mut shipments: Vec<Shipment> = (0..4)
            .map(|i| priced_shipment(&format!("SHP-{}", i), 4.5))
            .collect();
        shipments[0].freight_cost_usd = 0.0;
        shipments[1].freight_cost_usd = 0.0;
        shipments[2].freight_cost_usd = 1400.0;
        shipments[3].freight_cost_usd = 9000.0;

        let anomalies = run_statistical_checks(
            &shipments,
            &ReferenceData::default(),
            &detection(),
            &volume(),
        );
        assert!(anomalies
            .iter()
            .all(|a| a.sub_type != "freight_cost_outlier"));
    }

    #[test]
    fn test_payment_delay_respects_credit_rating_threshold() {
        // same payment pattern; z ≈ 2.98 for the late one, 33+ days over avg
        let build = |buyer_name: &str| -> Vec<Shipment> {
            let mut out = Vec::new();
            for (i, days) in [30.0, 31.0, 32.0, 30.0, 31.0, 29.0, 30.0, 31.0, 30.0, 95.0]
                .iter()
                .enumerate()
            {
                let mut s = priced_shipment(&format!("{}-{}", buyer_name, i), 4.5);
                s.buyer_name = buyer_name.to_string();
                s.days_to_payment = Some(*days);
                out.push(s);
            }
            out
        };

        // A-rated: threshold 4.5 suppresses the hit
        let refs_a = ReferenceData::new(vec![], vec![buyer("SAFE", "A", 31.0)], vec![]);
        let anomalies = run_statistical_checks(&build("SAFE"), &refs_a, &detection(), &volume());
        assert!(anomalies.iter().all(|a| a.sub_type != "payment_delay"));

        // C-rated: threshold 2.5 lets it through
        let refs_c = ReferenceData::new(vec![], vec![buyer("SHAKY", "C", 31.0)], vec![]);
        let anomalies = run_statistical_checks(&build("SHAKY"), &refs_c, &detection(), &volume());
        let hits: Vec<_> = anomalies
            .iter()
            .filter(|a| a.sub_type == "payment_delay")
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].severity, Severity::High);
        assert_eq!(hits[0].estimated_penalty_usd, 3000.0);
    }

    #[test]
    fn test_payment_delay_requires_absolute_buffer() {
        // tight cluster in days: a big z-score but only ~3 days over the
        // historical average must not fire
        let mut shipments = Vec::new();
        for (i, days) in [30.0, 30.1, 29.9, 30.0, 30.1, 29.9, 30.0, 30.1, 29.9, 33.0]
            .iter()
            .enumerate()
        {
            let mut s = priced_shipment(&format!("SHP-{}", i), 4.5);
            s.buyer_name = "TIGHT".to_string();
            s.days_to_payment = Some(*days);
            shipments.push(s);
        }
        let refs = ReferenceData::new(vec![], vec![buyer("TIGHT", "C", 30.0)], vec![]);
        let anomalies = run_statistical_checks(&shipments, &refs, &detection(), &volume());
        assert!(anomalies.iter().all(|a| a.sub_type != "payment_delay"));
    }

    fn monthly_series(monthly_fobs: &[f64]) -> Vec<Shipment> {
        let mut shipments = Vec::new();
        for (i, fob) in monthly_fobs.iter().enumerate() {
            let mut s = priced_shipment(&format!("SHP-{}", i), 4.5);
            s.date = NaiveDate::from_ymd_opt(2025, i as u32 + 1, 15).unwrap();
            s.total_fob_usd = *fob;
            s.buyer_name = "Gulf Distributors LLC".to_string();
            shipments.push(s);
        }
        shipments
    }

    #[test]
    fn test_buyer_volume_spike_fires_on_hot_month() {
        // eight months at $20K, September at $500K: z = 8/3 ≈ 2.67
        let mut fobs = vec![20000.0; 8];
        fobs.push(500000.0);
        let anomalies = run_statistical_checks(
            &monthly_series(&fobs),
            &ReferenceData::default(),
            &detection(),
            &volume(),
        );
        let hits: Vec<_> = anomalies
            .iter()
            .filter(|a| a.sub_type == "buyer_volume_spike")
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].shipment_id, "MULTI-Gulf Distr");
        assert_eq!(
            hits[0].evidence.get("month"),
            Some(&EvidenceValue::Text("2025-09".to_string()))
        );
    }

    #[test]
    fn test_buyer_volume_spike_positive_only() {
        // the mirror image: one quiet month, |z| ≈ 2.67 but negative
        let mut fobs = vec![500000.0; 8];
        fobs.push(20000.0);
        let anomalies = run_statistical_checks(
            &monthly_series(&fobs),
            &ReferenceData::default(),
            &detection(),
            &volume(),
        );
        assert!(anomalies
            .iter()
            .all(|a| a.sub_type != "buyer_volume_spike" && a.sub_type != "country_volume_spike"));
    }

    #[test]
    fn test_trend_deterioration_scenario() {
        // historical baseline 32 days; older shipments ~31, recent 3 avg 56:
        // slowdown 25 ≥ 14, 78% > 40%, 56 > 48 (= 1.5 × 32)
        let refs = ReferenceData::new(vec![], vec![buyer("Euro Trade GmbH", "A", 32.0)], vec![]);
        let mut shipments = Vec::new();
        let series = [30.0, 31.0, 32.0, 31.0, 30.0, 54.0, 56.0, 58.0];
        for (i, days) in series.iter().enumerate() {
            let mut s = priced_shipment(&format!("SHP-{}", i), 4.5);
            s.buyer_name = "Euro Trade GmbH".to_string();
            s.date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap() + chrono::Days::new(i as u64 * 7);
            s.days_to_payment = Some(*days);
            shipments.push(s);
        }

        let anomalies = detect_payment_trend(&shipments, &refs, &detection());
        assert_eq!(anomalies.len(), 1);
        let a = &anomalies[0];
        assert_eq!(a.sub_type, "payment_deterioration_trend");
        assert_eq!(a.layer, Layer::Trend);
        assert_eq!(a.shipment_id, "MULTI-Euro Trade"); // aggregate key, not a shipment
        assert_eq!(a.severity, Severity::High); // A-rated, not C
        assert_eq!(
            a.evidence.get("recent_avg_days"),
            Some(&EvidenceValue::Number(56.0))
        );
    }

    #[test]
    fn test_trend_single_late_payment_not_flagged() {
        // one slow payment inside an otherwise healthy series: the window
        // mean stays under every gate
        let refs = ReferenceData::new(vec![], vec![buyer("Euro Trade GmbH", "A", 32.0)], vec![]);
        let mut shipments = Vec::new();
        let series = [30.0, 31.0, 110.0, 31.0, 30.0, 32.0];
        for (i, days) in series.iter().enumerate() {
            let mut s = priced_shipment(&format!("SHP-{}", i), 4.5);
            s.buyer_name = "Euro Trade GmbH".to_string();
            s.date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap() + chrono::Days::new(i as u64 * 7);
            s.days_to_payment = Some(*days);
            shipments.push(s);
        }

        let anomalies = detect_payment_trend(&shipments, &refs, &detection());
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_smart_volume_ratio_branch() {
        // nine orders at $15K, one at $700K: 8.4x the buyer average (the
        // big order is included in its own average) and above the floor
        let mut shipments: Vec<Shipment> = (0..9)
            .map(|i| {
                let mut s = priced_shipment(&format!("SHP-{}", i), 4.5);
                s.buyer_name = "African Goods Co".to_string();
                s.total_fob_usd = 15000.0;
                s
            })
            .collect();
        let mut big = priced_shipment("SHP-BIG", 4.5);
        big.buyer_name = "African Goods Co".to_string();
        big.total_fob_usd = 700000.0;
        shipments.push(big);

        let anomalies = detect_volume_spikes_smart(&shipments, &volume());
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].shipment_id, "SHP-BIG");
        assert_eq!(anomalies[0].severity, Severity::Critical);
    }

    #[test]
    fn test_smart_volume_high_risk_product_branch() {
        // 5.1x the average is under the 8x general gate and the $100K floor,
        // but the product risk factor ≥ 3 lowers the ratio gate to 5x
        let mut shipments: Vec<Shipment> = (0..9)
            .map(|i| {
                let mut s = priced_shipment(&format!("SHP-{}", i), 1.2);
                s.buyer_name = "Gulf Distributors LLC".to_string();
                s.product_description = "Basmati Rice Premium Grade".to_string();
                s.total_fob_usd = 10000.0;
                s
            })
            .collect();
        let mut spike = priced_shipment("SHP-RICE", 1.2);
        spike.buyer_name = "Gulf Distributors LLC".to_string();
        spike.product_description = "Basmati Rice Premium Grade".to_string();
        spike.total_fob_usd = 95000.0;
        shipments.push(spike);

        let anomalies = detect_volume_spikes_smart(&shipments, &volume());
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].shipment_id, "SHP-RICE");

        // same magnitudes on a low-risk product stay silent
        for s in &mut shipments {
            s.product_description = "Cotton T-Shirts Export Quality".to_string();
        }
        assert!(detect_volume_spikes_smart(&shipments, &volume()).is_empty());
    }
}
