//! Shipment data structures for trade anomaly detection

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Customs clearance status of a shipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomsStatus {
    Approved,
    Rejected,
    Pending,
}

/// Payment collection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Received,
    Partial,
    Pending,
    Overdue,
}

/// Delivery term governing who pays freight and insurance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Incoterm {
    /// Free On Board — buyer pays destination freight
    Fob,
    /// Cost, Insurance, Freight — seller pays freight and insurance
    Cif,
    /// Ex Works
    Exw,
    /// Cost and Freight
    Cfr,
}

/// Represents one export transaction to be analyzed for anomalies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    /// Unique shipment identifier (e.g. SHP-2025-0034)
    pub shipment_id: String,

    /// Shipment date
    pub date: NaiveDate,

    /// Buyer name
    pub buyer_name: String,

    /// Buyer country
    pub buyer_country: String,

    /// Product description
    pub product_description: String,

    /// Harmonized tariff classification code
    pub hs_code: String,

    /// Quantity in units
    pub quantity: u64,

    /// Unit price in USD
    pub unit_price_usd: f64,

    /// Total declared FOB value in USD (expected = quantity × unit price)
    pub total_fob_usd: f64,

    /// Invoice currency
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Freight cost in USD
    pub freight_cost_usd: f64,

    /// Insurance cost in USD
    pub insurance_usd: f64,

    /// Delivery term
    pub incoterm: Incoterm,

    /// Port of loading (UN/LOCODE)
    pub port_of_loading: String,

    /// Port of discharge (UN/LOCODE)
    pub port_of_discharge: String,

    /// Shipping line
    #[serde(default)]
    pub shipping_line: String,

    /// Container type (20ft, 40ft, 40ft HC)
    pub container_type: String,

    /// Actual transit time in days
    pub transit_days: u32,

    /// Vessel name
    #[serde(default)]
    pub vessel_name: String,

    /// Customs clearance status
    pub customs_status: CustomsStatus,

    /// Duty drawback rate as percent of FOB
    pub drawback_rate_pct: f64,

    /// Duty drawback amount claimed in USD
    pub drawback_amount_usd: f64,

    /// Payment terms (e.g. "LC 60 days")
    #[serde(default)]
    pub payment_terms: String,

    /// Payment collection status
    pub payment_status: PaymentStatus,

    /// Days from shipment to payment; None while unpaid
    pub days_to_payment: Option<f64>,

    /// Freight forwarder
    #[serde(default)]
    pub freight_forwarder: String,

    /// Customs house agent (clearing agent)
    #[serde(default)]
    pub cha_name: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Shipment {
    /// Create a shipment with required fields (remaining fields defaulted).
    /// Intended for tests and fixtures.
    pub fn new(shipment_id: &str, quantity: u64, unit_price_usd: f64, total_fob_usd: f64) -> Self {
        Self {
            shipment_id: shipment_id.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            buyer_name: "Global Mart Inc".to_string(),
            buyer_country: "USA".to_string(),
            product_description: "Cotton T-Shirts Export Quality".to_string(),
            hs_code: "61091000".to_string(),
            quantity,
            unit_price_usd,
            total_fob_usd,
            currency: default_currency(),
            freight_cost_usd: 1400.0,
            insurance_usd: total_fob_usd * 0.002,
            incoterm: Incoterm::Fob,
            port_of_loading: "INMUN1".to_string(),
            port_of_discharge: "USLAX".to_string(),
            shipping_line: "Maersk".to_string(),
            container_type: "40ft".to_string(),
            transit_days: 28,
            vessel_name: "Maersk Taurus".to_string(),
            customs_status: CustomsStatus::Approved,
            drawback_rate_pct: 2.0,
            drawback_amount_usd: total_fob_usd * 0.02,
            payment_terms: "LC 60 days".to_string(),
            payment_status: PaymentStatus::Received,
            days_to_payment: Some(38.0),
            freight_forwarder: "DHL Global".to_string(),
            cha_name: "ABC Customs".to_string(),
        }
    }

    /// Year-month bucket used by the monthly volume scans (e.g. "2025-10")
    pub fn year_month(&self) -> String {
        self.date.format("%Y-%m").to_string()
    }
}
