//! Dataset loading: shipments, reference tables, planted-anomaly manifest

use crate::types::{Buyer, PlantedAnomaly, Product, ReferenceData, Route, Shipment};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::info;

/// Frozen input for one pipeline run
#[derive(Debug, Clone)]
pub struct Dataset {
    pub shipments: Vec<Shipment>,
    pub references: ReferenceData,
}

fn read_csv<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Vec<T>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: T =
            record.with_context(|| format!("Malformed row in {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

impl Dataset {
    /// Load the shipment dataset and all three reference tables from a
    /// data directory.
    pub fn load_from_dir<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let dir = data_dir.as_ref();

        let shipments: Vec<Shipment> = read_csv(dir.join("shipments.csv"))?;
        anyhow::ensure!(!shipments.is_empty(), "shipments.csv contains no rows");

        let products: Vec<Product> = read_csv(dir.join("product_catalog.csv"))?;
        let buyers: Vec<Buyer> = read_csv(dir.join("buyers.csv"))?;
        let routes: Vec<Route> = read_csv(dir.join("routes.csv"))?;

        let references = ReferenceData::new(products, buyers, routes);

        info!(
            shipments = shipments.len(),
            products = references.product_count(),
            buyers = references.buyer_count(),
            routes = references.route_count(),
            "Dataset loaded"
        );

        Ok(Self {
            shipments,
            references,
        })
    }
}

/// Load the planted-anomaly manifest. A missing file is fatal for the
/// accuracy evaluator only; callers decide whether to degrade.
pub fn load_planted_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<PlantedAnomaly>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read planted manifest {}", path.display()))?;
    let planted: Vec<PlantedAnomaly> =
        serde_json::from_str(&raw).context("Malformed planted-anomaly manifest")?;
    Ok(planted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CustomsStatus, Incoterm, PaymentStatus};
    use std::io::Write;

    const SHIPMENT_HEADER: &str = "shipment_id,date,buyer_name,buyer_country,product_description,hs_code,quantity,unit_price_usd,total_fob_usd,currency,freight_cost_usd,insurance_usd,incoterm,port_of_loading,port_of_discharge,shipping_line,container_type,transit_days,vessel_name,customs_status,drawback_rate_pct,drawback_amount_usd,payment_terms,payment_status,days_to_payment,freight_forwarder,cha_name";

    #[test]
    fn test_parse_shipment_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipments.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "{}", SHIPMENT_HEADER).unwrap();
        writeln!(
            f,
            "SHP-2025-0034,2025-10-05,Global Mart Inc,USA,Cotton T-Shirts Export Quality,61091000,2000,4.50,10800.00,USD,1400.0,21.6,FOB,INMUN1,USLAX,Maersk,40ft,28,Maersk Taurus,approved,2.0,216.0,LC 60 days,received,38,DHL Global,ABC Customs"
        )
        .unwrap();
        writeln!(
            f,
            "SHP-2025-0199,2026-01-12,Euro Trade GmbH,Germany,Brake Pads Automotive,87083010,500,12.00,6000.00,USD,1800.0,12.0,CIF,INMUN1,DEHAM,MSC,20ft,25,MSC Aurora,rejected,3.0,0.0,LC 30 days,received,,Kuehne Nagel,XYZ Clearing"
        )
        .unwrap();

        let rows: Vec<Shipment> = read_csv(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].quantity, 2000);
        assert_eq!(rows[0].incoterm, Incoterm::Fob);
        assert_eq!(rows[0].days_to_payment, Some(38.0));
        assert_eq!(rows[1].customs_status, CustomsStatus::Rejected);
        assert_eq!(rows[1].payment_status, PaymentStatus::Received);
        assert_eq!(rows[1].days_to_payment, None); // empty field
    }

    #[test]
    fn test_planted_manifest_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("planted_anomalies.json");
        std::fs::write(
            &path,
            r#"[{"anomaly_id":"PLANTED-001","shipment_id":"SHP-2025-0034","category":"pricing","sub_type":"fob_math_error","description":"inflated FOB","estimated_penalty_usd":5000,"severity":"critical"}]"#,
        )
        .unwrap();

        let planted = load_planted_manifest(&path).unwrap();
        assert_eq!(planted.len(), 1);
        assert_eq!(planted[0].shipment_id, "SHP-2025-0034");
        assert!(planted[0].why_this_matters.is_empty());
    }

    #[test]
    fn test_missing_manifest_is_an_error() {
        assert!(load_planted_manifest("/nonexistent/planted.json").is_err());
    }
}
