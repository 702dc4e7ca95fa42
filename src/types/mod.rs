//! Type definitions for the trade anomaly pipeline

pub mod anomaly;
pub mod reference;
pub mod shipment;

pub use anomaly::{Anomaly, Category, Evidence, EvidenceValue, Layer, PlantedAnomaly, Severity};
pub use reference::{Buyer, Product, ReferenceData, Route};
pub use shipment::{CustomsStatus, Incoterm, PaymentStatus, Shipment};
