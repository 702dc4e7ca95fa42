//! Static reference tables the detectors judge shipments against

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Product catalog entry with expected price baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub product_description: String,
    pub hs_code: String,
    pub price_range_min: f64,
    pub price_range_max: f64,
    pub drawback_rate_pct: f64,
    #[serde(default)]
    pub restricted_countries: String,
}

/// Buyer registry entry with payment and volume baselines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Buyer {
    pub buyer_name: String,
    pub buyer_country: String,
    pub avg_order_value_usd: f64,
    pub avg_payment_days: f64,
    /// Credit rating: "A" (strong) / "B" / "C" (weak)
    pub credit_rating: String,
    pub total_shipments_historical: u64,
}

/// Route registry entry with transit and freight baselines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub port_of_loading: String,
    pub port_of_discharge: String,
    pub avg_transit_days: f64,
    pub transit_range_min: u32,
    pub transit_range_max: u32,
    pub avg_freight_20ft_usd: f64,
    pub avg_freight_40ft_usd: f64,
    pub avg_freight_40hc_usd: f64,
}

/// All reference tables indexed for lookup. Read-only during detection.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    products: HashMap<String, Product>,
    buyers: HashMap<String, Buyer>,
    routes: HashMap<(String, String), Route>,
}

impl ReferenceData {
    pub fn new(products: Vec<Product>, buyers: Vec<Buyer>, routes: Vec<Route>) -> Self {
        Self {
            products: products
                .into_iter()
                .map(|p| (p.product_description.clone(), p))
                .collect(),
            buyers: buyers
                .into_iter()
                .map(|b| (b.buyer_name.clone(), b))
                .collect(),
            routes: routes
                .into_iter()
                .map(|r| {
                    (
                        (r.port_of_loading.clone(), r.port_of_discharge.clone()),
                        r,
                    )
                })
                .collect(),
        }
    }

    /// Look up a product by its catalog description
    pub fn product(&self, description: &str) -> Option<&Product> {
        self.products.get(description)
    }

    /// Look up a buyer by name
    pub fn buyer(&self, name: &str) -> Option<&Buyer> {
        self.buyers.get(name)
    }

    /// Look up a route by (port of loading, port of discharge)
    pub fn route(&self, pol: &str, pod: &str) -> Option<&Route> {
        self.routes.get(&(pol.to_string(), pod.to_string()))
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    pub fn buyer_count(&self) -> usize {
        self.buyers.len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}
