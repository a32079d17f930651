use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub stock_code: String,
    pub case_barcode: Option<String>,
    pub unit_barcode: Option<String>,
    pub description: String,
    pub units_per_case: Option<i32>,
    pub cases_per_layer: Option<i32>,
    pub layers_per_pallet: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Current packaging ratios, with unconfigured values defaulted to 1.
    pub fn packaging(&self) -> PackagingRatios {
        PackagingRatios::new(
            self.units_per_case.map(i64::from),
            self.cases_per_layer.map(i64::from),
            self.layers_per_pallet.map(i64::from),
        )
    }
}

/// Units-per-case, cases-per-layer and layers-per-pallet for one product.
///
/// Every ratio is at least 1, so a nonzero tier quantity can never collapse
/// to zero units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingRatios {
    pub units_per_case: i64,
    pub cases_per_layer: i64,
    pub layers_per_pallet: i64,
}

impl PackagingRatios {
    pub fn new(
        units_per_case: Option<i64>,
        cases_per_layer: Option<i64>,
        layers_per_pallet: Option<i64>,
    ) -> Self {
        let coerce = |ratio: Option<i64>| ratio.unwrap_or(1).max(1);
        Self {
            units_per_case: coerce(units_per_case),
            cases_per_layer: coerce(cases_per_layer),
            layers_per_pallet: coerce(layers_per_pallet),
        }
    }
}

impl Default for PackagingRatios {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

/// One way of identifying a product on a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductIdentifier {
    StockCode(String),
    CaseBarcode(String),
    UnitBarcode(String),
}

impl ProductIdentifier {
    pub fn value(&self) -> &str {
        match self {
            ProductIdentifier::StockCode(v)
            | ProductIdentifier::CaseBarcode(v)
            | ProductIdentifier::UnitBarcode(v) => v,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProductIdentifier::StockCode(_) => "stock_code",
            ProductIdentifier::CaseBarcode(_) => "case_barcode",
            ProductIdentifier::UnitBarcode(_) => "unit_barcode",
        }
    }
}

/// The identifiers supplied with a submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductLookup {
    pub stock_code: Option<String>,
    pub case_barcode: Option<String>,
    pub unit_barcode: Option<String>,
}

impl ProductLookup {
    /// Supplied identifiers in lookup priority order: stock code, case
    /// barcode, unit barcode. Blank values are skipped.
    pub fn candidates(&self) -> Vec<ProductIdentifier> {
        let clean = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let mut candidates = Vec::new();
        if let Some(v) = clean(&self.stock_code) {
            candidates.push(ProductIdentifier::StockCode(v));
        }
        if let Some(v) = clean(&self.case_barcode) {
            candidates.push(ProductIdentifier::CaseBarcode(v));
        }
        if let Some(v) = clean(&self.unit_barcode) {
            candidates.push(ProductIdentifier::UnitBarcode(v));
        }
        candidates
    }
}
