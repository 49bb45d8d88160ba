//! Typed promo-product records.
//!
//! One `PromoProductRow` per line of the unified dataset, addressed by the
//! composite key `(promo_id, product_id)`. The shape is explicit and
//! validated at the parse boundary; fields that are legitimately absent in
//! the source (lift metrics require baseline data, dates can be unset) are
//! optional, everything else coerces to a value.

use chrono::NaiveDate;

use super::coerce;
use super::error::LoadError;

/// Composite key addressing one promo-product combination
pub type CompositeKey = (String, String);

/// One fully typed row of the unified promo-product dataset
#[derive(Debug, Clone, PartialEq)]
pub struct PromoProductRow {
    pub promo_id: String,
    pub product_id: String,
    pub promo_name: String,
    pub season_label: String,
    pub category: String,
    pub product_name: String,
    pub product_sku: String,
    pub brand: String,
    pub base_price: f64,
    pub supplier_cost: f64,
    pub base_margin_percent: Option<f64>,
    pub discount_percent: f64,
    pub promo_type: String,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub channel: String,
    pub times_promoted: i64,
    pub total_units_sold: f64,
    pub baseline_units: Option<f64>,
    pub units_lift_percent: Option<f64>,
    pub revenue_lift_percent: Option<f64>,
    pub margin_after_discount_percent: Option<f64>,
    pub margin_impact_euros: Option<f64>,
    pub profit_impact_euros: Option<f64>,
}

impl PromoProductRow {
    /// Composite key of this row
    pub fn key(&self) -> CompositeKey {
        (self.promo_id.clone(), self.product_id.clone())
    }
}

/// A source row joined with its embedding, ready for the target store
#[derive(Debug, Clone)]
pub struct JoinedRow {
    pub record: PromoProductRow,
    pub vector: Vec<f32>,
}

/// Resolved column positions for the base-record CSV.
///
/// Header lookup happens once up front so the per-row path is index access
/// only; a header missing any required column fails the load before any
/// rows are read.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    promo_id: usize,
    product_id: usize,
    promo_name: usize,
    season_label: usize,
    category: usize,
    product_name: usize,
    product_sku: usize,
    brand: usize,
    base_price: usize,
    supplier_cost: usize,
    base_margin_percent: usize,
    discount_percent: usize,
    promo_type: usize,
    date_start: usize,
    date_end: usize,
    channel: usize,
    times_promoted: usize,
    total_units_sold: usize,
    baseline_units: usize,
    units_lift_percent: usize,
    revenue_lift_percent: usize,
    margin_after_discount_percent: usize,
    margin_impact_euros: usize,
    profit_impact_euros: usize,
}

impl ColumnMap {
    /// Resolve all column positions from the header row
    pub fn from_headers(headers: &csv::StringRecord) -> Result<Self, LoadError> {
        let find = |name: &str| -> Result<usize, LoadError> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| LoadError::Source(format!("Missing required column {:?}", name)))
        };

        Ok(Self {
            promo_id: find("promo_id")?,
            product_id: find("product_id")?,
            promo_name: find("promo_name")?,
            season_label: find("season_label")?,
            category: find("category")?,
            product_name: find("product_name")?,
            product_sku: find("product_sku")?,
            brand: find("brand")?,
            base_price: find("base_price")?,
            supplier_cost: find("supplier_cost")?,
            base_margin_percent: find("base_margin_percent")?,
            discount_percent: find("discount_percent")?,
            promo_type: find("promo_type")?,
            date_start: find("date_start")?,
            date_end: find("date_end")?,
            channel: find("channel")?,
            times_promoted: find("times_promoted")?,
            total_units_sold: find("total_units_sold")?,
            baseline_units: find("baseline_units")?,
            units_lift_percent: find("units_lift_percent")?,
            revenue_lift_percent: find("revenue_lift_percent")?,
            margin_after_discount_percent: find("margin_after_discount_percent")?,
            margin_impact_euros: find("margin_impact_euros")?,
            profit_impact_euros: find("profit_impact_euros")?,
        })
    }

    /// Build a typed row from one CSV record.
    ///
    /// Returns `None` for rows whose composite key is missing; those are
    /// counted as skips by the caller, never a fatal error.
    pub fn parse(&self, record: &csv::StringRecord) -> Option<PromoProductRow> {
        let get = |idx: usize| record.get(idx).unwrap_or("");

        let promo_id = get(self.promo_id).trim().to_string();
        let product_id = get(self.product_id).trim().to_string();
        if promo_id.is_empty() || product_id.is_empty() {
            return None;
        }

        Some(PromoProductRow {
            promo_id,
            product_id,
            promo_name: get(self.promo_name).trim().to_string(),
            season_label: get(self.season_label).trim().to_string(),
            category: get(self.category).trim().to_string(),
            product_name: get(self.product_name).trim().to_string(),
            product_sku: get(self.product_sku).trim().to_string(),
            brand: get(self.brand).trim().to_string(),
            base_price: coerce::required_f64(get(self.base_price)),
            supplier_cost: coerce::required_f64(get(self.supplier_cost)),
            base_margin_percent: coerce::optional_f64(get(self.base_margin_percent)),
            discount_percent: coerce::required_f64(get(self.discount_percent)),
            promo_type: get(self.promo_type).trim().to_string(),
            date_start: coerce::optional_date(get(self.date_start)),
            date_end: coerce::optional_date(get(self.date_end)),
            channel: get(self.channel).trim().to_string(),
            times_promoted: coerce::required_i64(get(self.times_promoted)),
            total_units_sold: coerce::required_f64(get(self.total_units_sold)),
            baseline_units: coerce::optional_f64(get(self.baseline_units)),
            units_lift_percent: coerce::optional_f64(get(self.units_lift_percent)),
            revenue_lift_percent: coerce::optional_f64(get(self.revenue_lift_percent)),
            margin_after_discount_percent: coerce::optional_f64(
                get(self.margin_after_discount_percent),
            ),
            margin_impact_euros: coerce::optional_f64(get(self.margin_impact_euros)),
            profit_impact_euros: coerce::optional_f64(get(self.profit_impact_euros)),
        })
    }
}

/// Header for the base-record CSV, in canonical column order
pub const SOURCE_COLUMNS: [&str; 24] = [
    "promo_id",
    "product_id",
    "promo_name",
    "season_label",
    "category",
    "product_name",
    "product_sku",
    "brand",
    "base_price",
    "supplier_cost",
    "base_margin_percent",
    "discount_percent",
    "promo_type",
    "date_start",
    "date_end",
    "channel",
    "times_promoted",
    "total_units_sold",
    "baseline_units",
    "units_lift_percent",
    "revenue_lift_percent",
    "margin_after_discount_percent",
    "margin_impact_euros",
    "profit_impact_euros",
];
