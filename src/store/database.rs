//! Database operations for the target store.
//!
//! The loader hands this module fully joined rows; everything here is
//! plain SQL against libSQL. Vectors cross this boundary as the store's
//! own bracketed literal syntax via `vector32(...)`, which re-validates
//! the width against the declared `F32_BLOB` column.

use libsql::{Connection, Row, params};
use tracing::{debug, instrument};

use super::error::DbError;
use super::schema;
use crate::loader::record::{JoinedRow, PromoProductRow};

/// Render a vector as the store's bracketed literal
pub fn vector_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Filters for the row query surface: equality on the dimension columns,
/// a lower bound on discount
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    pub category: Option<String>,
    pub channel: Option<String>,
    pub promo_type: Option<String>,
    pub season_label: Option<String>,
    pub min_discount_percent: Option<f64>,
}

/// One similarity search hit
#[derive(Debug, Clone, serde::Serialize)]
pub struct SimilarPromo {
    pub promo_id: String,
    pub product_id: String,
    pub promo_name: String,
    pub product_name: String,
    pub category: String,
    pub channel: String,
    pub season_label: String,
    pub discount_percent: f64,
    /// Cosine distance to the query vector (lower is closer)
    pub distance: f64,
}

/// Database manager for the target store
#[derive(Clone)]
pub struct Database {
    conn: Connection,
    dimensions: usize,
}

const INSERT_SQL: &str = "INSERT INTO promo_products (
        promo_id, product_id, promo_name, season_label, category,
        product_name, product_sku, brand, base_price, supplier_cost,
        base_margin_percent, discount_percent, promo_type, date_start,
        date_end, channel, times_promoted, total_units_sold, baseline_units,
        units_lift_percent, revenue_lift_percent,
        margin_after_discount_percent, margin_impact_euros,
        profit_impact_euros, embedding
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, vector32(?))";

const ROW_COLUMNS: &str = "promo_id, product_id, promo_name, season_label, category,
        product_name, product_sku, brand, base_price, supplier_cost,
        base_margin_percent, discount_percent, promo_type, date_start,
        date_end, channel, times_promoted, total_units_sold, baseline_units,
        units_lift_percent, revenue_lift_percent,
        margin_after_discount_percent, margin_impact_euros, profit_impact_euros";

impl Database {
    /// Create a database manager over an existing connection
    #[instrument(skip(conn))]
    pub async fn new(conn: Connection, dimensions: usize) -> Result<Self, DbError> {
        schema::initialize_schema(&conn, dimensions).await?;
        Ok(Self { conn, dimensions })
    }

    /// Create a database manager from a file path
    pub async fn new_from_path(path: &str, dimensions: usize) -> Result<Self, DbError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DbError::Connection(format!("Failed to open database: {}", e)))?;

        let conn = db
            .connect()
            .map_err(|e| DbError::Connection(format!("Failed to connect to database: {}", e)))?;

        Self::new(conn, dimensions).await
    }

    /// Embedding width this store was initialized with
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Remove every row; the loader always performs a full reload
    pub async fn truncate(&self) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM promo_products", params![])
            .await
            .map_err(|e| DbError::Query(format!("Failed to truncate promo_products: {}", e)))?;
        Ok(())
    }

    /// Insert a chunk of joined rows inside one transaction
    pub async fn insert_rows(&self, rows: &[JoinedRow]) -> Result<(), DbError> {
        if rows.is_empty() {
            return Ok(());
        }

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DbError::Transaction(format!("Failed to start transaction: {}", e)))?;

        for row in rows {
            let r = &row.record;
            let values: Vec<libsql::Value> = vec![
                r.promo_id.clone().into(),
                r.product_id.clone().into(),
                r.promo_name.clone().into(),
                r.season_label.clone().into(),
                r.category.clone().into(),
                r.product_name.clone().into(),
                r.product_sku.clone().into(),
                r.brand.clone().into(),
                r.base_price.into(),
                r.supplier_cost.into(),
                opt_value(r.base_margin_percent),
                r.discount_percent.into(),
                r.promo_type.clone().into(),
                opt_value(r.date_start.map(|d| d.format("%Y-%m-%d").to_string())),
                opt_value(r.date_end.map(|d| d.format("%Y-%m-%d").to_string())),
                r.channel.clone().into(),
                r.times_promoted.into(),
                r.total_units_sold.into(),
                opt_value(r.baseline_units),
                opt_value(r.units_lift_percent),
                opt_value(r.revenue_lift_percent),
                opt_value(r.margin_after_discount_percent),
                opt_value(r.margin_impact_euros),
                opt_value(r.profit_impact_euros),
                vector_literal(&row.vector).into(),
            ];
            tx.execute(INSERT_SQL, values).await.map_err(|e| {
                DbError::Query(format!(
                    "Failed to insert row ({}, {}): {}",
                    r.promo_id, r.product_id, e
                ))
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(format!("Failed to commit transaction: {}", e)))?;

        debug!("Inserted {} rows", rows.len());
        Ok(())
    }

    /// Count the rows currently in the target table
    pub async fn count_rows(&self) -> Result<i64, DbError> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM promo_products", params![])
            .await
            .map_err(|e| DbError::Query(format!("Failed to count rows: {}", e)))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| DbError::Data(format!("Failed to read count: {}", e))),
            Ok(None) => Err(DbError::Data("COUNT(*) returned no rows".to_string())),
            Err(e) => Err(DbError::Data(format!("Failed to read count: {}", e))),
        }
    }

    /// Approximate nearest-neighbor search ordered by cosine distance
    pub async fn search_similar(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SimilarPromo>, DbError> {
        if query.len() != self.dimensions {
            return Err(DbError::Data(format!(
                "Query vector has {} dimensions, store expects {}",
                query.len(),
                self.dimensions
            )));
        }

        let literal = vector_literal(query);
        let sql = "SELECT
                p.promo_id, p.product_id, p.promo_name, p.product_name,
                p.category, p.channel, p.season_label, p.discount_percent,
                vector_distance_cos(p.embedding, vector32(?)) AS distance
            FROM vector_top_k('idx_promo_products_embedding', vector32(?), ?) AS v
            JOIN promo_products p ON p.rowid = v.id
            ORDER BY distance";

        let mut rows = self
            .conn
            .query(
                sql,
                params![literal.clone(), literal, limit as i64],
            )
            .await
            .map_err(|e| DbError::Query(format!("Vector search failed: {}", e)))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(SimilarPromo {
                promo_id: row
                    .get(0)
                    .map_err(|e| DbError::Data(format!("Failed to get promo_id: {}", e)))?,
                product_id: row
                    .get(1)
                    .map_err(|e| DbError::Data(format!("Failed to get product_id: {}", e)))?,
                promo_name: row
                    .get(2)
                    .map_err(|e| DbError::Data(format!("Failed to get promo_name: {}", e)))?,
                product_name: row
                    .get(3)
                    .map_err(|e| DbError::Data(format!("Failed to get product_name: {}", e)))?,
                category: row
                    .get(4)
                    .map_err(|e| DbError::Data(format!("Failed to get category: {}", e)))?,
                channel: row
                    .get(5)
                    .map_err(|e| DbError::Data(format!("Failed to get channel: {}", e)))?,
                season_label: row
                    .get(6)
                    .map_err(|e| DbError::Data(format!("Failed to get season_label: {}", e)))?,
                discount_percent: row
                    .get(7)
                    .map_err(|e| DbError::Data(format!("Failed to get discount_percent: {}", e)))?,
                distance: row
                    .get(8)
                    .map_err(|e| DbError::Data(format!("Failed to get distance: {}", e)))?,
            });
        }
        Ok(results)
    }

    /// Filtered row listing with ordering and pagination.
    ///
    /// Rows come back ordered by units sold, highest first.
    pub async fn list_rows(
        &self,
        filter: &RowFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PromoProductRow>, DbError> {
        let mut sql = format!("SELECT {} FROM promo_products WHERE 1=1", ROW_COLUMNS);
        let mut query_params: Vec<libsql::Value> = Vec::new();

        for (column, value) in [
            ("category", &filter.category),
            ("channel", &filter.channel),
            ("promo_type", &filter.promo_type),
            ("season_label", &filter.season_label),
        ] {
            if let Some(value) = value {
                sql.push_str(&format!(" AND {} = ?", column));
                query_params.push(value.clone().into());
            }
        }

        if let Some(min_discount) = filter.min_discount_percent {
            sql.push_str(" AND discount_percent >= ?");
            query_params.push(min_discount.into());
        }

        sql.push_str(" ORDER BY total_units_sold DESC LIMIT ? OFFSET ?");
        query_params.push((limit as i64).into());
        query_params.push((offset as i64).into());

        let mut rows = self
            .conn
            .query(&sql, query_params)
            .await
            .map_err(|e| DbError::Query(format!("Failed to list rows: {}", e)))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }
}

fn opt_value<T: Into<libsql::Value>>(value: Option<T>) -> libsql::Value {
    value.map(Into::into).unwrap_or(libsql::Value::Null)
}

fn get_text(row: &Row, idx: i32, name: &str) -> Result<String, DbError> {
    row.get(idx)
        .map_err(|e| DbError::Data(format!("Failed to get {}: {}", name, e)))
}

fn get_f64(row: &Row, idx: i32, name: &str) -> Result<f64, DbError> {
    match row
        .get_value(idx)
        .map_err(|e| DbError::Data(format!("Failed to get {}: {}", name, e)))?
    {
        libsql::Value::Real(v) => Ok(v),
        libsql::Value::Integer(v) => Ok(v as f64),
        other => Err(DbError::Data(format!(
            "Unexpected value for {}: {:?}",
            name, other
        ))),
    }
}

fn get_i64(row: &Row, idx: i32, name: &str) -> Result<i64, DbError> {
    row.get(idx)
        .map_err(|e| DbError::Data(format!("Failed to get {}: {}", name, e)))
}

fn opt_f64(row: &Row, idx: i32, name: &str) -> Result<Option<f64>, DbError> {
    match row
        .get_value(idx)
        .map_err(|e| DbError::Data(format!("Failed to get {}: {}", name, e)))?
    {
        libsql::Value::Null => Ok(None),
        libsql::Value::Real(v) => Ok(Some(v)),
        libsql::Value::Integer(v) => Ok(Some(v as f64)),
        other => Err(DbError::Data(format!(
            "Unexpected value for {}: {:?}",
            name, other
        ))),
    }
}

fn opt_date(row: &Row, idx: i32, name: &str) -> Result<Option<chrono::NaiveDate>, DbError> {
    match row
        .get_value(idx)
        .map_err(|e| DbError::Data(format!("Failed to get {}: {}", name, e)))?
    {
        libsql::Value::Null => Ok(None),
        libsql::Value::Text(raw) => {
            Ok(chrono::NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok())
        }
        other => Err(DbError::Data(format!(
            "Unexpected value for {}: {:?}",
            name, other
        ))),
    }
}

fn row_to_record(row: &Row) -> Result<PromoProductRow, DbError> {
    Ok(PromoProductRow {
        promo_id: get_text(row, 0, "promo_id")?,
        product_id: get_text(row, 1, "product_id")?,
        promo_name: get_text(row, 2, "promo_name")?,
        season_label: get_text(row, 3, "season_label")?,
        category: get_text(row, 4, "category")?,
        product_name: get_text(row, 5, "product_name")?,
        product_sku: get_text(row, 6, "product_sku")?,
        brand: get_text(row, 7, "brand")?,
        base_price: get_f64(row, 8, "base_price")?,
        supplier_cost: get_f64(row, 9, "supplier_cost")?,
        base_margin_percent: opt_f64(row, 10, "base_margin_percent")?,
        discount_percent: get_f64(row, 11, "discount_percent")?,
        promo_type: get_text(row, 12, "promo_type")?,
        date_start: opt_date(row, 13, "date_start")?,
        date_end: opt_date(row, 14, "date_end")?,
        channel: get_text(row, 15, "channel")?,
        times_promoted: get_i64(row, 16, "times_promoted")?,
        total_units_sold: get_f64(row, 17, "total_units_sold")?,
        baseline_units: opt_f64(row, 18, "baseline_units")?,
        units_lift_percent: opt_f64(row, 19, "units_lift_percent")?,
        revenue_lift_percent: opt_f64(row, 20, "revenue_lift_percent")?,
        margin_after_discount_percent: opt_f64(row, 21, "margin_after_discount_percent")?,
        margin_impact_euros: opt_f64(row, 22, "margin_impact_euros")?,
        profit_impact_euros: opt_f64(row, 23, "profit_impact_euros")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_vector_literal_format() {
        assert_eq!(vector_literal(&[1.0, -0.5, 2.25]), "[1,-0.5,2.25]");
        assert_eq!(vector_literal(&[]), "[]");
    }

    fn sample_row(promo: &str, channel: &str, discount: f64, units: f64) -> JoinedRow {
        JoinedRow {
            record: PromoProductRow {
                promo_id: promo.to_string(),
                product_id: format!("SKU-{}", promo),
                promo_name: "Promo".to_string(),
                season_label: "Summer".to_string(),
                category: "Lighting".to_string(),
                product_name: "Lamp".to_string(),
                product_sku: format!("SKU-{}", promo),
                brand: "Lumina".to_string(),
                base_price: 25.0,
                supplier_cost: 10.0,
                base_margin_percent: Some(60.0),
                discount_percent: discount,
                promo_type: "percentage_discount".to_string(),
                date_start: None,
                date_end: None,
                channel: channel.to_string(),
                times_promoted: 1,
                total_units_sold: units,
                baseline_units: None,
                units_lift_percent: None,
                revenue_lift_percent: None,
                margin_after_discount_percent: None,
                margin_impact_euros: None,
                profit_impact_euros: None,
            },
            vector: vec![0.1, 0.2, 0.3],
        }
    }

    #[tokio::test]
    async fn test_list_rows_filters_and_orders() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let db = Database::new_from_path(path.to_str().unwrap(), 3)
            .await
            .unwrap();

        db.insert_rows(&[
            sample_row("P1", "Stores", 10.0, 50.0),
            sample_row("P2", "Web", 25.0, 200.0),
            sample_row("P3", "Web", 40.0, 120.0),
        ])
        .await
        .unwrap();

        // Equality filter on channel, ordering by units sold descending.
        let web = db
            .list_rows(
                &RowFilter {
                    channel: Some("Web".to_string()),
                    ..Default::default()
                },
                10,
                0,
            )
            .await
            .unwrap();
        assert_eq!(web.len(), 2);
        assert_eq!(web[0].promo_id, "P2");
        assert_eq!(web[1].promo_id, "P3");

        // Range filter on discount combines with the equality filter.
        let deep = db
            .list_rows(
                &RowFilter {
                    channel: Some("Web".to_string()),
                    min_discount_percent: Some(30.0),
                    ..Default::default()
                },
                10,
                0,
            )
            .await
            .unwrap();
        assert_eq!(deep.len(), 1);
        assert_eq!(deep[0].promo_id, "P3");

        // Pagination walks the full ordering.
        let page = db.list_rows(&Default::default(), 2, 2).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].promo_id, "P1");
    }
}
