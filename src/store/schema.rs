//! # Target Table Schema Module
//!
//! Defines the `promo_products` table: a synthetic primary key, the full
//! set of typed business columns from the unified dataset, and a
//! fixed-width vector column for the embedding.
//!
//! Secondary indexes cover the equality-filter columns used by the query
//! surface; a vector index over the embedding column enables approximate
//! nearest-neighbor search. Vector index creation degrades to a warning
//! when the extension is unavailable, so plain loads and filter queries
//! keep working without it.
//!
//! `(promo_id, product_id)` is enforced UNIQUE. The whole pipeline treats
//! that pair as the record identity: the embedding lookup holds one vector
//! per key, and a source file with duplicate keys would already have
//! collided there. A duplicate reaching this table is corrupt input and
//! fails the load loudly rather than being absorbed as a skip.

use libsql::{Connection, params};
use tracing::warn;

use super::error::DbError;

/// Initialize the target schema for the given embedding width
pub async fn initialize_schema(conn: &Connection, dimensions: usize) -> Result<(), DbError> {
    let create_table = format!(
        "CREATE TABLE IF NOT EXISTS promo_products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            promo_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            promo_name TEXT NOT NULL,
            season_label TEXT NOT NULL,
            category TEXT NOT NULL,
            product_name TEXT NOT NULL,
            product_sku TEXT NOT NULL,
            brand TEXT NOT NULL,
            base_price REAL NOT NULL,
            supplier_cost REAL NOT NULL,
            base_margin_percent REAL,
            discount_percent REAL NOT NULL,
            promo_type TEXT NOT NULL,
            date_start TEXT,
            date_end TEXT,
            channel TEXT NOT NULL,
            times_promoted INTEGER NOT NULL,
            total_units_sold REAL NOT NULL,
            baseline_units REAL,
            units_lift_percent REAL,
            revenue_lift_percent REAL,
            margin_after_discount_percent REAL,
            margin_impact_euros REAL,
            profit_impact_euros REAL,
            embedding F32_BLOB({dimensions}) NOT NULL
        )"
    );

    conn.execute(&create_table, params![])
        .await
        .map_err(|e| DbError::Schema(format!("Failed to create promo_products table: {}", e)))?;

    // Composite key lookups during verification and ad hoc queries
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_promo_products_key
         ON promo_products(promo_id, product_id)",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create key index: {}", e)))?;

    // Equality-filter columns exposed by the query surface
    for column in ["category", "channel", "promo_type", "season_label"] {
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS idx_promo_products_{column}
             ON promo_products({column})"
        );
        conn.execute(&sql, params![])
            .await
            .map_err(|e| DbError::Schema(format!("Failed to create {} index: {}", column, e)))?;
    }

    // ANN index for cosine-similarity search
    let vector_index = conn
        .execute(
            "CREATE INDEX IF NOT EXISTS idx_promo_products_embedding
             ON promo_products (libsql_vector_idx(embedding))",
            params![],
        )
        .await;

    if let Err(e) = vector_index {
        warn!(
            "Failed to create vector index: {}. Similarity search will not be available.",
            e
        );
    }

    Ok(())
}
