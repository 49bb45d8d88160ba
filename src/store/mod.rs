//! Target store module
//!
//! libSQL-backed persistent store for joined promo-product rows: bulk
//! insert, full-table truncate, filtered listing, and approximate
//! nearest-neighbor search over the embedding column.

mod database;
pub mod error;
mod schema;

pub use database::{Database, RowFilter, SimilarPromo, vector_literal};
pub use error::DbError;
