//! Bulk loader: join base records with embeddings, stream into the store.
//!
//! Joins two large sources by composite key without holding the base side
//! in memory. The embedding output file is the smaller source and is fully
//! materialized into a key → vector map; the base-record CSV is then
//! streamed row by row on a blocking reader task. Joined rows flow through
//! a bounded channel into chunked insert transactions, so a slow sink
//! backpressures the reader instead of buffering unboundedly.
//!
//! The load is always a full reload: the target table is truncated first,
//! never upserted. Rows with no matching embedding are dropped and
//! counted. A sink failure aborts the whole load; per-row data issues
//! never do.

pub mod coerce;
pub mod error;
pub mod record;

pub use error::LoadError;
pub use record::{ColumnMap, CompositeKey, JoinedRow, PromoProductRow};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::generator::output;
use crate::store::Database;

/// Rows buffered between the reader and the sink
const CHANNEL_CAPACITY: usize = 1024;

/// Rows per insert transaction
const INSERT_CHUNK: usize = 500;

/// Log the skip counter at this modulus
const SKIP_LOG_EVERY: usize = 1000;

/// Outcome of a bulk load
#[derive(Debug, Clone)]
pub struct LoadSummary {
    /// Rows read from the base-record source
    pub source_rows: usize,

    /// Rows written to the target store
    pub inserted: usize,

    /// Rows dropped for a missing embedding or missing key
    pub skipped: usize,

    /// Row count reported by the store after the load
    pub verified_count: i64,

    /// Wall-clock duration of the load
    pub duration: std::time::Duration,
}

impl LoadSummary {
    /// Effective write throughput in rows per second
    pub fn rows_per_sec(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.inserted as f64 / secs
        } else {
            0.0
        }
    }
}

/// Load the joined dataset into the target store.
#[instrument(skip(db), fields(source = %source.display(), embeddings = %embeddings.display()))]
pub async fn run_load(
    db: &Database,
    source: &Path,
    embeddings: &Path,
) -> Result<LoadSummary, LoadError> {
    let started = Instant::now();

    let lookup = Arc::new(build_lookup(embeddings, db.dimensions())?);
    info!("Loaded {} embeddings for the join", lookup.len());

    // Full reload: the table is cleared before any row is written, so a
    // partial load is always a restart-from-truncate scenario.
    db.truncate().await?;

    let (tx, mut rx) = mpsc::channel::<JoinedRow>(CHANNEL_CAPACITY);

    let reader_source = source.to_path_buf();
    let reader_lookup = lookup.clone();
    let reader = tokio::task::spawn_blocking(move || {
        stream_source(&reader_source, &reader_lookup, tx)
    });

    let mut inserted = 0usize;
    let mut chunk: Vec<JoinedRow> = Vec::with_capacity(INSERT_CHUNK);
    let mut sink_error: Option<LoadError> = None;

    while let Some(row) = rx.recv().await {
        chunk.push(row);
        if chunk.len() >= INSERT_CHUNK {
            match db.insert_rows(&chunk).await {
                Ok(()) => {
                    inserted += chunk.len();
                    chunk.clear();
                }
                Err(e) => {
                    sink_error = Some(e.into());
                    break;
                }
            }
        }
    }

    if sink_error.is_none() && !chunk.is_empty() {
        match db.insert_rows(&chunk).await {
            Ok(()) => inserted += chunk.len(),
            Err(e) => sink_error = Some(e.into()),
        }
    }

    // Closing the receiver unblocks the reader if it is waiting on the
    // channel; it stops at its next send.
    drop(rx);
    let (source_rows, skipped) = reader.await??;

    if let Some(e) = sink_error {
        return Err(e);
    }

    let verified_count = db.count_rows().await?;
    let summary = LoadSummary {
        source_rows,
        inserted,
        skipped,
        verified_count,
        duration: started.elapsed(),
    };
    info!(
        "Load complete: {} inserted, {} skipped of {} source rows in {:.1}s ({:.0} rows/s); store reports {} rows",
        summary.inserted,
        summary.skipped,
        summary.source_rows,
        summary.duration.as_secs_f64(),
        summary.rows_per_sec(),
        summary.verified_count
    );
    if summary.verified_count != summary.inserted as i64 {
        warn!(
            "Store row count {} does not match inserted count {}",
            summary.verified_count, summary.inserted
        );
    }
    Ok(summary)
}

/// Materialize the embedding output file into a key → vector map.
///
/// This side of the join is the smaller source and has no ordering
/// requirement. Vectors are width-checked here so a corrupt output file
/// fails before the table is truncated.
fn build_lookup(
    path: &Path,
    dimensions: usize,
) -> Result<HashMap<CompositeKey, Vec<f32>>, LoadError> {
    let rows = output::read_embeddings(path)
        .map_err(|e| LoadError::Embeddings(e.to_string()))?;

    let mut lookup = HashMap::with_capacity(rows.len());
    for row in rows {
        if row.vector.len() != dimensions {
            return Err(LoadError::Embeddings(format!(
                "Embedding for ({}, {}) has {} dimensions, store expects {}",
                row.promo_id,
                row.product_id,
                row.vector.len(),
                dimensions
            )));
        }
        lookup.insert((row.promo_id, row.product_id), row.vector);
    }
    Ok(lookup)
}

/// Stream the base CSV, joining each row against the lookup.
///
/// Runs on a blocking task; `blocking_send` on the bounded channel is the
/// backpressure point. Returns (source rows read, rows skipped).
fn stream_source(
    path: &Path,
    lookup: &HashMap<CompositeKey, Vec<f32>>,
    tx: mpsc::Sender<JoinedRow>,
) -> Result<(usize, usize), LoadError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| LoadError::Source(format!("Failed to open {}: {}", path.display(), e)))?;
    let columns = ColumnMap::from_headers(reader.headers()?)?;

    let mut source_rows = 0usize;
    let mut skipped = 0usize;

    for result in reader.records() {
        let record = result?;
        source_rows += 1;

        let Some(row) = columns.parse(&record) else {
            skipped += 1;
            log_skips(skipped);
            continue;
        };

        let Some(vector) = lookup.get(&row.key()) else {
            skipped += 1;
            log_skips(skipped);
            continue;
        };

        let joined = JoinedRow {
            record: row,
            vector: vector.clone(),
        };

        // A closed channel means the sink gave up; the sink error is the
        // one worth reporting.
        if tx.blocking_send(joined).is_err() {
            break;
        }
    }

    Ok((source_rows, skipped))
}

fn log_skips(skipped: usize) {
    if skipped % SKIP_LOG_EVERY == 0 {
        info!("Skipped {} rows with no matching embedding", skipped);
    }
}
