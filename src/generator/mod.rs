//! Embedding generator: batched, rate-limited, resumable.
//!
//! Converts every source row into an embedding vector with bounded
//! concurrency and durable incremental output. The pipeline is:
//!
//! 1. partition the (possibly resumed) input into fixed-size batches in
//!    file order;
//! 2. per batch, estimate a token weight from text length and pass through
//!    [`RateScheduler::admit`] before the API call;
//! 3. run batches under a concurrency bound that is independent of the
//!    scheduler's own in-flight cap;
//! 4. buffer completed batches and flush the contiguous prefix to the
//!    append-only output file every `flush_every` batches, persisting a
//!    checkpoint after each flush.
//!
//! Batches complete out of submission order, so the checkpoint tracks a
//! contiguous watermark: it only ever advances over a gap-free prefix of
//! completed batches. A crash therefore never records progress past an
//! unfinished earlier batch, and resume (derived from the output row count)
//! never reprocesses a durably written key.
//!
//! A batch that exhausts its retries fails the whole run. Losing embeddings
//! silently would corrupt the join downstream.

pub mod checkpoint;
pub mod error;
pub mod input;
pub mod output;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use error::GenerateError;
pub use input::EmbeddingInput;
pub use output::{EmbeddingRow, OutputFile};

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tracing::{info, instrument, warn};

use crate::embedder::EmbeddingClient;
use crate::scheduler::RateScheduler;

/// Rough chars-per-token ratio used for batch weight estimation
const CHARS_PER_TOKEN: usize = 4;

/// Outcome of a generation run
#[derive(Debug, Clone)]
pub struct GenerationSummary {
    /// Total rows in the source
    pub total_inputs: usize,

    /// Row offset the run resumed from
    pub resumed_from: usize,

    /// Rows embedded and durably written by this run
    pub rows_embedded: usize,

    /// Batches submitted by this run
    pub batches: usize,

    /// Wall-clock duration of the run
    pub duration: std::time::Duration,
}

impl GenerationSummary {
    /// Effective throughput in rows per second
    pub fn rows_per_sec(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.rows_embedded as f64 / secs
        } else {
            0.0
        }
    }
}

/// One submitted batch, carrying its position in the input ordering
struct Batch {
    /// Index of this batch among the batches of this run
    index: usize,

    /// Inputs in original file order
    inputs: Vec<EmbeddingInput>,
}

impl Batch {
    /// Token weight estimate, proportional to total text length
    fn weight(&self) -> u64 {
        let chars: usize = self.inputs.iter().map(|i| i.text.len()).sum();
        (chars / CHARS_PER_TOKEN).max(1) as u64
    }
}

/// Batching embedding generator
pub struct Generator<C: EmbeddingClient> {
    client: C,
    scheduler: Arc<RateScheduler>,
    batch_size: usize,
    concurrency: usize,
    flush_every: usize,
    progress_every: usize,
}

impl<C: EmbeddingClient> Generator<C> {
    /// Create a generator over the given client and scheduler
    pub fn new(
        client: C,
        scheduler: Arc<RateScheduler>,
        batch_size: usize,
        concurrency: usize,
        flush_every: usize,
        progress_every: usize,
    ) -> Self {
        Self {
            client,
            scheduler,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
            flush_every: flush_every.max(1),
            progress_every: progress_every.max(1),
        }
    }

    /// Run generation for the whole source file, resuming from prior output.
    #[instrument(skip(self, output, checkpoint), fields(source = %source.display()))]
    pub async fn run(
        &self,
        source: &Path,
        output: &OutputFile,
        checkpoint: &CheckpointStore,
    ) -> Result<GenerationSummary, GenerateError> {
        let started = Instant::now();
        let inputs = input::read_inputs(source)?;
        let total = inputs.len();

        // The durable output is the source of truth for resume; the
        // checkpoint is a cross-check. The two can legitimately disagree by
        // up to one flush interval after a crash.
        let resume = output.existing_rows()?;
        if let Some(saved) = checkpoint.load().await? {
            if saved.last_processed_index != resume {
                warn!(
                    "Checkpoint offset {} disagrees with output row count {}; trusting the output file",
                    saved.last_processed_index, resume
                );
            }
        }

        if resume >= total {
            info!("Output already covers all {} input rows; nothing to do", total);
            checkpoint.clear().await?;
            return Ok(GenerationSummary {
                total_inputs: total,
                resumed_from: resume,
                rows_embedded: 0,
                batches: 0,
                duration: started.elapsed(),
            });
        }

        if resume > 0 {
            info!("Resuming from row {} of {}", resume, total);
        }

        let batches: Vec<Batch> = inputs[resume..]
            .chunks(self.batch_size)
            .enumerate()
            .map(|(index, chunk)| Batch {
                index,
                inputs: chunk.to_vec(),
            })
            .collect();
        let batch_count = batches.len();
        info!(
            "Embedding {} rows in {} batches of up to {}",
            total - resume,
            batch_count,
            self.batch_size
        );

        let mut completions = futures::stream::iter(batches.into_iter().map(|batch| {
            let client = &self.client;
            let scheduler = &self.scheduler;
            async move {
                let permit = scheduler.admit(batch.weight()).await;
                let texts: Vec<String> =
                    batch.inputs.iter().map(|i| i.text.clone()).collect();
                let result = client.embed(&texts).await;
                drop(permit);
                result.map(|vectors| (batch, vectors))
            }
        }))
        .buffer_unordered(self.concurrency);

        let mut pending: BTreeMap<usize, Vec<EmbeddingRow>> = BTreeMap::new();
        let mut next_batch = 0usize;
        let mut flush_buffer: Vec<EmbeddingRow> = Vec::new();
        let mut flushed_rows = resume;
        let mut completed = 0usize;
        let mut batches_since_flush = 0usize;

        while let Some(completion) = completions.next().await {
            let (batch, vectors) = completion?;

            let rows: Vec<EmbeddingRow> = batch
                .inputs
                .into_iter()
                .zip(vectors)
                .map(|(input, vector)| EmbeddingRow {
                    promo_id: input.promo_id,
                    product_id: input.product_id,
                    vector,
                })
                .collect();
            pending.insert(batch.index, rows);

            completed += 1;
            if completed % self.progress_every == 0 || completed == batch_count {
                info!(
                    "Embedded {}/{} batches ({} rows durable)",
                    completed, batch_count, flushed_rows
                );
            }

            // Advance the contiguous watermark: only gap-free prefixes of
            // completed batches may reach the file and the checkpoint.
            while let Some(rows) = pending.remove(&next_batch) {
                flush_buffer.extend(rows);
                next_batch += 1;
                batches_since_flush += 1;
            }

            if batches_since_flush >= self.flush_every && !flush_buffer.is_empty() {
                flushed_rows = self
                    .flush(output, checkpoint, &mut flush_buffer, flushed_rows)
                    .await?;
                batches_since_flush = 0;
            }
        }

        // Final, unconditional flush. Every batch has completed, so the
        // buffer now holds the entire remaining suffix.
        if !flush_buffer.is_empty() {
            flushed_rows = self
                .flush(output, checkpoint, &mut flush_buffer, flushed_rows)
                .await?;
        }
        debug_assert!(pending.is_empty());

        checkpoint.clear().await?;

        let summary = GenerationSummary {
            total_inputs: total,
            resumed_from: resume,
            rows_embedded: flushed_rows - resume,
            batches: batch_count,
            duration: started.elapsed(),
        };
        info!(
            "Generation complete: {} rows embedded in {:.1}s ({:.1} rows/s)",
            summary.rows_embedded,
            summary.duration.as_secs_f64(),
            summary.rows_per_sec()
        );
        Ok(summary)
    }

    /// Drain the buffer to the output file, then persist the checkpoint.
    ///
    /// The file append completes before the checkpoint is written, so the
    /// checkpoint never claims rows that are not durable.
    async fn flush(
        &self,
        output: &OutputFile,
        checkpoint: &CheckpointStore,
        buffer: &mut Vec<EmbeddingRow>,
        flushed_rows: usize,
    ) -> Result<usize, GenerateError> {
        output.append(buffer)?;
        let new_offset = flushed_rows + buffer.len();
        buffer.clear();
        checkpoint.save(&Checkpoint::at(new_offset)).await?;
        Ok(new_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::EmbedError;
    use std::collections::HashSet;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Deterministic in-process stand-in for the embeddings API
    struct StubClient {
        dims: usize,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl StubClient {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn embedded_texts(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().flatten().cloned().collect()
        }
    }

    impl EmbeddingClient for StubClient {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.calls.lock().unwrap().push(texts.to_vec());
            Ok(texts
                .iter()
                .map(|t| {
                    let seed = t.len() as f32;
                    (0..self.dims).map(|d| seed + d as f32).collect()
                })
                .collect())
        }

        fn ndims(&self) -> usize {
            self.dims
        }
    }

    fn wide_open_scheduler() -> Arc<RateScheduler> {
        Arc::new(RateScheduler::new(
            u32::MAX,
            u64::MAX,
            64,
            Duration::from_secs(60),
        ))
    }

    fn write_source(dir: &Path, rows: usize) -> std::path::PathBuf {
        let path = dir.join("source.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "promo_id,product_id,embedding_text").unwrap();
        for i in 0..rows {
            writeln!(file, "P{},S{},promo text number {}", i / 3, i, i).unwrap();
        }
        path
    }

    #[tokio::test]
    async fn test_every_input_produces_exactly_one_output_row() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), 23);
        let output = OutputFile::new(dir.path().join("embeddings.csv"));
        let checkpoint = CheckpointStore::new(dir.path().join("checkpoint.json"));

        let generator = Generator::new(StubClient::new(8), wide_open_scheduler(), 5, 3, 2, 100);
        let summary = generator.run(&source, &output, &checkpoint).await.unwrap();

        assert_eq!(summary.total_inputs, 23);
        assert_eq!(summary.rows_embedded, 23);
        assert_eq!(summary.batches, 5);

        let rows = output::read_embeddings(output.path()).unwrap();
        assert_eq!(rows.len(), 23);

        let keys: HashSet<(String, String)> = rows
            .iter()
            .map(|r| (r.promo_id.clone(), r.product_id.clone()))
            .collect();
        assert_eq!(keys.len(), 23, "duplicate keys in output");

        // Checkpoint is removed on full completion.
        assert_eq!(checkpoint.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resume_skips_durably_written_rows() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), 10);
        let output = OutputFile::new(dir.path().join("embeddings.csv"));
        let checkpoint = CheckpointStore::new(dir.path().join("checkpoint.json"));

        // Simulate an interrupted run: the first 4 rows are already durable.
        let prior: Vec<EmbeddingRow> = (0..4)
            .map(|i| EmbeddingRow {
                promo_id: format!("P{}", i / 3),
                product_id: format!("S{}", i),
                vector: vec![0.0; 8],
            })
            .collect();
        output.append(&prior).unwrap();
        checkpoint.save(&Checkpoint::at(4)).await.unwrap();

        let client = StubClient::new(8);
        let generator = Generator::new(client, wide_open_scheduler(), 3, 2, 1, 100);
        let summary = generator.run(&source, &output, &checkpoint).await.unwrap();

        assert_eq!(summary.resumed_from, 4);
        assert_eq!(summary.rows_embedded, 6);

        // No key from the pre-existing output was re-embedded.
        let embedded = generator.client.embedded_texts();
        assert_eq!(embedded.len(), 6);
        for i in 0..4 {
            let text = format!("promo text number {}", i);
            assert!(!embedded.contains(&text), "row {} was reprocessed", i);
        }

        let rows = output::read_embeddings(output.path()).unwrap();
        assert_eq!(rows.len(), 10);
        let keys: HashSet<(String, String)> = rows
            .iter()
            .map(|r| (r.promo_id.clone(), r.product_id.clone()))
            .collect();
        assert_eq!(keys.len(), 10);
    }

    #[tokio::test]
    async fn test_completed_output_is_a_no_op() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), 3);
        let output = OutputFile::new(dir.path().join("embeddings.csv"));
        let checkpoint = CheckpointStore::new(dir.path().join("checkpoint.json"));

        let generator = Generator::new(StubClient::new(4), wide_open_scheduler(), 2, 2, 1, 100);
        generator.run(&source, &output, &checkpoint).await.unwrap();

        let again = Generator::new(StubClient::new(4), wide_open_scheduler(), 2, 2, 1, 100);
        let summary = again.run(&source, &output, &checkpoint).await.unwrap();

        assert_eq!(summary.rows_embedded, 0);
        assert_eq!(summary.batches, 0);
        assert!(again.client.embedded_texts().is_empty());
    }

    /// Client that fails a configurable number of times before succeeding
    struct FlakyClient {
        dims: usize,
        failures_left: Mutex<u32>,
    }

    impl EmbeddingClient for FlakyClient {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(EmbedError::RetriesExhausted {
                    attempts: 1,
                    message: "simulated outage".to_string(),
                });
            }
            drop(left);
            Ok(texts.iter().map(|_| vec![1.0; self.dims]).collect())
        }

        fn ndims(&self) -> usize {
            self.dims
        }
    }

    #[tokio::test]
    async fn test_terminal_batch_failure_aborts_the_run() {
        let dir = tempdir().unwrap();
        let source = write_source(dir.path(), 6);
        let output = OutputFile::new(dir.path().join("embeddings.csv"));
        let checkpoint = CheckpointStore::new(dir.path().join("checkpoint.json"));

        let client = FlakyClient {
            dims: 4,
            failures_left: Mutex::new(u32::MAX),
        };
        let generator = Generator::new(client, wide_open_scheduler(), 2, 1, 1, 100);
        let result = generator.run(&source, &output, &checkpoint).await;

        assert!(matches!(result, Err(GenerateError::Embed(_))));
    }
}
