//! Append-only embedding output file.
//!
//! Tabular CSV with a fixed header `promo_id,product_id,embedding`; the
//! vector column is a bracketed comma-separated list of floats. The file is
//! safe to append to across process restarts (it is only ever truncated by
//! an explicit from-scratch run), and the number of data rows doubles as
//! the resume offset. Row order is completion order, not input order, so
//! consumers must join by key rather than position.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use super::error::GenerateError;

/// One durable (key, vector) pair
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRow {
    /// First half of the composite key
    pub promo_id: String,

    /// Second half of the composite key
    pub product_id: String,

    /// The embedding vector
    pub vector: Vec<f32>,
}

/// Serialize a vector as a bracketed comma-separated list
pub fn format_vector(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// Parse a bracketed comma-separated vector
pub fn parse_vector(raw: &str) -> Result<Vec<f32>, GenerateError> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| {
            GenerateError::Output(format!("Vector is not bracketed: {:?}", truncated(raw)))
        })?;

    let inner = inner.trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            part.trim().parse::<f32>().map_err(|e| {
                GenerateError::Output(format!("Bad vector component {:?}: {}", part.trim(), e))
            })
        })
        .collect()
}

fn truncated(raw: &str) -> &str {
    match raw.char_indices().nth(32) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

/// Writer over the append-only output file
#[derive(Debug, Clone)]
pub struct OutputFile {
    path: PathBuf,
}

impl OutputFile {
    /// Create a handle over the given path; nothing is touched on disk yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count existing data rows (excluding the header).
    ///
    /// A missing file counts as zero: the run starts from scratch.
    pub fn existing_rows(&self) -> Result<usize, GenerateError> {
        if !self.path.exists() {
            return Ok(0);
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut count = 0usize;
        for record in reader.records() {
            record?;
            count += 1;
        }
        Ok(count)
    }

    /// Append rows, writing the header first if the file is new or empty.
    ///
    /// The underlying file is flushed before returning, so a row handed to
    /// this method is durable once it returns.
    pub fn append(&self, rows: &[EmbeddingRow]) -> Result<(), GenerateError> {
        let needs_header = !self.path.exists()
            || std::fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer.write_record(["promo_id", "product_id", "embedding"])?;
        }
        for row in rows {
            writer.write_record([
                row.promo_id.as_str(),
                row.product_id.as_str(),
                &format_vector(&row.vector),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Delete the file for a from-scratch run
    pub fn remove(&self) -> Result<(), GenerateError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GenerateError::Io(e)),
        }
    }
}

/// Read the whole output file back as rows.
///
/// The embedding side of the join is the smaller source and is fully
/// materialized by the loader, so a vector read is sufficient here.
pub fn read_embeddings(path: &Path) -> Result<Vec<EmbeddingRow>, GenerateError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        GenerateError::Output(format!("Failed to open {}: {}", path.display(), e))
    })?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let promo_id = record.get(0).unwrap_or("").to_string();
        let product_id = record.get(1).unwrap_or("").to_string();
        let vector = parse_vector(record.get(2).unwrap_or(""))?;
        rows.push(EmbeddingRow {
            promo_id,
            product_id,
            vector,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_vector_round_trip() {
        let vector = vec![0.25, -1.5, 3.0];
        let formatted = format_vector(&vector);
        assert_eq!(formatted, "[0.25, -1.5, 3]");
        assert_eq!(parse_vector(&formatted).unwrap(), vector);
    }

    #[test]
    fn test_parse_vector_rejects_unbracketed() {
        assert!(parse_vector("0.1, 0.2").is_err());
        assert!(parse_vector("[0.1, oops]").is_err());
    }

    #[test]
    fn test_parse_vector_error_handles_multibyte_garbage() {
        // The error message truncates long input; a multibyte character
        // straddling the cutoff must not split mid-character.
        let garbage = "€".repeat(40);
        let err = parse_vector(&garbage).unwrap_err();
        assert!(matches!(err, GenerateError::Output(_)));
    }

    #[test]
    fn test_append_writes_header_once_across_reopens() {
        let dir = tempdir().unwrap();
        let output = OutputFile::new(dir.path().join("embeddings.csv"));

        assert_eq!(output.existing_rows().unwrap(), 0);

        output
            .append(&[EmbeddingRow {
                promo_id: "P1".to_string(),
                product_id: "S1".to_string(),
                vector: vec![1.0, 2.0],
            }])
            .unwrap();

        // Second append simulates a process restart.
        let reopened = OutputFile::new(output.path());
        reopened
            .append(&[EmbeddingRow {
                promo_id: "P2".to_string(),
                product_id: "S2".to_string(),
                vector: vec![3.0, 4.0],
            }])
            .unwrap();

        assert_eq!(reopened.existing_rows().unwrap(), 2);

        let rows = read_embeddings(output.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].promo_id, "P1");
        assert_eq!(rows[1].promo_id, "P2");
        assert_eq!(rows[1].vector, vec![3.0, 4.0]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let output = OutputFile::new(dir.path().join("embeddings.csv"));
        output.remove().unwrap();

        output
            .append(&[EmbeddingRow {
                promo_id: "P1".to_string(),
                product_id: "S1".to_string(),
                vector: vec![1.0],
            }])
            .unwrap();
        output.remove().unwrap();
        assert_eq!(output.existing_rows().unwrap(), 0);
    }
}
