//! Generation input: the unified promo-product dataset.
//!
//! The generator only needs the composite key and the pre-rendered
//! `embedding_text` column from each row; the full typed record is parsed
//! later by the loader. Row order in the file is the stable ordering that
//! batching, checkpoints, and resume offsets are all expressed against.

use std::path::Path;

use super::error::GenerateError;

/// One row of generation input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingInput {
    /// First half of the composite key
    pub promo_id: String,

    /// Second half of the composite key
    pub product_id: String,

    /// Natural-language description to embed
    pub text: String,
}

/// Read the source CSV in file order, keeping key and embedding text.
///
/// Rows with an empty key or empty embedding text are rejected rather than
/// skipped: a silently missing text would surface much later as a join miss
/// in the loader, far from its cause.
pub fn read_inputs(path: &Path) -> Result<Vec<EmbeddingInput>, GenerateError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        GenerateError::Input(format!("Failed to open {}: {}", path.display(), e))
    })?;

    let headers = reader.headers()?.clone();
    let promo_idx = column_index(&headers, "promo_id", path)?;
    let product_idx = column_index(&headers, "product_id", path)?;
    let text_idx = column_index(&headers, "embedding_text", path)?;

    let mut inputs = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let promo_id = record.get(promo_idx).unwrap_or("").trim().to_string();
        let product_id = record.get(product_idx).unwrap_or("").trim().to_string();
        let text = record.get(text_idx).unwrap_or("").trim().to_string();

        if promo_id.is_empty() || product_id.is_empty() {
            return Err(GenerateError::Input(format!(
                "Row {} has an empty composite key",
                row + 1
            )));
        }
        if text.is_empty() {
            return Err(GenerateError::Input(format!(
                "Row {} ({}, {}) has no embedding text",
                row + 1,
                promo_id,
                product_id
            )));
        }

        inputs.push(EmbeddingInput {
            promo_id,
            product_id,
            text,
        });
    }

    Ok(inputs)
}

fn column_index(
    headers: &csv::StringRecord,
    name: &str,
    path: &Path,
) -> Result<usize, GenerateError> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        GenerateError::Input(format!(
            "{} is missing required column {:?}",
            path.display(),
            name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_reads_rows_in_file_order() {
        let file = write_csv(
            "promo_id,product_id,embedding_text,base_price\n\
             P1,SKU9,summer promo for lamps,10.0\n\
             P1,SKU2,summer promo for chairs,20.0\n\
             P2,SKU9,winter promo for lamps,10.0\n",
        );

        let inputs = read_inputs(file.path()).unwrap();
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[0].promo_id, "P1");
        assert_eq!(inputs[0].product_id, "SKU9");
        assert_eq!(inputs[1].product_id, "SKU2");
        assert_eq!(inputs[2].promo_id, "P2");
        assert_eq!(inputs[2].text, "winter promo for lamps");
    }

    #[test]
    fn test_missing_embedding_text_column_is_an_error() {
        let file = write_csv("promo_id,product_id\nP1,SKU1\n");
        let result = read_inputs(file.path());
        assert!(matches!(result, Err(GenerateError::Input(_))));
    }

    #[test]
    fn test_empty_text_is_an_error() {
        let file = write_csv("promo_id,product_id,embedding_text\nP1,SKU1,\n");
        let result = read_inputs(file.path());
        assert!(matches!(result, Err(GenerateError::Input(_))));
    }
}
