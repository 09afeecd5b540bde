use csv::ReaderBuilder;
use ht_types::{DataError, Dataset, HtResult, Row};
use std::path::Path;

/// Loader for user-supplied tabular datasets in headered CSV form.
///
/// One column is taken as the label; every other column must be numeric.
/// If every label parses as a number the values are kept as-is. Otherwise
/// the whole column is treated as class names, mapped to indices in order
/// of first appearance.
#[derive(Debug, Clone)]
pub struct CsvDatasetLoader {
    label_column: String,
    delimiter: u8,
}

impl CsvDatasetLoader {
    pub fn new(label_column: &str) -> Self {
        Self {
            label_column: label_column.to_string(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> HtResult<Dataset> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::SourceNotFound(path.display().to_string()).into());
        }

        tracing::info!("Loading CSV dataset from: {}", path.display());
        let bytes = std::fs::read(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset");
        self.load_bytes(name, &bytes)
    }

    pub fn load_bytes(&self, name: &str, bytes: &[u8]) -> HtResult<Dataset> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .from_reader(bytes);

        let headers = reader
            .headers()
            .map_err(|e| DataError::ParseError {
                message: format!("failed to read CSV headers: {}", e),
            })?
            .clone();

        let label_idx = headers
            .iter()
            .position(|h| h.trim() == self.label_column)
            .ok_or_else(|| DataError::InvalidFormat {
                message: format!("label column '{}' not found in {:?}", self.label_column, headers),
            })?;

        let feature_names: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != label_idx)
            .map(|(_, h)| h.trim().to_string())
            .collect();

        let mut records = Vec::new();
        for (id, result) in reader.records().enumerate() {
            let record = result.map_err(|e| DataError::ParseError {
                message: format!("record {}: {}", id + 1, e),
            })?;

            let mut features = Vec::with_capacity(feature_names.len());
            let mut label = None;
            for (i, field) in record.iter().enumerate() {
                let field = field.trim();
                if i == label_idx {
                    label = Some(field.to_string());
                } else {
                    features.push(field.parse::<f64>().map_err(|e| DataError::ParseError {
                        message: format!("record {}, column {}: '{}': {}", id + 1, i, field, e),
                    })?);
                }
            }

            let label = label.ok_or_else(|| DataError::InvalidFormat {
                message: format!("record {} has no label column", id + 1),
            })?;
            records.push((features, label));
        }

        // One encoding for the whole column: numeric only if every label is.
        let numeric: Option<Vec<f64>> = records
            .iter()
            .map(|(_, label)| label.parse::<f64>().ok())
            .collect();

        let mut target_names: Vec<String> = Vec::new();
        let labels = match numeric {
            Some(values) => values,
            None => records
                .iter()
                .map(|(_, label)| class_index(&mut target_names, label) as f64)
                .collect(),
        };

        let rows: Vec<Row> = records
            .into_iter()
            .zip(labels)
            .enumerate()
            .map(|(id, ((features, _), label))| Row::new(id, features, label))
            .collect();

        if rows.is_empty() {
            return Err(DataError::InsufficientData {
                message: format!("dataset '{}' has no rows", name),
            }
            .into());
        }

        let dataset = Dataset::new(name, feature_names, target_names, rows);
        dataset.validate()?;

        tracing::info!("Loaded {} rows with {} features", dataset.len(), dataset.n_features());
        Ok(dataset)
    }
}

fn class_index(classes: &mut Vec<String>, name: &str) -> usize {
    match classes.iter().position(|c| c == name) {
        Some(idx) => idx,
        None => {
            classes.push(name.to_string());
            classes.len() - 1
        }
    }
}
