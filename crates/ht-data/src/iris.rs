//! The Iris flower dataset, embedded in the crate.
//!
//! Fisher's 150 measurements of three iris species, four numeric features
//! each. Labels are class indices into [`TARGET_NAMES`].

use csv::ReaderBuilder;
use ht_types::{DataError, Dataset, HtResult, Row};
use serde::Deserialize;

const IRIS_CSV: &str = include_str!("../data/iris.csv");

pub const FEATURE_NAMES: [&str; 4] =
    ["sepal_length", "sepal_width", "petal_length", "petal_width"];
pub const TARGET_NAMES: [&str; 3] = ["setosa", "versicolor", "virginica"];

#[derive(Debug, Deserialize)]
struct IrisRecord {
    sepal_length: f64,
    sepal_width: f64,
    petal_length: f64,
    petal_width: f64,
    species: String,
}

/// Load the full Iris dataset in its canonical row order.
pub fn load_iris() -> HtResult<Dataset> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(IRIS_CSV.as_bytes());

    let mut rows = Vec::with_capacity(150);
    for (id, result) in reader.deserialize().enumerate() {
        let record: IrisRecord = result.map_err(|e| DataError::ParseError {
            message: format!("iris record {}: {}", id, e),
        })?;

        let label = TARGET_NAMES
            .iter()
            .position(|name| *name == record.species)
            .ok_or_else(|| DataError::InvalidFormat {
                message: format!("unknown iris species '{}'", record.species),
            })?;

        rows.push(Row::new(
            id,
            vec![
                record.sepal_length,
                record.sepal_width,
                record.petal_length,
                record.petal_width,
            ],
            label as f64,
        ));
    }

    tracing::debug!("Loaded {} iris rows", rows.len());

    Ok(Dataset::new(
        "iris",
        FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        TARGET_NAMES.iter().map(|s| s.to_string()).collect(),
        rows,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_all_rows() {
        let iris = load_iris().unwrap();
        assert_eq!(iris.name, "iris");
        assert_eq!(iris.len(), 150);
        assert_eq!(iris.n_features(), 4);
        assert!(iris.validate().is_ok());
    }

    #[test]
    fn fifty_rows_per_class() {
        let iris = load_iris().unwrap();
        for class in 0..3 {
            let count = iris.rows.iter().filter(|r| r.label == class as f64).count();
            assert_eq!(count, 50, "class {}", TARGET_NAMES[class]);
        }
    }

    #[test]
    fn canonical_first_and_last_rows() {
        let iris = load_iris().unwrap();
        let first = &iris.rows[0];
        assert_eq!(first.id, 0);
        assert_eq!(first.features, vec![5.1, 3.5, 1.4, 0.2]);
        assert_eq!(first.label, 0.0);

        let last = &iris.rows[149];
        assert_eq!(last.id, 149);
        assert_eq!(last.features, vec![5.9, 3.0, 5.1, 1.8]);
        assert_eq!(last.label, 2.0);
    }

    #[test]
    fn feature_means_match_reference() {
        let iris = load_iris().unwrap();
        let n = iris.len() as f64;
        let mean = |i: usize| iris.rows.iter().map(|r| r.features[i]).sum::<f64>() / n;
        assert!((mean(0) - 5.843333).abs() < 1e-5);
        assert!((mean(2) - 3.758).abs() < 1e-5);
    }
}
