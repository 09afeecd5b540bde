use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::errors::{DataError, HtResult};

/// A single dataset row: feature vector plus target label.
///
/// `id` is the row's position in the source dataset. It is used to reason
/// about partition membership and is never written out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: usize,
    pub features: Vec<f64>,
    pub label: f64,
}

impl Row {
    pub fn new(id: usize, features: Vec<f64>, label: f64) -> Self {
        Self { id, features, label }
    }
}

/// A fully loaded tabular dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub feature_names: Vec<String>,
    /// Class names indexed by label value; empty for regression targets.
    pub target_names: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(
        name: &str,
        feature_names: Vec<String>,
        target_names: Vec<String>,
        rows: Vec<Row>,
    ) -> Self {
        Self {
            name: name.to_string(),
            feature_names,
            target_names,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Check that every row carries exactly one value per feature name.
    pub fn validate(&self) -> HtResult<()> {
        let expected = self.n_features();
        if let Some(row) = self.rows.iter().find(|r| r.features.len() != expected) {
            return Err(DataError::InvalidFormat {
                message: format!(
                    "row {} has {} features, expected {}",
                    row.id,
                    row.features.len(),
                    expected
                ),
            }
            .into());
        }
        Ok(())
    }
}

/// Which partition a set of rows belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    Train,
    Validation,
    Test,
}

impl PartitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionKind::Train => "train",
            PartitionKind::Validation => "validation",
            PartitionKind::Test => "test",
        }
    }

    /// File name used when the partition is staged as CSV.
    pub fn file_name(&self) -> String {
        format!("{}.csv", self.as_str())
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Named, ordered subset of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub kind: PartitionKind,
    pub rows: Vec<Row>,
}

impl Partition {
    pub fn new(kind: PartitionKind, rows: Vec<Row>) -> Self {
        Self { kind, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> HashSet<usize> {
        self.rows.iter().map(|r| r.id).collect()
    }
}

/// The three partitions produced from one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub train: Partition,
    pub validation: Partition,
    pub test: Partition,
}

impl Split {
    pub fn total_rows(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    pub fn get(&self, kind: PartitionKind) -> &Partition {
        match kind {
            PartitionKind::Train => &self.train,
            PartitionKind::Validation => &self.validation,
            PartitionKind::Test => &self.test,
        }
    }

    pub fn partitions(&self) -> [&Partition; 3] {
        [&self.train, &self.validation, &self.test]
    }

    /// True when no row id appears in more than one partition.
    pub fn is_disjoint(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.total_rows());
        self.partitions()
            .iter()
            .flat_map(|p| p.rows.iter())
            .all(|row| seen.insert(row.id))
    }
}
