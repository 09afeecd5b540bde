pub mod export;
pub mod iris;
pub mod loaders;
pub mod split;
pub mod storage;

pub use export::*;
pub use iris::load_iris;
pub use loaders::*;
pub use split::*;
pub use storage::*;

use ht_types::{Dataset, HtResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the pipeline gets its rows from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasetSource {
    /// The embedded Iris dataset.
    Iris,
    /// A headered CSV file on disk.
    Csv { path: PathBuf, label_column: String },
}

impl Default for DatasetSource {
    fn default() -> Self {
        Self::Iris
    }
}

impl DatasetSource {
    pub fn load(&self) -> HtResult<Dataset> {
        match self {
            DatasetSource::Iris => load_iris(),
            DatasetSource::Csv { path, label_column } => {
                CsvDatasetLoader::new(label_column).load_file(path)
            }
        }
    }
}
