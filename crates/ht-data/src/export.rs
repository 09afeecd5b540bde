//! Header-less CSV staging of partitions.
//!
//! Each record is `label,feature_0,...,feature_n`: the label leads because
//! the built-in XGBoost container reads the target from the first column.
//! No header row and no index column are written.

use csv::{ReaderBuilder, WriterBuilder};
use ht_types::{DataError, HtResult, Partition};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write a partition as CSV to any writer.
pub fn write_partition<W: Write>(partition: &Partition, writer: W) -> HtResult<()> {
    let mut csv_writer = WriterBuilder::new().has_headers(false).from_writer(writer);

    for row in &partition.rows {
        let record = std::iter::once(row.label)
            .chain(row.features.iter().copied())
            .map(|v| v.to_string());
        csv_writer.write_record(record).map_err(|e| DataError::InvalidFormat {
            message: format!("failed to write {} row {}: {}", partition.kind, row.id, e),
        })?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Serialize a partition to an in-memory CSV buffer.
pub fn partition_to_bytes(partition: &Partition) -> HtResult<Vec<u8>> {
    let mut buffer = Vec::new();
    write_partition(partition, &mut buffer)?;
    Ok(buffer)
}

/// Write a partition to `{dir}/{kind}.csv`, replacing any previous file.
///
/// The staging file is left in place after upload.
pub fn export_to_dir<P: AsRef<Path>>(partition: &Partition, dir: P) -> HtResult<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let path = dir.join(partition.kind.file_name());
    let file = std::fs::File::create(&path)?;
    write_partition(partition, std::io::BufWriter::new(file))?;

    tracing::info!("Staged {} rows of {} at {}", partition.len(), partition.kind, path.display());
    Ok(path)
}

/// Parse exported CSV back into numeric records (label first).
pub fn read_records(bytes: &[u8]) -> HtResult<Vec<Vec<f64>>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .from_reader(bytes);

    let mut records = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result.map_err(|e| DataError::ParseError {
            message: format!("line {}: {}", line + 1, e),
        })?;
        let values = record
            .iter()
            .map(|field| {
                field.parse::<f64>().map_err(|e| DataError::ParseError {
                    message: format!("line {}: '{}' is not numeric: {}", line + 1, field, e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        records.push(values);
    }
    Ok(records)
}
