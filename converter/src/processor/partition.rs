use arrow::array::{Array, StringArray, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::record_batch::RecordBatch;
use common::{Error, Result};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::schema::PARTITION_COLUMN;
use crate::storage::s3::ObjectStorage;
use crate::utils::paths::ZoneLayout;

/// One Parquet object written for one partition value of one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFile {
    pub partition: String,
    pub key: String,
    pub rows: usize,
}

pub struct PartitionWriter {
    storage: Arc<dyn ObjectStorage>,
    layout: ZoneLayout,
}

impl PartitionWriter {
    pub fn new(storage: Arc<dyn ObjectStorage>, layout: ZoneLayout) -> Self {
        Self { storage, layout }
    }

    /// Writes one file per partition value. A failed group stops the write;
    /// groups written before it are left in place.
    pub async fn write(&self, batch: &RecordBatch, input_name: &str) -> Result<Vec<PartitionFile>> {
        let groups = group_by_partition(batch)?;
        let mut files = Vec::with_capacity(groups.len());

        for (partition, group) in groups {
            let key = self.layout.build_partition_file_key(input_name, &partition);

            info!(
                input = input_name,
                partition = %partition,
                path = %key,
                rows = group.num_rows(),
                "Saving Parquet partition"
            );

            let buffer = encode_parquet(&group, input_name).map_err(|e| Error::write(&key, e))?;
            self.storage
                .put_object(&key, &buffer)
                .await
                .map_err(|e| Error::write(&key, e))?;

            files.push(PartitionFile {
                partition,
                key,
                rows: group.num_rows(),
            });
        }

        Ok(files)
    }
}

/// Splits a normalized batch by partition value, keeping row order within
/// each group. Every row lands in exactly one group.
pub fn group_by_partition(batch: &RecordBatch) -> Result<BTreeMap<String, RecordBatch>> {
    let column = batch
        .column_by_name(PARTITION_COLUMN)
        .ok_or_else(|| Error::InvalidInput(format!("Batch has no {} column", PARTITION_COLUMN)))?;
    let values = column
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "{} must be a string column, found {}",
                PARTITION_COLUMN,
                column.data_type()
            ))
        })?;

    let mut rows_by_value: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for row in 0..values.len() {
        let value = if values.is_null(row) { "" } else { values.value(row) };
        rows_by_value
            .entry(value.to_string())
            .or_default()
            .push(row as u32);
    }

    let mut groups = BTreeMap::new();
    for (value, rows) in rows_by_value {
        let group = take_record_batch(batch, &UInt32Array::from(rows))?;
        groups.insert(value, group);
    }
    Ok(groups)
}

/// Serializes a batch into a complete Parquet file in memory, so that the
/// object store receives it in a single put.
fn encode_parquet(batch: &RecordBatch, input_name: &str) -> Result<Vec<u8>> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![KeyValue::new(
            "source_input".to_string(),
            input_name.to_string(),
        )]))
        .build();

    let mut buffer: Vec<u8> = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(buffer)
}
