use common::Result;
use common::config::{Settings, SyncMode};
use datafusion::prelude::SessionContext;
use std::sync::Arc;
use tracing::info;

use crate::catalog::{CatalogRegistrar, PartitionSynchronizer, QueryEngine, TableDefinition};
use crate::processor::{PartitionFile, PartitionWriter, RecordNormalizer, read_csv};
use crate::storage::s3::ObjectStorage;
use crate::utils::paths::ZoneLayout;

#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub input: String,
    pub rows: usize,
    pub files: Vec<PartitionFile>,
    pub synced: bool,
}

/// Drives one raw input through normalization, partition writes and the
/// catalog steps.
pub struct ShipmentConverter {
    storage: Arc<dyn ObjectStorage>,
    layout: ZoneLayout,
    normalizer: RecordNormalizer,
    writer: PartitionWriter,
    registrar: CatalogRegistrar,
    synchronizer: PartitionSynchronizer,
    sync_mode: SyncMode,
}

impl ShipmentConverter {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        engine: Arc<dyn QueryEngine>,
        settings: &Settings,
    ) -> Self {
        let layout = ZoneLayout::new(storage.bucket(), &settings.pipeline);
        let definition =
            TableDefinition::new(&settings.trino, &settings.pipeline.table_name, &layout);

        Self {
            normalizer: RecordNormalizer::new(SessionContext::new()),
            writer: PartitionWriter::new(storage.clone(), layout.clone()),
            registrar: CatalogRegistrar::new(engine.clone(), definition),
            synchronizer: PartitionSynchronizer::new(
                engine,
                &settings.trino.schema,
                &settings.pipeline.table_name,
            ),
            sync_mode: settings.pipeline.sync_mode,
            storage,
            layout,
        }
    }

    pub fn layout(&self) -> &ZoneLayout {
        &self.layout
    }

    pub async fn ensure_table(&self) -> Result<()> {
        self.registrar.ensure_table().await
    }

    /// Converts the input at `input_key`. Any error leaves the input
    /// unconverted from the caller's point of view; a failed partition sync
    /// is only reported in the result.
    pub async fn convert(&self, input_key: &str) -> Result<ConversionReport> {
        let input_name = self.layout.input_name(input_key);
        info!(input = input_name, path = %format!("s3://{}/{}", self.layout.bucket(), input_key), "Reading CSV");

        let data = self.storage.get_object(input_key).await?;
        let raw = read_csv(&data, input_name)?;
        let batch = self.normalizer.normalize(raw, input_name).await?;
        let files = self.writer.write(&batch, input_name).await?;

        info!(
            input = input_name,
            rows = batch.num_rows(),
            partitions = files.len(),
            "Converted input"
        );

        self.registrar.ensure_table().await?;
        let synced = self.synchronizer.sync_partitions(self.sync_mode).await;

        Ok(ConversionReport {
            input: input_name.to_string(),
            rows: batch.num_rows(),
            files,
            synced,
        })
    }
}
