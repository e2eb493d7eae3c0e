use common::Result;
pub use common::config::SyncMode;
use std::sync::Arc;
use tracing::{info, warn};

use super::{QueryEngine, quote_literal};

/// Asks the engine to rediscover partitions written straight to storage.
pub struct PartitionSynchronizer {
    engine: Arc<dyn QueryEngine>,
    schema: String,
    table: String,
}

impl PartitionSynchronizer {
    pub fn new(engine: Arc<dyn QueryEngine>, schema: &str, table: &str) -> Self {
        Self {
            engine,
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }

    pub fn sync_statement(&self, mode: SyncMode) -> String {
        format!(
            "CALL system.sync_partition_metadata({}, {}, {})",
            quote_literal(&self.schema),
            quote_literal(&self.table),
            quote_literal(&mode.to_string()),
        )
    }

    async fn try_sync(&self, mode: SyncMode) -> Result<()> {
        self.engine.execute(&self.sync_statement(mode)).await?;
        Ok(())
    }

    /// Never fails: the partitions may already be registered, and a stale
    /// partition list must not block later inputs. Returns whether the
    /// engine accepted the call.
    pub async fn sync_partitions(&self, mode: SyncMode) -> bool {
        info!(table = %self.table, mode = %mode, "Syncing partitions");

        match self.try_sync(mode).await {
            Ok(()) => {
                info!(table = %self.table, "Partitions synchronized");
                true
            }
            Err(e) => {
                warn!(
                    table = %self.table,
                    statement = %self.sync_statement(mode),
                    error = %e,
                    "Partition sync failed, continuing"
                );
                false
            }
        }
    }
}
