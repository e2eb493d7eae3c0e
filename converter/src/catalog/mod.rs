pub mod registrar;
pub mod sync;
pub mod trino;

use async_trait::async_trait;
use common::Result;
use serde_json::Value;

pub use registrar::{CatalogRegistrar, TableDefinition};
pub use sync::PartitionSynchronizer;
pub use trino::TrinoClient;

/// A SQL engine that can run one statement at a time.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Runs `statement` to completion and returns its rows. DDL and
    /// procedure calls return no rows.
    async fn execute(&self, statement: &str) -> Result<Vec<Vec<Value>>>;
}

/// Renders a SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
