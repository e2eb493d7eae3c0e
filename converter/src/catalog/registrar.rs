use common::config::TrinoConfig;
use common::{Error, Result};
use std::sync::Arc;
use tracing::{error, info};

use super::{QueryEngine, quote_literal};
use crate::schema::{PARTITION_COLUMN, get_output_schema, sql_type};
use crate::utils::paths::ZoneLayout;

/// The catalog's declaration of the output table.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub columns: Vec<(String, &'static str)>,
    pub location: String,
    pub format: String,
    pub partition_column: String,
}

impl TableDefinition {
    /// Declares the shipments table over the layout's table directory.
    pub fn new(trino: &TrinoConfig, table: &str, layout: &ZoneLayout) -> Self {
        let columns = get_output_schema()
            .fields()
            .iter()
            .map(|field| (field.name().clone(), sql_type(field.data_type())))
            .collect();

        Self {
            catalog: trino.catalog.clone(),
            schema: trino.schema.clone(),
            table: table.to_string(),
            columns,
            location: layout.build_table_location(),
            format: "PARQUET".to_string(),
            partition_column: PARTITION_COLUMN.to_string(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}.{}", self.catalog, self.schema, self.table)
    }

    pub fn create_statement(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|(name, sql_type)| format!("    {} {}", name, sql_type))
            .collect::<Vec<_>>()
            .join(",\n");

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)\nWITH (\n    external_location = {},\n    format = {},\n    partitioned_by = ARRAY[{}]\n)",
            self.qualified_name(),
            columns,
            quote_literal(&self.location),
            quote_literal(&self.format),
            quote_literal(&self.partition_column),
        )
    }
}

pub struct CatalogRegistrar {
    engine: Arc<dyn QueryEngine>,
    definition: TableDefinition,
}

impl CatalogRegistrar {
    pub fn new(engine: Arc<dyn QueryEngine>, definition: TableDefinition) -> Self {
        Self { engine, definition }
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    /// Creates the table unless it already exists. Safe to call every cycle.
    pub async fn ensure_table(&self) -> Result<()> {
        let statement = self.definition.create_statement();

        match self.engine.execute(&statement).await {
            Ok(_) => {
                info!(table = %self.definition.qualified_name(), "Table ensured");
                Ok(())
            }
            Err(e) => {
                error!(
                    table = %self.definition.qualified_name(),
                    statement = %statement,
                    error = %e,
                    "Table creation failed"
                );
                Err(Error::Catalog {
                    statement,
                    message: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingEngine;
    use common::config::PipelineConfig;

    fn definition() -> TableDefinition {
        let layout = ZoneLayout::new("datalake", &PipelineConfig::default());
        TableDefinition::new(&TrinoConfig::default(), "shipments", &layout)
    }

    #[test]
    fn test_create_statement_declares_partitioned_parquet_table() {
        let statement = definition().create_statement();

        assert!(statement.starts_with("CREATE TABLE IF NOT EXISTS hive.default.shipments ("));
        assert!(statement.contains("    shipment_number VARCHAR,"));
        assert!(statement.contains("    weight DOUBLE,"));
        assert!(statement.contains("    date_of_shipment VARCHAR\n)"));
        assert!(statement.contains("external_location = 's3://datalake/parquet/shipments/'"));
        assert!(statement.contains("format = 'PARQUET'"));
        assert!(statement.contains("partitioned_by = ARRAY['date_of_shipment']"));
    }

    #[tokio::test]
    async fn test_ensure_table_issues_create_statement() {
        let engine = Arc::new(RecordingEngine::new());
        let registrar = CatalogRegistrar::new(engine.clone(), definition());

        registrar.ensure_table().await.unwrap();
        registrar.ensure_table().await.unwrap();

        let statements = engine.statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], registrar.definition().create_statement());
    }

    #[tokio::test]
    async fn test_ensure_table_failure_carries_statement() {
        let engine = Arc::new(RecordingEngine::new());
        engine.fail_on("CREATE TABLE");
        let registrar = CatalogRegistrar::new(engine, definition());

        let err = registrar.ensure_table().await.unwrap_err();

        match err {
            Error::Catalog { statement, message } => {
                assert!(statement.contains("hive.default.shipments"));
                assert!(message.contains("injected failure"));
            }
            other => panic!("expected catalog error, got {other}"),
        }
    }
}
