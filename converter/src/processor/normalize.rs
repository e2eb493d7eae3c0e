use arrow::array::{Array, ArrayRef, StringArray};
use arrow::compute::concat_batches;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use common::{Error, Result};
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::debug;

use crate::schema::{ColumnKind, INPUT_COLUMNS, OUTPUT_COLUMNS, get_output_schema};

/// Turns a raw text batch into a batch of the output schema.
pub struct RecordNormalizer {
    ctx: SessionContext,
}

impl RecordNormalizer {
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    /// Fails with every required column the batch lacks, in contract order.
    pub fn validate(&self, batch: &RecordBatch, input_name: &str) -> Result<()> {
        let schema = batch.schema();
        let missing: Vec<String> = INPUT_COLUMNS
            .iter()
            .filter(|column| schema.field_with_name(column).is_err())
            .map(|column| column.to_string())
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        debug!(
            input = input_name,
            columns = ?schema.fields().iter().map(|f| f.name().as_str()).collect::<Vec<_>>(),
            "Input columns"
        );
        Err(Error::Validation {
            input: input_name.to_string(),
            missing,
        })
    }

    /// Validates, renames and coerces. Numeric cells that do not parse become
    /// null; text cells that are null become the empty string. Extra raw
    /// columns are dropped.
    pub async fn normalize(&self, batch: RecordBatch, input_name: &str) -> Result<RecordBatch> {
        self.validate(&batch, input_name)?;
        let batch = trim_numeric_cells(batch)?;

        let mut select_exprs: Vec<Expr> = Vec::with_capacity(OUTPUT_COLUMNS.len());
        for column in OUTPUT_COLUMNS {
            let source = ident(column.source_name());
            let coerced = match column.kind {
                ColumnKind::Numeric => try_cast(source, DataType::Float64),
                ColumnKind::Text => when(source.clone().is_null(), lit(""))
                    .otherwise(cast(source, DataType::Utf8))?,
            };
            select_exprs.push(coerced.alias(column.name));
        }

        let batches = self
            .ctx
            .read_batch(batch)?
            .select(select_exprs)?
            .collect()
            .await?;

        let output_schema = get_output_schema();
        let Some(first) = batches.first() else {
            return Ok(RecordBatch::new_empty(output_schema));
        };
        let combined = concat_batches(&first.schema(), &batches)?;

        // Re-checks types and the non-null text guarantee against the contract.
        Ok(RecordBatch::try_new(output_schema, combined.columns().to_vec())?)
    }
}

/// Strips surrounding whitespace from the raw cells of numeric columns so a
/// padded number like `" 10.0"` still parses.
fn trim_numeric_cells(batch: RecordBatch) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();

    for column in OUTPUT_COLUMNS.iter().filter(|c| c.kind == ColumnKind::Numeric) {
        let index = schema.index_of(column.source_name())?;
        if let Some(values) = columns[index].as_any().downcast_ref::<StringArray>() {
            let trimmed: StringArray = values.iter().map(|value| value.map(str::trim)).collect();
            columns[index] = Arc::new(trimmed);
        }
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}
