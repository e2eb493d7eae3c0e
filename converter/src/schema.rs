use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use lazy_static::lazy_static;
use std::sync::Arc;

/// Column every output row is partitioned by.
pub const PARTITION_COLUMN: &str = "date_of_shipment";

/// Columns a raw shipments file must carry. Order in the file is irrelevant.
pub const INPUT_COLUMNS: &[&str] = &[
    "shipment_number",
    "date_of_shipment",
    "hour_of_shipment",
    "sender_city",
    "latitude",
    "longitude",
    "sender_country",
    "sender_terminal",
    "receiver_country",
    "package_type",
    "weight",
    "size",
    "receiver_city",
    "receiver_terminal",
    "receiver_latitude",
    "receiver_longitude",
];

/// Raw columns whose name is ambiguous, paired with their output name.
pub const COLUMN_RENAMES: &[(&str, &str)] = &[
    ("latitude", "sender_latitude"),
    ("longitude", "sender_longitude"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Numeric,
}

#[derive(Debug, Clone, Copy)]
pub struct OutputColumn {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn text(name: &'static str) -> OutputColumn {
    OutputColumn {
        name,
        kind: ColumnKind::Text,
    }
}

const fn numeric(name: &'static str) -> OutputColumn {
    OutputColumn {
        name,
        kind: ColumnKind::Numeric,
    }
}

// The partition column stays last: the Hive connector requires it.
pub const OUTPUT_COLUMNS: &[OutputColumn] = &[
    text("shipment_number"),
    text("hour_of_shipment"),
    text("sender_city"),
    text("sender_country"),
    text("sender_terminal"),
    text("receiver_city"),
    text("receiver_country"),
    text("receiver_terminal"),
    text("package_type"),
    numeric("weight"),
    text("size"),
    numeric("sender_latitude"),
    numeric("sender_longitude"),
    numeric("receiver_latitude"),
    numeric("receiver_longitude"),
    text(PARTITION_COLUMN),
];

impl OutputColumn {
    /// Raw column this output column is read from.
    pub fn source_name(&self) -> &'static str {
        COLUMN_RENAMES
            .iter()
            .find(|(_, renamed)| *renamed == self.name)
            .map(|(raw, _)| *raw)
            .unwrap_or(self.name)
    }

    pub fn data_type(&self) -> DataType {
        match self.kind {
            ColumnKind::Text => DataType::Utf8,
            ColumnKind::Numeric => DataType::Float64,
        }
    }

    pub fn field(&self) -> Field {
        // Text columns are never null after normalization.
        Field::new(self.name, self.data_type(), self.kind == ColumnKind::Numeric)
    }
}

pub fn output_schema() -> Schema {
    Schema::new(
        OUTPUT_COLUMNS
            .iter()
            .map(OutputColumn::field)
            .collect::<Vec<Field>>(),
    )
}

pub fn get_output_schema() -> SchemaRef {
    OUTPUT_SCHEMA.clone()
}

/// Maps an output column type onto the query engine's SQL type.
pub fn sql_type(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Float64 => "DOUBLE",
        DataType::Int64 => "BIGINT",
        DataType::Boolean => "BOOLEAN",
        _ => "VARCHAR",
    }
}

lazy_static! {
    static ref OUTPUT_SCHEMA: SchemaRef = Arc::new(output_schema());
}
