use arrow::compute::concat_batches;
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use common::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;

lazy_static! {
    /// Cells read as missing: the empty string plus the usual spellings of
    /// "not available" that upstream exports emit.
    static ref MISSING_VALUE: Regex = Regex::new(
        r"^(|#N/A|#N/A N/A|#NA|-1\.#IND|-1\.#QNAN|-NaN|-nan|1\.#IND|1\.#QNAN|<NA>|N/A|NA|NULL|NaN|None|n/a|nan|null)$"
    )
    .expect("Invalid missing value regex");
}

/// Reads a headed CSV document into one batch with every column as text.
///
/// Typing is left to the normalizer so that a bad value in one cell cannot
/// reject the whole file.
pub fn read_csv(data: &[u8], input_name: &str) -> Result<RecordBatch> {
    let malformed = |e: ArrowError| Error::MalformedInput {
        input: input_name.to_string(),
        message: e.to_string(),
    };

    let format = Format::default()
        .with_header(true)
        .with_null_regex(MISSING_VALUE.clone());
    let (header, _) = format
        .infer_schema(Cursor::new(data), Some(0))
        .map_err(malformed)?;

    let names = dedupe_header(header.fields().iter().map(|field| field.name().as_str()));
    let fields: Vec<Field> = names
        .into_iter()
        .map(|name| Field::new(name, DataType::Utf8, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let reader = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .build(Cursor::new(data))
        .map_err(malformed)?;

    let batches = reader
        .collect::<std::result::Result<Vec<RecordBatch>, ArrowError>>()
        .map_err(malformed)?;

    Ok(concat_batches(&schema, &batches)?)
}

/// Renames repeated header names to `name.1`, `name.2`, ... so the first
/// occurrence keeps its name and every column stays addressable.
fn dedupe_header<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let names: Vec<&str> = names.collect();
    let mut taken: HashSet<String> = names.iter().map(|name| name.to_string()).collect();
    let mut seen: HashSet<&str> = HashSet::new();

    names
        .iter()
        .map(|&name| {
            if seen.insert(name) {
                return name.to_string();
            }
            let mut suffix = 1;
            loop {
                let candidate = format!("{name}.{suffix}");
                if taken.insert(candidate.clone()) {
                    return candidate;
                }
                suffix += 1;
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, StringArray};

    #[test]
    fn test_reads_every_column_as_text() {
        let csv = "shipment_number,weight\nA1,5\nA2,abc\n";
        let batch = read_csv(csv.as_bytes(), "a.csv").unwrap();

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(1).data_type(), &DataType::Utf8);
        let weight = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(weight.value(0), "5");
        assert_eq!(weight.value(1), "abc");
    }

    #[test]
    fn test_header_only_file_has_no_rows() {
        let batch = read_csv(b"shipment_number,weight\n", "empty.csv").unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 2);
    }

    #[test]
    fn test_repeated_header_names_get_suffixes() {
        let csv = "weight,size,weight,weight.1,weight\n1,S,2,3,4\n";
        let batch = read_csv(csv.as_bytes(), "dup.csv").unwrap();

        let schema = batch.schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["weight", "size", "weight.2", "weight.1", "weight.3"]);

        let first = batch
            .column_by_name("weight")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(first.value(0), "1");
    }

    #[test]
    fn test_missing_value_spellings_read_as_null() {
        let csv = "shipment_number,weight,size\nNA,null,NaN\nN/A,,M\nNAB,5,None\n";
        let batch = read_csv(csv.as_bytes(), "na.csv").unwrap();

        let column = |i: usize| {
            batch
                .column(i)
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap()
                .clone()
        };
        let (shipment, weight, size) = (column(0), column(1), column(2));
        assert!(shipment.is_null(0) && weight.is_null(0) && size.is_null(0));
        assert!(shipment.is_null(1) && weight.is_null(1));
        assert_eq!(size.value(1), "M");
        assert_eq!(shipment.value(2), "NAB");
        assert_eq!(weight.value(2), "5");
        assert!(size.is_null(2));
    }

    #[test]
    fn test_ragged_rows_are_malformed() {
        let csv = "a,b\n1,2\n3,4,5\n";
        let err = read_csv(csv.as_bytes(), "ragged.csv").unwrap_err();
        assert!(matches!(err, Error::MalformedInput { ref input, .. } if input == "ragged.csv"));
        assert!(err.is_input_error());
    }
}
