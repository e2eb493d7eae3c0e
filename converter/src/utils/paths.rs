use common::config::PipelineConfig;

use crate::schema::PARTITION_COLUMN;

/// Directory name Hive-style engines use for rows without a partition value.
pub const DEFAULT_PARTITION_NAME: &str = "__HIVE_DEFAULT_PARTITION__";

/// Object key layout of the watched bucket: the raw zone with its sibling
/// markers, and the partitioned table directory.
#[derive(Debug, Clone)]
pub struct ZoneLayout {
    bucket: String,
    raw_prefix: String,
    table_root: String,
    input_extension: String,
    marker_suffix: String,
    quarantine_suffix: String,
}

impl ZoneLayout {
    pub fn new(bucket: &str, pipeline: &PipelineConfig) -> Self {
        Self {
            bucket: bucket.to_string(),
            raw_prefix: directory(&pipeline.raw_prefix),
            table_root: format!(
                "{}{}",
                directory(&pipeline.parquet_prefix),
                pipeline.table_name.trim_matches('/')
            ),
            input_extension: pipeline.input_extension.clone(),
            marker_suffix: pipeline.marker_suffix.clone(),
            quarantine_suffix: pipeline.quarantine_suffix.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn raw_prefix(&self) -> &str {
        &self.raw_prefix
    }

    /// True for keys directly inside the raw zone carrying the input extension.
    pub fn is_input(&self, key: &str) -> bool {
        match key.strip_prefix(&self.raw_prefix) {
            Some(name) => {
                !name.contains('/')
                    && name.len() > self.input_extension.len()
                    && name.ends_with(&self.input_extension)
            }
            None => false,
        }
    }

    pub fn input_name<'a>(&self, input_key: &'a str) -> &'a str {
        input_key.rsplit('/').next().unwrap_or(input_key)
    }

    pub fn build_input_key(&self, input_name: &str) -> String {
        format!("{}{}", self.raw_prefix, input_name)
    }

    pub fn build_marker_key(&self, input_key: &str) -> String {
        format!("{}{}", input_key, self.marker_suffix)
    }

    pub fn build_quarantine_key(&self, input_key: &str) -> String {
        format!("{}{}", input_key, self.quarantine_suffix)
    }

    pub fn table_root(&self) -> &str {
        &self.table_root
    }

    pub fn build_table_location(&self) -> String {
        format!("s3://{}/{}/", self.bucket, self.table_root)
    }

    /// `<table root>/<partition column>=<value>/<input stem>_<value>.parquet`
    pub fn build_partition_file_key(&self, input_name: &str, partition_value: &str) -> String {
        let stem = input_name
            .strip_suffix(&self.input_extension)
            .unwrap_or(input_name);
        let value = escape_partition_value(partition_value);
        format!(
            "{}/{}={}/{}_{}.parquet",
            self.table_root, PARTITION_COLUMN, value, stem, value
        )
    }
}

fn directory(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Percent-encodes the characters Hive escapes in partition directory names.
pub fn escape_partition_value(value: &str) -> String {
    if value.is_empty() {
        return DEFAULT_PARTITION_NAME.to_string();
    }

    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        let needs_escape = c.is_control()
            || matches!(
                c,
                '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '{' | '[' | ']' | '^'
            );
        if needs_escape {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                escaped.push_str(&format!("%{:02X}", byte));
            }
        } else {
            escaped.push(c);
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ZoneLayout {
        ZoneLayout::new("datalake", &PipelineConfig::default())
    }

    #[test]
    fn test_marker_sits_next_to_input() {
        let layout = layout();
        let key = layout.build_input_key("batch_01.csv");
        assert_eq!(key, "raw/batch_01.csv");
        assert_eq!(layout.build_marker_key(&key), "raw/batch_01.csv.done");
        assert_eq!(layout.build_quarantine_key(&key), "raw/batch_01.csv.failed");
        assert_eq!(layout.input_name(&key), "batch_01.csv");
    }

    #[test]
    fn test_only_direct_csv_children_are_inputs() {
        let layout = layout();
        assert!(layout.is_input("raw/batch_01.csv"));
        assert!(!layout.is_input("raw/batch_01.csv.done"));
        assert!(!layout.is_input("raw/archive/batch_00.csv"));
        assert!(!layout.is_input("raw/.csv"));
        assert!(!layout.is_input("parquet/shipments/x.csv"));
    }

    #[test]
    fn test_partition_file_key() {
        let layout = layout();
        assert_eq!(
            layout.build_partition_file_key("batch_01.csv", "2024-01-01"),
            "parquet/shipments/date_of_shipment=2024-01-01/batch_01_2024-01-01.parquet"
        );
        assert_eq!(layout.build_table_location(), "s3://datalake/parquet/shipments/");
    }

    #[test]
    fn test_partition_values_are_escaped() {
        assert_eq!(escape_partition_value("2024/01/01"), "2024%2F01%2F01");
        assert_eq!(escape_partition_value("a=b"), "a%3Db");
        assert_eq!(escape_partition_value(""), DEFAULT_PARTITION_NAME);
        assert_eq!(escape_partition_value("2024-01-01"), "2024-01-01");
    }

    #[test]
    fn test_prefixes_are_normalized() {
        let pipeline = PipelineConfig {
            raw_prefix: "/landing".to_string(),
            parquet_prefix: "tables/".to_string(),
            ..PipelineConfig::default()
        };
        let layout = ZoneLayout::new("datalake", &pipeline);
        assert_eq!(layout.raw_prefix(), "landing/");
        assert_eq!(layout.table_root(), "tables/shipments");
    }
}
