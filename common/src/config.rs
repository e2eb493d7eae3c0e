use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Flat variable names understood by earlier deployments of the converter,
/// mapped onto their nested settings keys. These win over every other source.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("MINIO_ENDPOINT", "minio.endpoint"),
    ("MINIO_ACCESS_KEY", "minio.access_key"),
    ("MINIO_SECRET_KEY", "minio.secret_key"),
    ("WATCH_BUCKET", "minio.bucket"),
    ("TRINO_HOST", "trino.host"),
    ("TRINO_PORT", "trino.port"),
    ("TRINO_USER", "trino.user"),
    ("TRINO_CATALOG", "trino.catalog"),
    ("TRINO_SCHEMA", "trino.schema"),
];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub minio: MinioConfig,
    #[serde(default)]
    pub trino: TrinoConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    #[default]
    AwsSdk,
    ObjectStore,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MinioConfig {
    #[serde(default = "default_s3_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_minio_credential")]
    pub access_key: String,
    #[serde(default = "default_minio_credential")]
    pub secret_key: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    #[serde(default = "default_s3_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrinoConfig {
    #[serde(default = "default_trino_scheme")]
    pub scheme: String,
    #[serde(default = "default_trino_host")]
    pub host: String,
    #[serde(default = "default_trino_port")]
    pub port: u16,
    #[serde(default = "default_trino_user")]
    pub user: String,
    #[serde(default = "default_trino_catalog")]
    pub catalog: String,
    #[serde(default = "default_trino_schema")]
    pub schema: String,
}

/// Partition metadata reconciliation mode passed to
/// `system.sync_partition_metadata`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncMode {
    #[default]
    Add,
    Drop,
    Full,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self {
            SyncMode::Add => "ADD",
            SyncMode::Drop => "DROP",
            SyncMode::Full => "FULL",
        };
        f.write_str(mode)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default = "default_raw_prefix")]
    pub raw_prefix: String,
    #[serde(default = "default_parquet_prefix")]
    pub parquet_prefix: String,
    #[serde(default = "default_input_extension")]
    pub input_extension: String,
    #[serde(default = "default_marker_suffix")]
    pub marker_suffix: String,
    #[serde(default = "default_quarantine_suffix")]
    pub quarantine_suffix: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub sync_mode: SyncMode,
    /// Input-level failures tolerated before an input is quarantined.
    /// Unset means retry forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl TrinoConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl Default for MinioConfig {
    fn default() -> Self {
        Self {
            endpoint: default_s3_endpoint(),
            access_key: default_minio_credential(),
            secret_key: default_minio_credential(),
            region: default_s3_region(),
            bucket: default_s3_bucket(),
            backend: StorageBackend::default(),
        }
    }
}

impl Default for TrinoConfig {
    fn default() -> Self {
        Self {
            scheme: default_trino_scheme(),
            host: default_trino_host(),
            port: default_trino_port(),
            user: default_trino_user(),
            catalog: default_trino_catalog(),
            schema: default_trino_schema(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            raw_prefix: default_raw_prefix(),
            parquet_prefix: default_parquet_prefix(),
            input_extension: default_input_extension(),
            marker_suffix: default_marker_suffix(),
            quarantine_suffix: default_quarantine_suffix(),
            poll_interval_secs: default_poll_interval_secs(),
            sync_mode: SyncMode::default(),
            max_attempts: None,
        }
    }
}

fn default_s3_endpoint() -> String {
    "http://minio:9000".to_string()
}

fn default_minio_credential() -> String {
    "minioadmin".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_s3_bucket() -> String {
    "datalake".to_string()
}

fn default_trino_scheme() -> String {
    "http".to_string()
}

fn default_trino_host() -> String {
    "trino".to_string()
}

fn default_trino_port() -> u16 {
    8080
}

fn default_trino_user() -> String {
    "admin".to_string()
}

fn default_trino_catalog() -> String {
    "hive".to_string()
}

fn default_trino_schema() -> String {
    "default".to_string()
}

fn default_table_name() -> String {
    "shipments".to_string()
}

fn default_raw_prefix() -> String {
    "raw/".to_string()
}

fn default_parquet_prefix() -> String {
    "parquet/".to_string()
}

fn default_input_extension() -> String {
    ".csv".to_string()
}

fn default_marker_suffix() -> String {
    ".done".to_string()
}

fn default_quarantine_suffix() -> String {
    ".failed".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

/// `CONVERTER_<SECTION>__<KEY>`, e.g. `CONVERTER_TRINO__PORT`.
fn environment() -> Environment {
    Environment::with_prefix("CONVERTER")
        .prefix_separator("_")
        .separator("__")
}

impl Settings {
    /// Loads settings from an optional TOML file, `CONVERTER_*` variables and
    /// the legacy flat variables, in increasing order of precedence.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(environment());

        Self::from_builder(builder, |name| std::env::var(name).ok())
    }

    pub fn from_builder<F>(
        mut builder: ConfigBuilder<DefaultState>,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for (name, key) in LEGACY_ENV {
            if let Some(value) = lookup(name) {
                debug!(variable = name, key = key, "Applying legacy environment override");
                builder = builder.set_override(*key, value)?;
            }
        }

        let settings: Settings = builder.build()?.try_deserialize()?;

        debug!(
            bucket = %settings.minio.bucket,
            trino = %settings.trino.base_url(),
            table = %settings.pipeline.table_name,
            "Loaded converter settings"
        );

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};
    use std::collections::HashMap;

    fn load(toml: &str, env: &[(&str, &str)]) -> Settings {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let builder = Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        Settings::from_builder(builder, |name| env.get(name).cloned()).unwrap()
    }

    #[test]
    fn test_defaults_suit_local_development() {
        let settings = load("", &[]);
        assert_eq!(settings.minio.endpoint, "http://minio:9000");
        assert_eq!(settings.minio.bucket, "datalake");
        assert_eq!(settings.minio.backend, StorageBackend::AwsSdk);
        assert_eq!(settings.trino.base_url(), "http://trino:8080");
        assert_eq!(settings.trino.catalog, "hive");
        assert_eq!(settings.pipeline.table_name, "shipments");
        assert_eq!(settings.pipeline.poll_interval(), Duration::from_secs(10));
        assert_eq!(settings.pipeline.sync_mode, SyncMode::Add);
        assert_eq!(settings.pipeline.max_attempts, None);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let settings = load(
            r#"
            [minio]
            bucket = "landing"
            backend = "object-store"

            [pipeline]
            sync_mode = "FULL"
            max_attempts = 3
            poll_interval_secs = 2
            "#,
            &[],
        );
        assert_eq!(settings.minio.bucket, "landing");
        assert_eq!(settings.minio.backend, StorageBackend::ObjectStore);
        assert_eq!(settings.minio.region, "us-east-1");
        assert_eq!(settings.pipeline.sync_mode, SyncMode::Full);
        assert_eq!(settings.pipeline.max_attempts, Some(3));
        assert_eq!(settings.pipeline.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_legacy_variables_win() {
        let settings = load(
            r#"
            [trino]
            host = "from-file"
            "#,
            &[
                ("TRINO_HOST", "localhost"),
                ("TRINO_PORT", "18080"),
                ("WATCH_BUCKET", "drop-zone"),
            ],
        );
        assert_eq!(settings.trino.host, "localhost");
        assert_eq!(settings.trino.port, 18080);
        assert_eq!(settings.minio.bucket, "drop-zone");
    }

    #[test]
    fn test_environment_uses_single_underscore_after_prefix() {
        let vars: config::Map<String, String> = [
            ("CONVERTER_TRINO__PORT", "1111"),
            ("CONVERTER_PIPELINE__TABLE_NAME", "parcels"),
            ("CONVERTER_MINIO__BACKEND", "object-store"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let builder = Config::builder().add_source(environment().source(Some(vars)));

        let settings = Settings::from_builder(builder, |_| None).unwrap();

        assert_eq!(settings.trino.port, 1111);
        assert_eq!(settings.pipeline.table_name, "parcels");
        assert_eq!(settings.minio.backend, StorageBackend::ObjectStore);
    }

    #[test]
    fn test_sync_mode_renders_procedure_argument() {
        assert_eq!(SyncMode::Add.to_string(), "ADD");
        assert_eq!(SyncMode::Drop.to_string(), "DROP");
        assert_eq!(SyncMode::Full.to_string(), "FULL");
    }
}
