use arrow::error::ArrowError;
use aws_sdk_s3::primitives::ByteStreamError;
use aws_smithy_runtime_api::client::result::CreateUnhandledError;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use parquet::errors::ParquetError;
use datafusion::error::DataFusionError;
use thiserror::Error;
use url::ParseError;

pub mod config;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] rquest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(std::string::FromUtf8Error),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("ByteStream error: {0}")]
    ByteStream(#[from] ByteStreamError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The input is missing columns the schema contract requires.
    #[error("{input} is missing required columns: {}", .missing.join(", "))]
    Validation { input: String, missing: Vec<String> },

    /// The input could not be parsed as delimited text at all.
    #[error("{input} could not be parsed: {message}")]
    MalformedInput { input: String, message: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Catalog statement failed: {message}\n{statement}")]
    Catalog { statement: String, message: String },

    #[error("Query engine error: {0}")]
    QueryEngine(String),

    #[error("Invalid Uri: {0}")]
    InvalidUri(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Failures caused by the content of an input rather than by the
    /// environment. Retrying these without an upstream fix cannot succeed.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Error::Validation { .. } | Error::MalformedInput { .. })
    }

    pub fn write(path: impl Into<String>, source: Error) -> Self {
        Error::Write {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

// Implement From for various SdkError types
impl<E: std::fmt::Debug + CreateUnhandledError> From<SdkError<E, Response>> for Error {
    fn from(err: SdkError<E, Response>) -> Self {
        Error::AwsSdk(format!("{:?}", err))
    }
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        Error::Storage(format!("Object store error: {}", err))
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Utf8(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidUri(format!("URL parse error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_columns() {
        let err = Error::Validation {
            input: "batch.csv".to_string(),
            missing: vec!["weight".to_string(), "size".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "batch.csv is missing required columns: weight, size"
        );
        assert!(err.is_input_error());
    }

    #[test]
    fn test_write_error_keeps_destination() {
        let err = Error::write(
            "parquet/shipments/date_of_shipment=2024-01-01/a_2024-01-01.parquet",
            Error::Storage("connection reset".to_string()),
        );
        assert!(err.to_string().contains("date_of_shipment=2024-01-01"));
        assert!(err.to_string().contains("connection reset"));
        assert!(!err.is_input_error());
    }
}
