//! Shared test doubles and fixtures.

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use common::{Error, Result};
use datafusion::prelude::SessionContext;
use object_store::memory::InMemory;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::catalog::QueryEngine;
use crate::processor::{RecordNormalizer, read_csv};
use crate::storage::s3::ObjectStorage;
use crate::storage::store::ObjectStoreStorage;

pub const SHIPMENTS_HEADER: &str = "shipment_number,date_of_shipment,hour_of_shipment,sender_city,latitude,longitude,sender_country,sender_terminal,receiver_country,package_type,weight,size,receiver_city,receiver_terminal,receiver_latitude,receiver_longitude";

/// Builds a shipments CSV from `(shipment_number, date_of_shipment,
/// latitude, longitude, weight)` tuples; the other columns get fixed values.
pub fn shipments_csv(rows: &[(&str, &str, &str, &str, &str)]) -> String {
    let mut csv = String::from(SHIPMENTS_HEADER);
    csv.push('\n');
    for (shipment, date, latitude, longitude, weight) in rows {
        csv.push_str(&format!(
            "{shipment},{date},09:30,Hamburg,{latitude},{longitude},DE,HAM-1,PL,parcel,{weight},S,Gdansk,GDN-2,54.35,18.65\n"
        ));
    }
    csv
}

pub async fn normalized_batch(rows: &[(&str, &str, &str, &str, &str)]) -> RecordBatch {
    let raw = read_csv(shipments_csv(rows).as_bytes(), "fixture.csv").unwrap();
    RecordNormalizer::new(SessionContext::new())
        .normalize(raw, "fixture.csv")
        .await
        .unwrap()
}

pub fn memory_storage() -> Arc<dyn ObjectStorage> {
    Arc::new(ObjectStoreStorage::new("datalake", Arc::new(InMemory::new())))
}

pub fn read_parquet(data: &[u8]) -> RecordBatch {
    let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(data))
        .unwrap()
        .build()
        .unwrap();
    let batches: Vec<RecordBatch> = reader.map(|batch| batch.unwrap()).collect();
    arrow::compute::concat_batches(&batches[0].schema(), &batches).unwrap()
}

/// Storage double over [`memory_storage`] whose puts under a registered
/// prefix fail until cleared.
pub struct FailingWrites {
    inner: Arc<dyn ObjectStorage>,
    failing_prefix: Mutex<Option<String>>,
}

impl FailingWrites {
    pub fn new() -> Self {
        Self {
            inner: memory_storage(),
            failing_prefix: Mutex::new(None),
        }
    }

    pub fn fail_under(&self, prefix: &str) {
        *self.failing_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    pub fn clear_failures(&self) {
        *self.failing_prefix.lock().unwrap() = None;
    }
}

#[async_trait]
impl ObjectStorage for FailingWrites {
    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()> {
        let failing = self
            .failing_prefix
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|prefix| key.starts_with(prefix));
        if failing {
            return Err(Error::Storage(format!("injected put failure for {key}")));
        }
        self.inner.put_object(key, data).await
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.get_object(key).await
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list_objects(prefix).await
    }

    async fn check_file_exists(&self, key: &str) -> Result<bool> {
        self.inner.check_file_exists(key).await
    }

    fn invalidate_listing_cache(&self, prefix: &str) {
        self.inner.invalidate_listing_cache(prefix)
    }

    fn bucket(&self) -> &str {
        self.inner.bucket()
    }
}

/// Query engine double that records every statement and fails the ones
/// containing a registered pattern.
#[derive(Default)]
pub struct RecordingEngine {
    statements: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, pattern: &str) {
        self.failures.lock().unwrap().push(pattern.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryEngine for RecordingEngine {
    async fn execute(&self, statement: &str) -> Result<Vec<Vec<Value>>> {
        self.statements.lock().unwrap().push(statement.to_string());

        let failing = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|pattern| statement.contains(pattern.as_str()));
        if failing {
            return Err(Error::QueryEngine("injected failure".to_string()));
        }
        Ok(Vec::new())
    }
}
